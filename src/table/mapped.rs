//! Random-access reader with key translation
//!
//! Wraps a [`RandomAccessTableReader`] with an optional secondary table
//! mapping query keys to the keys the primary table is stored under, e.g.
//! utterance to speaker. An empty map specifier degenerates to the plain
//! reader. A key with no translation is simply absent.

use crate::error::{Result, TableError};
use crate::record::Record;
use crate::table::random::RandomAccessTableReader;

pub struct MappedRandomAccessTableReader<R: Record> {
    reader: RandomAccessTableReader<R>,
    key_map: Option<RandomAccessTableReader<String>>,
}

impl<R: Record> MappedRandomAccessTableReader<R> {
    /// Open `table_spec` for values and, unless `map_spec` is empty, a
    /// key-translation table behind it.
    pub fn new(table_spec: &str, map_spec: &str) -> Result<Self> {
        let key_map = if map_spec.is_empty() {
            None
        } else {
            Some(RandomAccessTableReader::new(map_spec)?)
        };
        Ok(Self {
            reader: RandomAccessTableReader::new(table_spec)?,
            key_map,
        })
    }

    fn translate(&mut self, key: &str) -> Result<Option<String>> {
        match &mut self.key_map {
            None => Ok(Some(key.to_string())),
            Some(map) => {
                if map.has_key(key)? {
                    Ok(Some(map.value(key)?.clone()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub fn has_key(&mut self, key: &str) -> Result<bool> {
        match self.translate(key)? {
            Some(mapped) => self.reader.has_key(&mapped),
            None => Ok(false),
        }
    }

    pub fn value(&mut self, key: &str) -> Result<&R> {
        match self.translate(key)? {
            Some(mapped) => self.reader.value(&mapped),
            None => Err(TableError::MissingKey(key.to_string())),
        }
    }

    pub fn close(self) -> Result<()> {
        if let Some(map) = self.key_map {
            map.close()?;
        }
        self.reader.close()
    }
}
