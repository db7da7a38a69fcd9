//! Sequential table reader

use crate::archive;
use crate::error::{Result, TableError};
use crate::framing;
use crate::record::Record;
use crate::script::{ScriptEntry, ScriptIndex};
use crate::specifier::{ReadKind, ReadOptions, ReadSpecifier};
use crate::xfilename::{classify_read, Input};
use tracing::warn;

enum Backend {
    Archive { input: Option<Input> },
    Script { entries: std::vec::IntoIter<ScriptEntry> },
}

/// Forward-only, single-pass reader over a table, configured by a read
/// specifier such as `ark:-` or `scp:feats.scp`. Never buffers more than
/// the current record.
///
/// The reader is also an [`Iterator`] over `Result<(String, R)>`.
pub struct SequentialTableReader<R: Record> {
    backend: Backend,
    options: ReadOptions,
    current: Option<(String, R)>,
    pending_err: Option<TableError>,
}

impl<R: Record> SequentialTableReader<R> {
    pub fn new(spec: &str) -> Result<Self> {
        let parsed = ReadSpecifier::parse(spec)?;
        let backend = match parsed.kind {
            ReadKind::Archive => {
                let input = Input::open(&classify_read(&parsed.target)?)?;
                Backend::Archive { input: Some(input) }
            }
            ReadKind::Script => {
                let index =
                    ScriptIndex::load(&classify_read(&parsed.target)?, parsed.options.permissive)?;
                Backend::Script {
                    entries: index.entries().to_vec().into_iter(),
                }
            }
        };
        let mut reader = Self {
            backend,
            options: parsed.options,
            current: None,
            pending_err: None,
        };
        reader.fill_next()?;
        Ok(reader)
    }

    /// True once the sequence is exhausted.
    pub fn done(&self) -> bool {
        self.current.is_none()
    }

    /// Key of the current record.
    pub fn key(&self) -> Option<&str> {
        self.current.as_ref().map(|(k, _)| k.as_str())
    }

    /// Value of the current record.
    pub fn value(&self) -> Option<&R> {
        self.current.as_ref().map(|(_, v)| v)
    }

    /// Advance past the current record.
    pub fn advance(&mut self) -> Result<()> {
        self.current = None;
        self.fill_next()
    }

    /// Release the underlying stream, reporting a piped command's exit.
    pub fn close(mut self) -> Result<()> {
        if let Backend::Archive { input } = &mut self.backend {
            if let Some(input) = input.take() {
                return input.close(self.options.permissive);
            }
        }
        Ok(())
    }

    fn fill_next(&mut self) -> Result<()> {
        let permissive = self.options.permissive;
        match &mut self.backend {
            Backend::Archive { input } => {
                let Some(stream) = input.as_mut() else {
                    return Ok(());
                };
                self.current = archive::read_entry::<R>(stream.stream(), permissive)?;
                if self.current.is_none() {
                    if let Some(input) = input.take() {
                        input.close(permissive)?;
                    }
                }
            }
            Backend::Script { entries } => {
                for entry in entries.by_ref() {
                    match load_script_entry::<R>(&entry, permissive) {
                        Ok(value) => {
                            self.current = Some((entry.key, value));
                            return Ok(());
                        }
                        Err(e) if permissive => {
                            warn!("skipping script entry '{}': {e}", entry.key);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(())
    }
}

impl<R: Record> Iterator for SequentialTableReader<R> {
    type Item = Result<(String, R)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_err.take() {
            return Some(Err(e));
        }
        let current = self.current.take()?;
        if let Err(e) = self.fill_next() {
            self.pending_err = Some(e);
        }
        Some(Ok(current))
    }
}

/// Open one script entry's xfilename and read its record, applying a range
/// suffix when present.
pub(crate) fn load_script_entry<R: Record>(
    entry: &ScriptEntry,
    permissive: bool,
) -> Result<R> {
    let xfn = classify_read(&entry.xfilename)?;
    let mut input = Input::open(&xfn)?;
    let binary = framing::detect_binary(input.stream())?;
    let value = R::read(input.stream(), binary)?;
    input.close(permissive)?;
    match &entry.range {
        Some(range) if !range.is_full() => value.extract_range(range),
        _ => Ok(value),
    }
}
