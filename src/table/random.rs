//! Random-access table reader
//!
//! Script-backed tables serve each query with a direct lookup and open.
//! Archive-backed tables are the hard case: the stream may be a pipe and
//! cannot be seeked, so queries are served by a forward-scanning cursor
//! plus a cache of records read ahead of their request. Which cached
//! records may be discarded, and when a missing key can be declared absent
//! without draining the stream, depends on the ordering options the caller
//! asserted. Asserted orderings are verified lazily; a falsified assertion
//! aborts with an ordering violation rather than returning a wrong value.
//!
//! Keys compare byte-wise throughout, the same order `sort` produces under
//! the C locale.

use crate::archive;
use crate::error::{Result, TableError};
use crate::record::Record;
use crate::script::{ScriptEntry, ScriptIndex};
use crate::specifier::{ReadKind, ReadOptions, ReadSpecifier};
use crate::table::sequential::load_script_entry;
use crate::xfilename::{classify_read, Input};
use std::collections::BTreeMap;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Read ahead of its request; may still be queried.
    Buffered,
    /// Returned to the caller under an option asserting it will never be
    /// queried again; dropped at the next operation.
    ConsumedDiscardable,
}

struct CacheEntry<R> {
    value: R,
    state: EntryState,
}

/// Eviction rules, fixed once per reader from the asserted option set.
///
/// Without options nothing is ever discarded and worst-case memory is the
/// whole archive. `o` (once) discards an entry after it is returned. `cs`
/// (called-sorted) discards everything below the current query, bounding
/// memory by the gap between consecutive queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Eviction {
    discard_consumed: bool,
    discard_below_query: bool,
}

impl Eviction {
    fn for_options(options: &ReadOptions) -> Self {
        Self {
            discard_consumed: options.once,
            discard_below_query: options.called_sorted,
        }
    }

    /// Apply the state-transition table to the cache at the start of a query.
    fn purge<R>(&self, cache: &mut BTreeMap<String, CacheEntry<R>>, query: &str) {
        let before = cache.len();
        if self.discard_below_query {
            // Everything strictly below the query can never be requested
            // again once queries are non-decreasing.
            *cache = cache.split_off(query);
        }
        if self.discard_consumed {
            cache.retain(|_, e| e.state == EntryState::Buffered);
        }
        let evicted = before - cache.len();
        if evicted > 0 {
            trace!("evicted {evicted} cached records before query '{query}'");
        }
    }
}

struct ArchiveRandom<R: Record> {
    input: Option<Input>,
    options: ReadOptions,
    eviction: Eviction,
    cache: BTreeMap<String, CacheEntry<R>>,
    /// Greatest key read from the archive, for sorted-order verification
    /// and early absence decisions.
    last_archive_key: Option<String>,
    /// Previous query, for called-sorted verification.
    last_query: Option<String>,
    records_read: u64,
}

impl<R: Record> ArchiveRandom<R> {
    fn open(target: &str, options: ReadOptions) -> Result<Self> {
        let input = Input::open(&classify_read(target)?)?;
        Ok(Self {
            input: Some(input),
            options,
            eviction: Eviction::for_options(&options),
            cache: BTreeMap::new(),
            last_archive_key: None,
            last_query: None,
            records_read: 0,
        })
    }

    fn find(&mut self, key: &str) -> Result<bool> {
        if self.options.called_sorted {
            if let Some(last) = &self.last_query {
                if key < last.as_str() {
                    return Err(TableError::OrderingViolation(format!(
                        "query '{key}' after '{last}' breaks the called-sorted assumption"
                    )));
                }
            }
            self.last_query = Some(key.to_string());
        }
        self.eviction.purge(&mut self.cache, key);
        if self.cache.contains_key(key) {
            return Ok(true);
        }
        if self.options.sorted {
            if let Some(last) = &self.last_archive_key {
                if key < last.as_str() {
                    // The cursor is already past where this key would live.
                    return Ok(false);
                }
            }
        }
        while self.input.is_some() {
            let entry = {
                let input = match self.input.as_mut() {
                    Some(input) => input,
                    None => break,
                };
                archive::read_entry::<R>(input.stream(), self.options.permissive)?
            };
            let Some((k, v)) = entry else {
                if let Some(input) = self.input.take() {
                    input.close(self.options.permissive)?;
                }
                break;
            };
            self.records_read += 1;
            if self.options.sorted {
                if let Some(last) = &self.last_archive_key {
                    if k.as_str() < last.as_str() {
                        return Err(TableError::OrderingViolation(format!(
                            "archive key '{k}' after '{last}' breaks the sorted assumption"
                        )));
                    }
                }
            }
            let found = k == key;
            let beyond = self.options.sorted && k.as_str() > key;
            self.last_archive_key = Some(k.clone());
            // A record below a called-sorted query can never be requested;
            // drop it instead of caching.
            if self.eviction.discard_below_query && k.as_str() < key {
                trace!("passing over '{k}' without caching");
            } else {
                self.cache.insert(
                    k,
                    CacheEntry {
                        value: v,
                        state: EntryState::Buffered,
                    },
                );
            }
            if found {
                return Ok(true);
            }
            if beyond {
                // Sorted archives let us declare absence here, leaving the
                // record just read buffered as the new cursor head.
                return Ok(false);
            }
        }
        Ok(false)
    }

    fn value(&mut self, key: &str) -> Result<&R> {
        if !self.find(key)? {
            return Err(TableError::MissingKey(key.to_string()));
        }
        match self.cache.get_mut(key) {
            Some(entry) => {
                if self.eviction.discard_consumed {
                    entry.state = EntryState::ConsumedDiscardable;
                }
                Ok(&entry.value)
            }
            None => Err(TableError::MissingKey(key.to_string())),
        }
    }

    fn close(mut self) -> Result<()> {
        match self.input.take() {
            Some(input) => input.close(self.options.permissive),
            None => Ok(()),
        }
    }
}

struct ScriptRandom<R: Record> {
    index: ScriptIndex,
    options: ReadOptions,
    held: Option<(String, R)>,
}

impl<R: Record> ScriptRandom<R> {
    fn open(target: &str, options: ReadOptions) -> Result<Self> {
        let index = ScriptIndex::load(&classify_read(target)?, options.permissive)?;
        Ok(Self {
            index,
            options,
            held: None,
        })
    }

    fn has_key(&mut self, key: &str) -> Result<bool> {
        let Some(entry) = self.index.get(key).cloned() else {
            return Ok(false);
        };
        if !self.options.permissive {
            return Ok(true);
        }
        // Permissive mode forces a load so a dead script entry reads as
        // absent instead of failing later.
        if self.held.as_ref().is_some_and(|(k, _)| k == key) {
            return Ok(true);
        }
        match self.load(&entry) {
            Ok(value) => {
                self.held = Some((key.to_string(), value));
                Ok(true)
            }
            Err(e) => {
                warn!("treating unloadable entry '{key}' as absent: {e}");
                Ok(false)
            }
        }
    }

    fn value(&mut self, key: &str) -> Result<&R> {
        if !self.held.as_ref().is_some_and(|(k, _)| k == key) {
            let entry = self
                .index
                .get(key)
                .cloned()
                .ok_or_else(|| TableError::MissingKey(key.to_string()))?;
            let value = self.load(&entry)?;
            self.held = Some((key.to_string(), value));
        }
        match &self.held {
            Some((_, value)) => Ok(value),
            None => Err(TableError::MissingKey(key.to_string())),
        }
    }

    fn load(&self, entry: &ScriptEntry) -> Result<R> {
        load_script_entry(entry, self.options.permissive)
    }
}

enum RandomKind<R: Record> {
    Archive(ArchiveRandom<R>),
    Script(ScriptRandom<R>),
}

/// Random-access reader over a table, configured by a read specifier such
/// as `scp:feats.scp` or `ark,s,cs:gunzip -c ali.gz |`.
pub struct RandomAccessTableReader<R: Record> {
    kind: RandomKind<R>,
}

impl<R: Record> RandomAccessTableReader<R> {
    pub fn new(spec: &str) -> Result<Self> {
        let parsed = ReadSpecifier::parse(spec)?;
        let kind = match parsed.kind {
            ReadKind::Archive => {
                RandomKind::Archive(ArchiveRandom::open(&parsed.target, parsed.options)?)
            }
            ReadKind::Script => {
                RandomKind::Script(ScriptRandom::open(&parsed.target, parsed.options)?)
            }
        };
        Ok(Self { kind })
    }

    /// Whether the table holds a value for `key`. May scan the archive
    /// forward; an exhausted search is `false`, not an error.
    pub fn has_key(&mut self, key: &str) -> Result<bool> {
        match &mut self.kind {
            RandomKind::Archive(a) => a.find(key),
            RandomKind::Script(s) => s.has_key(key),
        }
    }

    /// The value for `key`. Querying an absent key is an error; probe with
    /// [`Self::has_key`] first when absence is expected.
    pub fn value(&mut self, key: &str) -> Result<&R> {
        match &mut self.kind {
            RandomKind::Archive(a) => a.value(key),
            RandomKind::Script(s) => s.value(key),
        }
    }

    /// Records pulled off the archive stream so far. Zero for script-backed
    /// tables.
    pub fn records_read(&self) -> u64 {
        match &self.kind {
            RandomKind::Archive(a) => a.records_read,
            RandomKind::Script(_) => 0,
        }
    }

    /// Records currently buffered ahead of their request.
    pub fn cache_size(&self) -> usize {
        match &self.kind {
            RandomKind::Archive(a) => a.cache.len(),
            RandomKind::Script(_) => 0,
        }
    }

    /// Release the underlying stream, reporting a piped command's exit.
    pub fn close(self) -> Result<()> {
        match self.kind {
            RandomKind::Archive(a) => a.close(),
            RandomKind::Script(_) => Ok(()),
        }
    }
}
