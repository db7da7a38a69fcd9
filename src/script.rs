//! Script-file index
//!
//! A script file is a UTF-8 text table, one entry per line:
//! `<key><whitespace><xfilename>` optionally followed by a range suffix
//! `[r0:r1]`, `[r0:r1,c0:c1]` or `[:,c0:c1]` that slices a two-dimensional
//! record along inclusive row/column bounds. Blank lines and lines with an
//! empty key or xfilename are invalid.
//!
//! The index is a sequence of entries, not a key-unique map: duplicate keys
//! are legal under sequential access. Random access observes the first
//! occurrence of a key; which occurrence wins is explicitly undefined.

use crate::error::{Result, TableError};
use crate::xfilename::{Input, XFilename};
use std::collections::HashMap;
use std::io::Read;
use tracing::warn;

/// Inclusive bounds along one axis; `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl DimRange {
    fn is_full(self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Resolve against an axis of length `len` into concrete inclusive bounds.
    pub fn resolve(self, len: usize, axis: &str) -> Result<(usize, usize)> {
        if len == 0 {
            return Err(TableError::Format(format!(
                "range applied to empty {axis} axis"
            )));
        }
        let start = self.start.unwrap_or(0);
        let end = self.end.unwrap_or(len - 1);
        if start > end || end >= len {
            return Err(TableError::Format(format!(
                "{axis} range {start}:{end} out of bounds for length {len}"
            )));
        }
        Ok((start, end))
    }
}

/// Row and column bounds from a script-line range suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeSpec {
    pub rows: DimRange,
    pub cols: DimRange,
}

impl RangeSpec {
    /// Parse the text between the suffix brackets, e.g. `0:9,3:4` or `:,0:12`.
    pub fn parse(inner: &str) -> Result<RangeSpec> {
        let mut parts = inner.splitn(2, ',');
        let rows = Self::parse_dim(parts.next().unwrap_or(""))?;
        let cols = match parts.next() {
            Some(p) => Self::parse_dim(p)?,
            None => DimRange::default(),
        };
        Ok(RangeSpec { rows, cols })
    }

    fn parse_dim(part: &str) -> Result<DimRange> {
        let (a, b) = part.split_once(':').ok_or_else(|| {
            TableError::Format(format!("range dimension '{part}' is missing ':'"))
        })?;
        let parse_bound = |s: &str| -> Result<Option<usize>> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse().map(Some).map_err(|_| {
                    TableError::Format(format!("bad range bound '{s}'"))
                })
            }
        };
        Ok(DimRange {
            start: parse_bound(a)?,
            end: parse_bound(b)?,
        })
    }

    pub fn is_full(&self) -> bool {
        self.rows.is_full() && self.cols.is_full()
    }
}

/// One parsed script line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEntry {
    pub key: String,
    pub xfilename: String,
    pub range: Option<RangeSpec>,
}

impl ScriptEntry {
    /// Parse one script line. The line must be non-blank with a non-empty
    /// key and xfilename after stripping any range suffix.
    pub fn parse_line(line: &str) -> Result<ScriptEntry> {
        let line = line.trim();
        let (key, rest) = line.split_once(char::is_whitespace).ok_or_else(|| {
            TableError::Format(format!("script line '{line}' has no xfilename"))
        })?;
        let rest = rest.trim();
        let (xfilename, range) = split_range_suffix(rest);
        if key.is_empty() || xfilename.is_empty() {
            return Err(TableError::Format(format!(
                "script line '{line}' has an empty key or xfilename"
            )));
        }
        Ok(ScriptEntry {
            key: key.to_string(),
            xfilename: xfilename.to_string(),
            range,
        })
    }
}

/// Strip a trailing `[...]` suffix if it parses as a range; otherwise the
/// whole string is the xfilename (brackets are legal in file names).
fn split_range_suffix(rest: &str) -> (&str, Option<RangeSpec>) {
    if let Some(stripped) = rest.strip_suffix(']') {
        if let Some((xfilename, inner)) = stripped.rsplit_once('[') {
            if !xfilename.is_empty() {
                if let Ok(range) = RangeSpec::parse(inner) {
                    return (xfilename, Some(range));
                }
            }
        }
    }
    (rest, None)
}

/// A loaded script file: entries in file order plus a first-occurrence map.
#[derive(Debug)]
pub struct ScriptIndex {
    entries: Vec<ScriptEntry>,
    by_key: HashMap<String, usize>,
}

impl ScriptIndex {
    /// Load and parse a script extended filename. Under `permissive`, a
    /// malformed line is logged and skipped instead of failing the load.
    pub fn load(xfn: &XFilename, permissive: bool) -> Result<Self> {
        let mut input = Input::open(xfn)?;
        let mut text = String::new();
        input
            .stream()
            .read_to_string(&mut text)
            .map_err(|e| TableError::Open {
                string: input.description().to_string(),
                reason: e.to_string(),
            })?;
        input.close(permissive)?;
        Self::parse(&text, permissive)
    }

    pub fn parse(text: &str, permissive: bool) -> Result<Self> {
        let mut entries = Vec::new();
        let mut by_key = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            match ScriptEntry::parse_line(line) {
                Ok(entry) => {
                    by_key.entry(entry.key.clone()).or_insert(entries.len());
                    entries.push(entry);
                }
                Err(e) if permissive => {
                    warn!("skipping script line {}: {e}", lineno + 1);
                }
                Err(e) => {
                    return Err(TableError::Format(format!(
                        "script line {}: {e}",
                        lineno + 1
                    )));
                }
            }
        }
        Ok(Self { entries, by_key })
    }

    /// First entry for a key, if any.
    pub fn get(&self, key: &str) -> Option<&ScriptEntry> {
        self.by_key.get(key).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
