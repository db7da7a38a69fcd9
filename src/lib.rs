//! Typed archive and script-table I/O for batch-processing pipelines
//!
//! Pipeline stages that communicate through files, pipes and standard
//! streams need a self-describing, concatenable way to move large keyed
//! collections of typed records between them. This crate provides it:
//!
//! - **Extended filenames** name a standard stream (`-`), a plain file, a
//!   byte offset into a file (`feats.ark:1234`), or a shell pipeline
//!   (`gunzip -c foo.gz |` to read, `| gzip -c > foo.gz` to write).
//! - **Archives** are headerless streams of `<key> <payload>` records;
//!   concatenating two archives yields a valid archive, so they live
//!   happily inside pipes. Payloads are binary (marked in-band) or text.
//! - **Script files** are text indexes mapping keys to extended filenames,
//!   optionally with sub-matrix range suffixes.
//! - **Specifiers** such as `ark,t:-`, `scp:feats.scp` or
//!   `ark,scp:/data/x.ark,/data/x.scp` select the storage kind and access
//!   options for the table engines.
//!
//! ## Example
//!
//! ```no_run
//! use arktable::{RandomAccessTableReader, TableWriter};
//!
//! let mut writer = TableWriter::<i32>::new("ark,scp,t:/tmp/x.ark,/tmp/x.scp")?;
//! writer.write("u1", &17)?;
//! writer.write("u2", &42)?;
//! writer.close()?;
//!
//! let mut reader = RandomAccessTableReader::<i32>::new("scp:/tmp/x.scp")?;
//! assert_eq!(*reader.value("u2")?, 42);
//! # Ok::<(), arktable::TableError>(())
//! ```
//!
//! Random access over a non-seekable archive is served by a forward cursor
//! plus a cache; the `s` (sorted keys) and `cs` (called in sorted order)
//! options let the reader bound scan cost and memory, and falsified
//! assertions abort with an ordering violation instead of wrong results.

pub mod archive;
pub mod error;
pub mod framing;
pub mod record;
pub mod script;
pub mod specifier;
pub mod table;
pub mod xfilename;

pub use error::{Result, TableError};
pub use record::{Matrix, Record};
pub use script::{DimRange, RangeSpec, ScriptEntry, ScriptIndex};
pub use specifier::{ReadKind, ReadOptions, ReadSpecifier, WriteOptions, WriteSpecifier};
pub use table::{
    MappedRandomAccessTableReader, RandomAccessTableReader, SequentialTableReader, TableWriter,
};
pub use xfilename::{classify_read, classify_write, Input, Output, XFilename};
