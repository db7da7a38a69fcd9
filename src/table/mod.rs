//! Table access engines
//!
//! A table is a collection of typed records indexed by string keys, stored
//! as an archive, a script file, or both. Three engines cover the access
//! patterns of a batch pipeline: [`TableWriter`] appends, a
//! [`SequentialTableReader`] streams forward once, and a
//! [`RandomAccessTableReader`] answers keyed queries, staying memory-bounded
//! over non-seekable input when the caller asserts ordering options.

pub mod mapped;
pub mod random;
pub mod sequential;
pub mod writer;

pub use mapped::MappedRandomAccessTableReader;
pub use random::RandomAccessTableReader;
pub use sequential::SequentialTableReader;
pub use writer::TableWriter;
