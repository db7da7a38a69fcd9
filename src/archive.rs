//! Archive codec
//!
//! An archive is a possibly-empty concatenation of `<key><space><payload>`
//! units with no global header or trailer. Binary payloads open with the
//! two-byte marker; the record codec delimits the payload itself. Nothing
//! here scans ahead for an end sentinel, which is what lets archives be
//! concatenated byte-wise and consumed from pipes.

use crate::error::Result;
use crate::framing::{self, FramedReader};
use crate::record::Record;
use crate::xfilename::Output;
use std::io::Write;
use tracing::{trace, warn};

/// Append one record. Returns the byte offset of the payload start (the
/// binary marker, when present) within the output, which is what a script
/// line must point at for later random access.
pub fn write_entry<R: Record>(
    out: &mut Output,
    key: &str,
    value: &R,
    binary: bool,
) -> Result<u64> {
    framing::validate_token(key)?;
    out.write_all(key.as_bytes())?;
    out.write_all(b" ")?;
    let payload_offset = out.written();
    if binary {
        framing::write_binary_marker(out)?;
    }
    value.write(out, binary)?;
    trace!("wrote '{key}' at payload offset {payload_offset}");
    Ok(payload_offset)
}

/// Read the next record, or `None` at a clean end of stream.
///
/// Under `permissive`, a malformed payload is logged and treated as end of
/// stream instead of failing the read.
pub fn read_entry<R: Record>(
    r: &mut FramedReader,
    permissive: bool,
) -> Result<Option<(String, R)>> {
    let Some(key) = framing::read_token(r)? else {
        return Ok(None);
    };
    let binary = framing::detect_binary(r)?;
    match R::read(r, binary) {
        Ok(value) => Ok(Some((key, value))),
        Err(e) if permissive => {
            warn!("treating malformed record '{key}' as end of archive: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
