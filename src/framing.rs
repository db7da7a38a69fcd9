//! Stream framing and primitive codecs
//!
//! Binary mode is signaled in-band by a two-byte marker (`\0B`) at the start
//! of a logical object region; a reader peeks for it to decide binary vs text
//! without out-of-band metadata. Binary scalars carry a one-byte tag encoding
//! width (in bytes) and signedness (high bit set for unsigned); a tag that
//! does not match the expected type fails the read, there is no implicit
//! widening between integer types. Text mode is whitespace tolerant.

use crate::error::{Result, TableError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, BufRead, Read, Write};

/// Marker that opens a binary object region.
pub const BINARY_MARKER: [u8; 2] = [0x00, b'B'];

const UNSIGNED_BIT: u8 = 0x80;

/// A buffered reader with one byte of pushback, enough to sniff the binary
/// marker and to stop token reads at their delimiter.
pub struct FramedReader {
    inner: Box<dyn BufRead>,
    peeked: Option<u8>,
}

impl FramedReader {
    pub fn new(inner: Box<dyn BufRead>) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    /// Next byte without consuming it; `None` at end of stream.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            let mut buf = [0u8; 1];
            self.peeked = match self.inner.read(&mut buf)? {
                0 => None,
                _ => Some(buf[0]),
            };
        }
        Ok(self.peeked)
    }

    /// Consume and return the next byte; `None` at end of stream.
    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        Ok(match self.inner.read(&mut buf)? {
            0 => None,
            _ => Some(buf[0]),
        })
    }
}

impl Read for FramedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            let n = self.inner.read(&mut buf[1..])?;
            return Ok(n + 1);
        }
        self.inner.read(buf)
    }
}

/// Check that a string is a valid token: non-empty, no whitespace.
pub fn validate_token(s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(TableError::Format("empty token".to_string()));
    }
    if s.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(TableError::Format(format!(
            "token '{s}' contains whitespace"
        )));
    }
    Ok(())
}

/// Write a token followed by a single separating space.
pub fn write_token(w: &mut dyn Write, token: &str) -> Result<()> {
    validate_token(token)?;
    w.write_all(token.as_bytes())?;
    w.write_all(b" ")?;
    Ok(())
}

/// Read one whitespace-delimited token, consuming the delimiter that ends it.
/// Returns `None` if the stream ends before any token byte.
pub fn read_token(r: &mut FramedReader) -> Result<Option<String>> {
    // Skip leading whitespace (text-mode tolerance).
    loop {
        match r.peek_byte()? {
            Some(b) if b.is_ascii_whitespace() => {
                r.next_byte()?;
            }
            Some(_) => break,
            None => return Ok(None),
        }
    }
    let mut token = Vec::new();
    loop {
        match r.peek_byte()? {
            Some(b) if b.is_ascii_whitespace() => {
                // Consume exactly one delimiter so a following binary
                // payload starts at the right byte.
                r.next_byte()?;
                break;
            }
            Some(b) => {
                token.push(b);
                r.next_byte()?;
            }
            None => break,
        }
    }
    let token = String::from_utf8(token)
        .map_err(|_| TableError::Format("token is not valid UTF-8".to_string()))?;
    Ok(Some(token))
}

/// Read a token and fail unless it equals `expected`.
pub fn expect_token(r: &mut FramedReader, expected: &str) -> Result<()> {
    match read_token(r)? {
        Some(tok) if tok == expected => Ok(()),
        Some(tok) => Err(TableError::TypeMismatch {
            expected: format!("token '{expected}'"),
            found: format!("token '{tok}'"),
        }),
        None => Err(TableError::TypeMismatch {
            expected: format!("token '{expected}'"),
            found: "end of stream".to_string(),
        }),
    }
}

/// Write the binary-object marker.
pub fn write_binary_marker(w: &mut dyn Write) -> Result<()> {
    w.write_all(&BINARY_MARKER)?;
    Ok(())
}

/// Peek for the binary-object marker, consuming it if present.
pub fn detect_binary(r: &mut FramedReader) -> Result<bool> {
    match r.peek_byte()? {
        Some(0) => {
            r.next_byte()?;
            match r.next_byte()? {
                Some(b'B') => Ok(true),
                other => Err(TableError::Format(format!(
                    "bad binary marker: NUL followed by {other:?}"
                ))),
            }
        }
        _ => Ok(false),
    }
}

fn tag_name(tag: u8) -> String {
    let width = (tag & !UNSIGNED_BIT) * 8;
    if tag & UNSIGNED_BIT != 0 {
        format!("u{width}")
    } else {
        format!("i{width}")
    }
}

fn read_tag(r: &mut FramedReader, expected: u8, expected_name: &str) -> Result<()> {
    let tag = r.next_byte()?.ok_or_else(|| TableError::TypeMismatch {
        expected: expected_name.to_string(),
        found: "end of stream".to_string(),
    })?;
    if tag != expected {
        return Err(TableError::TypeMismatch {
            expected: expected_name.to_string(),
            found: tag_name(tag),
        });
    }
    Ok(())
}

fn parse_text<T: std::str::FromStr>(r: &mut FramedReader, what: &str) -> Result<T> {
    let token = read_token(r)?
        .ok_or_else(|| TableError::Format(format!("expected {what}, got end of stream")))?;
    token
        .parse()
        .map_err(|_| TableError::Format(format!("cannot parse '{token}' as {what}")))
}

pub fn write_i32(w: &mut dyn Write, v: i32, binary: bool) -> Result<()> {
    if binary {
        w.write_all(&[4])?;
        w.write_i32::<LittleEndian>(v)?;
    } else {
        write!(w, "{v} ")?;
    }
    Ok(())
}

pub fn read_i32(r: &mut FramedReader, binary: bool) -> Result<i32> {
    if binary {
        read_tag(r, 4, "i32")?;
        Ok(r.read_i32::<LittleEndian>()?)
    } else {
        parse_text(r, "i32")
    }
}

pub fn write_u32(w: &mut dyn Write, v: u32, binary: bool) -> Result<()> {
    if binary {
        w.write_all(&[4 | UNSIGNED_BIT])?;
        w.write_u32::<LittleEndian>(v)?;
    } else {
        write!(w, "{v} ")?;
    }
    Ok(())
}

pub fn read_u32(r: &mut FramedReader, binary: bool) -> Result<u32> {
    if binary {
        read_tag(r, 4 | UNSIGNED_BIT, "u32")?;
        Ok(r.read_u32::<LittleEndian>()?)
    } else {
        parse_text(r, "u32")
    }
}

pub fn write_bool(w: &mut dyn Write, v: bool, binary: bool) -> Result<()> {
    let byte: &[u8] = if v { b"T" } else { b"F" };
    w.write_all(byte)?;
    if !binary {
        w.write_all(b" ")?;
    }
    Ok(())
}

pub fn read_bool(r: &mut FramedReader, binary: bool) -> Result<bool> {
    let found = if binary {
        r.next_byte()?.map(|b| (b as char).to_string())
    } else {
        read_token(r)?
    };
    match found.as_deref() {
        Some("T") => Ok(true),
        Some("F") => Ok(false),
        Some(other) => Err(TableError::TypeMismatch {
            expected: "bool".to_string(),
            found: format!("'{other}'"),
        }),
        None => Err(TableError::TypeMismatch {
            expected: "bool".to_string(),
            found: "end of stream".to_string(),
        }),
    }
}

/// Floats are tagged with their width only. A value written at one precision
/// is readable at the other; narrowing is performed on read.
pub fn write_f32(w: &mut dyn Write, v: f32, binary: bool) -> Result<()> {
    if binary {
        w.write_all(&[4])?;
        w.write_f32::<LittleEndian>(v)?;
    } else {
        write!(w, "{v} ")?;
    }
    Ok(())
}

pub fn read_f32(r: &mut FramedReader, binary: bool) -> Result<f32> {
    if binary {
        match r.next_byte()? {
            Some(4) => Ok(r.read_f32::<LittleEndian>()?),
            Some(8) => Ok(r.read_f64::<LittleEndian>()? as f32),
            Some(tag) => Err(TableError::TypeMismatch {
                expected: "f32".to_string(),
                found: tag_name(tag),
            }),
            None => Err(TableError::TypeMismatch {
                expected: "f32".to_string(),
                found: "end of stream".to_string(),
            }),
        }
    } else {
        parse_text(r, "f32")
    }
}

pub fn write_f64(w: &mut dyn Write, v: f64, binary: bool) -> Result<()> {
    if binary {
        w.write_all(&[8])?;
        w.write_f64::<LittleEndian>(v)?;
    } else {
        write!(w, "{v} ")?;
    }
    Ok(())
}

pub fn read_f64(r: &mut FramedReader, binary: bool) -> Result<f64> {
    if binary {
        match r.next_byte()? {
            Some(8) => Ok(r.read_f64::<LittleEndian>()?),
            Some(4) => Ok(f64::from(r.read_f32::<LittleEndian>()?)),
            Some(tag) => Err(TableError::TypeMismatch {
                expected: "f64".to_string(),
                found: tag_name(tag),
            }),
            None => Err(TableError::TypeMismatch {
                expected: "f64".to_string(),
                found: "end of stream".to_string(),
            }),
        }
    } else {
        parse_text(r, "f64")
    }
}

#[cfg(test)]
pub(crate) fn reader_over(bytes: &[u8]) -> FramedReader {
    FramedReader::new(Box::new(std::io::Cursor::new(bytes.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_round_trip() {
        let mut buf = Vec::new();
        write_token(&mut buf, "utt-001").unwrap();
        write_token(&mut buf, "utt-002").unwrap();
        let mut r = reader_over(&buf);
        assert_eq!(read_token(&mut r).unwrap().as_deref(), Some("utt-001"));
        assert_eq!(read_token(&mut r).unwrap().as_deref(), Some("utt-002"));
        assert_eq!(read_token(&mut r).unwrap(), None);
    }

    #[test]
    fn token_read_tolerates_extra_whitespace() {
        let mut r = reader_over(b"  \n\t foo \n  bar\n");
        assert_eq!(read_token(&mut r).unwrap().as_deref(), Some("foo"));
        assert_eq!(read_token(&mut r).unwrap().as_deref(), Some("bar"));
        assert_eq!(read_token(&mut r).unwrap(), None);
    }

    #[test]
    fn invalid_tokens_rejected_on_write() {
        let mut buf = Vec::new();
        assert!(write_token(&mut buf, "").is_err());
        assert!(write_token(&mut buf, "has space").is_err());
    }

    #[test]
    fn expect_token_mismatch_is_type_error() {
        let mut r = reader_over(b"FV ");
        let err = expect_token(&mut r, "FM").unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
    }

    #[test]
    fn binary_marker_detection() {
        let mut buf = Vec::new();
        write_binary_marker(&mut buf).unwrap();
        buf.extend_from_slice(b"rest");
        let mut r = reader_over(&buf);
        assert!(detect_binary(&mut r).unwrap());
        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"rest");

        let mut r = reader_over(b"12 ");
        assert!(!detect_binary(&mut r).unwrap());
        assert_eq!(read_i32(&mut r, false).unwrap(), 12);
    }

    #[test]
    fn scalar_round_trips_binary() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -123456, true).unwrap();
        write_u32(&mut buf, 0xdead_beef, true).unwrap();
        write_bool(&mut buf, true, true).unwrap();
        write_f32(&mut buf, 2.5, true).unwrap();
        write_f64(&mut buf, -0.125, true).unwrap();
        let mut r = reader_over(&buf);
        assert_eq!(read_i32(&mut r, true).unwrap(), -123456);
        assert_eq!(read_u32(&mut r, true).unwrap(), 0xdead_beef);
        assert!(read_bool(&mut r, true).unwrap());
        assert_eq!(read_f32(&mut r, true).unwrap(), 2.5);
        assert_eq!(read_f64(&mut r, true).unwrap(), -0.125);
    }

    #[test]
    fn scalar_round_trips_text() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 42, false).unwrap();
        write_bool(&mut buf, false, false).unwrap();
        write_f64(&mut buf, 1.5, false).unwrap();
        let mut r = reader_over(&buf);
        assert_eq!(read_i32(&mut r, false).unwrap(), 42);
        assert!(!read_bool(&mut r, false).unwrap());
        assert_eq!(read_f64(&mut r, false).unwrap(), 1.5);
    }

    #[test]
    fn integer_tag_mismatch_fails() {
        // u32 payload read as i32: signedness differs, no implicit cast.
        let mut buf = Vec::new();
        write_u32(&mut buf, 7, true).unwrap();
        let mut r = reader_over(&buf);
        let err = read_i32(&mut r, true).unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
    }

    #[test]
    fn floats_read_across_precisions() {
        let mut buf = Vec::new();
        write_f32(&mut buf, 3.25, true).unwrap();
        let mut r = reader_over(&buf);
        assert_eq!(read_f64(&mut r, true).unwrap(), 3.25);

        let mut buf = Vec::new();
        write_f64(&mut buf, 3.25, true).unwrap();
        let mut r = reader_over(&buf);
        assert_eq!(read_f32(&mut r, true).unwrap(), 3.25);
    }
}
