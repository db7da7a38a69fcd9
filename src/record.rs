//! Record capability trait and built-in record types
//!
//! The table engines are generic over [`Record`]; the archive and script
//! machinery never looks inside a payload. A record's codec must be
//! self-delimiting in both modes: binary payloads know their own extent,
//! text payloads end with their own newline.

use crate::error::{Result, TableError};
use crate::framing::{self, FramedReader};
use crate::script::RangeSpec;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

/// Capability interface every storable record type implements.
pub trait Record: Sized {
    /// Write the payload in the given mode. Text payloads must end with a
    /// newline so a following key can be tokenized.
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()>;

    /// Read a payload, consuming exactly its extent.
    fn read(r: &mut FramedReader, binary: bool) -> Result<Self>;

    /// Slice the record per a script-file range suffix. Only meaningful for
    /// two-dimensional numeric records; everything else rejects it.
    fn extract_range(&self, range: &RangeSpec) -> Result<Self> {
        let _ = range;
        Err(TableError::Format(
            "range suffix not supported for this record type".to_string(),
        ))
    }
}

impl Record for i32 {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        framing::write_i32(w, *self, binary)?;
        if !binary {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        framing::read_i32(r, binary)
    }
}

impl Record for u32 {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        framing::write_u32(w, *self, binary)?;
        if !binary {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        framing::read_u32(r, binary)
    }
}

impl Record for bool {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        framing::write_bool(w, *self, binary)?;
        if !binary {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        framing::read_bool(r, binary)
    }
}

impl Record for f32 {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        framing::write_f32(w, *self, binary)?;
        if !binary {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        framing::read_f32(r, binary)
    }
}

impl Record for f64 {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        framing::write_f64(w, *self, binary)?;
        if !binary {
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        framing::read_f64(r, binary)
    }
}

/// Token record: a single whitespace-free string. Used for key-translation
/// tables among other things.
impl Record for String {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        framing::validate_token(self)?;
        w.write_all(self.as_bytes())?;
        w.write_all(if binary { b" " } else { b"\n" })?;
        Ok(())
    }

    fn read(r: &mut FramedReader, _binary: bool) -> Result<Self> {
        framing::read_token(r)?
            .ok_or_else(|| TableError::Format("expected token, got end of stream".to_string()))
    }
}

/// Float vector. Binary: `FV` token, tagged length, raw little-endian f32s.
/// Text: `[ v0 v1 ... ]` on one line.
impl Record for Vec<f32> {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        if binary {
            framing::write_token(w, "FV")?;
            framing::write_i32(w, self.len() as i32, true)?;
            for v in self {
                w.write_f32::<LittleEndian>(*v)?;
            }
        } else {
            w.write_all(b"[ ")?;
            for v in self {
                write!(w, "{v} ")?;
            }
            w.write_all(b"]\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        if binary {
            framing::expect_token(r, "FV")?;
            let len = framing::read_i32(r, true)?;
            if len < 0 {
                return Err(TableError::Format(format!("negative vector length {len}")));
            }
            let mut data = Vec::with_capacity(len as usize);
            for _ in 0..len {
                data.push(r.read_f32::<LittleEndian>()?);
            }
            Ok(data)
        } else {
            framing::expect_token(r, "[")?;
            let mut data = Vec::new();
            loop {
                let tok = framing::read_token(r)?.ok_or_else(|| {
                    TableError::Format("unterminated vector: missing ']'".to_string())
                })?;
                if tok == "]" {
                    return Ok(data);
                }
                let v = tok.parse::<f32>().map_err(|_| {
                    TableError::Format(format!("cannot parse '{tok}' as f32"))
                })?;
                data.push(v);
            }
        }
    }
}

/// Row-major two-dimensional float matrix.
///
/// Binary: `FM` token, tagged row and column counts, raw little-endian f32s.
/// Text: `[ r00 r01 ; r10 r11 ]` with `;` separating rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(TableError::Format(format!(
                "matrix data length {} does not match {rows}x{cols}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        if row < self.rows {
            Some(self.row_slice(row))
        } else {
            None
        }
    }

    fn row_slice(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }
}

impl Record for Matrix {
    fn write(&self, w: &mut dyn Write, binary: bool) -> Result<()> {
        if binary {
            framing::write_token(w, "FM")?;
            framing::write_i32(w, self.rows as i32, true)?;
            framing::write_i32(w, self.cols as i32, true)?;
            for v in &self.data {
                w.write_f32::<LittleEndian>(*v)?;
            }
        } else {
            w.write_all(b"[ ")?;
            for row in 0..self.rows {
                if row > 0 {
                    w.write_all(b"; ")?;
                }
                for v in self.row_slice(row) {
                    write!(w, "{v} ")?;
                }
            }
            w.write_all(b"]\n")?;
        }
        Ok(())
    }

    fn read(r: &mut FramedReader, binary: bool) -> Result<Self> {
        if binary {
            framing::expect_token(r, "FM")?;
            let rows = framing::read_i32(r, true)?;
            let cols = framing::read_i32(r, true)?;
            if rows < 0 || cols < 0 {
                return Err(TableError::Format(format!(
                    "negative matrix dimension {rows}x{cols}"
                )));
            }
            let (rows, cols) = (rows as usize, cols as usize);
            let mut data = Vec::with_capacity(rows * cols);
            for _ in 0..rows * cols {
                data.push(r.read_f32::<LittleEndian>()?);
            }
            Matrix::new(rows, cols, data)
        } else {
            framing::expect_token(r, "[")?;
            let mut data = Vec::new();
            let mut row_ends = Vec::new();
            loop {
                let tok = framing::read_token(r)?.ok_or_else(|| {
                    TableError::Format("unterminated matrix: missing ']'".to_string())
                })?;
                match tok.as_str() {
                    "]" => {
                        row_ends.push(data.len());
                        break;
                    }
                    ";" => row_ends.push(data.len()),
                    _ => {
                        let v = tok.parse::<f32>().map_err(|_| {
                            TableError::Format(format!("cannot parse '{tok}' as f32"))
                        })?;
                        data.push(v);
                    }
                }
            }
            if data.is_empty() {
                return Matrix::new(0, 0, data);
            }
            let cols = row_ends[0];
            let mut prev = 0;
            for end in &row_ends {
                if end - prev != cols {
                    return Err(TableError::Format(
                        "matrix rows have unequal lengths".to_string(),
                    ));
                }
                prev = *end;
            }
            Matrix::new(row_ends.len(), cols, data)
        }
    }

    fn extract_range(&self, range: &RangeSpec) -> Result<Self> {
        let (r0, r1) = range.rows.resolve(self.rows, "row")?;
        let (c0, c1) = range.cols.resolve(self.cols, "column")?;
        let mut data = Vec::with_capacity((r1 - r0 + 1) * (c1 - c0 + 1));
        for row in r0..=r1 {
            data.extend_from_slice(&self.row_slice(row)[c0..=c1]);
        }
        Matrix::new(r1 - r0 + 1, c1 - c0 + 1, data)
    }
}
