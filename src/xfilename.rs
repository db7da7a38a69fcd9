//! Extended-filename classification and stream opening
//!
//! An extended filename is a string denoting a standard stream (`-` or empty),
//! a plain file path, a byte offset into a file (`path:1234`, read side only),
//! or a shell pipeline (`gunzip -c foo.gz |` for reading, `| gzip -c > foo.gz`
//! for writing). Classification is direction-checked: a read-shaped string
//! given for writing is an error, never silently treated as a plain path.

use crate::error::{Result, TableError};
use crate::framing::FramedReader;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

/// A classified extended filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XFilename {
    /// stdin (read) or stdout (write)
    StandardStream,
    /// Ordinary file path
    PlainFile(PathBuf),
    /// File opened and seeked to a byte offset before reading.
    /// The offset must address the start of a record payload.
    OffsetFile(PathBuf, u64),
    /// Shell command whose output (read) or input (write) is piped here
    PipedCommand(String),
}

/// Classify a string as a read-direction extended filename.
pub fn classify_read(s: &str) -> Result<XFilename> {
    if s.is_empty() || s == "-" {
        return Ok(XFilename::StandardStream);
    }
    if let Some(cmd) = s.strip_suffix('|') {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return Err(classify_err(s, "read", "empty pipe command"));
        }
        return Ok(XFilename::PipedCommand(cmd.to_string()));
    }
    if s.starts_with('|') {
        return Err(classify_err(
            s,
            "read",
            "leading '|' denotes an output pipe, not readable",
        ));
    }
    if let Some((path, offset)) = split_offset(s) {
        let offset = offset.parse::<u64>().map_err(|_| {
            classify_err(s, "read", "byte offset does not fit in 64 bits")
        })?;
        return Ok(XFilename::OffsetFile(PathBuf::from(path), offset));
    }
    Ok(XFilename::PlainFile(PathBuf::from(s)))
}

/// Classify a string as a write-direction extended filename.
pub fn classify_write(s: &str) -> Result<XFilename> {
    if s.is_empty() || s == "-" {
        return Ok(XFilename::StandardStream);
    }
    if let Some(cmd) = s.strip_prefix('|') {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return Err(classify_err(s, "write", "empty pipe command"));
        }
        return Ok(XFilename::PipedCommand(cmd.to_string()));
    }
    if s.ends_with('|') {
        return Err(classify_err(
            s,
            "write",
            "trailing '|' denotes an input pipe, not writable",
        ));
    }
    if split_offset(s).is_some() {
        return Err(classify_err(
            s,
            "write",
            "offset form 'path:N' is only valid for reading",
        ));
    }
    Ok(XFilename::PlainFile(PathBuf::from(s)))
}

/// Split `path:digits` into (path, digits) if the string has that shape.
fn split_offset(s: &str) -> Option<(&str, &str)> {
    let (path, offset) = s.rsplit_once(':')?;
    if path.is_empty() || offset.is_empty() {
        return None;
    }
    if !offset.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((path, offset))
}

fn classify_err(s: &str, direction: &'static str, reason: &str) -> TableError {
    TableError::Classification {
        string: s.to_string(),
        direction,
        reason: reason.to_string(),
    }
}

fn open_err(s: &str, e: &dyn std::fmt::Display) -> TableError {
    TableError::Open {
        string: s.to_string(),
        reason: e.to_string(),
    }
}

/// An opened read stream together with the subprocess backing it, if any.
///
/// The engine that opens an `Input` exclusively owns it for its lifetime.
/// [`Input::close`] reports a non-zero exit of a piped command; dropping
/// without closing reaps the subprocess best-effort and only logs.
pub struct Input {
    reader: FramedReader,
    child: Option<Child>,
    desc: String,
}

impl Input {
    /// Open a read-direction extended filename.
    pub fn open(xfn: &XFilename) -> Result<Self> {
        let (reader, child, desc): (Box<dyn BufRead>, _, _) = match xfn {
            XFilename::StandardStream => {
                (Box::new(BufReader::new(io::stdin())), None, "-".to_string())
            }
            XFilename::PlainFile(path) => {
                let file = File::open(path)
                    .map_err(|e| open_err(&path.display().to_string(), &e))?;
                debug!("opened {} for reading", path.display());
                (
                    Box::new(BufReader::new(file)),
                    None,
                    path.display().to_string(),
                )
            }
            XFilename::OffsetFile(path, offset) => {
                let mut file = File::open(path)
                    .map_err(|e| open_err(&path.display().to_string(), &e))?;
                file.seek(SeekFrom::Start(*offset))
                    .map_err(|e| open_err(&path.display().to_string(), &e))?;
                debug!("opened {} at byte offset {}", path.display(), offset);
                (
                    Box::new(BufReader::new(file)),
                    None,
                    format!("{}:{}", path.display(), offset),
                )
            }
            XFilename::PipedCommand(cmd) => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .spawn()
                    .map_err(|e| open_err(cmd, &e))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| open_err(cmd, &"no stdout handle"))?;
                debug!("spawned input command: {}", cmd);
                (
                    Box::new(BufReader::new(stdout)),
                    Some(child),
                    format!("{cmd} |"),
                )
            }
        };
        Ok(Self {
            reader: FramedReader::new(reader),
            child,
            desc,
        })
    }

    /// The stream, with one-byte pushback for binary-marker detection.
    pub fn stream(&mut self) -> &mut FramedReader {
        &mut self.reader
    }

    /// Description of the underlying source, for diagnostics.
    pub fn description(&self) -> &str {
        &self.desc
    }

    /// Close the stream and reap any piped subprocess.
    ///
    /// A non-zero exit status is an error unless `permissive` is set, in
    /// which case it is logged and swallowed.
    pub fn close(mut self, permissive: bool) -> Result<()> {
        match self.finish() {
            Err(e) if permissive => {
                warn!("ignoring input pipe failure: {e}");
                Ok(())
            }
            other => other,
        }
    }

    fn finish(&mut self) -> Result<()> {
        // Drop our read end first so a still-writing command sees EPIPE
        // instead of blocking forever.
        self.reader = FramedReader::new(Box::new(io::empty()));
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(TableError::ProcessExit {
                    command: self.desc.clone(),
                    status: status.code().unwrap_or(-1),
                });
            }
            debug!("input command finished: {}", self.desc);
        }
        Ok(())
    }
}

impl Drop for Input {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.finish() {
                warn!("while dropping input '{}': {e}", self.desc);
            }
        }
    }
}

/// A write stream that counts bytes written, so archive writers can emit
/// byte offsets into script files.
pub struct Output {
    writer: Box<dyn Write>,
    written: u64,
    child: Option<Child>,
    desc: String,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("desc", &self.desc)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

impl Output {
    /// Open a write-direction extended filename.
    pub fn open(xfn: &XFilename) -> Result<Self> {
        let (writer, child, desc): (Box<dyn Write>, _, _) = match xfn {
            XFilename::StandardStream => {
                (Box::new(io::stdout()), None, "-".to_string())
            }
            XFilename::PlainFile(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| open_err(&path.display().to_string(), &e))?;
                debug!("opened {} for writing", path.display());
                (
                    Box::new(BufWriter::new(file)),
                    None,
                    path.display().to_string(),
                )
            }
            XFilename::OffsetFile(path, _) => {
                return Err(classify_err(
                    &path.display().to_string(),
                    "write",
                    "offset form 'path:N' is only valid for reading",
                ));
            }
            XFilename::PipedCommand(cmd) => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::inherit())
                    .spawn()
                    .map_err(|e| open_err(cmd, &e))?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| open_err(cmd, &"no stdin handle"))?;
                debug!("spawned output command: {}", cmd);
                (Box::new(stdin), Some(child), format!("| {cmd}"))
            }
        };
        Ok(Self {
            writer,
            written: 0,
            child,
            desc,
        })
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Description of the underlying sink, for diagnostics.
    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush, close the stream, and reap any piped subprocess.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        // Close our write end so the command sees EOF and can exit.
        self.writer = Box::new(io::sink());
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(TableError::ProcessExit {
                    command: self.desc.clone(),
                    status: status.code().unwrap_or(-1),
                });
            }
            debug!("output command finished: {}", self.desc);
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("while dropping output '{}': {e}", self.desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_standard_streams() {
        assert_eq!(classify_read("-").unwrap(), XFilename::StandardStream);
        assert_eq!(classify_read("").unwrap(), XFilename::StandardStream);
        assert_eq!(classify_write("-").unwrap(), XFilename::StandardStream);
    }

    #[test]
    fn classifies_pipes_by_direction() {
        assert_eq!(
            classify_read("gunzip -c foo.gz |").unwrap(),
            XFilename::PipedCommand("gunzip -c foo.gz".to_string())
        );
        assert_eq!(
            classify_write("| gzip -c > foo.gz").unwrap(),
            XFilename::PipedCommand("gzip -c > foo.gz".to_string())
        );
        assert!(classify_read("| sort").is_err());
        assert!(classify_write("cat foo |").is_err());
    }

    #[test]
    fn classifies_offset_files_read_only() {
        assert_eq!(
            classify_read("/data/foo.ark:1234").unwrap(),
            XFilename::OffsetFile(PathBuf::from("/data/foo.ark"), 1234)
        );
        // Writing to an offset form is a direction mismatch, not a plain file.
        assert!(matches!(
            classify_write("/data/foo.ark:1234"),
            Err(TableError::Classification { .. })
        ));
    }

    #[test]
    fn non_numeric_suffix_is_a_plain_file() {
        assert_eq!(
            classify_read("foo:bar").unwrap(),
            XFilename::PlainFile(PathBuf::from("foo:bar"))
        );
        assert_eq!(
            classify_read("foo:").unwrap(),
            XFilename::PlainFile(PathBuf::from("foo:"))
        );
    }

    #[test]
    fn piped_input_reads_command_output() {
        let xfn = classify_read("printf 'hello world' |").unwrap();
        let mut input = Input::open(&xfn).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(input.stream(), &mut buf).unwrap();
        assert_eq!(buf, b"hello world");
        input.close(false).unwrap();
    }

    #[test]
    fn failing_pipe_surfaces_exit_status() {
        let xfn = classify_read("exit 3 |").unwrap();
        let mut input = Input::open(&xfn).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(input.stream(), &mut buf).unwrap();
        let err = input.close(false).unwrap_err();
        assert!(matches!(err, TableError::ProcessExit { status: 3, .. }));
    }

    #[test]
    fn permissive_close_swallows_exit_status() {
        let xfn = classify_read("exit 3 |").unwrap();
        let mut input = Input::open(&xfn).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(input.stream(), &mut buf).unwrap();
        input.close(true).unwrap();
    }

    #[test]
    fn output_counts_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let xfn = classify_write(path.to_str().unwrap()).unwrap();
        let mut out = Output::open(&xfn).unwrap();
        out.write_all(b"abcde").unwrap();
        assert_eq!(out.written(), 5);
        out.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcde");
    }

    #[test]
    fn offset_file_seeks_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"0123456789").unwrap();
        let spec = format!("{}:4", path.display());
        let xfn = classify_read(&spec).unwrap();
        let mut input = Input::open(&xfn).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(input.stream(), &mut buf).unwrap();
        assert_eq!(buf, b"456789");
    }
}
