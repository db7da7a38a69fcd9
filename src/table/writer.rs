//! Table writer

use crate::archive;
use crate::error::{Result, TableError};
use crate::framing;
use crate::record::Record;
use crate::script::ScriptIndex;
use crate::specifier::{WriteOptions, WriteSpecifier, WriteTarget};
use crate::xfilename::{classify_read, classify_write, Output, XFilename};
use std::io::Write;
use std::marker::PhantomData;
use tracing::debug;

#[derive(Debug)]
enum WriterKind {
    /// Plain archive stream.
    Archive { out: Output },
    /// Archive plus a script file of `<key> <archive-path>:<offset>` lines.
    Both {
        ark: Output,
        scp: Output,
        ark_path: String,
    },
    /// Script-driven: each write goes to the wxfilename a pre-supplied
    /// script maps the key to.
    Script { index: ScriptIndex },
}

/// Writer for a table of records, configured by a write specifier such as
/// `ark:-`, `ark,t,f:/data/x.ark` or `ark,scp:/data/x.ark,/data/x.scp`.
#[derive(Debug)]
pub struct TableWriter<R: Record> {
    kind: WriterKind,
    options: WriteOptions,
    _record: PhantomData<fn(&R)>,
}

impl<R: Record> TableWriter<R> {
    pub fn new(spec: &str) -> Result<Self> {
        let parsed = WriteSpecifier::parse(spec)?;
        let kind = match parsed.target {
            WriteTarget::Archive(target) => {
                let out = Output::open(&classify_write(&target)?)?;
                WriterKind::Archive { out }
            }
            WriteTarget::Both { archive, script } => {
                // Offsets in the emitted script are only meaningful against
                // a path that can later be reopened at an offset.
                let ark_xfn = classify_write(&archive)?;
                if !matches!(ark_xfn, XFilename::PlainFile(_)) {
                    return Err(TableError::Specifier {
                        string: spec.to_string(),
                        reason: "combined form needs a plain file as archive target"
                            .to_string(),
                    });
                }
                let ark = Output::open(&ark_xfn)?;
                let scp = Output::open(&classify_write(&script)?)?;
                WriterKind::Both {
                    ark,
                    scp,
                    ark_path: archive,
                }
            }
            WriteTarget::Script(target) => {
                let index = ScriptIndex::load(&classify_read(&target)?, false)?;
                debug!("script-driven writer over {} entries", index.len());
                WriterKind::Script { index }
            }
        };
        Ok(Self {
            kind,
            options: parsed.options,
            _record: PhantomData,
        })
    }

    /// Append one (key, value) pair to the table.
    pub fn write(&mut self, key: &str, value: &R) -> Result<()> {
        let binary = self.options.binary;
        match &mut self.kind {
            WriterKind::Archive { out } => {
                archive::write_entry(out, key, value, binary)?;
                if self.options.flush {
                    out.flush()?;
                }
            }
            WriterKind::Both { ark, scp, ark_path } => {
                let offset = archive::write_entry(ark, key, value, binary)?;
                writeln!(scp, "{key} {ark_path}:{offset}")?;
                if self.options.flush {
                    ark.flush()?;
                    scp.flush()?;
                }
            }
            WriterKind::Script { index } => {
                framing::validate_token(key)?;
                let Some(entry) = index.get(key).cloned() else {
                    if self.options.permissive {
                        debug!("no script entry for '{key}', skipping write");
                        return Ok(());
                    }
                    return Err(TableError::MissingKey(key.to_string()));
                };
                if entry.range.is_some() {
                    return Err(TableError::Format(format!(
                        "script entry for '{key}' has a range suffix, not writable"
                    )));
                }
                let mut out = Output::open(&classify_write(&entry.xfilename)?)?;
                if binary {
                    framing::write_binary_marker(&mut out)?;
                }
                value.write(&mut out, binary)?;
                out.close()?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.kind {
            WriterKind::Archive { out } => out.flush(),
            WriterKind::Both { ark, scp, .. } => {
                ark.flush()?;
                scp.flush()
            }
            WriterKind::Script { .. } => Ok(()),
        }
    }

    /// Flush, close the target stream(s) and reap any piped subprocess.
    pub fn close(self) -> Result<()> {
        match self.kind {
            WriterKind::Archive { out } => out.close(),
            WriterKind::Both { ark, scp, .. } => {
                ark.close()?;
                scp.close()
            }
            WriterKind::Script { .. } => Ok(()),
        }
    }
}
