//! Specifier mini-language
//!
//! A specifier is `opts:target`, where `opts` is a comma-separated,
//! order-independent option set and `target` an extended filename. Exactly
//! one of `ark`/`scp` selects the storage kind, except the combined writer
//! form `ark,scp,...:archive-target,script-target` where `ark` must precede
//! `scp` and the first comma in the target splits the two filenames.
//!
//! Write options: `b` binary (default), `t` text, `f` flush after each
//! write, `nf` no flush, `p` permissive. Read options: `o` once, `p`
//! permissive, `s` sorted archive keys, `cs` called in sorted order;
//! `no`, `np`, `ns`, `ncs`, `b`, `t` parse but are inert on the read side.
//! Unknown option tokens are an error.

use crate::error::{Result, TableError};

/// Storage kind of a read specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Archive,
    Script,
}

/// Options governing a table writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub binary: bool,
    pub flush: bool,
    pub permissive: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            binary: true,
            flush: false,
            permissive: false,
        }
    }
}

/// Options governing a table reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOptions {
    pub once: bool,
    pub permissive: bool,
    pub sorted: bool,
    pub called_sorted: bool,
}

/// Target(s) of a write specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    Archive(String),
    Script(String),
    /// Combined form: archive records plus a script file of byte offsets.
    Both { archive: String, script: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSpecifier {
    pub target: WriteTarget,
    pub options: WriteOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSpecifier {
    pub kind: ReadKind,
    pub target: String,
    pub options: ReadOptions,
}

fn spec_err(spec: &str, reason: impl Into<String>) -> TableError {
    TableError::Specifier {
        string: spec.to_string(),
        reason: reason.into(),
    }
}

impl WriteSpecifier {
    pub fn parse(spec: &str) -> Result<Self> {
        let (opts, target) = spec
            .split_once(':')
            .ok_or_else(|| spec_err(spec, "missing ':' between options and target"))?;
        let mut options = WriteOptions::default();
        let mut ark_pos = None;
        let mut scp_pos = None;
        for (pos, tok) in opts.split(',').enumerate() {
            match tok {
                "ark" => ark_pos = Some(pos),
                "scp" => scp_pos = Some(pos),
                "b" => options.binary = true,
                "t" => options.binary = false,
                "f" => options.flush = true,
                "nf" => options.flush = false,
                "p" => options.permissive = true,
                other => {
                    return Err(spec_err(spec, format!("unknown write option '{other}'")));
                }
            }
        }
        let target = match (ark_pos, scp_pos) {
            (Some(a), Some(s)) => {
                if a > s {
                    return Err(spec_err(spec, "'ark' must precede 'scp'"));
                }
                let (archive, script) = target.split_once(',').ok_or_else(|| {
                    spec_err(spec, "combined form needs 'archive-target,script-target'")
                })?;
                WriteTarget::Both {
                    archive: archive.to_string(),
                    script: script.to_string(),
                }
            }
            (Some(_), None) => WriteTarget::Archive(target.to_string()),
            (None, Some(_)) => WriteTarget::Script(target.to_string()),
            (None, None) => {
                return Err(spec_err(spec, "need 'ark' or 'scp'"));
            }
        };
        Ok(Self { target, options })
    }
}

impl ReadSpecifier {
    pub fn parse(spec: &str) -> Result<Self> {
        let (opts, target) = spec
            .split_once(':')
            .ok_or_else(|| spec_err(spec, "missing ':' between options and target"))?;
        let mut options = ReadOptions::default();
        let mut kind = None;
        for tok in opts.split(',') {
            match tok {
                "ark" | "scp" => {
                    let this = if tok == "ark" {
                        ReadKind::Archive
                    } else {
                        ReadKind::Script
                    };
                    if kind.is_some() {
                        return Err(spec_err(spec, "read specifier takes one of 'ark'/'scp'"));
                    }
                    kind = Some(this);
                }
                "o" => options.once = true,
                "p" => options.permissive = true,
                "s" => options.sorted = true,
                "cs" => options.called_sorted = true,
                // Accepted but inert: reserved negations and write-side modes.
                "no" | "np" | "ns" | "ncs" | "b" | "t" => {}
                other => {
                    return Err(spec_err(spec, format!("unknown read option '{other}'")));
                }
            }
        }
        let kind = kind.ok_or_else(|| spec_err(spec, "need 'ark' or 'scp'"))?;
        Ok(Self {
            kind,
            target: target.to_string(),
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_archive_writer() {
        let s = WriteSpecifier::parse("ark,t,f:-").unwrap();
        assert_eq!(s.target, WriteTarget::Archive("-".to_string()));
        assert!(!s.options.binary);
        assert!(s.options.flush);
    }

    #[test]
    fn write_options_are_order_independent() {
        let a = WriteSpecifier::parse("ark,t:/tmp/x.ark").unwrap();
        let b = WriteSpecifier::parse("t,ark:/tmp/x.ark").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parses_combined_writer() {
        let s = WriteSpecifier::parse("ark,scp,t:/tmp/x.ark,/tmp/x.scp").unwrap();
        assert_eq!(
            s.target,
            WriteTarget::Both {
                archive: "/tmp/x.ark".to_string(),
                script: "/tmp/x.scp".to_string(),
            }
        );
        // scp before ark is malformed.
        assert!(WriteSpecifier::parse("scp,ark:/tmp/x.ark,/tmp/x.scp").is_err());
        // Combined form needs two targets.
        assert!(WriteSpecifier::parse("ark,scp:/tmp/x.ark").is_err());
    }

    #[test]
    fn shell_targets_keep_their_commas() {
        let s = ReadSpecifier::parse("ark:cut -d, -f1 data.csv |").unwrap();
        assert_eq!(s.target, "cut -d, -f1 data.csv |");
    }

    #[test]
    fn parses_read_options() {
        let s = ReadSpecifier::parse("scp,o,p,s,cs:feats.scp").unwrap();
        assert_eq!(s.kind, ReadKind::Script);
        assert!(s.options.once);
        assert!(s.options.permissive);
        assert!(s.options.sorted);
        assert!(s.options.called_sorted);
    }

    #[test]
    fn negated_read_options_are_inert() {
        let s = ReadSpecifier::parse("ark,no,np,ns,ncs,b,t:foo.ark").unwrap();
        assert_eq!(s.options, ReadOptions::default());
    }

    #[test]
    fn rejects_malformed_specifiers() {
        assert!(WriteSpecifier::parse("t:/tmp/x.ark").is_err());
        assert!(WriteSpecifier::parse("ark,zz:/tmp/x.ark").is_err());
        assert!(WriteSpecifier::parse("no-colon").is_err());
        assert!(ReadSpecifier::parse("ark,scp:foo").is_err());
        assert!(ReadSpecifier::parse("ark,q:foo").is_err());
        assert!(ReadSpecifier::parse(":foo").is_err());
    }
}
