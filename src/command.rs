//! Resolved invocation and dispatch to the archive operations.
//!
//! The CLI (or any other front end) fills in an [`Invocation`]; [`run`]
//! applies the per-command argument rules and calls exactly one
//! [`Archive`] operation.

use std::path::PathBuf;

use log::{debug, warn};

use crate::archive::{Archive, ArchiveError, ExtractReport};
use crate::hamming::HammingConfig;
use crate::header::FileEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Create,
    List,
    Extract,
    Append,
    Delete,
    Concatenate,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Create      => "create",
            Command::List        => "list",
            Command::Extract     => "extract",
            Command::Append      => "append",
            Command::Delete      => "delete",
            Command::Concatenate => "concatenate",
        }
    }
}

/// Everything one operation needs.  `files` holds input paths for
/// create/append, entry names for delete and extract, and source archive
/// paths for concatenate.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command:      Command,
    pub archive_path: PathBuf,
    pub files:        Vec<String>,
    pub hamming:      HammingConfig,
    /// Extraction target directory.
    pub output_dir:   PathBuf,
    /// Refuse `(k, r)` pairs that cannot correct every single-bit error.
    pub strict:       bool,
}

impl Invocation {
    pub fn new(command: Command, archive_path: impl Into<PathBuf>) -> Self {
        Self {
            command,
            archive_path: archive_path.into(),
            files:        Vec::new(),
            hamming:      HammingConfig::default(),
            output_dir:   PathBuf::from("."),
            strict:       false,
        }
    }

    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn hamming(mut self, config: HammingConfig) -> Self {
        self.hamming = config;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// What a successful operation produced.
#[derive(Debug)]
pub enum Outcome {
    /// Directory after create, append or concatenate.
    Written(Vec<FileEntry>),
    Listing(Vec<FileEntry>),
    Extracted(ExtractReport),
    Deleted(Vec<FileEntry>),
}

pub fn run(inv: &Invocation) -> Result<Outcome, ArchiveError> {
    if inv.strict {
        inv.hamming.validate_coverage()?;
    }
    if inv.command == Command::Concatenate && inv.files.len() < 2 {
        return Err(ArchiveError::Validation(
            "concatenate requires at least two source archives".into(),
        ));
    }
    if !inv.hamming.covers_all_positions() {
        warn!(
            "k={} r={} cannot correct every single-bit error",
            inv.hamming.data_bits(),
            inv.hamming.parity_bits(),
        );
    }

    debug!("{} {} ({} file argument(s))", inv.command.name(), inv.archive_path.display(), inv.files.len());
    let archive = Archive::new(&inv.archive_path, inv.hamming);
    Ok(match inv.command {
        Command::Create      => Outcome::Written(archive.create(&inv.files)?),
        Command::List        => Outcome::Listing(archive.list()?),
        Command::Extract     => Outcome::Extracted(archive.extract(&inv.files, &inv.output_dir)?),
        Command::Append      => Outcome::Written(archive.append(&inv.files)?),
        Command::Delete      => Outcome::Deleted(archive.delete(&inv.files)?),
        Command::Concatenate => Outcome::Written(archive.concatenate(&inv.files)?),
    })
}
