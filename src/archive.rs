//! High-level [`Archive`] API: the six archive operations.
//!
//! ```no_run
//! use hamarc::archive::Archive;
//! use hamarc::hamming::HammingConfig;
//!
//! let ar = Archive::new("out.haf", HammingConfig::default());
//! ar.create(&["readme.txt"])?;
//! for entry in ar.list()? {
//!     println!("{} ({} bytes)", entry.name, entry.original_size);
//! }
//! ar.extract::<&str>(&[], "restored")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Atomicity
//! Every mutating operation writes a complete new archive into a temp file
//! next to the target and renames it over the target only once everything
//! has been written and synced.  On any error the temp file is dropped
//! (and with it deleted) and the target is left exactly as it was.
//!
//! Existing entries are never re-encoded: append, delete and concatenate
//! copy their encoded bytes verbatim, so a not-yet-corrected bit error
//! survives the copy unchanged.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::hamming::{DecodeStats, HammingCodec, HammingConfig, HammingError};
use crate::header::{self, assign_offsets, header_size, write_header, FileEntry, HeaderError};

const TEMP_PREFIX: &str = ".hamarc-";
const TEMP_SUFFIX: &str = ".tmp";
/// rw-r--r-- for archives and extracted files that did not exist before.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{}: {source}", .path.display())]
    Header { path: PathBuf, source: HeaderError },
    #[error("Cannot decode '{name}': {source}")]
    Decode { name: String, source: HammingError },
    #[error("Cannot encode {}: {source}", .path.display())]
    Encode { path: PathBuf, source: HammingError },
    #[error("File not found in archive: {0}")]
    NotFound(String),
    #[error("Input is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("Input file name is not valid UTF-8: {}", .0.display())]
    NonUtf8Name(PathBuf),
    #[error("Refusing to extract entry with unsafe name {0:?}")]
    UnsafeName(String),
    #[error("Entry '{name}' was encoded with other Hamming parameters ({stored} B stored, {expected} B expected)")]
    ParameterMismatch { name: String, stored: u64, expected: u64 },
    #[error("{} changed size while being archived", .0.display())]
    SourceChanged(PathBuf),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Config(#[from] HammingError),
    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T, ArchiveError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, ArchiveError> {
        self.map_err(|source| ArchiveError::Io { path: path.to_owned(), source })
    }
}

// ── Report types ─────────────────────────────────────────────────────────────

/// One file written by [`Archive::extract`].
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub name:  String,
    pub path:  PathBuf,
    pub stats: DecodeStats,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub files: Vec<ExtractedFile>,
}

impl ExtractReport {
    /// Codewords repaired across all extracted files.
    pub fn corrected(&self) -> u64 {
        self.files.iter().map(|f| f.stats.corrected).sum()
    }
}

/// An input file queued for encoding, with its directory record.
struct PendingFile {
    source: PathBuf,
    entry:  FileEntry,
}

// ── Archive ──────────────────────────────────────────────────────────────────

/// Handle on an archive path plus the Hamming parameters used to encode new
/// entries and decode existing ones.  Holds no open files between calls.
pub struct Archive {
    path:  PathBuf,
    codec: HammingCodec,
}

impl Archive {
    pub fn new<P: AsRef<Path>>(path: P, config: HammingConfig) -> Self {
        Self { path: path.as_ref().to_owned(), codec: HammingCodec::new(config) }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn config(&self) -> HammingConfig { self.codec.config() }

    // ── Create ───────────────────────────────────────────────────────────────

    /// Build a new archive from `inputs`, replacing whatever is at the path.
    pub fn create<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Vec<FileEntry>, ArchiveError> {
        require_files(inputs, "create")?;
        info!("creating {} with {} file(s)", self.path.display(), inputs.len());

        let pending = self.collect_inputs(inputs)?;
        let mut entries: Vec<FileEntry> = pending.iter().map(|p| p.entry.clone()).collect();
        warn_duplicates(&entries);
        assign_offsets(&mut entries);

        replace_atomically(&self.path, |out| {
            write_header(&mut *out, &entries).map_err(|source| self.header_error(source))?;
            for p in &pending {
                self.encode_into(p, out)?;
            }
            Ok(())
        })?;

        info!("created {} ({} entries)", self.path.display(), entries.len());
        Ok(entries)
    }

    // ── List ─────────────────────────────────────────────────────────────────

    pub fn list(&self) -> Result<Vec<FileEntry>, ArchiveError> {
        let (_, entries, _) = open_archive(&self.path)?;
        debug!("{}: {} entries", self.path.display(), entries.len());
        Ok(entries)
    }

    // ── Extract ──────────────────────────────────────────────────────────────

    /// Decode entries into `dest`.  An empty `names` means every entry.
    ///
    /// All requested names are resolved and checked before the first file
    /// is written; one missing name extracts nothing.
    pub fn extract<S: AsRef<str>>(&self, names: &[S], dest: impl AsRef<Path>) -> Result<ExtractReport, ArchiveError> {
        let dest = dest.as_ref();
        let (file, entries, _) = open_archive(&self.path)?;

        let targets: Vec<&FileEntry> = if names.is_empty() {
            entries.iter().collect()
        } else {
            let mut targets = Vec::new();
            let mut requested = HashSet::new();
            for name in names {
                let name = name.as_ref();
                if !requested.insert(name) {
                    continue;
                }
                let before = targets.len();
                targets.extend(entries.iter().filter(|e| e.name == name));
                if targets.len() == before {
                    return Err(ArchiveError::NotFound(name.to_owned()));
                }
            }
            targets
        };

        let config = self.config();
        for entry in &targets {
            let expected = config.encoded_size(entry.original_size);
            if entry.encoded_size != expected {
                return Err(ArchiveError::ParameterMismatch {
                    name:     entry.name.clone(),
                    stored:   entry.encoded_size,
                    expected,
                });
            }
            if safe_relative_path(&entry.name).is_none() {
                return Err(ArchiveError::UnsafeName(entry.name.clone()));
            }
        }

        info!("extracting {} entries from {} into {}", targets.len(), self.path.display(), dest.display());
        let mut report = ExtractReport::default();
        for entry in targets {
            let extracted = self.extract_entry(&file, entry, dest)?;
            report.files.push(extracted);
        }
        Ok(report)
    }

    fn extract_entry(&self, mut archive: &File, entry: &FileEntry, dest: &Path) -> Result<ExtractedFile, ArchiveError> {
        let out_path = match safe_relative_path(&entry.name) {
            Some(rel) => dest.join(rel),
            None => return Err(ArchiveError::UnsafeName(entry.name.clone())),
        };
        let parent = parent_dir(&out_path);
        fs::create_dir_all(parent).at(parent)?;

        archive.seek(SeekFrom::Start(entry.offset)).at(&self.path)?;

        // Decode into a sibling temp file so a corrupt entry never leaves a
        // half-written output behind.
        let tmp = temp_in(parent)?;
        let stats = self.codec
            .decode_stream(archive, tmp.as_file(), entry.original_size, entry.encoded_size)
            .map_err(|source| ArchiveError::Decode { name: entry.name.clone(), source })?;
        apply_permissions(&tmp, &out_path)?;
        tmp.persist(&out_path).map_err(|e| e.error).at(&out_path)?;

        if stats.corrected > 0 {
            warn!("{}: repaired {} of {} codewords", entry.name, stats.corrected, stats.codewords);
        }
        debug!("extracted {} -> {} ({} bytes)", entry.name, out_path.display(), entry.original_size);
        Ok(ExtractedFile { name: entry.name.clone(), path: out_path, stats })
    }

    // ── Append ───────────────────────────────────────────────────────────────

    /// Add `inputs` after the existing entries.  Returns the full new
    /// directory.
    pub fn append<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Vec<FileEntry>, ArchiveError> {
        require_files(inputs, "append")?;
        let (archive, old_entries, _) = open_archive(&self.path)?;
        let pending = self.collect_inputs(inputs)?;
        info!("appending {} file(s) to {} ({} existing)", pending.len(), self.path.display(), old_entries.len());

        let mut all: Vec<FileEntry> = old_entries.clone();
        all.extend(pending.iter().map(|p| p.entry.clone()));
        warn_duplicates(&all);
        assign_offsets(&mut all);

        replace_atomically(&self.path, move |out| {
            write_header(&mut *out, &all).map_err(|source| self.header_error(source))?;
            let mut archive = archive;
            for e in &old_entries {
                copy_range(&mut archive, &self.path, e.offset, e.encoded_size, out)?;
            }
            for p in &pending {
                self.encode_into(p, out)?;
            }
            Ok(all)
        })
    }

    // ── Delete ───────────────────────────────────────────────────────────────

    /// Remove every entry whose name is in `names`.  Returns the removed
    /// entries.  Fails without touching the archive if any name is absent.
    pub fn delete<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<FileEntry>, ArchiveError> {
        require_files(names, "delete")?;
        let (archive, entries, _) = open_archive(&self.path)?;

        for name in names {
            let name = name.as_ref();
            if !entries.iter().any(|e| e.name == name) {
                return Err(ArchiveError::NotFound(name.to_owned()));
            }
        }

        let (removed, kept): (Vec<FileEntry>, Vec<FileEntry>) = entries
            .into_iter()
            .partition(|e| names.iter().any(|n| n.as_ref() == e.name));
        if removed.is_empty() {
            return Err(ArchiveError::Validation("no entries were removed".into()));
        }
        info!("deleting {} entries from {}, keeping {}", removed.len(), self.path.display(), kept.len());

        let mut relocated = kept.clone();
        assign_offsets(&mut relocated);

        replace_atomically(&self.path, move |out| {
            write_header(&mut *out, &relocated).map_err(|source| self.header_error(source))?;
            let mut archive = archive;
            for e in &kept {
                copy_range(&mut archive, &self.path, e.offset, e.encoded_size, out)?;
            }
            Ok(())
        })?;
        Ok(removed)
    }

    // ── Concatenate ──────────────────────────────────────────────────────────

    /// Merge `sources` (in order) into this archive's path.  Colliding names
    /// get the smallest free `"(N)"` suffix, starting at 2.  The destination
    /// may be one of the sources.
    pub fn concatenate<P: AsRef<Path>>(&self, sources: &[P]) -> Result<Vec<FileEntry>, ArchiveError> {
        if sources.len() < 2 {
            return Err(ArchiveError::Validation(
                "concatenate requires at least two source archives".into(),
            ));
        }

        let mut merged  = Vec::new();
        let mut used    = HashSet::new();
        let mut payload = Vec::with_capacity(sources.len());

        for src in sources {
            let src = src.as_ref();
            let (_, entries, file_len) = open_archive(src)?;
            check_contiguous(src, &entries, file_len)?;

            let data_start = header_size(&entries);
            payload.push((src.to_owned(), data_start, file_len - data_start));
            debug!("{}: {} entries, payload {} bytes", src.display(), entries.len(), file_len - data_start);

            for mut entry in entries {
                let name = unique_name(&used, &entry.name);
                if name != entry.name {
                    debug!("renamed {} -> {}", entry.name, name);
                    entry.name = name;
                }
                used.insert(entry.name.clone());
                merged.push(entry);
            }
        }

        assign_offsets(&mut merged);
        info!("concatenating {} archives into {} ({} entries)", sources.len(), self.path.display(), merged.len());

        replace_atomically(&self.path, move |out| {
            write_header(&mut *out, &merged).map_err(|source| self.header_error(source))?;
            for (path, start, len) in &payload {
                let mut src = File::open(path).at(path)?;
                copy_range(&mut src, path, *start, *len, out)?;
            }
            Ok(merged)
        })
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn collect_inputs<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Vec<PendingFile>, ArchiveError> {
        let config = self.config();
        inputs.iter().map(|input| {
            let source = input.as_ref().to_owned();
            let meta = fs::metadata(&source).at(&source)?;
            if !meta.is_file() {
                return Err(ArchiveError::NotAFile(source));
            }
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ArchiveError::NonUtf8Name(source.clone()))?
                .to_owned();
            let original_size = meta.len();
            let entry = FileEntry::new(name, original_size, config.encoded_size(original_size));
            Ok(PendingFile { source, entry })
        }).collect()
    }

    fn encode_into<W: Write>(&self, pending: &PendingFile, out: &mut W) -> Result<(), ArchiveError> {
        let src = File::open(&pending.source).at(&pending.source)?;
        // Never read past the size recorded in the header.
        let input = src.take(pending.entry.original_size);
        let written = self.codec
            .encode_stream(input, &mut *out)
            .map_err(|source| ArchiveError::Encode { path: pending.source.clone(), source })?;
        if written != pending.entry.encoded_size {
            return Err(ArchiveError::SourceChanged(pending.source.clone()));
        }
        debug!("encoded {} ({} -> {} bytes)", pending.entry.name, pending.entry.original_size, written);
        Ok(())
    }

    fn header_error(&self, source: HeaderError) -> ArchiveError {
        ArchiveError::Header { path: self.path.clone(), source }
    }
}

// ── Free helpers ─────────────────────────────────────────────────────────────

fn require_files<T>(files: &[T], op: &str) -> Result<(), ArchiveError> {
    if files.is_empty() {
        return Err(ArchiveError::Validation(format!("{op} requires at least one file name")));
    }
    Ok(())
}

fn open_archive(path: &Path) -> Result<(File, Vec<FileEntry>, u64), ArchiveError> {
    let file = File::open(path).at(path)?;
    let file_len = file.metadata().at(path)?.len();
    let entries = header::read_header(BufReader::new(&file), file_len)
        .map_err(|source| ArchiveError::Header { path: path.to_owned(), source })?;
    Ok((file, entries, file_len))
}

/// Write a replacement for `target` through `fill`, then rename it into
/// place.  The temp file is removed if `fill` or the rename fails.
fn replace_atomically<T, F>(target: &Path, fill: F) -> Result<T, ArchiveError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<T, ArchiveError>,
{
    let dir = parent_dir(target);
    fs::create_dir_all(dir).at(dir)?;
    let tmp = temp_in(dir)?;

    let value = {
        let mut out = BufWriter::new(tmp.as_file());
        let value = fill(&mut out)?;
        out.flush().at(tmp.path())?;
        value
    };
    tmp.as_file().sync_all().at(tmp.path())?;
    apply_permissions(&tmp, target)?;
    tmp.persist(target).map_err(|e| e.error).at(target)?;
    Ok(value)
}

fn temp_in(dir: &Path) -> Result<NamedTempFile, ArchiveError> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .at(dir)
}

/// Give the temp file the mode of the file it replaces, or the usual mode
/// for a new file.  Temp files start out owner-only.
fn apply_permissions(tmp: &NamedTempFile, target: &Path) -> Result<(), ArchiveError> {
    let perms = match fs::metadata(target) {
        Ok(meta) => meta.permissions(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => match new_file_permissions() {
            Some(p) => p,
            None => return Ok(()),
        },
        Err(source) => return Err(ArchiveError::Io { path: target.to_owned(), source }),
    };
    tmp.as_file().set_permissions(perms).at(tmp.path())
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn copy_range<R: Read + Seek, W: Write>(src: &mut R, src_path: &Path, offset: u64, len: u64, out: &mut W) -> Result<(), ArchiveError> {
    src.seek(SeekFrom::Start(offset)).at(src_path)?;
    let copied = io::copy(&mut Read::by_ref(src).take(len), out).at(src_path)?;
    if copied != len {
        return Err(ArchiveError::Header {
            path:   src_path.to_owned(),
            source: HeaderError::Truncated,
        });
    }
    Ok(())
}

/// Payload must be exactly the entries laid out back to back after the
/// header, or the merged offsets would point at the wrong bytes.
fn check_contiguous(path: &Path, entries: &[FileEntry], file_len: u64) -> Result<(), ArchiveError> {
    let mut expected = entries.to_vec();
    let start = assign_offsets(&mut expected);
    let end = expected.last().map_or(start, |e| e.offset + e.encoded_size);
    let layout_ok = expected.iter().zip(entries).all(|(a, b)| a.offset == b.offset);
    if !layout_ok || end != file_len {
        return Err(ArchiveError::Header {
            path:   path.to_owned(),
            source: HeaderError::NonContiguous { expected_len: end, file_len },
        });
    }
    Ok(())
}

/// `name` itself if unused, otherwise the first free `name(N)` for N >= 2.
pub fn unique_name(used: &HashSet<String>, name: &str) -> String {
    if !used.contains(name) {
        return name.to_owned();
    }
    (2u64..)
        .map(|n| format!("{name}({n})"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_owned())
}

/// Entry names are extracted relative to the output directory; absolute
/// paths, `..` and names without a normal component are refused.
fn safe_relative_path(name: &str) -> Option<&Path> {
    let path = Path::new(name);
    let mut has_normal = false;
    for comp in path.components() {
        match comp {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            _ => return None,
        }
    }
    has_normal.then_some(path)
}

fn warn_duplicates(entries: &[FileEntry]) {
    let mut seen = HashSet::new();
    for e in entries {
        if !seen.insert(e.name.as_str()) {
            warn!("duplicate entry name '{}'", e.name);
        }
    }
}
