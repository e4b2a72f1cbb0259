pub mod repack;

use ahash::AHashSet;
use chrono::Local;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Error;
use crate::symbols::SymbolRecord;

const MANIFEST_SUFFIX: &str = "-symbols.txt";

/// Where accepted symbol records go.
pub trait SymbolSink {
    /// Store `record` under its archive path. Returns `false` if that path
    /// was already stored.
    fn accept(&mut self, record: &SymbolRecord) -> Result<bool, Error>;
}

/// A finished archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub manifest_name: String,
    pub entries: Vec<String>,
}

impl ArchiveSummary {
    /// Read back an archive written by [`ZipArchiveSink`].
    pub fn open(path: &Path) -> Result<Self, Error> {
        let archive = ZipArchive::new(File::open(path)?)?;
        let mut manifest_name = None;
        let mut entries = Vec::new();
        for name in archive.file_names() {
            if !name.contains('/') && name.ends_with(MANIFEST_SUFFIX) {
                manifest_name = Some(name.to_string());
            } else {
                entries.push(name.to_string());
            }
        }
        let manifest_name = manifest_name.ok_or_else(|| {
            Error::Other(format!("{} has no symbol manifest", path.display()))
        })?;
        entries.sort();
        Ok(Self {
            path: path.to_path_buf(),
            manifest_name,
            entries,
        })
    }
}

/// Deflated zip archive plus a manifest listing every entry.
///
/// Entries are written to a temporary file beside the destination, which is
/// only moved into place by [`ZipArchiveSink::finalize`]. Dropping an
/// unfinished sink deletes the temporary file.
pub struct ZipArchiveSink {
    destination: PathBuf,
    manifest_prefix: String,
    writer: ZipWriter<NamedTempFile>,
    entries: Vec<String>,
    seen: AHashSet<String>,
}

impl ZipArchiveSink {
    /// `manifest_prefix` is e.g. `ossyms-1.0-Linux`; the manifest is named
    /// `<prefix>-<YYYYmmddHHMMSS>-symbols.txt`.
    pub fn create(destination: &Path, manifest_prefix: &str) -> Result<Self, Error> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        debug!("Building archive in {}", temp.path().display());
        Ok(Self {
            destination: destination.to_path_buf(),
            manifest_prefix: manifest_prefix.to_string(),
            writer: ZipWriter::new(temp),
            entries: Vec::new(),
            seen: AHashSet::new(),
        })
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o664)
    }

    /// Add `contents` under `name` unless that name is already present.
    pub fn add(&mut self, name: &str, contents: &[u8]) -> Result<bool, Error> {
        if !self.seen.insert(name.to_string()) {
            return Ok(false);
        }
        self.writer.start_file(name, Self::options())?;
        self.writer.write_all(contents)?;
        self.entries.push(name.to_string());
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn manifest_name(&self) -> String {
        format!(
            "{}-{}{}",
            self.manifest_prefix,
            Local::now().format("%Y%m%d%H%M%S"),
            MANIFEST_SUFFIX
        )
    }

    /// Write the manifest and move the archive into place. With nothing
    /// accepted, the archive is discarded and `None` returned.
    pub fn finalize(mut self) -> Result<Option<ArchiveSummary>, Error> {
        if self.entries.is_empty() {
            debug!("No entries, discarding archive");
            return Ok(None);
        }

        let manifest_name = self.manifest_name();
        self.writer.start_file(manifest_name.as_str(), Self::options())?;
        self.writer.write_all(self.entries.join("\n").as_bytes())?;

        let temp = self.writer.finish()?;
        temp.persist(&self.destination).map_err(|e| e.error)?;

        Ok(Some(ArchiveSummary {
            path: self.destination,
            manifest_name,
            entries: self.entries,
        }))
    }
}

impl SymbolSink for ZipArchiveSink {
    fn accept(&mut self, record: &SymbolRecord) -> Result<bool, Error> {
        self.add(&record.archive_path(), &record.payload)
    }
}
