pub mod extract;

pub use extract::{locate_tool, Extraction, NotFound, SymbolExtractor};

use std::fmt;
use std::path::PathBuf;

/// One dump_syms invocation: a binary plus the slice to dump, if the
/// platform has per-architecture slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchJob {
    pub path: PathBuf,
    pub arch: Option<String>,
}

impl fmt::Display for ArchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arch {
            Some(arch) => write!(f, "{} [{}]", self.path.display(), arch),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// The identity of a symbol file on the symbol server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolKey {
    pub debug_file: String,
    pub debug_id: String,
}

impl SymbolKey {
    pub fn new(debug_file: impl Into<String>, debug_id: impl Into<String>) -> Self {
        Self {
            debug_file: debug_file.into(),
            debug_id: debug_id.into(),
        }
    }

    pub fn symbol_file_name(&self) -> String {
        format!("{}.sym", self.debug_file)
    }

    /// `debug_file/debug_id/debug_file.sym`, the path used both inside the
    /// archive and on the symbol server.
    pub fn archive_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.debug_file,
            self.debug_id,
            self.symbol_file_name()
        )
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.debug_file, self.debug_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub platform: String,
    pub cpu_arch: String,
    pub debug_id: String,
    pub debug_file: String,
    pub payload: Vec<u8>,
}

/// Whether `part` can be used as a single path component: keys name archive
/// entries and marker files, so nothing that could climb out of a directory.
pub fn is_safe_component(part: &str) -> bool {
    !(part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\', '\0']))
}

impl SymbolRecord {
    /// Build a record from dump_syms output. The first line must be
    /// `MODULE <platform> <arch> <debug id> <debug file>`; the debug file
    /// is everything after the fourth space and may itself contain spaces.
    pub fn from_dump(payload: Vec<u8>) -> Option<SymbolRecord> {
        let first_line = payload.split(|&b| b == b'\n').next()?;
        let line = String::from_utf8_lossy(first_line);
        let line = line.trim_end_matches('\r');

        let bits: Vec<&str> = line.splitn(5, ' ').collect();
        let [marker, platform, cpu_arch, debug_id, debug_file] = bits.as_slice() else {
            return None;
        };
        if *marker != "MODULE" || !is_safe_component(debug_id) || !is_safe_component(debug_file)
        {
            return None;
        }

        Some(SymbolRecord {
            platform: platform.to_string(),
            cpu_arch: cpu_arch.to_string(),
            debug_id: debug_id.to_string(),
            debug_file: debug_file.to_string(),
            payload,
        })
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey::new(&self.debug_file, &self.debug_id)
    }

    pub fn archive_path(&self) -> String {
        self.key().archive_path()
    }
}
