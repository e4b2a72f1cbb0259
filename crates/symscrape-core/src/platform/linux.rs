use object::FileKind;
use std::path::{Path, PathBuf};

use super::PlatformProfile;

/// ELF platforms. Binaries are single-architecture and stripped debug info
/// may live in a parallel tree under `debug_root` (e.g. `-dbg` packages).
#[derive(Debug, Clone)]
pub struct LinuxProfile {
    debug_root: PathBuf,
}

impl LinuxProfile {
    pub fn new(debug_root: PathBuf) -> Self {
        Self { debug_root }
    }
}

impl PlatformProfile for LinuxProfile {
    fn name(&self) -> &'static str {
        "Linux"
    }

    fn system_dirs(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("/lib"), PathBuf::from("/usr/lib")]
    }

    fn library_extension(&self) -> &'static str {
        ".so"
    }

    fn matches_library_name(&self, file_name: &str) -> bool {
        // versioned sonames: libfoo.so.6
        file_name.contains(self.library_extension())
    }

    fn is_native_format(&self, kind: FileKind) -> bool {
        matches!(kind, FileKind::Elf32 | FileKind::Elf64)
    }

    fn architectures(&self, _path: &Path) -> Vec<Option<String>> {
        vec![None]
    }

    fn debug_companion(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix("/").unwrap_or(path);
        let candidate = self.debug_root.join(relative);
        candidate.is_file().then_some(candidate)
    }
}
