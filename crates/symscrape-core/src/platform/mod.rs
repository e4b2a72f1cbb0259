mod linux;
mod macos;

pub use linux::LinuxProfile;
pub use macos::MacProfile;

use object::FileKind;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// Bytes needed by [`FileKind::parse`] to recognise a format.
const MAGIC_LEN: u64 = 16;

/// Everything the pipeline needs to know about the host's binary conventions.
///
/// Selected once at startup; nothing downstream checks the target OS itself.
pub trait PlatformProfile: Send + Sync {
    /// Title-cased platform name, as used in archive manifest names.
    fn name(&self) -> &'static str;

    /// Directories holding system libraries and executables.
    fn system_dirs(&self) -> Vec<PathBuf>;

    fn library_extension(&self) -> &'static str;

    /// Whether a file name follows the shared-library naming convention.
    fn matches_library_name(&self, file_name: &str) -> bool;

    fn is_native_format(&self, kind: FileKind) -> bool;

    /// Architectures to dump for `path`. `None` means the dump tool picks
    /// the only architecture there is. An empty list means nothing usable
    /// was found.
    fn architectures(&self, path: &Path) -> Vec<Option<String>>;

    /// Separately installed debug info for `path`, dumped in its place.
    fn debug_companion(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// The profile for the platform this binary was built for.
pub fn current(config: &AppConfig) -> Box<dyn PlatformProfile> {
    if cfg!(target_os = "macos") {
        Box::new(MacProfile)
    } else {
        Box::new(LinuxProfile::new(config.debug_root.clone()))
    }
}

/// Read at most `limit` bytes from the start of `path`.
pub fn read_header(path: &Path, limit: u64) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut data = Vec::new();
    file.take(limit).read_to_end(&mut data)?;
    Ok(data)
}

/// Detect the object format of `path` from its magic bytes.
pub fn sniff_format(path: &Path) -> io::Result<Option<FileKind>> {
    let data = read_header(path, MAGIC_LEN)?;
    Ok(FileKind::parse(&*data).ok())
}

#[cfg(unix)]
pub fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
pub fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
