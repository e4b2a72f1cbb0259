use std::fs;
use std::io;
use std::path::Path;
use tracing::trace;

use crate::platform::{self, PlatformProfile};

/// Whether `path` is a loadable platform binary worth dumping.
///
/// The file must be executable or named like a shared library, and its magic
/// bytes must match the platform's object format. Any probe error counts as
/// "no".
pub fn should_process(path: &Path, profile: &dyn PlatformProfile) -> bool {
    match probe(path, profile) {
        Ok(processable) => processable,
        Err(err) => {
            trace!("Skipping {}: {}", path.display(), err);
            false
        }
    }
}

fn probe(path: &Path, profile: &dyn PlatformProfile) -> io::Result<bool> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Ok(false);
    }

    let named_like_library = path
        .file_name()
        .map(|name| profile.matches_library_name(&name.to_string_lossy()))
        .unwrap_or(false);
    if !platform::is_executable(&metadata) && !named_like_library {
        return Ok(false);
    }

    Ok(platform::sniff_format(path)?.is_some_and(|kind| profile.is_native_format(kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LinuxProfile, MacProfile};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn elf_bytes() -> Vec<u8> {
        let mut bytes = vec![0x7f, b'E', b'L', b'F', 2, 1, 1, 0];
        bytes.resize(64, 0);
        bytes
    }

    fn linux() -> LinuxProfile {
        LinuxProfile::new(PathBuf::from("/nonexistent/debug"))
    }

    #[test]
    fn test_elf_library_is_processed() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("libfoo.so.1");
        fs::write(&lib, elf_bytes()).unwrap();
        assert!(should_process(&lib, &linux()));
    }

    #[test]
    fn test_foreign_format_is_rejected() {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("libfoo.so");
        fs::write(&lib, elf_bytes()).unwrap();
        assert!(!should_process(&lib, &MacProfile));

        let script = dir.path().join("libtext.so");
        fs::write(&script, "#!/bin/sh\necho this is not a binary\n").unwrap();
        assert!(!should_process(&script, &linux()));
    }

    #[test]
    fn test_unnamed_non_executable_is_rejected() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("blob.bin");
        fs::write(&data, elf_bytes()).unwrap();
        assert!(!should_process(&data, &linux()));
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_without_library_name() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let exe = dir.path().join("tool");
        fs::write(&exe, elf_bytes()).unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(should_process(&exe, &linux()));
    }

    #[test]
    fn test_missing_path_and_directory_are_rejected() {
        let dir = tempdir().unwrap();
        assert!(!should_process(&dir.path().join("gone.so"), &linux()));
        assert!(!should_process(dir.path(), &linux()));
    }
}
