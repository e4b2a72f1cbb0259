pub mod classify;
pub mod walk;

use ahash::AHashSet;
use glob::Pattern;
use std::fs;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::trace;

use crate::platform::PlatformProfile;

pub use classify::should_process;
pub use walk::{compile_ignore_patterns, walk_inputs};

/// A walked file after symlink resolution, with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryCandidate {
    pub path: PathBuf,
    pub processable: bool,
}

/// Walk `inputs`, resolve every path fully and classify each distinct target
/// once. A library reachable through several links is reported a single time.
pub fn discover<F>(
    inputs: &[PathBuf],
    ignore_patterns: &[Pattern],
    profile: &dyn PlatformProfile,
    mut visit: F,
) where
    F: FnMut(BinaryCandidate) -> ControlFlow<()>,
{
    let mut seen: AHashSet<PathBuf> = AHashSet::new();

    walk_inputs(inputs, ignore_patterns, |path| {
        let resolved = match fs::canonicalize(&path) {
            Ok(resolved) => resolved,
            Err(err) => {
                trace!("Can't resolve {}: {}", path.display(), err);
                return ControlFlow::Continue(());
            }
        };
        if !seen.insert(resolved.clone()) {
            return ControlFlow::Continue(());
        }
        let processable = should_process(&resolved, profile);
        visit(BinaryCandidate {
            path: resolved,
            processable,
        })
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::LinuxProfile;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn test_symlinks_resolve_to_one_candidate() {
        let dir = tempdir().unwrap();
        let mut elf = vec![0x7f, b'E', b'L', b'F', 2, 1, 1, 0];
        elf.resize(64, 0);
        let real = dir.path().join("libfoo.so.1.2.3");
        fs::write(&real, elf).unwrap();
        symlink(&real, dir.path().join("libfoo.so.1")).unwrap();
        symlink("libfoo.so.1", dir.path().join("libfoo.so")).unwrap();
        fs::write(dir.path().join("notes.txt"), "text").unwrap();

        let profile = LinuxProfile::new(PathBuf::from("/nonexistent"));
        let mut found = Vec::new();
        discover(&[dir.path().to_path_buf()], &[], &profile, |candidate| {
            found.push(candidate);
            ControlFlow::Continue(())
        });

        let processable: Vec<_> = found.iter().filter(|c| c.processable).collect();
        assert_eq!(processable.len(), 1);
        assert_eq!(processable[0].path, fs::canonicalize(&real).unwrap());
        assert_eq!(found.len(), 2);
    }
}
