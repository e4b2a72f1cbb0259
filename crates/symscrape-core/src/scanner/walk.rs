use glob::Pattern;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Compile glob ignore patterns, dropping (and logging) invalid ones.
pub fn compile_ignore_patterns(ignore_globs: &[String]) -> Vec<Pattern> {
    ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

/// Expand `inputs` into the files beneath them. Directories are walked
/// recursively without following links; anything else is yielded as is.
/// Symlinks are yielded unresolved. Unreadable entries are logged and skipped.
pub fn walk_inputs<F>(inputs: &[PathBuf], ignore_patterns: &[Pattern], mut visit: F)
where
    F: FnMut(PathBuf) -> ControlFlow<()>,
{
    for input in inputs {
        if is_ignored(input, ignore_patterns) {
            continue;
        }
        if !input.is_dir() {
            if visit(input.clone()).is_break() {
                return;
            }
            continue;
        }

        let walker = WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_ignored(entry.path(), ignore_patterns));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log_walk_error(&err);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            if visit(entry.into_path()).is_break() {
                return;
            }
        }
    }
}

fn is_ignored(path: &Path, ignore_patterns: &[Pattern]) -> bool {
    ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(path))
}

fn log_walk_error(err: &walkdir::Error) {
    let path = err
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    match err.io_error().map(io::Error::kind) {
        Some(io::ErrorKind::PermissionDenied) => {
            debug!("Access denied reading {}: {}", path, err)
        }
        _ => warn!("Error walking {}: {}", path, err),
    }
}
