use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ZipArchiveSink;
use crate::error::Error;

/// Time of the last successful repack, stored as fractional Unix seconds.
#[derive(Debug, Clone)]
pub struct LastRun {
    path: PathBuf,
}

impl LastRun {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<SystemTime>, Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let secs: f64 = text.trim().parse().map_err(|e| {
            Error::Other(format!("Bad timestamp in {}: {}", self.path.display(), e))
        })?;
        let bad = || Error::Other(format!("Bad timestamp in {}: {}", self.path.display(), secs));
        let since_epoch = Duration::try_from_secs_f64(secs).map_err(|_| bad())?;
        UNIX_EPOCH.checked_add(since_epoch).map(Some).ok_or_else(bad)
    }

    pub fn store(&self, at: SystemTime) -> Result<(), Error> {
        let secs = at
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Other(e.to_string()))?
            .as_secs_f64();
        fs::write(&self.path, secs.to_string())?;
        Ok(())
    }
}

/// Add every gzipped symbol file under `root` modified after `since` to
/// `sink`, named by its path relative to `root` without the `.gz`.
/// Returns the number of files added.
pub fn repack_local_store(
    root: &Path,
    since: Option<SystemTime>,
    sink: &mut ZipArchiveSink,
) -> Result<usize, Error> {
    let mut added = 0;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error walking {}: {}", root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let modified = entry.metadata().map_err(std::io::Error::from)?.modified()?;
        if since.is_some_and(|since| modified <= since) {
            continue;
        }

        let Some(name) = archive_name(root, entry.path()) else {
            debug!("Skipping {}: not a gzipped symbol file", entry.path().display());
            continue;
        };

        let mut contents = Vec::new();
        GzDecoder::new(File::open(entry.path())?).read_to_end(&mut contents)?;
        info!("Adding {}", name);
        if sink.add(&name, &contents)? {
            added += 1;
        }
    }

    Ok(added)
}

fn archive_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let joined = parts.join("/");
    joined.strip_suffix(".gz").map(str::to_string)
}
