use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

use super::{ArchJob, SymbolRecord};
use crate::error::Error;
use crate::platform;

/// Resolve the dump tool to an absolute path, failing unless it is an
/// existing executable file.
pub fn locate_tool(path: &Path) -> Result<PathBuf, Error> {
    let not_found = || Error::ToolNotFound(path.to_path_buf());
    let resolved = fs::canonicalize(path).map_err(|_| not_found())?;
    let metadata = fs::metadata(&resolved).map_err(|_| not_found())?;
    if !metadata.is_file() || !platform::is_executable(&metadata) {
        return Err(not_found());
    }
    Ok(resolved)
}

/// Why a job produced no symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// Exit code, if the tool exited rather than being killed by a signal.
    ToolFailed(Option<i32>),
    TimedOut(Duration),
    Malformed,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::ToolFailed(Some(code)) => write!(f, "dump_syms exited with {}", code),
            NotFound::ToolFailed(None) => f.write_str("dump_syms was killed"),
            NotFound::TimedOut(limit) => write!(f, "dump_syms timed out after {:?}", limit),
            NotFound::Malformed => f.write_str("unrecognised MODULE line"),
        }
    }
}

#[derive(Debug)]
pub enum Extraction {
    Found(SymbolRecord),
    NotFound(NotFound),
}

/// Runs the external dump tool: `<tool> [-a <arch>] <path>`.
#[derive(Debug, Clone)]
pub struct SymbolExtractor {
    tool: PathBuf,
    timeout: Option<Duration>,
    verbose: bool,
}

impl SymbolExtractor {
    /// `tool` should already have been checked with [`locate_tool`].
    pub fn new(tool: PathBuf) -> Self {
        Self {
            tool,
            timeout: None,
            verbose: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pass the tool's stderr through instead of discarding it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Dump one job. `Err` is reserved for failures to run the tool at all;
    /// a tool that runs and fails yields [`Extraction::NotFound`].
    pub fn extract(&self, job: &ArchJob) -> Result<Extraction, Error> {
        let mut command = Command::new(&self.tool);
        if let Some(arch) = &job.arch {
            command.arg("-a").arg(arch);
        }
        command
            .arg(&job.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.verbose {
                Stdio::inherit()
            } else {
                Stdio::null()
            });
        // Own process group, so a timeout also reaches anything the tool forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("dump_syms stdout was not captured".to_string()))?;
        // Symbol files are far larger than a pipe buffer, so read while waiting.
        let reader = thread::spawn(move || read_all(stdout));

        let status = match self.wait(&mut child)? {
            Some(status) => status,
            None => {
                let limit = self.timeout.unwrap_or_default();
                debug!("Killing dump_syms for {} after {:?}", job, limit);
                kill_tree(&mut child);
                child.wait()?;
                // A descendant outside the group may still hold the pipe; the
                // reader finishes whenever it lets go.
                drop(reader);
                return Ok(Extraction::NotFound(NotFound::TimedOut(limit)));
            }
        };
        let output = reader
            .join()
            .map_err(|_| Error::Other("dump_syms output reader panicked".to_string()))??;

        if !status.success() {
            debug!("dump_syms failed on {}: {}", job, status);
            return Ok(Extraction::NotFound(NotFound::ToolFailed(status.code())));
        }

        Ok(match SymbolRecord::from_dump(output) {
            Some(record) => Extraction::Found(record),
            None => Extraction::NotFound(NotFound::Malformed),
        })
    }

    /// `None` when the timeout elapsed first.
    fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        match self.timeout {
            Some(limit) => child.wait_timeout(limit),
            None => child.wait().map(Some),
        }
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a negative pid names the process
        // group the child leads.
        Ok(pid) if unsafe { libc::kill(-pid, libc::SIGKILL) } == 0 => {}
        _ => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn read_all(mut stdout: impl Read) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    stdout.read_to_end(&mut output)?;
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_locate_tool_rejects_missing_and_non_executable() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("dump_syms");
        assert!(matches!(locate_tool(&missing), Err(Error::ToolNotFound(_))));

        fs::write(&missing, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&missing, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(locate_tool(&missing), Err(Error::ToolNotFound(_))));

        fs::set_permissions(&missing, fs::Permissions::from_mode(0o755)).unwrap();
        let located = locate_tool(&missing).unwrap();
        assert!(located.is_absolute());

        assert!(matches!(locate_tool(dir.path()), Err(Error::ToolNotFound(_))));
    }

    fn write_tool(dir: &Path, script: &str) -> PathBuf {
        let tool = dir.join("dump_syms");
        fs::write(&tool, script).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        // ETXTBSY while a concurrently forked test child still holds the write handle
        for _ in 0..50 {
            match Command::new(&tool).arg("--version").output() {
                Err(err) if err.raw_os_error() == Some(26) => {
                    thread::sleep(Duration::from_millis(20))
                }
                _ => break,
            }
        }
        tool
    }

    #[test]
    fn test_timeout_kills_forked_children() {
        let dir = tempdir().unwrap();
        let tool = write_tool(
            dir.path(),
            "#!/bin/sh\nif [ \"$1\" = --version ]; then exit 0; fi\nsleep 8\necho MODULE Linux x86_64 ABCD libx.so\n",
        );
        let extractor =
            SymbolExtractor::new(tool).with_timeout(Some(Duration::from_millis(500)));
        let job = ArchJob {
            path: dir.path().join("libx.so"),
            arch: None,
        };

        let started = std::time::Instant::now();
        let outcome = extractor.extract(&job).unwrap();
        let elapsed = started.elapsed();

        assert!(matches!(
            outcome,
            Extraction::NotFound(NotFound::TimedOut(limit)) if limit == Duration::from_millis(500)
        ));
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    }

    #[test]
    fn test_arch_is_passed_to_the_tool() {
        let dir = tempdir().unwrap();
        let tool = write_tool(
            dir.path(),
            "#!/bin/sh\n[ \"$1\" = -a ] || exit 3\necho \"MODULE mac $2 ABCD $(basename \"$3\")\"\n",
        );
        let extractor = SymbolExtractor::new(tool);

        let job = ArchJob {
            path: PathBuf::from("/usr/lib/libz.dylib"),
            arch: Some("arm64".to_string()),
        };
        match extractor.extract(&job).unwrap() {
            Extraction::Found(record) => {
                assert_eq!(record.cpu_arch, "arm64");
                assert_eq!(record.debug_file, "libz.dylib");
            }
            other => panic!("unexpected {:?}", other),
        }

        let job = ArchJob {
            path: PathBuf::from("/usr/lib/libz.dylib"),
            arch: None,
        };
        assert!(matches!(
            extractor.extract(&job).unwrap(),
            Extraction::NotFound(NotFound::ToolFailed(Some(3)))
        ));
    }

    #[test]
    fn test_not_found_display() {
        assert_eq!(
            NotFound::ToolFailed(Some(1)).to_string(),
            "dump_syms exited with 1"
        );
        assert_eq!(NotFound::Malformed.to_string(), "unrecognised MODULE line");
    }
}
