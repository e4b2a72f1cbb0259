use glob::Pattern;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::archive::SymbolSink;
use crate::dedup::{DedupOracle, MarkerStore, SkipReason, Verdict};
use crate::error::Error;
use crate::platform::PlatformProfile;
use crate::progress::{ProgressReporter, RunPhase};
use crate::scanner;
use crate::symbols::{ArchJob, Extraction, NotFound, SymbolExtractor, SymbolKey, SymbolRecord};

/// Walks inputs, dumps every (binary, architecture) pair on a worker pool and
/// feeds new symbols to a sink.
pub struct GatherEngine<'a> {
    profile: &'a dyn PlatformProfile,
    extractor: SymbolExtractor,
    oracle: DedupOracle,
    ignore_patterns: Vec<Pattern>,
    jobs: usize,
}

#[derive(Debug, Default)]
pub struct GatherReport {
    pub duration: Duration,
    /// Distinct processable binaries found.
    pub candidates: usize,
    pub jobs: usize,
    /// Keys stored in the sink, in completion order.
    pub accepted: Vec<SymbolKey>,
    /// New symbols whose archive path was already taken this run.
    pub duplicates: usize,
    pub not_missing: usize,
    pub already_marked: usize,
    pub on_server: usize,
    pub markers_written: usize,
    /// Markers that could not be written.
    pub marker_failures: usize,
    /// Accepted symbols whose marker or server check failed.
    pub unverified: usize,
    pub not_found: usize,
    pub errors: usize,
}

impl GatherReport {
    /// Record every accepted key as submitted. Call once the archive has
    /// reached the server.
    pub fn mark_accepted(&self, markers: &dyn MarkerStore) -> Result<usize, Error> {
        for key in &self.accepted {
            markers.mark(key)?;
        }
        Ok(self.accepted.len())
    }
}

struct JobResult {
    job: ArchJob,
    outcome: JobOutcome,
}

enum JobOutcome {
    New { record: SymbolRecord, verified: bool },
    Skipped(SymbolKey, SkipReason),
    NotFound(NotFound),
    /// The job could not run or panicked.
    Failed(String),
}

impl<'a> GatherEngine<'a> {
    pub fn new(
        profile: &'a dyn PlatformProfile,
        extractor: SymbolExtractor,
        oracle: DedupOracle,
    ) -> Self {
        Self {
            profile,
            extractor,
            oracle,
            ignore_patterns: Vec::new(),
            jobs: 0,
        }
    }

    /// Worker threads; 0 uses the available parallelism.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_ignore_patterns(mut self, ignore_globs: &[String]) -> Self {
        self.ignore_patterns = scanner::compile_ignore_patterns(ignore_globs);
        self
    }

    /// Run the pipeline over `inputs` (files or directories).
    ///
    /// Results are drained on the calling thread in completion order while
    /// walking continues on another. Per-job failures are counted in the
    /// report; only a failing sink aborts the run, after which queued jobs
    /// are skipped and the error returned.
    pub fn gather<S: SymbolSink>(
        &self,
        inputs: &[PathBuf],
        sink: &mut S,
        reporter: &dyn ProgressReporter,
    ) -> Result<GatherReport, Error> {
        let start = Instant::now();
        reporter.on_phase(RunPhase::Idle);

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("symscrape-worker-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("Can't start worker pool: {}", e)))?;
        debug!("Worker pool with {} threads", pool.current_num_threads());

        let (tx, rx) = mpsc::channel();
        let abort = AtomicBool::new(false);
        let submitted = AtomicUsize::new(0);
        let mut report = GatherReport::default();

        let (drained, walked) = thread::scope(|scope| {
            let (pool, abort, submitted) = (&pool, &abort, &submitted);
            let walker = scope.spawn(move || {
                self.walk_and_dispatch(pool, inputs, tx, reporter, abort, submitted)
            });

            let drained = self.drain(rx, sink, reporter, submitted, &mut report);
            if drained.is_err() {
                abort.store(true, Ordering::SeqCst);
            }
            (drained, walker.join())
        });

        report.candidates =
            walked.map_err(|_| Error::Other("Walker thread panicked".to_string()))?;
        drained?;
        report.jobs = submitted.load(Ordering::SeqCst);
        report.duration = start.elapsed();

        if report.unverified > 0 || report.marker_failures > 0 {
            warn!(
                "{} symbols could not be checked and {} markers could not be written",
                report.unverified, report.marker_failures
            );
        }

        reporter.on_phase(RunPhase::Done);
        reporter.on_complete(report.accepted.len(), report.duration.as_secs_f64());
        info!(
            "Gathered {} new symbols from {} binaries ({} jobs) in {:.2}s",
            report.accepted.len(),
            report.candidates,
            report.jobs,
            report.duration.as_secs_f64()
        );
        Ok(report)
    }

    /// Returns the number of processable candidates.
    fn walk_and_dispatch(
        &self,
        pool: &ThreadPool,
        inputs: &[PathBuf],
        tx: Sender<JobResult>,
        reporter: &dyn ProgressReporter,
        abort: &AtomicBool,
        submitted: &AtomicUsize,
    ) -> usize {
        reporter.on_phase(RunPhase::Walking);
        let mut candidates = 0;

        pool.scope(|scope| {
            scanner::discover(inputs, &self.ignore_patterns, self.profile, |candidate| {
                if abort.load(Ordering::SeqCst) {
                    return ControlFlow::Break(());
                }
                if !candidate.processable {
                    return ControlFlow::Continue(());
                }
                candidates += 1;
                reporter.on_candidate(candidates, &candidate.path);

                let path = match self.profile.debug_companion(&candidate.path) {
                    Some(debug_path) => {
                        debug!(
                            "Using {} for {}",
                            debug_path.display(),
                            candidate.path.display()
                        );
                        debug_path
                    }
                    None => candidate.path,
                };

                let archs = self.profile.architectures(&path);
                if archs.is_empty() {
                    debug!("No usable architectures in {}", path.display());
                }
                for arch in archs {
                    let job = ArchJob {
                        path: path.clone(),
                        arch,
                    };
                    let count = submitted.fetch_add(1, Ordering::SeqCst) + 1;
                    if count == 1 {
                        reporter.on_phase(RunPhase::Dispatching);
                    }
                    reporter.on_job_submitted(count);

                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        if abort.load(Ordering::SeqCst) {
                            return;
                        }
                        let outcome = self.run_guarded(&job);
                        // the drainer only hangs up after a fatal error
                        let _ = tx.send(JobResult { job, outcome });
                    });
                }
                ControlFlow::Continue(())
            });
            reporter.on_phase(RunPhase::Draining);
        });

        candidates
    }

    fn run_guarded(&self, job: &ArchJob) -> JobOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_job(job))) {
            Ok(outcome) => outcome,
            Err(payload) => JobOutcome::Failed(panic_message(payload.as_ref())),
        }
    }

    fn run_job(&self, job: &ArchJob) -> JobOutcome {
        let record = match self.extractor.extract(job) {
            Ok(Extraction::Found(record)) => record,
            Ok(Extraction::NotFound(reason)) => return JobOutcome::NotFound(reason),
            Err(err) => return JobOutcome::Failed(err.to_string()),
        };
        let key = record.key();
        match self.oracle.check(&key) {
            Verdict::New => JobOutcome::New {
                record,
                verified: true,
            },
            Verdict::Unverified => JobOutcome::New {
                record,
                verified: false,
            },
            Verdict::Skip(reason) => JobOutcome::Skipped(key, reason),
        }
    }

    fn drain<S: SymbolSink>(
        &self,
        rx: Receiver<JobResult>,
        sink: &mut S,
        reporter: &dyn ProgressReporter,
        submitted: &AtomicUsize,
        report: &mut GatherReport,
    ) -> Result<(), Error> {
        let mut done = 0;

        for JobResult { job, outcome } in rx {
            done += 1;
            reporter.on_job_complete(done, submitted.load(Ordering::SeqCst));

            match outcome {
                JobOutcome::New { record, verified } => {
                    if sink.accept(&record)? {
                        info!("Processing {}...done.", job);
                        report.accepted.push(record.key());
                        if !verified {
                            report.unverified += 1;
                        }
                    } else {
                        debug!("Processing {}...{} already collected.", job, record.key());
                        report.duplicates += 1;
                    }
                }
                JobOutcome::Skipped(key, SkipReason::OnServer) => {
                    info!("Processing {}...already on server.", job);
                    report.on_server += 1;
                    if let Some(markers) = self.oracle.markers() {
                        match markers.mark(&key) {
                            Ok(()) => report.markers_written += 1,
                            Err(err) => {
                                debug!("Can't write marker for {}: {}", key, err);
                                report.marker_failures += 1;
                            }
                        }
                    }
                }
                JobOutcome::Skipped(_, SkipReason::LocalMarker) => {
                    info!("Processing {}...already submitted.", job);
                    report.already_marked += 1;
                }
                JobOutcome::Skipped(key, SkipReason::NotMissing) => {
                    debug!("Skipping {}: {} is not missing", job, key);
                    report.not_missing += 1;
                }
                JobOutcome::NotFound(reason) => {
                    info!("Processing {}...failed ({}).", job, reason);
                    report.not_found += 1;
                }
                JobOutcome::Failed(message) => {
                    error!("Error processing {}: {}", job, message);
                    report.errors += 1;
                }
            }
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
