mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, Context};
use chrono::Local;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, GatherArgs};
use dotenv::dotenv;
use progress::CliReporter;
use symscrape_core::archive::repack::{repack_local_store, LastRun};
use symscrape_core::archive::{ArchiveSummary, ZipArchiveSink};
use symscrape_core::dedup::{
    fetch_missing_symbols, open_marker_store, DedupOracle, HttpFeedSource, HttpSymbolStore,
};
use symscrape_core::symbols::{locate_tool, SymbolExtractor};
use symscrape_core::{platform, upload, AppConfig, GatherEngine, GatherReport};
use symscrape_core::{ProgressReporter, SilentReporter};
use tracing::{error, info};

/// Manifest prefix used for archives repacked from a local symbol store.
const REPACK_MANIFEST_PREFIX: &str = "osxsyms-1.0-Darwin";

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    let _guard = logging::init_logger(args.verbose);

    let config = match symscrape_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match args.command {
        Some(Commands::Gather(gather)) => run_gather(&config, gather, args.verbose),
        Some(Commands::Upload { archive }) => run_upload(&config, &archive, args.verbose),
        Some(Commands::Repack { dry_run }) => run_repack(&config, dry_run, args.verbose),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("{:#}", err);
        process::exit(1);
    }
}

fn run_gather(config: &AppConfig, args: GatherArgs, verbose: bool) -> anyhow::Result<()> {
    let tool = locate_tool(&args.dump_syms)?;
    let profile = platform::current(config);
    let markers = open_marker_store(config).context("Can't open marker store")?;

    let explicit_files = !args.files.is_empty();
    let missing = if args.all || explicit_files {
        None
    } else {
        let feed = HttpFeedSource::new(&config.missing_symbols_url, config.http_timeout())?;
        let missing = fetch_missing_symbols(
            &feed,
            Local::now().date_naive(),
            config.missing_symbols_lookback_days,
            profile.library_extension(),
        );
        if missing.is_empty() {
            None
        } else {
            info!("Looking for {} missing symbol files", missing.len());
            Some(missing)
        }
    };

    let store = HttpSymbolStore::new(&config.symbol_server_url, config.http_timeout())
        .context("Bad symbol_server_url")?;
    let oracle = DedupOracle::new()
        .with_missing(missing)
        .with_markers(markers.clone())
        .with_store(Some(Arc::new(store)));
    let extractor = SymbolExtractor::new(tool)
        .with_timeout(config.job_timeout())
        .verbose(verbose);
    let engine = GatherEngine::new(profile.as_ref(), extractor, oracle)
        .with_jobs(config.jobs)
        .with_ignore_patterns(&config.ignore_patterns);

    let inputs = if explicit_files {
        args.files
    } else {
        config.scan_roots(profile.as_ref())
    };
    let output = args.output.unwrap_or_else(|| config.output_path.clone());
    let mut sink = ZipArchiveSink::create(&output, &format!("ossyms-1.0-{}", profile.name()))
        .with_context(|| format!("Can't create {}", output.display()))?;

    let reporter: Box<dyn ProgressReporter> = if args.progress {
        Box::new(CliReporter::new())
    } else {
        Box::new(SilentReporter)
    };
    let report = engine.gather(&inputs, &mut sink, reporter.as_ref())?;
    let archive = sink.finalize()?;
    print_summary(&report, archive.as_ref());

    let Some(archive) = archive else {
        return Ok(());
    };
    if args.upload {
        let uploader = upload::from_config(config, verbose)?
            .ok_or_else(|| anyhow!("--upload needs upload_url or the ssh settings configured"))?;
        uploader.upload(&archive)?;
        println!("Uploaded {}", archive.path.display());
        if let Some(markers) = &markers {
            let marked = report.mark_accepted(markers.as_ref())?;
            info!("Marked {} symbol files as submitted", marked);
        }
    }

    Ok(())
}

fn print_summary(report: &GatherReport, archive: Option<&ArchiveSummary>) {
    match archive {
        Some(archive) => println!(
            "Wrote {} symbol files to {}",
            format!("{}", archive.entries.len()).green(),
            archive.path.display()
        ),
        None => println!("No new symbols found"),
    }
    println!(
        "{} binaries, {} jobs in {}: {} already on server, {} already submitted, {} not missing, {} without symbols, {} errors",
        report.candidates,
        report.jobs,
        format!("{:.2}s", report.duration.as_secs_f64()).green(),
        format!("{}", report.on_server).cyan(),
        format!("{}", report.already_marked).cyan(),
        format!("{}", report.not_missing).cyan(),
        format!("{}", report.not_found).yellow(),
        format!("{}", report.errors).red(),
    );
    if report.unverified > 0 || report.marker_failures > 0 {
        println!(
            "{} symbols kept without a server check, {} markers not written",
            format!("{}", report.unverified).yellow(),
            format!("{}", report.marker_failures).yellow(),
        );
    }
}

fn run_upload(config: &AppConfig, archive: &Path, verbose: bool) -> anyhow::Result<()> {
    let archive = ArchiveSummary::open(archive)
        .with_context(|| format!("Can't read {}", archive.display()))?;
    let uploader = upload::from_config(config, verbose)?
        .ok_or_else(|| anyhow!("No uploader configured: set upload_url or the ssh settings"))?;
    uploader.upload(&archive)?;
    println!(
        "Uploaded {} ({} symbol files)",
        archive.path.display(),
        format!("{}", archive.entries.len()).green()
    );
    Ok(())
}

fn run_repack(config: &AppConfig, dry_run: bool, verbose: bool) -> anyhow::Result<()> {
    let root = config
        .local_symbol_path
        .as_ref()
        .ok_or_else(|| anyhow!("local_symbol_path is not configured"))?;
    let uploader = if dry_run {
        None
    } else {
        Some(upload::from_config(config, verbose)?.ok_or_else(|| {
            anyhow!("No uploader configured: set upload_url or the ssh settings")
        })?)
    };

    let last_run = LastRun::new(&config.last_run_file);
    let since = last_run.load()?;
    let started = SystemTime::now();

    let mut sink = ZipArchiveSink::create(&config.output_path, REPACK_MANIFEST_PREFIX)
        .with_context(|| format!("Can't create {}", config.output_path.display()))?;
    repack_local_store(root, since, &mut sink)?;

    match sink.finalize()? {
        Some(archive) => {
            println!(
                "Repacked {} symbol files into {}",
                format!("{}", archive.entries.len()).green(),
                archive.path.display()
            );
            if let Some(uploader) = &uploader {
                uploader.upload(&archive)?;
                println!("Uploaded {}", archive.path.display());
            }
        }
        None => println!("No symbol files changed since the last run"),
    }

    if !dry_run {
        last_run.store(started)?;
    }
    Ok(())
}
