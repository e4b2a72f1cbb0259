use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::PlatformProfile;

pub const DEFAULT_SYMBOL_SERVER_URL: &str =
    "https://s3-us-west-2.amazonaws.com/org.mozilla.crash-stats.symbols-public/v1/";
pub const DEFAULT_MISSING_SYMBOLS_URL: &str =
    "https://crash-analysis.mozilla.com/crash_analysis/{date}/{date}-missing-symbols.txt";

/// Where previously confirmed (debug file, debug id) pairs are remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStoreKind {
    None,
    Directory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directories walked when no explicit file list is given. Empty means
    /// the platform profile's defaults.
    pub system_dirs: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub symbol_server_url: String,
    pub missing_symbols_url: String,
    pub missing_symbols_lookback_days: u32,
    pub marker_store: MarkerStoreKind,
    pub marker_path: PathBuf,
    /// Worker threads; 0 uses the available parallelism.
    pub jobs: usize,
    /// Per dump_syms invocation; 0 disables the limit.
    pub job_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub output_path: PathBuf,
    pub debug_root: PathBuf,
    pub upload_url: Option<String>,
    pub auth_token: Option<String>,
    pub ssh_user: Option<String>,
    pub ssh_host: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub remote_symbol_path: Option<String>,
    pub post_upload_command: Option<String>,
    pub local_symbol_path: Option<PathBuf>,
    pub last_run_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            system_dirs: Vec::new(),
            ignore_patterns: Vec::new(),
            symbol_server_url: DEFAULT_SYMBOL_SERVER_URL.to_string(),
            missing_symbols_url: DEFAULT_MISSING_SYMBOLS_URL.to_string(),
            missing_symbols_lookback_days: 5,
            marker_store: MarkerStoreKind::None,
            marker_path: PathBuf::from("symbol-markers"),
            jobs: 0,
            job_timeout_secs: 300,
            http_timeout_secs: 30,
            output_path: PathBuf::from("symbols.zip"),
            debug_root: PathBuf::from("/usr/lib/debug"),
            upload_url: None,
            auth_token: None,
            ssh_user: None,
            ssh_host: None,
            ssh_key: None,
            remote_symbol_path: None,
            post_upload_command: None,
            local_symbol_path: None,
            last_run_file: PathBuf::from("last-run"),
        }
    }
}

impl AppConfig {
    /// Roots to walk for a full system scan, with nested roots removed.
    pub fn scan_roots(&self, profile: &dyn PlatformProfile) -> Vec<PathBuf> {
        let dirs = if self.system_dirs.is_empty() {
            profile.system_dirs()
        } else {
            self.system_dirs.iter().map(PathBuf::from).collect()
        };
        non_overlapping_directories(dirs)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Load `Config.{toml,yaml,json}` from the working directory if present, then
/// overlay `SYMSCRAPE_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("SYMSCRAPE"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        if result.iter().any(|res_dir| is_within(&dir, res_dir)) {
            continue;
        }
        result.retain(|res_dir| !is_within(res_dir, &dir));
        result.push(dir);
    }

    result
}

fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
