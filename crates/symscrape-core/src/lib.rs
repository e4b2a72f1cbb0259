pub mod archive;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod storage;
pub mod symbols;
pub mod upload;

pub use config::AppConfig;
pub use engine::{GatherEngine, GatherReport};
pub use error::Error;
pub use progress::{ProgressReporter, RunPhase, SilentReporter};
