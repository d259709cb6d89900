//! Command-line interface parsing for dictcache
//!
//! Each subcommand dispatches one worker event (install, activate, fetch,
//! sync) against the on-disk generation store, or inspects the store.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use reqwest::Method;
use thiserror::Error;

use crate::cache::GenerationStore;
use crate::config::{parse_url, WorkerConfig, DEFAULT_APP_ROOT, SYNC_TAG};
use crate::error::WorkerError;
use crate::net::Request;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The HTTP method is not a valid token
    #[error("Invalid HTTP method: '{0}'")]
    InvalidMethod(String),

    /// No cache directory given and none could be determined
    #[error("Could not determine a cache directory; pass --cache-dir or set DICTCACHE_DIR")]
    NoCacheDir,

    /// A URL or generation argument was rejected
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// dictcache - offline cache for the E2B dictionary app
#[derive(Parser, Debug)]
#[command(name = "dictcache")]
#[command(about = "Offline read-through cache for the E2B dictionary app")]
#[command(version)]
pub struct Cli {
    /// Event to dispatch
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Directory holding the cache generations
    #[arg(long, global = true, env = "DICTCACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// URL the dictionary app is served from
    #[arg(long, global = true, env = "DICTCACHE_APP_ROOT", value_name = "URL", default_value = DEFAULT_APP_ROOT)]
    pub app_root: String,

    /// Override the cache generation name
    #[arg(long, global = true, env = "DICTCACHE_GENERATION", value_name = "TAG")]
    pub generation: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seed the current generation
    Install,

    /// Delete stale generations and take control
    Activate,

    /// Mediate a request through the cache
    Fetch(FetchArgs),

    /// Dispatch a background sync
    Sync(SyncArgs),

    /// List cache generations
    Generations,

    /// Dispatch the dictionary sync periodically until interrupted
    Watch(WatchArgs),
}

/// Arguments for the fetch command
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Absolute URL to request
    pub url: String,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Treat the request as a page navigation
    #[arg(long)]
    pub navigate: bool,

    /// Write the body to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Sync tag to dispatch
    #[arg(long, default_value = SYNC_TAG)]
    pub tag: String,
}

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between syncs
    #[arg(long, default_value_t = 3600, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,
}

/// Parses an HTTP method argument, case-insensitively
pub fn parse_method(s: &str) -> Result<Method, CliError> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(s.to_string()))
}

impl FetchArgs {
    /// Builds the request described by these arguments
    pub fn to_request(&self) -> Result<Request, CliError> {
        Ok(Request {
            method: parse_method(&self.method)?,
            url: parse_url(&self.url)?,
            navigate: self.navigate,
        })
    }
}

/// Worker configuration and store location derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Settings {
    /// Configuration for the cache manager
    pub config: WorkerConfig,
    /// Root of the generation store
    pub cache_dir: PathBuf,
}

impl Settings {
    /// Resolves settings from parsed CLI arguments
    ///
    /// # Returns
    /// * `Err(CliError::Worker)` if the app root is not an absolute URL
    /// * `Err(CliError::NoCacheDir)` if no cache directory is available
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = WorkerConfig::for_app(&cli.app_root)?;
        if let Some(ref generation) = cli.generation {
            config = config.with_version(generation.clone());
        }

        let cache_dir = match &cli.cache_dir {
            Some(dir) => dir.clone(),
            None => GenerationStore::new()
                .ok_or(CliError::NoCacheDir)?
                .root()
                .to_path_buf(),
        };

        Ok(Self { config, cache_dir })
    }

    /// Generation store at the configured location
    pub fn store(&self) -> GenerationStore {
        GenerationStore::with_dir(self.cache_dir.clone())
    }
}
