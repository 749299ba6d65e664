//! Command-line options shared by every `routec` subcommand.

use std::path::PathBuf;

use clap::Args;
use routec_core::{Config, Result};

/// Where configuration comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOptions {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for route cache files (overrides the config file).
    #[arg(long = "cache-root", value_name = "DIR", global = true)]
    pub cache_root: Option<PathBuf>,
}

/// Route cache behavior for one run.
#[derive(Args, Debug, Clone, Default)]
pub struct CacheOptions {
    /// Skip reading and writing the route cache.
    #[arg(long = "no-cache", global = true)]
    pub no_cache: bool,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn with_cache_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(path.into());
        self
    }

    /// File (or defaults), then `ROUTEC_*` variables, then flags.
    pub fn load(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default(),
        };
        let config = config.apply_env()?;
        Ok(match &self.cache_root {
            Some(root) => config.with_cache_root(root),
            None => config,
        })
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn apply(&self, config: Config) -> Config {
        if self.no_cache {
            config.with_route_cache(false)
        } else {
            config
        }
    }
}
