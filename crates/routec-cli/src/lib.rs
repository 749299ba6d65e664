//! routec command-line interface.
//!
pub mod options;
pub mod output;
pub mod pipeline;

use std::path::PathBuf;

use routec_core::Result;

pub use options::{CacheOptions, ConfigOptions};
pub use output::{emit, render_json};
pub use pipeline::{Target, compile};

/// Options for one `routec` run.
#[derive(Debug, Clone)]
pub struct RoutecOptions {
    pub config: ConfigOptions,
    pub cache: CacheOptions,
    pub output: Option<PathBuf>,
    pub target: Target,
}

/// Main entry point
pub fn run_main(opts: &RoutecOptions) -> Result<String> {
    let config = opts.cache.apply(opts.config.load()?);
    let rendered = compile(config, &opts.target)?;
    emit(&rendered, opts.output.as_deref())?;
    Ok(rendered)
}
