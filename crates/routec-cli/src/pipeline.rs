//! One compile run: load config, pick the compile mode, render JSON.

use std::path::PathBuf;
use std::time::Instant;

use routec_core::{Compiler, Config, Result};
use tracing::info;

use crate::output::render_json;

/// What to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Http {
        dir: PathBuf,
        uri: String,
        context: String,
    },
    Cli {
        dir: PathBuf,
        command: String,
    },
    Export {
        dir: PathBuf,
    },
}

impl Target {
    pub fn dir(&self) -> &PathBuf {
        match self {
            Target::Http { dir, .. } | Target::Cli { dir, .. } | Target::Export { dir } => dir,
        }
    }
}

/// Compile `target` with `config` and return the rendered table.
pub fn compile(config: Config, target: &Target) -> Result<String> {
    let start = Instant::now();
    let mut compiler = Compiler::with_fs_cache(config);
    let rendered = match target {
        Target::Http { dir, uri, context } => render_json(&compiler.for_http(dir, context, uri)?)?,
        Target::Cli { dir, command } => render_json(&compiler.for_cli(dir, command)?)?,
        Target::Export { dir } => render_json(&compiler.export(dir)?)?,
    };

    let metrics = compiler.metrics();
    info!(
        cache_hit = metrics.cache_hit,
        files = metrics.files_scanned,
        class = metrics.matched_class.as_deref().unwrap_or("-"),
        "Compile: {:.3}s",
        start.elapsed().as_secs_f64()
    );
    Ok(rendered)
}
