//! Rendering compiled tables.

use std::fs;
use std::path::Path;
use std::time::Instant;

use routec_core::{Error, ErrorKind, Result};
use serde::Serialize;
use tracing::info;

/// Pretty JSON for anything the compiler returns.
pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    let render_start = Instant::now();
    let rendered = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::SerializationFailed, err.to_string())
            .with_operation("output::render_json")
            .set_source(err)
    })?;
    info!("Rendering: {:.3}s", render_start.elapsed().as_secs_f64());
    Ok(rendered)
}

/// Write to `path`, or stdout when no path is given.
pub fn emit(output: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, output).map_err(|err| {
                Error::from(err)
                    .with_operation("output::emit")
                    .with_context("path", path.display().to_string())
            })?;
            info!(path = %path.display(), "output written");
        }
        None => println!("{output}"),
    }
    Ok(())
}
