use std::fs;
use std::path::{Path, PathBuf};

use routec_core::{Config, Layout};
use tempfile::TempDir;
use textwrap::dedent;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_test_writer()
        .try_init();
}

/// Temporary application tree with its own cache directory.
pub struct AppFixture {
    dir: TempDir,
}

#[allow(dead_code)]
impl AppFixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn app_root(&self) -> PathBuf {
        self.dir.path().join("app")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Write `source` (dedented) to `app/<relative>`.
    pub fn write(&self, relative: &str, source: &str) -> PathBuf {
        let path = self.app_root().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(&path, dedent(source).trim_start()).expect("write source");
        path
    }

    pub fn remove_app(&self) {
        fs::remove_dir_all(self.app_root()).expect("remove app");
    }

    pub fn config(&self) -> Config {
        Config::default()
            .with_app_root(self.app_root())
            .with_cache_root(self.cache_root())
            .with_layout(Layout::Auto)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
