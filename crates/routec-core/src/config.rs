//! Compiler configuration loaded from TOML and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use routec_error::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::namespace::Layout;

pub const ENV_ROUTE_CACHE: &str = "ROUTEC_ROUTE_CACHE";
pub const ENV_ENVIRONMENT: &str = "ROUTEC_ENV";
pub const ENV_CACHE_ROOT: &str = "ROUTEC_CACHE_ROOT";

const PRODUCTION: &str = "production";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_app_root")]
    pub app_root: PathBuf,
    #[serde(default = "Config::default_cache_root")]
    pub cache_root: PathBuf,
    /// Root namespace of the application.
    #[serde(default = "Config::default_namespace")]
    pub namespace: String,
    #[serde(default = "Config::default_environment")]
    pub environment: String,
    /// Set when the process serves console commands; HTTP compiles are no-ops.
    #[serde(default)]
    pub console: bool,
    #[serde(default)]
    pub layout: Layout,
    /// File names (or path suffixes) the walker never yields.
    #[serde(default)]
    pub excluded_files: Vec<String>,
    #[serde(default)]
    pub feature: FeatureConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub route: RouteFeature,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFeature {
    #[serde(default)]
    pub cache: RouteCacheFeature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCacheFeature {
    /// Consult and write the route cache.
    #[serde(default = "RouteCacheFeature::default_attributes")]
    pub attributes: bool,
}

impl RouteCacheFeature {
    fn default_attributes() -> bool {
        true
    }
}

impl Default for RouteCacheFeature {
    fn default() -> Self {
        Self {
            attributes: Self::default_attributes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_root: Self::default_app_root(),
            cache_root: Self::default_cache_root(),
            namespace: Self::default_namespace(),
            environment: Self::default_environment(),
            console: false,
            layout: Layout::Auto,
            excluded_files: Vec::new(),
            feature: FeatureConfig::default(),
        }
    }
}

/// `1`/`true`/`on`/`yes` and `0`/`false`/`off`/`no`, any case.
fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(Error::config_invalid(format!(
            "{key} must be a boolean flag, found '{other}'"
        ))
        .with_context("variable", key)),
    }
}

impl Config {
    fn default_app_root() -> PathBuf {
        PathBuf::from("app")
    }

    fn default_cache_root() -> PathBuf {
        PathBuf::from("storage/cache")
    }

    fn default_namespace() -> String {
        "App".to_string()
    }

    fn default_environment() -> String {
        PRODUCTION.to_string()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            Error::from(err)
                .with_operation("config::from_path")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_toml_str(&text).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| {
            Error::config_invalid(format!("invalid TOML: {}", err.message()))
                .with_operation("config::from_toml_str")
                .set_source(err)
        })
    }

    /// Overlay `ROUTEC_*` environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_ROUTE_CACHE) {
            self.feature.route.cache.attributes = parse_flag(ENV_ROUTE_CACHE, &value)?;
        }
        if let Some(value) = lookup(ENV_ENVIRONMENT).filter(|v| !v.trim().is_empty()) {
            self.environment = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_CACHE_ROOT).filter(|v| !v.trim().is_empty()) {
            self.cache_root = PathBuf::from(value.trim());
        }
        Ok(self)
    }

    pub fn with_app_root(mut self, app_root: impl Into<PathBuf>) -> Self {
        self.app_root = app_root.into();
        self
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_route_cache(mut self, enabled: bool) -> Self {
        self.feature.route.cache.attributes = enabled;
        self
    }

    pub fn with_excluded_files(mut self, files: Vec<String>) -> Self {
        self.excluded_files = files;
        self
    }

    pub fn route_cache_enabled(&self) -> bool {
        self.feature.route.cache.attributes
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION)
    }

    /// Non-production builds write compact cache files.
    pub fn minify(&self) -> bool {
        !self.is_production()
    }

    pub fn resolved_layout(&self) -> Layout {
        self.layout.resolve(&self.app_root)
    }
}
