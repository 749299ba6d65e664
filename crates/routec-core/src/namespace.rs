//! Namespace conventions for MVC and HMVC application layouts.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Directory that holds HMVC modules under the application root.
pub const MODULES_DIR: &str = "Modules";

static APP_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/app/Modules/([^/]+)/").expect("module regex"));
static ANY_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)Modules/([^/]+)/").expect("module regex"));

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Detect from the application root.
    #[default]
    Auto,
    /// `<app>/Controllers/{Http,Cli}`.
    Mvc,
    /// `<app>/Modules/<Module>/Controllers/{Http,Cli}`.
    Hmvc,
}

impl Layout {
    /// Resolve `Auto` by looking for a `Modules` directory under `app_root`.
    pub fn resolve(self, app_root: &Path) -> Layout {
        match self {
            Layout::Auto if app_root.join(MODULES_DIR).is_dir() => Layout::Hmvc,
            Layout::Auto => Layout::Mvc,
            other => other,
        }
    }
}

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Module a controller file belongs to under HMVC.
pub fn module_name(path: &Path) -> Option<String> {
    let path = slashed(path);
    APP_MODULE
        .captures(&path)
        .or_else(|| ANY_MODULE.captures(&path))
        .map(|caps| caps[1].to_string())
}

/// Namespace a controller file is expected to declare.
pub fn expected_namespace(path: &Path, layout: Layout, root_namespace: &str) -> String {
    let context = path
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let module = match layout {
        Layout::Hmvc => module_name(path),
        Layout::Mvc | Layout::Auto => None,
    };
    match module {
        Some(module) => format!("{root_namespace}\\{MODULES_DIR}\\{module}\\Controllers\\{context}"),
        None => format!("{root_namespace}\\Controllers\\{context}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;
    use std::str::FromStr;
    use tempfile::TempDir;

    #[test]
    fn module_from_path() {
        assert_eq!(
            module_name(Path::new("/srv/site/app/Modules/Blog/Controllers/Http/Post.php")),
            Some("Blog".to_string())
        );
        assert_eq!(
            module_name(Path::new("src/Modules/Shop/Controllers/Cli/Sync.php")),
            Some("Shop".to_string())
        );
        assert_eq!(module_name(Path::new("/srv/app/Controllers/Http/Home.php")), None);
    }

    #[test]
    fn namespaces_per_layout() {
        let mvc = PathBuf::from("/srv/app/Controllers/Http/Home.php");
        assert_eq!(expected_namespace(&mvc, Layout::Mvc, "App"), "App\\Controllers\\Http");

        let hmvc = PathBuf::from("/srv/app/Modules/Blog/Controllers/Cli/Feed.php");
        assert_eq!(
            expected_namespace(&hmvc, Layout::Hmvc, "App"),
            "App\\Modules\\Blog\\Controllers\\Cli"
        );
        assert_eq!(expected_namespace(&hmvc, Layout::Mvc, "Site"), "Site\\Controllers\\Cli");
    }

    #[test]
    fn auto_layout_detects_modules() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Layout::Auto.resolve(dir.path()), Layout::Mvc);
        fs::create_dir(dir.path().join("Modules")).unwrap();
        assert_eq!(Layout::Auto.resolve(dir.path()), Layout::Hmvc);
        assert_eq!(Layout::Mvc.resolve(dir.path()), Layout::Mvc);
    }

    #[test]
    fn layout_names() {
        assert_eq!(Layout::from_str("HMVC").unwrap(), Layout::Hmvc);
        assert_eq!(Layout::Mvc.to_string(), "mvc");
        assert!(Layout::from_str("flat").is_err());
    }
}
