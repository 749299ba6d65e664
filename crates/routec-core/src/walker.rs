//! Lazy discovery of controller source files.

use std::path::{Path, PathBuf};

use routec_error::{Error, ErrorKind};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::namespace::Layout;

const SOURCE_EXTENSION: &str = "php";
const CONTROLLERS_DIR: &str = "Controllers";
const CONTEXT_DIRS: [&str; 2] = ["Http", "Cli"];

/// Directories that never hold controllers.
fn should_skip_dir(name: &str) -> bool {
    matches!(name, "Views" | "Models")
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Which controller tree to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum WalkContext {
    Http,
    Cli,
    /// Both trees, for route listings.
    Export,
}

impl WalkContext {
    /// Directory that holds controllers for this context.
    pub fn dir_name(self) -> Option<&'static str> {
        match self {
            WalkContext::Http => Some("Http"),
            WalkContext::Cli => Some("Cli"),
            WalkContext::Export => None,
        }
    }

    fn accepts_dir(self, name: &str) -> bool {
        match self.dir_name() {
            Some(dir) => dir == name,
            None => CONTEXT_DIRS.contains(&name),
        }
    }
}

/// Iterator over candidate controller files, in file-name order.
///
/// Each call to [`walk`] starts a fresh traversal. Dropping the iterator
/// early stops the walk.
pub struct ControllerWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    context: WalkContext,
    layout: Layout,
    excluded_files: Vec<String>,
    yielded: usize,
}

/// Walk `root` for controller files of `context`.
pub fn walk(
    root: &Path,
    context: WalkContext,
    layout: Layout,
    excluded_files: &[String],
) -> ControllerWalker {
    let layout = layout.resolve(root);
    debug!(root = %root.display(), %context, %layout, "walking controllers");
    ControllerWalker {
        root: root.to_path_buf(),
        inner: WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter(),
        context,
        layout,
        excluded_files: excluded_files.to_vec(),
        yielded: 0,
    }
}

impl ControllerWalker {
    /// Number of files yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    fn enter_dir(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if is_hidden(&name) || should_skip_dir(&name) {
            return false;
        }
        // Under HMVC the other context's directory is a sibling; skip it.
        let foreign_context = self.layout == Layout::Hmvc
            && CONTEXT_DIRS.contains(&&*name)
            && !self.context.accepts_dir(&name);
        !foreign_context
    }

    fn is_valid_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
            return false;
        };
        if is_hidden(&name) {
            return false;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
            return false;
        }
        let excluded = self
            .excluded_files
            .iter()
            .any(|excluded| excluded == &*name || path.ends_with(excluded));
        if excluded {
            return false;
        }

        match self.layout {
            Layout::Hmvc => path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .parent()
                .is_some_and(|parent| {
                    parent
                        .components()
                        .any(|component| component.as_os_str() == CONTROLLERS_DIR)
                }),
            Layout::Mvc | Layout::Auto => path
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|parent| self.context.accepts_dir(&parent.to_string_lossy())),
        }
    }
}

impl Iterator for ControllerWalker {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                    let err = Error::new(ErrorKind::TraversalFailed, err.to_string())
                        .with_operation("walker::next")
                        .with_context("path", path)
                        .set_source(err);
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                if !self.enter_dir(&entry) {
                    self.inner.skip_current_dir();
                }
                continue;
            }
            if self.is_valid_file(entry.path()) {
                self.yielded += 1;
                return Some(entry.into_path());
            }
        }
    }
}
