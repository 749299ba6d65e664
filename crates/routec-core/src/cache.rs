//! Route table cache.
//!
//! Entries never expire; a table stays valid until it is deleted or a new
//! compile overwrites it. Every failure here degrades to a cache miss.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use routec_error::{Error, Result};
use strum_macros::{AsRefStr, Display};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::pattern::{ROOT_KEY, matches_prefix, resolved_prefix};
use crate::table::RouteTable;

/// Sub-directory of the cache root that holds route tables.
pub const ROUTES_DIR: &str = "routes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum CacheContext {
    Http,
    Cli,
}

/// Storage behind the route cache.
pub trait CacheStore {
    fn read(&self, context: CacheContext, key: &str) -> Result<Option<String>>;
    fn write(&self, context: CacheContext, key: &str, contents: &str) -> Result<()>;
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    fn read(&self, context: CacheContext, key: &str) -> Result<Option<String>> {
        (**self).read(context, key)
    }

    fn write(&self, context: CacheContext, key: &str, contents: &str) -> Result<()> {
        (**self).write(context, key, contents)
    }
}

/// Keep keys usable as file names.
pub fn sanitize_key(key: &str) -> String {
    let key: String = key
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let key = key.trim_start_matches('.');
    if key.is_empty() {
        ROOT_KEY.to_string()
    } else {
        key.to_string()
    }
}

/// Sanitize each `/`-separated segment of a store key.
pub fn normalize_key(key: &str) -> String {
    key.split('/').map(sanitize_key).collect::<Vec<_>>().join("/")
}

/// Store key for `key` under `scope`; an empty scope leaves the key unscoped.
pub fn scoped_key(scope: &str, key: &str) -> String {
    if scope.trim().is_empty() {
        sanitize_key(key)
    } else {
        format!("{}/{}", sanitize_key(scope), sanitize_key(key))
    }
}

/// JSON files under `<cache_root>/routes/<context>/<key>.json`, one
/// directory level per key segment.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(cache_root: impl AsRef<Path>) -> Self {
        Self {
            root: cache_root.as_ref().join(ROUTES_DIR),
        }
    }

    pub fn path_for(&self, context: CacheContext, key: &str) -> PathBuf {
        let key = normalize_key(key);
        let mut path = self.root.join(context.as_ref());
        let mut segments = key.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}.json"));
            }
        }
        path
    }
}

impl CacheStore for FsCacheStore {
    fn read(&self, context: CacheContext, key: &str) -> Result<Option<String>> {
        let path = self.path_for(context, key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::from(err)
                .with_operation("cache::FsCacheStore::read")
                .with_context("path", path.display().to_string())),
        }
    }

    /// Writes a temp file next to the target and renames it into place.
    fn write(&self, context: CacheContext, key: &str, contents: &str) -> Result<()> {
        let path = self.path_for(context, key);
        let annotate = |err: Error| {
            err.with_operation("cache::FsCacheStore::write")
                .with_context("path", path.display().to_string())
        };
        let dir = path
            .parent()
            .ok_or_else(|| annotate(Error::invalid_argument("cache path has no parent")))?;
        fs::create_dir_all(dir).map_err(|err| annotate(err.into()))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|err| annotate(err.into()))?;
        file.write_all(contents.as_bytes())
            .map_err(|err| annotate(err.into()))?;
        // A concurrent writer may hold the target; the rename can be retried.
        file.persist(&path)
            .map_err(|err| annotate(Error::from(err.error).temporary()))?;
        Ok(())
    }
}

/// In-process store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<BTreeMap<(CacheContext, String), String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn keys(&self, context: CacheContext) -> Vec<String> {
        self.entries
            .lock()
            .keys()
            .filter(|(ctx, _)| *ctx == context)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn remove(&self, context: CacheContext, key: &str) -> Option<String> {
        self.entries.lock().remove(&(context, normalize_key(key)))
    }
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, context: CacheContext, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(&(context, normalize_key(key))).cloned())
    }

    fn write(&self, context: CacheContext, key: &str, contents: &str) -> Result<()> {
        self.entries
            .lock()
            .insert((context, normalize_key(key)), contents.to_string());
        Ok(())
    }
}

/// Feature-gated lookup and storage of compiled tables.
#[derive(Debug)]
pub struct RouteCache<S> {
    store: S,
    enabled: bool,
    minify: bool,
}

impl<S: CacheStore> RouteCache<S> {
    pub fn new(store: S, enabled: bool, minify: bool) -> Self {
        Self {
            store,
            enabled,
            minify,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn backend(&self) -> &S {
        &self.store
    }

    /// Cached table for `request` under `scope`, trying `prefix` first and
    /// then the root key.
    pub fn load(
        &self,
        context: CacheContext,
        scope: &str,
        prefix: &str,
        request: &str,
    ) -> Option<RouteTable> {
        if !self.enabled {
            return None;
        }
        let prefix = if prefix.is_empty() { ROOT_KEY } else { prefix };
        let mut keys = vec![scoped_key(scope, prefix)];
        if prefix != ROOT_KEY {
            keys.push(scoped_key(scope, ROOT_KEY));
        }

        for key in keys {
            let key = key.as_str();
            let contents = match self.store.read(context, key) {
                Ok(Some(contents)) => contents,
                Ok(None) => continue,
                Err(err) => {
                    warn!(%context, key, error = %err, "route cache read failed");
                    continue;
                }
            };
            let table = match RouteTable::from_json(&contents) {
                Ok(table) => table,
                Err(err) => {
                    warn!(%context, key, error = %err, "ignoring malformed route cache");
                    continue;
                }
            };
            if self.is_fresh(context, &table, request) {
                debug!(%context, key, request, "route cache hit");
                return Some(table);
            }
            debug!(%context, key, request, base = %table.base_pattern, "route cache entry does not match");
        }
        None
    }

    fn is_fresh(&self, context: CacheContext, table: &RouteTable, request: &str) -> bool {
        match context {
            CacheContext::Http => matches_prefix(&table.base_pattern, &table.excluders, request),
            CacheContext::Cli => table.base_pattern == request.trim(),
        }
    }

    /// Persist `table` under `scope`; false when disabled, empty, or the
    /// write failed.
    pub fn store(&self, context: CacheContext, scope: &str, table: &RouteTable) -> bool {
        if !self.enabled || table.is_empty() {
            return false;
        }
        let key = match context {
            CacheContext::Http => scoped_key(scope, &resolved_prefix(&table.base_pattern)),
            CacheContext::Cli => scoped_key(scope, &table.base_pattern),
        };
        let contents = match table.to_json(self.minify) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(%context, key = %key, error = %err, "route table serialization failed");
                return false;
            }
        };
        match self.store.write(context, &key, &contents) {
            Ok(()) => {
                debug!(%context, key = %key, routes = table.len(), "route cache written");
                true
            }
            Err(err) => {
                warn!(
                    %context,
                    key = %key,
                    retryable = err.is_retryable(),
                    error = %err,
                    "route cache write failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CommandEntry, HttpBucket, RouteEntry};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn http_table(base: &str, excluders: &[&str]) -> RouteTable {
        let mut table = RouteTable {
            base_pattern: base.to_string(),
            excluders: excluders.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        };
        table.http.push(
            HttpBucket::Routes,
            "GET",
            RouteEntry {
                pattern: base.to_string(),
                callback: "App\\Controllers\\Http\\Blog::index".into(),
                before: false,
            },
        );
        table
    }

    fn cli_table(group: &str) -> RouteTable {
        let mut table = RouteTable {
            base_pattern: group.to_string(),
            ..Default::default()
        };
        table.cli.push_group(
            group,
            CommandEntry {
                pattern: "send".into(),
                callback: "App\\Controllers\\Cli\\Mail::send".into(),
            },
        );
        table
    }

    #[test]
    fn http_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let cache = RouteCache::new(FsCacheStore::new(dir.path()), true, false);
        let table = http_table("/blog", &[]);

        assert!(cache.store(CacheContext::Http, "web", &table));
        assert!(dir.path().join("routes/http/web/blog.json").is_file());
        assert_eq!(cache.load(CacheContext::Http, "web", "blog", "/blog/42"), Some(table));
        assert_eq!(cache.load(CacheContext::Http, "web", "blog", "/blogs"), None);
        assert_eq!(cache.load(CacheContext::Http, "api", "blog", "/blog/42"), None);
    }

    #[test]
    fn cli_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let cache = RouteCache::new(FsCacheStore::new(dir.path()), true, true);
        let table = cli_table("mail");

        assert!(cache.store(CacheContext::Cli, "", &table));
        let written = fs::read_to_string(dir.path().join("routes/cli/mail.json")).unwrap();
        assert!(!written.contains('\n'));
        assert_eq!(cache.load(CacheContext::Cli, "", "mail", "mail"), Some(table));
        assert_eq!(cache.load(CacheContext::Cli, "", "queue", "queue"), None);
    }

    #[test]
    fn falls_back_to_root_entry() {
        let store = MemoryCacheStore::new();
        let cache = RouteCache::new(store, true, true);
        let root = http_table("/", &["api"]);
        assert!(cache.store(CacheContext::Http, "web", &root));
        assert_eq!(cache.backend().keys(CacheContext::Http), vec!["web/web".to_string()]);

        assert_eq!(cache.load(CacheContext::Http, "web", "contact", "/contact"), Some(root));
        assert_eq!(cache.load(CacheContext::Http, "web", "api", "/api/ping"), None);
    }

    #[test]
    fn malformed_entries_are_misses() {
        let store = MemoryCacheStore::new();
        store.write(CacheContext::Http, "web/blog", "{\"base_pattern\": ").unwrap();
        let cache = RouteCache::new(store, true, true);
        assert_eq!(cache.load(CacheContext::Http, "web", "blog", "/blog"), None);
    }

    #[test]
    fn disabled_or_empty_never_touches_the_store() {
        let cache = RouteCache::new(MemoryCacheStore::new(), false, true);
        assert!(!cache.store(CacheContext::Http, "web", &http_table("/blog", &[])));
        assert!(cache.backend().is_empty());
        assert_eq!(cache.load(CacheContext::Http, "web", "blog", "/blog"), None);

        let cache = RouteCache::new(MemoryCacheStore::new(), true, true);
        assert!(!cache.store(CacheContext::Http, "web", &RouteTable::default()));
        assert!(cache.backend().is_empty());
    }

    #[test]
    fn write_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("routes");
        fs::write(&blocker, "not a directory").unwrap();
        let cache = RouteCache::new(FsCacheStore::new(dir.path()), true, false);
        assert!(!cache.store(CacheContext::Http, "web", &http_table("/blog", &[])));
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = RouteCache::new(FsCacheStore::new(dir.path()), true, false);
        assert!(cache.store(CacheContext::Http, "web", &http_table("/blog", &[])));
        assert!(cache.store(CacheContext::Http, "web", &http_table("/blog", &["drafts"])));
        let names: Vec<String> = fs::read_dir(dir.path().join("routes/http/web"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["blog.json".to_string()]);
    }

    #[test]
    fn scopes_keep_http_contexts_apart() {
        let cache = RouteCache::new(MemoryCacheStore::new(), true, true);
        let web = http_table("/blog", &[]);
        let api = http_table("/blog", &["v1"]);
        assert!(cache.store(CacheContext::Http, "web", &web));
        assert!(cache.store(CacheContext::Http, "api", &api));
        assert_eq!(
            cache.backend().keys(CacheContext::Http),
            vec!["api/blog".to_string(), "web/blog".to_string()]
        );
        assert_eq!(cache.load(CacheContext::Http, "web", "blog", "/blog"), Some(web));
        assert_eq!(cache.load(CacheContext::Http, "api", "blog", "/blog"), Some(api));
        assert_eq!(cache.load(CacheContext::Http, "admin", "blog", "/blog"), None);
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("db:seed"), "db_seed");
        assert_eq!(sanitize_key("../etc"), "_etc");
        assert_eq!(sanitize_key(""), "web");
        let store = FsCacheStore::new("/cache");
        assert_eq!(
            store.path_for(CacheContext::Cli, "queue:work"),
            PathBuf::from("/cache/routes/cli/queue_work.json")
        );
        assert_eq!(
            store.path_for(CacheContext::Http, "../admin/blog"),
            PathBuf::from("/cache/routes/http/web/admin/blog.json")
        );
        assert_eq!(scoped_key("api", ""), "api/web");
        assert_eq!(scoped_key("", "db:seed"), "db_seed");
    }

    #[test]
    fn shared_store_through_arc() {
        let store = Arc::new(MemoryCacheStore::new());
        let writer = RouteCache::new(Arc::clone(&store), true, true);
        assert!(writer.store(CacheContext::Cli, "", &cli_table("mail")));
        let reader = RouteCache::new(Arc::clone(&store), true, true);
        assert!(reader.load(CacheContext::Cli, "", "mail", "mail").is_some());
        assert_eq!(store.len(), 1);
    }
}
