//! Route compilation: cache lookup, scan, reflect, build, cache write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use routec_error::{Error, Result};
use tracing::{debug, info, warn};

use crate::attribute::{
    CallbackRef, ERROR, ErrorAttribute, GROUP, GroupAttribute, Middleware, PREFIX,
    PrefixAttribute, ROUTE, RouteAttribute,
};
use crate::cache::{CacheContext, CacheStore, FsCacheStore, RouteCache};
use crate::config::Config;
use crate::namespace::{Layout, expected_namespace, module_name};
use crate::pattern::{
    ROOT_KEY, clean_uri, excluder, is_home, join_patterns, normalize, resolved_prefix, uri_context,
};
use crate::reflect::{AttributeNode, ClassInfo, SourceUnit, reflect_file};
use crate::scanner::{AttributeKind, is_valid_group_name, scan_file};
use crate::table::{CommandEntry, ExportEntry, ExportTable, HttpBucket, RouteEntry, RouteTable};
use crate::walker::{WalkContext, walk};

const ROUTABLE_PARENTS: [&str; 2] = ["Controller", "Command"];
const ROUTABLE_INTERFACES: [&str; 1] = ["RoutableInterface"];
const API_BIND: &str = "api";
const GLOBAL_MIDDLEWARE: &str = "global";

/// Diagnostics for the most recent compile call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileMetrics {
    pub files_scanned: usize,
    pub cache_hit: bool,
    pub matched_class: Option<String>,
    pub elapsed: Duration,
}

impl CompileMetrics {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Whether a route pattern may be registered under a controller prefix.
///
/// Middleware routes must stay inside the prefix's first segment unless they
/// target the site root.
pub fn is_pattern_valid(
    prefix_context: &str,
    raw: &str,
    normalized: &str,
    middleware: Option<Middleware>,
) -> bool {
    if prefix_context.is_empty() || middleware.is_none() {
        return true;
    }
    if raw == "/" || is_home(normalized) {
        return true;
    }
    normalized.starts_with(&format!("/{prefix_context}"))
}

/// Concrete class that extends a routable base or implements the marker interface.
pub fn is_routable(class: &ClassInfo) -> bool {
    class.is_instantiable()
        && (class.extends_any(&ROUTABLE_PARENTS) || class.implements_any(&ROUTABLE_INTERFACES))
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

fn single_attribute<'a>(
    class: &'a ClassInfo,
    name: &'static str,
) -> Result<Option<&'a AttributeNode>> {
    let mut nodes = class.attributes_named(name);
    let first = nodes.next();
    if nodes.next().is_some() {
        return Err(Error::duplicate_attribute(class.fqcn(), name)
            .with_operation("compiler::single_attribute"));
    }
    Ok(first)
}

fn prefix_of(class: &ClassInfo) -> Result<Option<PrefixAttribute>> {
    single_attribute(class, PREFIX)?
        .map(|node| PrefixAttribute::from_node(node, &class.fqcn()))
        .transpose()
}

/// Route attributes of each public, non-constructor method, materialized.
fn method_routes(class: &ClassInfo) -> Result<Vec<(String, RouteAttribute)>> {
    let owner = class.fqcn();
    let mut routes = Vec::new();
    for method in class.public_methods().filter(|m| !m.is_constructor()) {
        for node in method.attributes.iter().filter(|attr| attr.is(ROUTE)) {
            let route = RouteAttribute::from_node(node, &owner, &method.name)?;
            routes.push((method.name.clone(), route));
        }
    }
    Ok(routes)
}

/// Reflected source units for one compile call.
#[derive(Default)]
struct UnitCache {
    units: HashMap<PathBuf, Arc<SourceUnit>>,
}

impl UnitCache {
    fn get(&mut self, path: &Path) -> Result<Arc<SourceUnit>> {
        if let Some(unit) = self.units.get(path) {
            return Ok(Arc::clone(unit));
        }
        let unit = Arc::new(reflect_file(path)?);
        self.units.insert(path.to_path_buf(), Arc::clone(&unit));
        Ok(unit)
    }
}

/// Compiles attribute-declared routes for one request at a time.
pub struct Compiler<S: CacheStore = FsCacheStore> {
    config: Config,
    cache: RouteCache<S>,
    metrics: CompileMetrics,
}

impl Compiler<FsCacheStore> {
    /// Compiler backed by cache files under `config.cache_root`.
    pub fn with_fs_cache(config: Config) -> Self {
        let store = FsCacheStore::new(&config.cache_root);
        Self::new(config, store)
    }
}

impl<S: CacheStore> Compiler<S> {
    pub fn new(config: Config, store: S) -> Self {
        let cache = RouteCache::new(store, config.route_cache_enabled(), config.minify());
        Self {
            config,
            cache,
            metrics: CompileMetrics::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &RouteCache<S> {
        &self.cache
    }

    pub fn metrics(&self) -> &CompileMetrics {
        &self.metrics
    }

    /// Find the controller `path` holds for `uri` and compile its HTTP routes.
    pub fn for_http(&mut self, path: &Path, context: &str, uri: &str) -> Result<RouteTable> {
        let start = Instant::now();
        self.metrics = CompileMetrics::default();
        if self.config.console {
            debug!(uri, "console mode, skipping http compile");
            return Ok(RouteTable::default());
        }

        let uri = clean_uri(uri);
        let key = match uri_context(&uri) {
            "" => ROOT_KEY,
            segment => segment,
        };
        if let Some(table) = self.cache.load(CacheContext::Http, context, key, &uri) {
            self.metrics.cache_hit = true;
            self.metrics.elapsed = start.elapsed();
            return Ok(table);
        }

        let mut table = RouteTable::default();
        let mut units = UnitCache::default();
        let mut walker = walk(path, WalkContext::Http, self.config.layout, &self.config.excluded_files);
        let layout = walker.layout();
        let mut matched = None;
        for file in walker.by_ref() {
            if let Some(class) = self.scan(&file, &uri, AttributeKind::Prefix)? {
                matched = Some((file, class));
                break;
            }
        }
        self.metrics.files_scanned = walker.yielded();

        if let Some((file, fqcn)) = matched {
            let unit = units.get(&file)?;
            let class = unit.find_class(&fqcn).ok_or_else(|| {
                Error::class_not_found(&fqcn)
                    .with_operation("compiler::for_http")
                    .with_context("path", file.display().to_string())
            })?;
            if is_routable(class) {
                self.check_namespace(&file, class, layout);
                self.build_http(&mut table, class, context)
                    .map_err(|err| err.with_context("path", file.display().to_string()))?;
                self.metrics.matched_class = Some(class.fqcn());
            } else {
                debug!(class = %fqcn, "matched class is not routable, skipping");
            }
        }

        self.cache.store(CacheContext::Http, context, &table);
        self.metrics.elapsed = start.elapsed();
        info!(
            uri = %uri,
            context,
            files = self.metrics.files_scanned,
            routes = table.len(),
            "http compile: {:.3}s",
            self.metrics.elapsed_secs()
        );
        Ok(table)
    }

    /// Find the console controller for `command` and compile its commands.
    pub fn for_cli(&mut self, path: &Path, command: &str) -> Result<RouteTable> {
        let start = Instant::now();
        self.metrics = CompileMetrics::default();
        let command = command.trim();

        if let Some(table) = self.cache.load(CacheContext::Cli, "", command, command) {
            self.metrics.cache_hit = true;
            self.metrics.elapsed = start.elapsed();
            return Ok(table);
        }

        let mut table = RouteTable::default();
        let mut units = UnitCache::default();
        let mut walker = walk(path, WalkContext::Cli, self.config.layout, &self.config.excluded_files);
        let layout = walker.layout();
        let mut matched = None;
        for file in walker.by_ref() {
            if let Some(class) = self.scan(&file, command, AttributeKind::Group)? {
                matched = Some((file, class));
                break;
            }
        }
        self.metrics.files_scanned = walker.yielded();

        if let Some((file, fqcn)) = matched {
            let unit = units.get(&file)?;
            let class = unit.find_class(&fqcn).ok_or_else(|| {
                Error::class_not_found(&fqcn)
                    .with_operation("compiler::for_cli")
                    .with_context("path", file.display().to_string())
            })?;
            if is_routable(class) {
                self.check_namespace(&file, class, layout);
                build_cli(&mut table, class)
                    .map_err(|err| err.with_context("path", file.display().to_string()))?;
                self.metrics.matched_class = Some(class.fqcn());
            } else {
                debug!(class = %fqcn, "matched class is not routable, skipping");
            }
        }

        self.cache.store(CacheContext::Cli, "", &table);
        self.metrics.elapsed = start.elapsed();
        info!(
            command,
            files = self.metrics.files_scanned,
            routes = table.len(),
            "cli compile: {:.3}s",
            self.metrics.elapsed_secs()
        );
        Ok(table)
    }

    /// List every routable class under `path`, grouped by module and bind key.
    pub fn export(&mut self, path: &Path) -> Result<ExportTable> {
        let start = Instant::now();
        self.metrics = CompileMetrics::default();
        let mut export = ExportTable::default();
        let mut units = UnitCache::default();
        let mut walker = walk(path, WalkContext::Export, self.config.layout, &self.config.excluded_files);

        for file in walker.by_ref() {
            let unit = match units.get(&file) {
                Ok(unit) => unit,
                Err(err) if err.is_configuration() => return Err(err),
                Err(err) => {
                    warn!(path = %file.display(), error = %err, "skipping unreadable controller");
                    continue;
                }
            };
            let module = module_name(&file).unwrap_or_else(|| self.config.namespace.clone());
            let display = file.display().to_string();
            for class in unit.classes.iter().filter(|class| is_routable(class)) {
                export_class(&mut export, &module, &display, class)
                    .map_err(|err| err.with_context("path", display.clone()))?;
            }
        }

        self.metrics.files_scanned = walker.yielded();
        self.metrics.elapsed = start.elapsed();
        info!(
            files = self.metrics.files_scanned,
            routes = export.len(),
            "export: {:.3}s",
            self.metrics.elapsed_secs()
        );
        Ok(export)
    }

    /// Scan one file; configuration errors abort, read failures skip the file.
    fn scan(&self, file: &Path, request: &str, kind: AttributeKind) -> Result<Option<String>> {
        let Some(expected) = file_stem(file) else {
            return Ok(None);
        };
        match scan_file(file, &expected, request, kind) {
            Ok(found) => {
                debug!(path = %file.display(), request, matched = found.is_some(), "scanned");
                Ok(found)
            }
            Err(err) if err.is_configuration() => Err(err),
            Err(err) => {
                warn!(path = %file.display(), error = %err, "skipping unscannable controller");
                Ok(None)
            }
        }
    }

    fn check_namespace(&self, file: &Path, class: &ClassInfo, layout: Layout) {
        let expected = expected_namespace(file, layout, &self.config.namespace);
        if !class.namespace.eq_ignore_ascii_case(&expected) {
            warn!(
                class = %class.fqcn(),
                expected = %expected,
                "controller namespace does not follow the directory layout"
            );
        }
    }

    fn build_http(&self, table: &mut RouteTable, class: &ClassInfo, context: &str) -> Result<()> {
        let owner = class.fqcn();
        let prefix = prefix_of(class)?;
        let raw_prefix = prefix.as_ref().map_or("/", |p| p.pattern.as_str());
        let excludes = prefix.as_ref().map(|p| p.exclude.clone()).unwrap_or_default();
        let merge = prefix.as_ref().is_some_and(|p| p.merge_excluders) && !excludes.is_empty();
        let prefix_context = uri_context(raw_prefix.trim()).to_string();

        table.base_pattern = normalize(raw_prefix);
        table.excluders = excludes.clone();

        for node in class.attributes_named(ERROR) {
            let error = ErrorAttribute::from_node(node, &owner)?;
            if error.context == context {
                table.http.errors.push(RouteEntry {
                    pattern: normalize(&join_patterns(raw_prefix, &error.pattern)),
                    callback: error.on_error.to_string(),
                    before: false,
                });
            }
        }
        if let Some(on_error) = prefix.as_ref().and_then(|p| p.on_error.as_ref()) {
            table.http.errors.push(RouteEntry {
                pattern: table.base_pattern.clone(),
                callback: on_error.to_string(),
                before: false,
            });
        }

        for (method, route) in method_routes(class)? {
            if route.group.is_some() {
                continue;
            }
            let callback = CallbackRef::new(&owner, &method).to_string();
            if route.is_error {
                table.http.errors.push(RouteEntry {
                    pattern: normalize(&join_patterns(raw_prefix, &route.pattern)),
                    callback,
                    before: false,
                });
                continue;
            }

            let mut patterns = Vec::with_capacity(route.aliases.len() + 1);
            for raw in std::iter::once(&route.pattern).chain(route.aliases.iter()) {
                let normalized = normalize(&join_patterns(raw_prefix, raw));
                if !is_pattern_valid(&prefix_context, raw, &normalized, route.middleware) {
                    debug!(class = %owner, method = %method, pattern = %normalized, "route outside prefix, skipping");
                    continue;
                }
                patterns.push(normalized);
            }

            let bucket = match route.middleware {
                Some(Middleware::HttpBefore) => HttpBucket::Middleware,
                Some(Middleware::HttpAfter) => HttpBucket::After,
                _ => HttpBucket::Routes,
            };
            for pattern in &patterns {
                let pattern = if merge && bucket != HttpBucket::Routes {
                    excluder(pattern, &excludes)
                } else {
                    pattern.clone()
                };
                for verb in &route.methods {
                    table.http.push(
                        bucket,
                        verb,
                        RouteEntry {
                            pattern: pattern.clone(),
                            callback: callback.clone(),
                            before: bucket == HttpBucket::Middleware,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

fn build_cli(table: &mut RouteTable, class: &ClassInfo) -> Result<()> {
    let owner = class.fqcn();
    if let Some(node) = single_attribute(class, GROUP)? {
        let group = GroupAttribute::from_node(node, &owner)?;
        if !is_valid_group_name(&group.name) {
            return Err(Error::invalid_group_name(&group.name)
                .with_operation("compiler::build_cli")
                .with_context("class", owner));
        }
        table.base_pattern = group.name;
    }

    for (method, route) in method_routes(class)? {
        let Some(group) = route.group.as_deref() else {
            continue;
        };
        let group = group.trim();
        if group.trim_matches('/').is_empty() {
            return Err(Error::invalid_group_name(group)
                .with_operation("compiler::build_cli")
                .with_context("class", owner.clone())
                .with_context("method", method));
        }
        let callback = CallbackRef::new(&owner, &method).to_string();
        match route.middleware {
            Some(Middleware::CliGlobal) => table.cli.push_middleware(
                GLOBAL_MIDDLEWARE,
                CommandEntry {
                    pattern: route.pattern.trim().to_string(),
                    callback,
                },
            ),
            Some(Middleware::CliGroup) => table.cli.push_middleware(
                group,
                CommandEntry {
                    pattern: route.pattern.trim().to_string(),
                    callback,
                },
            ),
            _ => {
                for pattern in std::iter::once(&route.pattern).chain(route.aliases.iter()) {
                    table.cli.push_group(
                        group,
                        CommandEntry {
                            pattern: pattern.trim().to_string(),
                            callback: callback.clone(),
                        },
                    );
                }
            }
        }
    }
    Ok(())
}

/// Bucket of an export pattern: `(is_api, bind)`.
fn bind_key(pattern: &str) -> (bool, String) {
    let mut segments = pattern
        .trim_start_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty());
    let first = segments.next().map(resolved_prefix);
    match first.as_deref() {
        Some(API_BIND) => {
            let second = segments.next().map_or_else(|| ROOT_KEY.to_string(), resolved_prefix);
            (true, second)
        }
        Some(first) => (false, first.to_string()),
        None => (false, ROOT_KEY.to_string()),
    }
}

fn export_class(export: &mut ExportTable, module: &str, file: &str, class: &ClassInfo) -> Result<()> {
    let owner = class.fqcn();
    let prefix = prefix_of(class)?;
    let raw_prefix = prefix.as_ref().map_or("/", |p| p.pattern.as_str());
    let group = single_attribute(class, GROUP)?
        .map(|node| GroupAttribute::from_node(node, &owner))
        .transpose()?;
    let routes = export.module_mut(module);

    for node in class.attributes_named(ERROR) {
        let error = ErrorAttribute::from_node(node, &owner)?;
        let pattern = join_patterns(raw_prefix, &error.pattern);
        let (is_api, bind) = bind_key(&pattern);
        let bucket = if is_api { &mut routes.api } else { &mut routes.http };
        bucket.entry(bind).or_default().push(ExportEntry {
            methods: Vec::new(),
            pattern,
            callback: error.on_error.to_string(),
            middleware: None,
            is_error: true,
            file: file.to_string(),
        });
    }

    for (method, route) in method_routes(class)? {
        let callback = CallbackRef::new(&owner, &method).to_string();
        let middleware = route.middleware.map(|m| m.to_string());
        if let Some(route_group) = route.group.as_deref() {
            let key = group
                .as_ref()
                .map_or(route_group, |g| g.name.as_str())
                .to_string();
            routes.cli.entry(key).or_default().push(ExportEntry {
                methods: Vec::new(),
                pattern: route.pattern.trim().to_string(),
                callback,
                middleware,
                is_error: false,
                file: file.to_string(),
            });
            continue;
        }
        for raw in std::iter::once(&route.pattern).chain(route.aliases.iter()) {
            let pattern = join_patterns(raw_prefix, raw);
            let (is_api, bind) = bind_key(&pattern);
            let bucket = if is_api { &mut routes.api } else { &mut routes.http };
            bucket.entry(bind).or_default().push(ExportEntry {
                methods: route.methods.clone(),
                pattern,
                callback: callback.clone(),
                middleware: middleware.clone(),
                is_error: route.is_error,
                file: file.to_string(),
            });
        }
    }
    Ok(())
}
