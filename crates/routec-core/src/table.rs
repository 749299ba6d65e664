//! Compiled route tables.
//!
//! Maps are ordered by key so serialized tables are stable; entry lists keep
//! discovery order and are never sorted.

use std::collections::BTreeMap;

use routec_error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// One HTTP route, middleware hook or error handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub pattern: String,
    pub callback: String,
    #[serde(default)]
    pub before: bool,
}

/// One console command or console middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub pattern: String,
    pub callback: String,
}

/// Which HTTP map a route lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum HttpBucket {
    Routes,
    Middleware,
    After,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRoutes {
    pub routes: BTreeMap<String, Vec<RouteEntry>>,
    pub middleware: BTreeMap<String, Vec<RouteEntry>>,
    pub after: BTreeMap<String, Vec<RouteEntry>>,
    pub errors: Vec<RouteEntry>,
}

impl HttpRoutes {
    pub fn bucket_mut(&mut self, bucket: HttpBucket) -> &mut BTreeMap<String, Vec<RouteEntry>> {
        match bucket {
            HttpBucket::Routes => &mut self.routes,
            HttpBucket::Middleware => &mut self.middleware,
            HttpBucket::After => &mut self.after,
        }
    }

    pub fn push(&mut self, bucket: HttpBucket, method: &str, entry: RouteEntry) {
        self.bucket_mut(bucket)
            .entry(method.to_string())
            .or_default()
            .push(entry);
    }

    pub fn len(&self) -> usize {
        [&self.routes, &self.middleware, &self.after]
            .iter()
            .flat_map(|map| map.values())
            .map(Vec::len)
            .sum::<usize>()
            + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliRoutes {
    pub groups: BTreeMap<String, Vec<CommandEntry>>,
    pub middleware: BTreeMap<String, Vec<CommandEntry>>,
}

impl CliRoutes {
    pub fn push_group(&mut self, group: &str, entry: CommandEntry) {
        self.groups.entry(group.to_string()).or_default().push(entry);
    }

    pub fn push_middleware(&mut self, key: &str, entry: CommandEntry) {
        self.middleware.entry(key.to_string()).or_default().push(entry);
    }

    pub fn len(&self) -> usize {
        self.groups
            .values()
            .chain(self.middleware.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Routes of the single controller matched for one URI or command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    /// Normalized prefix regex for HTTP, the group name for CLI.
    pub base_pattern: String,
    pub excluders: Vec<String>,
    pub http: HttpRoutes,
    pub cli: CliRoutes,
}

impl RouteTable {
    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.cli.is_empty()
    }

    pub fn len(&self) -> usize {
        self.http.len() + self.cli.len()
    }

    /// Compact JSON when `minify` is set, pretty JSON otherwise.
    pub fn to_json(&self, minify: bool) -> Result<String> {
        let encoded = if minify {
            serde_json::to_string(self)
        } else {
            serde_json::to_string_pretty(self)
        };
        encoded.map_err(|err| {
            Error::new(ErrorKind::SerializationFailed, err.to_string())
                .with_operation("table::to_json")
                .set_source(err)
        })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|err| {
            Error::new(ErrorKind::DeserializationFailed, err.to_string())
                .with_operation("table::from_json")
                .set_source(err)
        })
    }
}

/// One declared route as listed by an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub methods: Vec<String>,
    pub pattern: String,
    pub callback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRoutes {
    /// Bind key to routes.
    pub http: BTreeMap<String, Vec<ExportEntry>>,
    /// Routes under `/api`, keyed by their second segment.
    pub api: BTreeMap<String, Vec<ExportEntry>>,
    /// Group to commands.
    pub cli: BTreeMap<String, Vec<ExportEntry>>,
}

/// Every route in a controller tree, bucketed by module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportTable {
    pub modules: BTreeMap<String, ModuleRoutes>,
}

impl ExportTable {
    pub fn module_mut(&mut self, module: &str) -> &mut ModuleRoutes {
        self.modules.entry(module.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.modules
            .values()
            .flat_map(|module| [&module.http, &module.api, &module.cli])
            .flat_map(|map| map.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(pattern: &str, callback: &str) -> RouteEntry {
        RouteEntry {
            pattern: pattern.into(),
            callback: callback.into(),
            before: false,
        }
    }

    #[test]
    fn empty_table() {
        let table = RouteTable::default();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn push_keeps_discovery_order() {
        let mut http = HttpRoutes::default();
        http.push(HttpBucket::Routes, "GET", entry("/b", "B::b"));
        http.push(HttpBucket::Routes, "GET", entry("/a", "A::a"));
        http.push(HttpBucket::After, "POST", entry("/a", "A::after"));
        let patterns: Vec<&str> = http.routes["GET"].iter().map(|e| e.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["/b", "/a"]);
        assert_eq!(http.len(), 3);
        assert!(http.middleware.is_empty());
    }

    #[test]
    fn errors_count_towards_emptiness() {
        let mut table = RouteTable::default();
        table.http.errors.push(entry("/blog(?:/.*)?", "Blog::error"));
        assert!(!table.is_empty());
    }

    #[test]
    fn missing_sections_deserialize_to_defaults() {
        let table = RouteTable::from_json(r#"{"base_pattern":"mail","cli":{"groups":{"mail":[{"pattern":"send","callback":"Mail::send"}]}}}"#)
            .expect("decode");
        assert_eq!(table.base_pattern, "mail");
        assert!(table.http.is_empty());
        assert_eq!(table.cli.groups["mail"][0].pattern, "send");
    }

    #[test]
    fn compact_and_pretty_json_decode_identically() {
        let mut table = RouteTable {
            base_pattern: "/blog(?:/.*)?".into(),
            excluders: vec!["drafts".into()],
            ..Default::default()
        };
        table.http.push(HttpBucket::Middleware, "GET", RouteEntry {
            before: true,
            ..entry("/blog", "Blog::auth")
        });
        let compact = table.to_json(true).expect("compact");
        let pretty = table.to_json(false).expect("pretty");
        assert!(!compact.contains('\n'));
        assert!(pretty.contains('\n'));
        assert_eq!(RouteTable::from_json(&compact).expect("decode"), table);
        assert_eq!(RouteTable::from_json(&pretty).expect("decode"), table);
    }

    #[test]
    fn malformed_json_is_a_deserialization_error() {
        let err = RouteTable::from_json("{not json").expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::DeserializationFailed);
    }

    #[test]
    fn export_len_counts_all_buckets() {
        let mut export = ExportTable::default();
        let record = ExportEntry {
            methods: vec!["GET".into()],
            pattern: "/blog".into(),
            callback: "Blog::index".into(),
            middleware: None,
            is_error: false,
            file: "Blog.php".into(),
        };
        export.module_mut("App").http.entry("blog".into()).or_default().push(record.clone());
        export.module_mut("App").api.entry("users".into()).or_default().push(record);
        assert_eq!(export.len(), 2);
        assert_eq!(export.modules.len(), 1);
    }
}
