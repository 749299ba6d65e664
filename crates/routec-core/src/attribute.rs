//! Typed routing attributes built from reflected literal arguments.
//!
//! Construction validates the declaration, so an attribute value that exists
//! is always consistent. Errors carry the declaring class and method.

use std::fmt;
use std::str::FromStr;

use routec_error::{Error, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::pattern::ROOT_KEY;
use crate::reflect::{AttributeNode, Value};

pub const ROUTE: &str = "Route";
pub const PREFIX: &str = "Prefix";
pub const GROUP: &str = "Group";
pub const ERROR: &str = "Error";

/// Middleware role of a route.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Middleware {
    /// HTTP hook that runs before the handler.
    #[strum(serialize = "before")]
    #[serde(rename = "before")]
    HttpBefore,
    /// HTTP hook that runs after the handler.
    #[strum(serialize = "after")]
    #[serde(rename = "after")]
    HttpAfter,
    /// Console hook for every command.
    #[strum(serialize = "global")]
    #[serde(rename = "global")]
    CliGlobal,
    /// Console hook for one command group.
    #[strum(serialize = "guard")]
    #[serde(rename = "guard")]
    CliGroup,
}

impl Middleware {
    pub fn is_cli(self) -> bool {
        matches!(self, Middleware::CliGlobal | Middleware::CliGroup)
    }

    /// Accepts `'before'` as well as constants like `Route::BEFORE`.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        let text = match value {
            Value::Null => return Ok(None),
            Value::Str(s) if s.trim().is_empty() => return Ok(None),
            Value::Str(s) => s.trim(),
            Value::ClassConst { constant, .. } => constant.as_str(),
            other => {
                return Err(Error::invalid_middleware(format!(
                    "middleware must be a string or a class constant, found {other:?}"
                )));
            }
        };
        Middleware::from_str(text).map(Some).map_err(|_| {
            Error::invalid_middleware(format!(
                "unknown middleware '{text}', expected before, after, global or guard"
            ))
            .with_context("middleware", text)
        })
    }
}

/// `"Class::method"` handed to the router untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackRef(String);

impl CallbackRef {
    pub fn new(class: &str, method: &str) -> Self {
        Self(format!("{}::{}", class.trim_start_matches('\\'), method))
    }

    /// Accepts `[Foo::class, 'method']`, `'Foo::method'`, `'Foo@method'`, or a
    /// bare method name on `owner`.
    pub fn from_value(value: &Value, owner: &str) -> Option<Self> {
        let own = |class: &str| -> String {
            match class {
                "self" | "static" => owner.to_string(),
                other => other.to_string(),
            }
        };
        match value {
            Value::Array(items) if items.len() == 2 => {
                let class = match &items[0].1 {
                    Value::ClassConst { class, constant } if constant.eq_ignore_ascii_case("class") => {
                        own(class)
                    }
                    Value::Str(class) => class.clone(),
                    _ => return None,
                };
                let method = items[1].1.as_str()?;
                Some(Self::new(&class, method))
            }
            Value::Str(text) => {
                let text = text.trim();
                let (class, method) = text
                    .split_once("::")
                    .or_else(|| text.split_once('@'))
                    .unwrap_or(("", text));
                if method.is_empty() {
                    return None;
                }
                let class = if class.is_empty() { owner.to_string() } else { own(class) };
                Some(Self::new(&class, method))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn string_arg(node: &AttributeNode, position: usize, names: &[&str]) -> Option<String> {
    node.argument(position, names)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Method-level `#[Route(pattern, methods, error, group, middleware, aliases)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAttribute {
    pub pattern: String,
    /// Upper-cased verbs in declaration order, without duplicates.
    pub methods: Vec<String>,
    pub is_error: bool,
    pub group: Option<String>,
    pub middleware: Option<Middleware>,
    pub aliases: Vec<String>,
}

impl RouteAttribute {
    pub fn new(
        pattern: impl Into<String>,
        methods: &[&str],
        is_error: bool,
        group: Option<String>,
        middleware: Option<Middleware>,
        aliases: Vec<String>,
    ) -> Result<Self> {
        if let Some(middleware) = middleware {
            match (middleware.is_cli(), group.as_deref()) {
                (true, None) => {
                    return Err(Error::invalid_middleware(format!(
                        "middleware '{middleware}' is only valid on console routes with a group"
                    ))
                    .with_context("middleware", middleware.to_string()));
                }
                (false, Some(group)) => {
                    return Err(Error::invalid_middleware(format!(
                        "middleware '{middleware}' is only valid on HTTP routes, found group '{group}'"
                    ))
                    .with_context("middleware", middleware.to_string()));
                }
                _ => {}
            }
        }

        let mut verbs: Vec<String> = Vec::with_capacity(methods.len().max(1));
        for method in methods {
            let verb = method.trim().to_ascii_uppercase();
            if !verb.is_empty() && !verbs.contains(&verb) {
                verbs.push(verb);
            }
        }
        if verbs.is_empty() {
            verbs.push("GET".to_string());
        }

        Ok(Self {
            pattern: pattern.into(),
            methods: verbs,
            is_error,
            group,
            middleware,
            aliases,
        })
    }

    pub fn from_node(node: &AttributeNode, class: &str, method: &str) -> Result<Self> {
        let pattern = string_arg(node, 0, &["pattern", "path"]).unwrap_or_else(|| "/".to_string());
        let methods = node
            .argument(1, &["methods", "method"])
            .map(Value::string_list)
            .unwrap_or_default();
        let is_error = node
            .argument(2, &["error"])
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let group = string_arg(node, 3, &["group"]);
        let aliases = node
            .argument(5, &["aliases", "alias"])
            .map(Value::string_list)
            .unwrap_or_default();

        let annotate = |err: Error| {
            err.with_operation("attribute::RouteAttribute::from_node")
                .with_context("class", class)
                .with_context("method", method)
        };
        let middleware = match node.argument(4, &["middleware"]) {
            Some(value) => Middleware::from_value(value).map_err(annotate)?,
            None => None,
        };
        let methods: Vec<&str> = methods.iter().map(String::as_str).collect();
        Self::new(pattern, &methods, is_error, group, middleware, aliases).map_err(annotate)
    }
}

/// Class-level `#[Prefix(pattern, onError, exclude, mergeExcluders)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixAttribute {
    pub pattern: String,
    pub on_error: Option<CallbackRef>,
    pub exclude: Vec<String>,
    pub merge_excluders: bool,
}

impl PrefixAttribute {
    pub fn from_node(node: &AttributeNode, class: &str) -> Result<Self> {
        let pattern = string_arg(node, 0, &["pattern"]).unwrap_or_else(|| "/".to_string());
        let on_error = node
            .argument(1, &["onError"])
            .and_then(|value| CallbackRef::from_value(value, class));
        let exclude = node
            .argument(2, &["exclude"])
            .map(Value::string_list)
            .unwrap_or_default();
        let merge_excluders = node
            .argument(3, &["mergeExcluders"])
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            pattern,
            on_error,
            exclude,
            merge_excluders,
        })
    }
}

/// Class-level `#[Group(name)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAttribute {
    pub name: String,
}

impl GroupAttribute {
    pub fn from_node(node: &AttributeNode, class: &str) -> Result<Self> {
        let name = string_arg(node, 0, &["name"]).ok_or_else(|| {
            Error::config_invalid(format!("#[{GROUP}] on '{class}' has no name"))
                .with_operation("attribute::GroupAttribute::from_node")
                .with_context("class", class)
        })?;
        Ok(Self { name })
    }
}

/// Class-level `#[Error(context, pattern, onError)]`, repeatable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorAttribute {
    pub context: String,
    pub pattern: String,
    pub on_error: CallbackRef,
}

impl ErrorAttribute {
    pub fn from_node(node: &AttributeNode, class: &str) -> Result<Self> {
        let context = string_arg(node, 0, &["context"]).unwrap_or_else(|| ROOT_KEY.to_string());
        let pattern = string_arg(node, 1, &["pattern"]).unwrap_or_else(|| "/".to_string());
        let on_error = node
            .argument(2, &["onError"])
            .and_then(|value| CallbackRef::from_value(value, class))
            .ok_or_else(|| {
                Error::config_invalid(format!("#[{ERROR}] on '{class}' needs an onError callback"))
                    .with_operation("attribute::ErrorAttribute::from_node")
                    .with_context("class", class)
            })?;
        Ok(Self {
            context,
            pattern,
            on_error,
        })
    }
}
