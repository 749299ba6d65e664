//! Route pattern normalization and prefix matching.
//!
//! Route patterns use `(:name)` placeholders that expand to fixed regular
//! expression fragments. Prefix matching needs negative lookahead for the
//! exclusion list, so matching goes through `fancy_regex`; everything that
//! only rewrites text uses `regex`.

use std::str::FromStr;
use std::sync::LazyLock;

use fancy_regex::Regex as FancyRegex;
use regex::{Captures, Regex};
use routec_error::{Error, Result};
use strum_macros::{AsRefStr, EnumString};
use tracing::{debug, warn};

/// Fragment used for trailing catch-all placeholders.
pub const OPTIONAL_TAIL: &str = "(?:/.*)?";

/// Cache key and error context used for the site root.
pub const ROOT_KEY: &str = "web";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(:([A-Za-z]+)\)").expect("placeholder regex"));

/// Named placeholder accepted inside route patterns as `(:name)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Placeholder {
    Root,
    Base,
    Any,
    #[strum(serialize = "int", serialize = "integer")]
    Int,
    Mixed,
    #[strum(serialize = "string")]
    Str,
    Optional,
    Alphabet,
    Alphanumeric,
    Username,
    Version,
    Number,
    #[strum(serialize = "double", serialize = "float")]
    Double,
    Path,
    Uuid,
}

impl Placeholder {
    /// The regular expression fragment this placeholder expands to.
    pub fn fragment(self) -> &'static str {
        match self {
            Placeholder::Root | Placeholder::Base => OPTIONAL_TAIL,
            Placeholder::Any => "(.*)",
            Placeholder::Int => r"(\d+)",
            Placeholder::Mixed => "([^/]+)",
            Placeholder::Str => r"([\w-]+)",
            Placeholder::Optional => "([^/]*)?",
            Placeholder::Alphabet => "([A-Za-z]+)",
            Placeholder::Alphanumeric => "([A-Za-z0-9]+)",
            Placeholder::Username => "([A-Za-z0-9_.-]+)",
            Placeholder::Version => r"(\d+(?:\.\d+)*)",
            Placeholder::Number => r"([-+]?\d+)",
            Placeholder::Double => r"([-+]?\d*\.?\d+)",
            Placeholder::Path => "((?:[^/]+/)*[^/]+)",
            Placeholder::Uuid => {
                "([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})"
            }
        }
    }
}

/// Expand every known `(:name)` placeholder into its regex fragment.
///
/// Unknown placeholder names are left untouched, and since no fragment
/// contains the `(:` sequence the function is idempotent.
pub fn normalize(pattern: &str) -> String {
    PLACEHOLDER
        .replace_all(pattern, |caps: &Captures| {
            match Placeholder::from_str(&caps[1]) {
                Ok(placeholder) => placeholder.fragment().to_string(),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Remove a trailing catch-all (`(:root)`, `(:base)` or its expanded form).
pub fn strip_catch_all(pattern: &str) -> &str {
    for tail in ["(:root)", "(:base)", OPTIONAL_TAIL] {
        if let Some(stripped) = pattern.strip_suffix(tail) {
            return stripped;
        }
    }
    pattern
}

/// Build a prefix pattern that matches everything under `prefix` except the
/// listed first-level sub-paths.
pub fn excluder(prefix: &str, excludes: &[String]) -> String {
    let trimmed = strip_catch_all(prefix.trim()).trim_matches('/');
    let alternatives: Vec<String> = excludes
        .iter()
        .map(|exclude| exclude.trim().trim_matches('/'))
        .filter(|exclude| !exclude.is_empty())
        .map(|exclude| format!("{}(?:/|$)", regex::escape(exclude)))
        .collect();

    match (trimmed.is_empty(), alternatives.is_empty()) {
        (true, true) => "/.*".to_string(),
        (false, true) => format!("/{trimmed}{OPTIONAL_TAIL}"),
        (true, false) => format!("/(?!{}).*", alternatives.join("|")),
        (false, false) => format!("/{trimmed}(?:/(?!{}).*)?", alternatives.join("|")),
    }
}

/// Spellings that mean "everything at the site root".
pub fn is_home(pattern: &str) -> bool {
    matches!(
        pattern,
        "/" | "/*" | "/.*" | "/?" | "/?.*" | "/?(.*)" | "/." | "/-" | "/_" | "." | "-" | "_"
    )
}

/// Anchored regex for a prefix pattern; `is_root` also accepts any tail.
pub fn compile_prefix(pattern: &str, is_root: bool) -> Result<FancyRegex> {
    let mut source = format!("^(?:{})", normalize(pattern));
    if is_root {
        source.push_str(r"(\/.*)?");
    }
    source.push('$');
    FancyRegex::new(&source).map_err(|err| {
        Error::invalid_pattern(pattern)
            .with_operation("pattern::compile_prefix")
            .set_source(err)
    })
}

/// Full-string match of `uri` against a (possibly unnormalized) prefix pattern.
///
/// A pattern that does not compile is reported and treated as no match.
pub fn is_controller_prefix(pattern: &str, uri: &str, is_root: bool) -> bool {
    if uri == "/" && is_home(&normalize(pattern)) {
        return true;
    }

    let regex = match compile_prefix(pattern, is_root) {
        Ok(regex) => regex,
        Err(err) => {
            warn!(pattern, error = %err, "route prefix does not compile");
            return false;
        }
    };

    match regex.is_match(uri) {
        Ok(matched) => {
            debug!(pattern = regex.as_str(), uri, matched, "prefix match");
            matched
        }
        Err(err) => {
            warn!(pattern, uri, error = %err, "route prefix match aborted");
            false
        }
    }
}

/// Match `uri` against a prefix and its exclusion list.
pub fn matches_prefix(prefix: &str, excludes: &[String], uri: &str) -> bool {
    is_controller_prefix(&excluder(prefix, excludes), uri, false)
}

/// Strip query string and fragment, and make sure the path is rooted.
pub fn clean_uri(uri: &str) -> String {
    let path = uri
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// First path segment of a request URI, empty for the site root.
pub fn uri_context(uri: &str) -> &str {
    uri.trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
}

/// Reduce a compiled prefix to its first literal path segment.
///
/// Used as the cache key for a compiled table; the root falls back to
/// [`ROOT_KEY`].
pub fn resolved_prefix(base_pattern: &str) -> String {
    let segment: String = base_pattern
        .trim_start_matches(['^', '/'])
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
        .collect();
    if segment.is_empty() {
        ROOT_KEY.to_string()
    } else {
        segment
    }
}

/// Join a class prefix and a method route into one rooted pattern.
pub fn join_patterns(prefix: &str, route: &str) -> String {
    let prefix = strip_catch_all(prefix.trim()).trim_matches('/');
    let route = route.trim().trim_matches('/');
    match (prefix.is_empty(), route.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{route}"),
        (false, true) => format!("/{prefix}"),
        (false, false) => format!("/{prefix}/{route}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn broken_prefix_is_an_invalid_pattern() {
        let err = compile_prefix("/blog(", false).expect_err("unbalanced");
        assert_eq!(err.kind(), routec_error::ErrorKind::InvalidPattern);
        assert!(!is_controller_prefix("/blog(", "/blog", false));
        assert!(compile_prefix("/blog", true).unwrap().is_match("/blog/1").unwrap());
    }

    fn excludes(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn normalize_expands_known_placeholders() {
        assert_eq!(normalize("/blog/(:int)"), r"/blog/(\d+)");
        assert_eq!(normalize("/blog/(:integer)"), r"/blog/(\d+)");
        assert_eq!(normalize("/files/(:path)"), "/files/((?:[^/]+/)*[^/]+)");
        assert_eq!(normalize("/u/(:alphabet)"), "/u/([A-Za-z]+)");
        assert_eq!(normalize("/(:root)"), "/(?:/.*)?");
        assert!(normalize("/item/(:uuid)").contains("{8}-[0-9a-fA-F]{4}"));
    }

    #[test]
    fn normalize_keeps_unknown_placeholders() {
        assert_eq!(normalize("/x/(:slug)"), "/x/(:slug)");
        assert_eq!(normalize("/plain/path"), "/plain/path");
    }

    #[test]
    fn normalize_is_idempotent() {
        for pattern in [
            "/",
            "/blog/(:int)/(:any)",
            "/api/(:version)/(:uuid)",
            "/(:root)",
            "/x/(:slug)/(:float)",
            "/docs/(:optional)",
        ] {
            let once = normalize(pattern);
            assert_eq!(normalize(&once), once, "pattern {pattern}");
        }
    }

    #[test]
    fn home_patterns() {
        assert!(is_home("/"));
        assert!(is_home("/*"));
        assert!(is_home("/.*"));
        assert!(is_home("/?(.*)"));
        assert!(is_home("_"));
        assert!(!is_home("/blog"));
        assert!(!is_home(""));
    }

    #[test]
    fn excluder_shapes() {
        assert_eq!(excluder("/", &[]), "/.*");
        assert_eq!(excluder("/blog/", &[]), "/blog(?:/.*)?");
        assert_eq!(excluder("/(:root)", &[]), "/.*");
        assert_eq!(
            excluder("/", &excludes(&["api", "/blog/"])),
            "/(?!api(?:/|$)|blog(?:/|$)).*"
        );
        assert_eq!(
            excluder("/admin(:base)", &excludes(&["login"])),
            "/admin(?:/(?!login(?:/|$)).*)?"
        );
        assert_eq!(
            excluder("/", &excludes(&["a.b"])),
            r"/(?!a\.b(?:/|$)).*"
        );
    }

    #[test]
    fn excluded_sub_paths_do_not_match() {
        let pattern = excluder("/", &excludes(&["api", "blog", "admin"]));
        assert!(is_controller_prefix(&pattern, "/contact", false));
        assert!(is_controller_prefix(&pattern, "/", false));
        assert!(is_controller_prefix(&pattern, "/apiary", false));
        assert!(!is_controller_prefix(&pattern, "/api/users", false));
        assert!(!is_controller_prefix(&pattern, "/api", false));
        assert!(!is_controller_prefix(&pattern, "/blog/1", false));
    }

    #[test]
    fn non_root_prefix_with_excludes() {
        let pattern = excluder("/admin", &excludes(&["login"]));
        assert!(is_controller_prefix(&pattern, "/admin", false));
        assert!(is_controller_prefix(&pattern, "/admin/users", false));
        assert!(!is_controller_prefix(&pattern, "/admin/login", false));
        assert!(!is_controller_prefix(&pattern, "/administrator", false));
    }

    #[test]
    fn root_fast_path_and_degenerate_input() {
        assert!(is_controller_prefix("/", "/", false));
        assert!(!is_controller_prefix("/blog((", "/blog", false));
        assert!(!is_controller_prefix("/blog", "/", false));
    }

    #[test]
    fn is_root_appends_optional_tail() {
        assert!(!is_controller_prefix("/blog", "/blog/42", false));
        assert!(is_controller_prefix("/blog", "/blog/42", true));
        assert!(is_controller_prefix("/blog/(:int)", "/blog/42", false));
        assert!(!is_controller_prefix("/blog/(:int)", "/blog/abc", false));
    }

    #[test]
    fn matches_prefix_respects_excludes() {
        assert!(matches_prefix("/blog", &[], "/blog/42"));
        assert!(!matches_prefix("/blog", &[], "/blogs"));
        assert!(!matches_prefix("/", &excludes(&["api"]), "/api/ping"));
        assert!(matches_prefix("/", &excludes(&["api"]), "/contact"));
    }

    #[test]
    fn uri_helpers() {
        assert_eq!(clean_uri("/blog/42?page=2#top"), "/blog/42");
        assert_eq!(clean_uri("blog"), "/blog");
        assert_eq!(uri_context("/blog/42"), "blog");
        assert_eq!(uri_context("/"), "");
        assert_eq!(resolved_prefix("/blog(?:/.*)?"), "blog");
        assert_eq!(resolved_prefix(r"/api/v1/(\d+)"), "api");
        assert_eq!(resolved_prefix("/"), "web");
        assert_eq!(resolved_prefix("/(?!api(?:/|$)).*"), "web");
    }

    #[test]
    fn join_patterns_collapses_slashes() {
        assert_eq!(join_patterns("/blog", "/"), "/blog");
        assert_eq!(join_patterns("/", "/"), "/");
        assert_eq!(join_patterns("/", "contact"), "/contact");
        assert_eq!(join_patterns("/blog/", "/(:int)"), "/blog/(:int)");
        assert_eq!(join_patterns("/(:root)", "about"), "/about");
    }
}
