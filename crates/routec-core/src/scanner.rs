//! Single-pass controller scanner.
//!
//! Decides from the token stream alone whether a file declares the expected
//! controller class with a class-level `Prefix` or `Group` matching the
//! request. The scan stops at the class body, so most of a file is never
//! tokenized.

use std::fs;
use std::iter::Peekable;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use routec_error::{Error, Result};
use strum_macros::{AsRefStr, Display};
use tracing::trace;

use crate::attribute::{GROUP, PREFIX};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::pattern::matches_prefix;
use crate::reflect::short_name;

/// Parents that make a class routable.
pub const ROUTABLE_BASES: [&str; 3] = ["Controller", "Command", "RoutableInterface"];

static GROUP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_:-]*$").expect("group name regex"));

/// Which class attribute selects the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum AttributeKind {
    /// HTTP controllers, matched by URI prefix.
    Prefix,
    /// Console controllers, matched by command group.
    Group,
}

impl AttributeKind {
    pub fn attribute_name(self) -> &'static str {
        match self {
            AttributeKind::Prefix => PREFIX,
            AttributeKind::Group => GROUP,
        }
    }
}

/// Literal arguments captured from one matching class attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAttribute {
    pub text: String,
    pub excludes: Vec<String>,
}

/// Whether a command group name is acceptable.
pub fn is_valid_group_name(name: &str) -> bool {
    GROUP_NAME.is_match(name)
}

/// Test a captured attribute pattern against a URI or command.
pub fn is_match(raw: &str, request: &str, excludes: &[String], kind: AttributeKind) -> Result<bool> {
    let mut text = raw.trim();
    for key in ["pattern:", "name:"] {
        if let Some(rest) = text.strip_prefix(key) {
            text = rest.trim();
        }
    }
    let text = text.trim_matches(|ch: char| ch == '\'' || ch == '"' || ch == '/' || ch.is_whitespace());

    match kind {
        AttributeKind::Group => {
            if !is_valid_group_name(text) {
                return Err(Error::invalid_group_name(text).with_operation("scanner::is_match"));
            }
            Ok(text == request.trim().trim_matches('/'))
        }
        AttributeKind::Prefix => Ok(matches_prefix(text, excludes, request)),
    }
}

/// Scan a file on disk.
pub fn scan_file(
    path: &Path,
    expected_class: &str,
    request: &str,
    kind: AttributeKind,
) -> Result<Option<String>> {
    let bytes = fs::read(path).map_err(|err| {
        Error::from(err)
            .with_operation("scanner::scan_file")
            .with_context("path", path.display().to_string())
    })?;
    let source = String::from_utf8_lossy(&bytes);
    scan_source(&source, expected_class, request, kind).map_err(|err| {
        err.with_context("path", path.display().to_string())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inheritance {
    Extends,
    Implements,
}

/// Scan in-memory source; returns the qualified class name on a match.
pub fn scan_source(
    source: &str,
    expected_class: &str,
    request: &str,
    kind: AttributeKind,
) -> Result<Option<String>> {
    let mut tokens = Lexer::new(source)
        .filter(|tok| !tok.kind.is_trivia())
        .peekable();

    let mut namespace: Option<String> = None;
    let mut inheritance: Option<Inheritance> = None;
    let mut pending: Vec<PendingAttribute> = Vec::new();
    let mut in_target = false;
    let mut previous: Option<TokenKind> = None;

    while let Some(tok) = tokens.next() {
        match tok.kind {
            TokenKind::Namespace
                if tokens
                    .peek()
                    .is_some_and(|next| next.is_word() || next.kind == TokenKind::LBrace) =>
            {
                let mut buffer = String::new();
                while let Some(part) =
                    tokens.next_if(|t| t.kind == TokenKind::NsSeparator || t.is_word())
                {
                    buffer.push_str(part.text);
                }
                let buffer = buffer.trim_start_matches('\\').to_string();
                namespace = buffer
                    .split('\\')
                    .any(|segment| segment == "Controllers")
                    .then_some(buffer);
                // Braced form: the namespace body is scanned, not skipped.
                tokens.next_if(|t| t.kind == TokenKind::LBrace);
                pending.clear();
            }
            TokenKind::AttributeOpen => {
                pending.extend(parse_attribute_block(&mut tokens, kind));
            }
            TokenKind::Class
                if !matches!(previous, Some(TokenKind::DoubleColon | TokenKind::New)) =>
            {
                let name = tokens.next_if(|t| t.is_word()).map(|t| t.text);
                in_target = name.is_some_and(|name| name.eq_ignore_ascii_case(expected_class));
                if !in_target {
                    pending.clear();
                }
            }
            TokenKind::Extends if in_target => inheritance = Some(Inheritance::Extends),
            TokenKind::Implements if in_target => inheritance = Some(Inheritance::Implements),
            TokenKind::LBrace => {
                if in_target {
                    trace!(class = expected_class, "reached class body without a routable base");
                    return Ok(None);
                }
                skip_block(&mut tokens);
                pending.clear();
            }
            TokenKind::Identifier if in_target && inheritance.is_some() => {
                let qualified = tokens
                    .peek()
                    .is_some_and(|next| next.kind == TokenKind::NsSeparator);
                let routable = ROUTABLE_BASES
                    .iter()
                    .any(|base| base.eq_ignore_ascii_case(tok.text));
                if !qualified && routable {
                    return resolve_match(namespace, pending, expected_class, request, kind);
                }
            }
            _ => {}
        }
        previous = Some(tok.kind);
    }
    Ok(None)
}

fn resolve_match(
    namespace: Option<String>,
    pending: Vec<PendingAttribute>,
    expected_class: &str,
    request: &str,
    kind: AttributeKind,
) -> Result<Option<String>> {
    let Some(namespace) = namespace else {
        return Ok(None);
    };
    let class = format!("{namespace}\\{expected_class}");
    match pending.len() {
        0 => Ok(None),
        1 => {
            let attribute = &pending[0];
            let matched = is_match(&attribute.text, request, &attribute.excludes, kind)
                .map_err(|err| err.with_context("class", class.clone()))?;
            trace!(%class, request, matched, "scanned controller");
            Ok(matched.then_some(class))
        }
        _ => Err(Error::duplicate_attribute(class, kind.attribute_name())
            .with_operation("scanner::scan_source")),
    }
}

/// Skip to the brace closing the block just opened.
fn skip_block<'src, I>(tokens: &mut Peekable<I>)
where
    I: Iterator<Item = Token<'src>>,
{
    let mut depth = 1usize;
    for tok in tokens.by_ref() {
        match tok.kind {
            TokenKind::LBrace => depth += 1,
            TokenKind::RBrace => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Capture every attribute of `kind` in one `#[...]` block.
fn parse_attribute_block<'src, I>(tokens: &mut Peekable<I>, kind: AttributeKind) -> Vec<PendingAttribute>
where
    I: Iterator<Item = Token<'src>>,
{
    let mut found = Vec::new();
    loop {
        let mut name = String::new();
        while let Some(part) = tokens.next_if(|t| t.kind == TokenKind::NsSeparator || t.is_word()) {
            name.push_str(part.text);
        }
        let wanted = !name.is_empty()
            && short_name(&name).eq_ignore_ascii_case(kind.attribute_name());

        let capture = match tokens.next_if(|t| t.kind == TokenKind::LParen) {
            Some(_) => capture_arguments(tokens, kind),
            None => PendingAttribute::default(),
        };
        if wanted {
            found.push(capture);
        }

        match tokens.next().map(|t| t.kind) {
            Some(TokenKind::Comma) => continue,
            Some(TokenKind::RBracket) | None => break,
            Some(_) => {
                // Unexpected token; resync on the closing bracket.
                let mut depth = 0usize;
                for tok in tokens.by_ref() {
                    match tok.kind {
                        TokenKind::LParen | TokenKind::LBracket | TokenKind::AttributeOpen => {
                            depth += 1
                        }
                        TokenKind::RParen => depth = depth.saturating_sub(1),
                        TokenKind::RBracket if depth == 0 => break,
                        TokenKind::RBracket => depth -= 1,
                        _ => {}
                    }
                }
                break;
            }
        }
    }
    found
}

/// Role of the top-level argument currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pattern,
    Exclude,
    Error,
    Other,
}

impl Slot {
    fn positional(kind: AttributeKind, index: usize) -> Slot {
        match (kind, index) {
            (_, 0) => Slot::Pattern,
            (AttributeKind::Prefix, 1) => Slot::Error,
            (AttributeKind::Prefix, 2) => Slot::Exclude,
            _ => Slot::Other,
        }
    }

    fn named(name: &str) -> Slot {
        match name {
            "pattern" | "name" => Slot::Pattern,
            "exclude" => Slot::Exclude,
            "onError" => Slot::Error,
            _ => Slot::Other,
        }
    }
}

#[derive(Default)]
struct ArrayCapture {
    strings: Vec<String>,
    callable: bool,
}

/// Read an argument list up to its closing `)`; the `(` is consumed.
fn capture_arguments<'src, I>(tokens: &mut Peekable<I>, kind: AttributeKind) -> PendingAttribute
where
    I: Iterator<Item = Token<'src>>,
{
    let mut captured = PendingAttribute::default();
    let mut depth = 0usize;
    let mut index = 0usize;
    let mut slot = Slot::positional(kind, 0);
    let mut array: Option<ArrayCapture> = None;

    while let Some(tok) = tokens.next() {
        match tok.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::AttributeOpen => {
                if depth == 0 && tok.kind == TokenKind::LBracket {
                    array = Some(ArrayCapture::default());
                }
                depth += 1;
            }
            TokenKind::RParen | TokenKind::RBracket => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(capture) = array.take() {
                        let literal = !capture.callable
                            && matches!(slot, Slot::Pattern | Slot::Exclude)
                            && kind == AttributeKind::Prefix;
                        if literal {
                            captured.excludes.extend(capture.strings);
                        }
                    }
                }
            }
            TokenKind::Comma if depth == 0 => {
                index += 1;
                slot = Slot::positional(kind, index);
            }
            TokenKind::Identifier
                if depth == 0
                    && tokens.peek().is_some_and(|next| next.kind == TokenKind::Colon) =>
            {
                tokens.next();
                slot = Slot::named(tok.text);
                if slot == Slot::Pattern {
                    captured.text.clear();
                }
            }
            TokenKind::Identifier if tok.text == "onError" && depth == 0 => slot = Slot::Error,
            TokenKind::DoubleColon | TokenKind::Fn | TokenKind::Function | TokenKind::Callable => {
                match array.as_mut() {
                    Some(capture) => capture.callable = true,
                    None if depth == 0 => slot = Slot::Error,
                    None => {}
                }
            }
            TokenKind::StringLiteral => {
                let text = tok.unquoted();
                if let Some(capture) = array.as_mut() {
                    capture.strings.push(text.into_owned());
                } else if depth == 0 {
                    match slot {
                        Slot::Pattern => captured.text.push_str(&text),
                        Slot::Exclude => captured.excludes.push(text.into_owned()),
                        Slot::Error | Slot::Other => {}
                    }
                }
            }
            _ => {}
        }
    }
    captured
}
