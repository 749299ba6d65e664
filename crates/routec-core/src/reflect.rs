//! Static recovery of class declarations from PHP source.
//!
//! The reflector walks the token stream of one file and records what the
//! compiler needs about every declared class: modifiers, parents, imports,
//! attributes with their literal arguments, and methods. It never evaluates
//! code; anything that is not a literal survives as [`Value::Expr`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use routec_error::{Error, Result};
use strum_macros::{AsRefStr, Display};
use tracing::trace;

use crate::lexer::{Lexer, Token, TokenKind};

/// Literal value of an attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// `[...]` or `array(...)`, with optional keys.
    Array(Vec<(Option<Value>, Value)>),
    /// `Foo::BAR` or `Foo::class`, with `Foo` resolved to a qualified name.
    ClassConst { class: String, constant: String },
    /// Raw source of anything the reflector does not evaluate.
    Expr(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[(Option<Value>, Value)]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Every string in a scalar or a flat array; other values are dropped.
    pub fn string_list(&self) -> Vec<String> {
        match self {
            Value::Str(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|(_, item)| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `Foo::class`, or an expression that can only be a closure.
    pub fn is_callable_ref(&self) -> bool {
        match self {
            Value::ClassConst { constant, .. } => constant.eq_ignore_ascii_case("class"),
            Value::Expr(raw) => {
                let raw = raw.trim_start().to_ascii_lowercase();
                raw.starts_with("fn") || raw.starts_with("function") || raw.contains("::")
            }
            Value::Array(items) => items.iter().any(|(_, item)| item.is_callable_ref()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Value,
}

/// One attribute as written in source, e.g. `#[Route('/x', methods: ['GET'])]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    /// Qualified name after import resolution.
    pub name: String,
    pub args: Vec<Argument>,
}

impl AttributeNode {
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Compares the unqualified attribute name, ignoring ASCII case like PHP does.
    pub fn is(&self, short: &str) -> bool {
        self.short_name().eq_ignore_ascii_case(short)
    }

    /// Named argument matching one of `names`, else the positional argument at
    /// `position`.
    pub fn argument(&self, position: usize, names: &[&str]) -> Option<&Value> {
        let named = self.args.iter().find(|arg| {
            arg.name
                .as_deref()
                .is_some_and(|name| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
        });
        if let Some(arg) = named {
            return Some(&arg.value);
        }
        self.args
            .iter()
            .take_while(|arg| arg.name.is_none())
            .nth(position)
            .map(|arg| &arg.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
    Enum,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub attributes: Vec<AttributeNode>,
}

impl MethodInfo {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_constructor(&self) -> bool {
        self.name.eq_ignore_ascii_case("__construct")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub namespace: String,
    pub name: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub is_final: bool,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub attributes: Vec<AttributeNode>,
    pub methods: Vec<MethodInfo>,
    /// Byte offset of the declaring keyword.
    pub position: usize,
}

impl ClassInfo {
    pub fn fqcn(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}\\{}", self.namespace, self.name)
        }
    }

    /// A concrete class that could be constructed.
    pub fn is_instantiable(&self) -> bool {
        self.kind == ClassKind::Class && !self.is_abstract
    }

    pub fn extends_any(&self, bases: &[&str]) -> bool {
        names_contain(&self.extends, bases)
    }

    pub fn implements_any(&self, interfaces: &[&str]) -> bool {
        names_contain(&self.implements, interfaces)
    }

    pub fn attributes_named<'a>(&'a self, short: &'a str) -> impl Iterator<Item = &'a AttributeNode> {
        self.attributes.iter().filter(move |attr| attr.is(short))
    }

    pub fn public_methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(|method| method.is_public())
    }
}

fn names_contain(names: &[String], wanted: &[&str]) -> bool {
    names.iter().any(|name| {
        let short = short_name(name);
        wanted.iter().any(|w| w.eq_ignore_ascii_case(short))
    })
}

/// Last segment of a backslash-separated name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

/// Everything recovered from one source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Namespace of the last `namespace` declaration.
    pub namespace: String,
    /// Lower-cased alias to qualified name.
    pub imports: BTreeMap<String, String>,
    pub classes: Vec<ClassInfo>,
}

impl SourceUnit {
    pub fn find_class(&self, fqcn: &str) -> Option<&ClassInfo> {
        let wanted = fqcn.trim_start_matches('\\');
        self.classes
            .iter()
            .find(|class| class.fqcn().eq_ignore_ascii_case(wanted))
    }

    pub fn resolve_class_name(&self, name: &str) -> String {
        resolve_name(name, &self.namespace, &self.imports)
    }
}

fn resolve_name(name: &str, namespace: &str, imports: &BTreeMap<String, String>) -> String {
    if let Some(qualified) = name.strip_prefix('\\') {
        return qualified.to_string();
    }
    let lower = name.to_ascii_lowercase();
    if matches!(lower.as_str(), "self" | "static" | "parent") {
        return lower;
    }

    let (first, rest) = match name.split_once('\\') {
        Some((first, rest)) => (first, Some(rest)),
        None => (name, None),
    };
    if let Some(imported) = imports.get(&first.to_ascii_lowercase()) {
        return match rest {
            Some(rest) => format!("{imported}\\{rest}"),
            None => imported.clone(),
        };
    }
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}\\{name}")
    }
}

/// Read and reflect a source file.
pub fn reflect_file(path: &Path) -> Result<SourceUnit> {
    let bytes = fs::read(path).map_err(|err| {
        Error::from(err)
            .with_operation("reflect::reflect_file")
            .with_context("path", path.display().to_string())
    })?;
    let source = String::from_utf8_lossy(&bytes);
    reflect_source(&source, path)
}

/// Reflect in-memory source; `path` is only recorded.
pub fn reflect_source(source: &str, path: &Path) -> Result<SourceUnit> {
    let parser = Parser {
        source,
        tokens: Lexer::new(source).filter(|tok| !tok.kind.is_trivia()).collect(),
        pos: 0,
        namespace: String::new(),
        imports: BTreeMap::new(),
    };
    parser.parse(path).map_err(|err| {
        err.with_operation("reflect::reflect_source")
            .with_context("path", path.display().to_string())
    })
}

#[derive(Default)]
struct Modifiers {
    visibility: Option<Visibility>,
    is_static: bool,
    is_abstract: bool,
    is_final: bool,
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token<'src>>,
    pos: usize,
    namespace: String,
    imports: BTreeMap<String, String>,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|tok| tok.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|tok| tok.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse(mut self, path: &Path) -> Result<SourceUnit> {
        let mut classes = Vec::new();
        let mut attributes = Vec::new();
        let mut modifiers = Modifiers::default();

        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Namespace if self.peek_kind_at(1) != Some(TokenKind::NsSeparator) => {
                    self.pos += 1;
                    self.namespace = self.qualified_name().trim_start_matches('\\').to_string();
                    // Braced namespaces keep their body at top level.
                    self.eat(TokenKind::LBrace);
                    attributes.clear();
                }
                TokenKind::Use => {
                    self.pos += 1;
                    self.parse_use();
                }
                TokenKind::AttributeOpen => {
                    self.pos += 1;
                    attributes.extend(self.parse_attribute_group());
                }
                TokenKind::Abstract => {
                    self.pos += 1;
                    modifiers.is_abstract = true;
                }
                TokenKind::Final => {
                    self.pos += 1;
                    modifiers.is_final = true;
                }
                TokenKind::Readonly => self.pos += 1,
                TokenKind::Class | TokenKind::Interface | TokenKind::Trait | TokenKind::Enum
                    if self.is_declaration() =>
                {
                    let attrs = std::mem::take(&mut attributes);
                    let mods = std::mem::take(&mut modifiers);
                    classes.push(self.parse_class(tok, attrs, mods)?);
                }
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => {
                    self.skip_balanced();
                    attributes.clear();
                    modifiers = Modifiers::default();
                }
                _ => {
                    self.pos += 1;
                    attributes.clear();
                    modifiers = Modifiers::default();
                }
            }
        }

        Ok(SourceUnit {
            path: path.to_path_buf(),
            namespace: self.namespace,
            imports: self.imports,
            classes,
        })
    }

    /// A class keyword that starts a declaration, not `Foo::class` or `new class`.
    fn is_declaration(&self) -> bool {
        let previous = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i));
        let after_member_access = previous.is_some_and(|tok| {
            matches!(tok.kind, TokenKind::DoubleColon | TokenKind::New)
                || matches!(tok.text, "->" | "?->")
        });
        let named = self
            .tokens
            .get(self.pos + 1)
            .is_some_and(|tok| tok.is_word() && tok.kind != TokenKind::Extends);
        !after_member_access && named
    }

    /// `\A\B\C`, stopping before a separator that opens a group use.
    fn qualified_name(&mut self) -> String {
        let mut name = String::new();
        if self.at(TokenKind::NsSeparator) && self.peek_kind_at(1) != Some(TokenKind::LBrace) {
            self.pos += 1;
            name.push('\\');
        }
        while let Some(tok) = self.peek() {
            if !tok.is_word() {
                break;
            }
            self.pos += 1;
            name.push_str(tok.text);
            let continues = self.at(TokenKind::NsSeparator)
                && self.tokens.get(self.pos + 1).is_some_and(|next| next.is_word());
            if !continues {
                break;
            }
            self.pos += 1;
            name.push('\\');
        }
        name
    }

    fn resolve(&self, name: &str) -> String {
        resolve_name(name, &self.namespace, &self.imports)
    }

    fn parse_use(&mut self) {
        // `use function` and `use const` import no classes.
        if matches!(self.peek_kind(), Some(TokenKind::Function | TokenKind::Const)) {
            self.skip_statement();
            return;
        }
        loop {
            let name = self.qualified_name();
            let name = name.trim_start_matches('\\').to_string();
            if self.at(TokenKind::NsSeparator) && self.peek_kind_at(1) == Some(TokenKind::LBrace) {
                self.pos += 2;
                while !matches!(self.peek_kind(), None | Some(TokenKind::RBrace)) {
                    if self.eat(TokenKind::Comma) {
                        continue;
                    }
                    let member = self.qualified_name();
                    if member.is_empty() {
                        self.pos += 1;
                        continue;
                    }
                    self.import(format!("{name}\\{member}"));
                }
                self.eat(TokenKind::RBrace);
            } else if !name.is_empty() {
                self.import(name);
            }

            match self.peek_kind() {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(TokenKind::Semicolon) => {
                    self.pos += 1;
                    return;
                }
                _ => {
                    self.skip_statement();
                    return;
                }
            }
        }
    }

    fn import(&mut self, qualified: String) {
        let alias = match self.peek() {
            Some(tok) if tok.text.eq_ignore_ascii_case("as") => {
                self.pos += 1;
                self.bump()
                    .filter(|tok| tok.is_word())
                    .map(|tok| tok.text.to_string())
            }
            _ => None,
        }
        .unwrap_or_else(|| short_name(&qualified).to_string());
        self.imports.insert(alias.to_ascii_lowercase(), qualified);
    }

    fn parse_class(
        &mut self,
        keyword: Token<'src>,
        attributes: Vec<AttributeNode>,
        modifiers: Modifiers,
    ) -> Result<ClassInfo> {
        self.pos += 1;
        let name = self
            .bump()
            .map(|tok| tok.text.to_string())
            .unwrap_or_default();
        let kind = match keyword.kind {
            TokenKind::Interface => ClassKind::Interface,
            TokenKind::Trait => ClassKind::Trait,
            TokenKind::Enum => ClassKind::Enum,
            _ => ClassKind::Class,
        };

        let mut extends = Vec::new();
        let mut implements = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Extends) => {
                    self.pos += 1;
                    extends = self.name_list();
                }
                Some(TokenKind::Implements) => {
                    self.pos += 1;
                    implements = self.name_list();
                }
                Some(TokenKind::LBrace) => break,
                Some(_) => self.pos += 1,
                None => {
                    return Err(Error::syntax_error(format!(
                        "declaration of {kind} '{name}' has no body"
                    ))
                    .with_context("class", name));
                }
            }
        }
        self.pos += 1;

        let methods = self.parse_class_body();
        trace!(class = %name, methods = methods.len(), "reflected class");
        Ok(ClassInfo {
            namespace: self.namespace.clone(),
            name,
            kind,
            is_abstract: modifiers.is_abstract,
            is_final: modifiers.is_final,
            extends,
            implements,
            attributes,
            methods,
            position: keyword.position,
        })
    }

    fn name_list(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            let name = self.qualified_name();
            if name.is_empty() {
                break;
            }
            names.push(self.resolve(&name));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        names
    }

    fn parse_class_body(&mut self) -> Vec<MethodInfo> {
        let mut methods = Vec::new();
        let mut attributes = Vec::new();
        let mut modifiers = Modifiers::default();

        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::RBrace => {
                    self.pos += 1;
                    break;
                }
                TokenKind::AttributeOpen => {
                    self.pos += 1;
                    attributes.extend(self.parse_attribute_group());
                }
                TokenKind::Public => {
                    self.pos += 1;
                    modifiers.visibility = Some(Visibility::Public);
                }
                TokenKind::Protected => {
                    self.pos += 1;
                    modifiers.visibility = Some(Visibility::Protected);
                }
                TokenKind::Private => {
                    self.pos += 1;
                    modifiers.visibility = Some(Visibility::Private);
                }
                TokenKind::Static => {
                    self.pos += 1;
                    modifiers.is_static = true;
                }
                TokenKind::Abstract => {
                    self.pos += 1;
                    modifiers.is_abstract = true;
                }
                TokenKind::Function => {
                    self.pos += 1;
                    let attrs = std::mem::take(&mut attributes);
                    let mods = std::mem::take(&mut modifiers);
                    if let Some(method) = self.parse_method(attrs, mods) {
                        methods.push(method);
                    }
                }
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => self.skip_balanced(),
                TokenKind::Semicolon => {
                    self.pos += 1;
                    attributes.clear();
                    modifiers = Modifiers::default();
                }
                _ => self.pos += 1,
            }
        }
        methods
    }

    fn parse_method(
        &mut self,
        attributes: Vec<AttributeNode>,
        modifiers: Modifiers,
    ) -> Option<MethodInfo> {
        if self.peek().is_some_and(|tok| tok.text == "&") {
            self.pos += 1;
        }
        let name = self.peek().filter(|tok| tok.is_word())?.text.to_string();
        self.pos += 1;

        loop {
            match self.peek_kind() {
                Some(TokenKind::LBrace) => {
                    self.skip_balanced();
                    break;
                }
                Some(TokenKind::Semicolon) => {
                    self.pos += 1;
                    break;
                }
                Some(TokenKind::LParen | TokenKind::LBracket) => self.skip_balanced(),
                Some(TokenKind::RBrace) | None => break,
                Some(_) => self.pos += 1,
            }
        }

        Some(MethodInfo {
            name,
            visibility: modifiers.visibility.unwrap_or_default(),
            is_static: modifiers.is_static,
            is_abstract: modifiers.is_abstract,
            attributes,
        })
    }

    /// Attributes of one `#[...]` block; the opener is already consumed.
    fn parse_attribute_group(&mut self) -> Vec<AttributeNode> {
        let mut nodes = Vec::new();
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::RBracket => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Comma => self.pos += 1,
                TokenKind::RBrace | TokenKind::Semicolon => break,
                TokenKind::NsSeparator => {
                    let name = self.qualified_name();
                    if name.len() <= 1 {
                        if name.is_empty() {
                            self.pos += 1;
                        }
                        continue;
                    }
                    let args = self.parse_arguments();
                    nodes.push(AttributeNode {
                        name: self.resolve(&name),
                        args,
                    });
                }
                _ if tok.is_word() => {
                    let name = self.qualified_name();
                    let args = self.parse_arguments();
                    nodes.push(AttributeNode {
                        name: self.resolve(&name),
                        args,
                    });
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::AttributeOpen => {
                    self.skip_balanced()
                }
                _ => self.pos += 1,
            }
        }
        nodes
    }

    fn parse_arguments(&mut self) -> Vec<Argument> {
        let mut args = Vec::new();
        if !self.eat(TokenKind::LParen) {
            return args;
        }
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::RParen => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Comma => self.pos += 1,
                TokenKind::RBrace | TokenKind::Semicolon | TokenKind::RBracket => break,
                _ => {
                    let name = if tok.is_word() && self.peek_kind_at(1) == Some(TokenKind::Colon) {
                        self.pos += 2;
                        Some(tok.text.to_string())
                    } else {
                        None
                    };
                    let value = self.parse_value();
                    args.push(Argument { name, value });
                }
            }
        }
        args
    }

    fn at_boundary(&self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(
                TokenKind::Comma
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::DoubleArrow
                    | TokenKind::Semicolon
            )
        )
    }

    fn raw_text(&self, start: usize, end: usize) -> String {
        match (self.tokens.get(start), end.checked_sub(1).and_then(|i| self.tokens.get(i))) {
            (Some(first), Some(last)) if end > start => {
                self.source[first.position..last.position + last.text.len()].to_string()
            }
            _ => String::new(),
        }
    }

    fn parse_value(&mut self) -> Value {
        let start = self.pos;
        let mut value = self.parse_primary();
        let mut opaque = false;

        while self.eat(TokenKind::Dot) {
            let rhs = self.parse_primary();
            value = match (value, rhs) {
                (Value::Str(mut lhs), Value::Str(rhs)) => {
                    lhs.push_str(&rhs);
                    Value::Str(lhs)
                }
                (lhs, _) => {
                    opaque = true;
                    lhs
                }
            };
        }

        if !self.at_boundary() {
            while !self.at_boundary() {
                self.skip_one();
            }
            opaque = true;
        }

        if opaque {
            Value::Expr(self.raw_text(start, self.pos))
        } else {
            value
        }
    }

    fn parse_primary(&mut self) -> Value {
        let Some(tok) = self.peek() else {
            return Value::Null;
        };
        let start = self.pos;

        match tok.kind {
            TokenKind::StringLiteral => {
                self.pos += 1;
                Value::Str(tok.unquoted().into_owned())
            }
            TokenKind::Number => {
                self.pos += 1;
                parse_number(tok.text)
            }
            TokenKind::Operator
                if matches!(tok.text, "-" | "+")
                    && self.peek_kind_at(1) == Some(TokenKind::Number) =>
            {
                self.pos += 1;
                match (tok.text, self.parse_primary()) {
                    ("-", Value::Int(i)) => Value::Int(-i),
                    ("-", Value::Float(f)) => Value::Float(-f),
                    (_, value) => value,
                }
            }
            TokenKind::LBracket => self.parse_array(TokenKind::RBracket),
            TokenKind::Array if self.peek_kind_at(1) == Some(TokenKind::LParen) => {
                self.pos += 1;
                self.parse_array(TokenKind::RParen)
            }
            TokenKind::Identifier if tok.text.eq_ignore_ascii_case("true") => {
                self.pos += 1;
                Value::Bool(true)
            }
            TokenKind::Identifier if tok.text.eq_ignore_ascii_case("false") => {
                self.pos += 1;
                Value::Bool(false)
            }
            TokenKind::Identifier if tok.text.eq_ignore_ascii_case("null") => {
                self.pos += 1;
                Value::Null
            }
            TokenKind::Fn => {
                self.pos += 1;
                while !matches!(
                    self.peek_kind(),
                    None | Some(
                        TokenKind::DoubleArrow
                            | TokenKind::Comma
                            | TokenKind::RParen
                            | TokenKind::RBracket
                    )
                ) {
                    self.skip_one();
                }
                if self.eat(TokenKind::DoubleArrow) {
                    self.parse_value();
                }
                Value::Expr(self.raw_text(start, self.pos))
            }
            TokenKind::Function => {
                self.pos += 1;
                loop {
                    match self.peek_kind() {
                        Some(TokenKind::LBrace) => {
                            self.skip_balanced();
                            break;
                        }
                        None | Some(TokenKind::Comma | TokenKind::RParen | TokenKind::RBracket) => {
                            break;
                        }
                        Some(_) => self.skip_one(),
                    }
                }
                Value::Expr(self.raw_text(start, self.pos))
            }
            TokenKind::New | TokenKind::Callable => {
                self.pos += 1;
                Value::Expr(self.raw_text(start, self.pos))
            }
            TokenKind::NsSeparator | TokenKind::Identifier | TokenKind::Static => {
                let name = self.qualified_name();
                if name.is_empty() {
                    self.pos += 1;
                    return Value::Expr(self.raw_text(start, self.pos));
                }
                let constant = self
                    .tokens
                    .get(self.pos + 1)
                    .filter(|next| self.at(TokenKind::DoubleColon) && next.is_word())
                    .map(|next| next.text.to_string());
                match constant {
                    Some(constant) => {
                        self.pos += 2;
                        Value::ClassConst {
                            class: self.resolve(&name),
                            constant,
                        }
                    }
                    None => Value::Expr(name),
                }
            }
            TokenKind::LParen | TokenKind::LBrace | TokenKind::AttributeOpen => {
                self.skip_balanced();
                Value::Expr(self.raw_text(start, self.pos))
            }
            _ => {
                self.pos += 1;
                Value::Expr(self.raw_text(start, self.pos))
            }
        }
    }

    fn parse_array(&mut self, close: TokenKind) -> Value {
        self.pos += 1;
        let mut items = Vec::new();
        while let Some(kind) = self.peek_kind() {
            if kind == close {
                self.pos += 1;
                break;
            }
            match kind {
                TokenKind::Comma => self.pos += 1,
                TokenKind::RBrace | TokenKind::Semicolon => break,
                TokenKind::RParen | TokenKind::RBracket => {
                    // Mismatched closer; give up on this array.
                    self.pos += 1;
                    break;
                }
                _ => {
                    let first = self.parse_value();
                    if self.eat(TokenKind::DoubleArrow) {
                        let value = self.parse_value();
                        items.push((Some(first), value));
                    } else {
                        items.push((None, first));
                    }
                }
            }
        }
        Value::Array(items)
    }

    /// Skip one bracketed group starting at the current opener.
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(tok) = self.bump() {
            match tok.kind {
                TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::AttributeOpen => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Skip a single token, or a whole group when it opens one.
    fn skip_one(&mut self) {
        match self.peek_kind() {
            Some(
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace | TokenKind::AttributeOpen,
            ) => self.skip_balanced(),
            Some(_) => self.pos += 1,
            None => {}
        }
    }

    fn skip_statement(&mut self) {
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Semicolon => {
                    self.pos += 1;
                    return;
                }
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => self.skip_balanced(),
                _ => self.pos += 1,
            }
        }
    }
}

fn parse_number(text: &str) -> Value {
    let digits = text.replace('_', "");
    let lower = digits.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    };
    match parsed {
        Some(int) => Value::Int(int),
        None => lower
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Expr(text.to_string())),
    }
}
