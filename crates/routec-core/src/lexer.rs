//! A small PHP lexer.
//!
//! Produces just enough token structure for the scanner and the reflector:
//! names, keywords, literals, punctuation and attribute openers. Everything
//! the two consumers never look at collapses into [`TokenKind::Operator`].
//! The lexer is an iterator, so consumers that stop early never tokenize the
//! rest of the file.

use std::borrow::Cow;

use strum_macros::{Display, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TokenKind {
    // Trivia
    Whitespace,
    Comment,
    InlineHtml,
    OpenTag,
    CloseTag,

    // Names and literals
    Identifier,
    Variable,
    Number,
    StringLiteral,
    NsSeparator,

    // Keywords
    Namespace,
    Use,
    Extends,
    Implements,
    Class,
    Interface,
    Trait,
    Enum,
    Function,
    Fn,
    Callable,
    Abstract,
    Final,
    Readonly,
    Public,
    Protected,
    Private,
    Static,
    New,
    Const,
    Array,

    // Punctuation
    DoubleColon,
    AttributeOpen,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semicolon,
    Comma,
    Colon,
    DoubleArrow,
    Dot,
    Operator,
}

impl TokenKind {
    /// Tokens that carry no meaning for the scanner.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::Comment
                | TokenKind::InlineHtml
                | TokenKind::OpenTag
                | TokenKind::CloseTag
        )
    }

    /// Case-insensitive keyword lookup.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "namespace" => TokenKind::Namespace,
            "use" => TokenKind::Use,
            "extends" => TokenKind::Extends,
            "implements" => TokenKind::Implements,
            "class" => TokenKind::Class,
            "interface" => TokenKind::Interface,
            "trait" => TokenKind::Trait,
            "enum" => TokenKind::Enum,
            "function" => TokenKind::Function,
            "fn" => TokenKind::Fn,
            "callable" => TokenKind::Callable,
            "abstract" => TokenKind::Abstract,
            "final" => TokenKind::Final,
            "readonly" => TokenKind::Readonly,
            "public" => TokenKind::Public,
            "protected" => TokenKind::Protected,
            "private" => TokenKind::Private,
            "static" => TokenKind::Static,
            "new" => TokenKind::New,
            "const" => TokenKind::Const,
            "array" => TokenKind::Array,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    /// Byte offset of the token in the source.
    pub position: usize,
}

impl<'src> Token<'src> {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Identifiers and keywords: anything usable as a member name.
    pub fn is_word(&self) -> bool {
        self.text
            .as_bytes()
            .first()
            .is_some_and(|&b| is_ident_start(b))
            && !matches!(self.kind, TokenKind::Variable | TokenKind::StringLiteral)
    }

    /// Literal value of a string token, with quotes removed and escapes applied.
    pub fn unquoted(&self) -> Cow<'src, str> {
        unquote(self.text)
    }
}

/// Strip the quotes of a PHP string literal and resolve its escapes.
///
/// Text that is not a quoted literal is returned as-is.
pub fn unquote(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    if text.starts_with("<<<") {
        return Cow::Owned(heredoc_body(text));
    }
    if bytes.len() < 2 {
        return Cow::Borrowed(text);
    }
    let quote = bytes[0];
    if !matches!(quote, b'\'' | b'"' | b'`') || bytes[bytes.len() - 1] != quote {
        return Cow::Borrowed(text);
    }

    let inner = &text[1..text.len() - 1];
    if !inner.contains('\\') {
        return Cow::Borrowed(inner);
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match (quote, next) {
            (b'\'', '\'') | (_, '\\') => out.push(next),
            (b'\'', _) => {
                out.push('\\');
                out.push(next);
            }
            (_, 'n') => out.push('\n'),
            (_, 't') => out.push('\t'),
            (_, 'r') => out.push('\r'),
            (_, '$') | (_, '"') | (_, '`') => out.push(next),
            _ => {
                out.push('\\');
                out.push(next);
            }
        }
    }
    Cow::Owned(out)
}

fn heredoc_body(text: &str) -> String {
    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        return String::new();
    };
    let label = header
        .trim_start_matches("<<<")
        .trim()
        .trim_matches(['\'', '"']);
    let body: Vec<&str> = lines.collect();
    let (closing, content) = match body.split_last() {
        Some((last, rest)) if last.trim_start().starts_with(label) => (*last, rest),
        _ => ("", &body[..]),
    };
    let indent = closing.len() - closing.trim_start().len();
    content
        .iter()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte-level PHP tokenizer.
pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    in_php: bool,
}

const OPERATORS: &[&str] = &[
    "<=>", "===", "!==", "??=", "?->", "**=", "...", "<<=", ">>=", "->", "??", "==", "!=",
    "<>", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", ".=", "%=", "&=", "|=",
    "^=", "**", "<<", ">>",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            in_php: false,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn starts_with(&self, needle: &str) -> bool {
        self.bytes[self.pos..].starts_with(needle.as_bytes())
    }

    fn emit(&mut self, kind: TokenKind, start: usize) -> Token<'src> {
        Token {
            kind,
            text: &self.source[start..self.pos],
            position: start,
        }
    }

    fn lex_inline_html(&mut self, start: usize) -> Token<'src> {
        match self.source[self.pos..].find("<?") {
            Some(0) => {
                self.in_php = true;
                if self.starts_with("<?php") {
                    self.pos += 5;
                } else if self.starts_with("<?=") {
                    self.pos += 3;
                } else {
                    self.pos += 2;
                }
                self.emit(TokenKind::OpenTag, start)
            }
            Some(offset) => {
                self.pos += offset;
                self.emit(TokenKind::InlineHtml, start)
            }
            None => {
                self.pos = self.bytes.len();
                self.emit(TokenKind::InlineHtml, start)
            }
        }
    }

    fn lex_line_comment(&mut self, start: usize) -> Token<'src> {
        while let Some(b) = self.peek(0) {
            if b == b'\n' || self.starts_with("?>") {
                break;
            }
            self.pos += 1;
        }
        self.emit(TokenKind::Comment, start)
    }

    fn lex_block_comment(&mut self, start: usize) -> Token<'src> {
        self.pos += 2;
        match self.source[self.pos..].find("*/") {
            Some(offset) => self.pos += offset + 2,
            None => self.pos = self.bytes.len(),
        }
        self.emit(TokenKind::Comment, start)
    }

    fn lex_quoted(&mut self, start: usize, quote: u8) -> Token<'src> {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            self.pos += 1;
            if b == b'\\' {
                if self.peek(0).is_some() {
                    self.pos += 1;
                }
            } else if b == quote {
                break;
            }
        }
        self.emit(TokenKind::StringLiteral, start)
    }

    fn lex_heredoc(&mut self, start: usize) -> Token<'src> {
        self.pos += 3;
        while matches!(self.peek(0), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
        let quote = match self.peek(0) {
            Some(q @ (b'\'' | b'"')) => {
                self.pos += 1;
                Some(q)
            }
            _ => None,
        };
        let label_start = self.pos;
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        let label = &self.source[label_start..self.pos];
        if quote.is_some() && self.peek(0) == quote {
            self.pos += 1;
        }
        if label.is_empty() {
            return self.emit(TokenKind::Operator, start);
        }

        // The closing label sits on its own line, possibly indented.
        let mut line_start = match self.source[self.pos..].find('\n') {
            Some(offset) => self.pos + offset + 1,
            None => {
                self.pos = self.bytes.len();
                return self.emit(TokenKind::StringLiteral, start);
            }
        };
        loop {
            let line = &self.source[line_start..];
            let trimmed = line.trim_start_matches([' ', '\t']);
            let indent = line.len() - trimmed.len();
            if trimmed.starts_with(label)
                && !trimmed
                    .as_bytes()
                    .get(label.len())
                    .is_some_and(|&b| is_ident_char(b))
            {
                self.pos = line_start + indent + label.len();
                break;
            }
            match line.find('\n') {
                Some(offset) => line_start += offset + 1,
                None => {
                    self.pos = self.bytes.len();
                    break;
                }
            }
        }
        self.emit(TokenKind::StringLiteral, start)
    }

    fn lex_number(&mut self, start: usize) -> Token<'src> {
        while let Some(b) = self.peek(0) {
            let exponent_sign =
                matches!(b, b'+' | b'-') && matches!(self.bytes[self.pos - 1], b'e' | b'E');
            if b.is_ascii_alphanumeric() || b == b'_' || exponent_sign {
                self.pos += 1;
            } else if b == b'.' && self.peek(1).is_some_and(|n| n.is_ascii_digit()) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.emit(TokenKind::Number, start)
    }

    fn lex_word(&mut self, start: usize) -> Token<'src> {
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        let kind = TokenKind::keyword(word).unwrap_or(TokenKind::Identifier);
        self.emit(kind, start)
    }

    fn lex_php(&mut self, start: usize, b: u8) -> Token<'src> {
        if b.is_ascii_whitespace() {
            while self.peek(0).is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            return self.emit(TokenKind::Whitespace, start);
        }
        if self.starts_with("?>") {
            self.pos += 2;
            self.in_php = false;
            return self.emit(TokenKind::CloseTag, start);
        }
        if self.starts_with("#[") {
            self.pos += 2;
            return self.emit(TokenKind::AttributeOpen, start);
        }
        if b == b'#' || self.starts_with("//") {
            return self.lex_line_comment(start);
        }
        if self.starts_with("/*") {
            return self.lex_block_comment(start);
        }
        if self.starts_with("<<<") {
            return self.lex_heredoc(start);
        }
        if matches!(b, b'\'' | b'"' | b'`') {
            return self.lex_quoted(start, b);
        }
        if b == b'$' && self.peek(1).is_some_and(is_ident_start) {
            self.pos += 1;
            while self.peek(0).is_some_and(is_ident_char) {
                self.pos += 1;
            }
            return self.emit(TokenKind::Variable, start);
        }
        if b.is_ascii_digit() || (b == b'.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
            self.pos += 1;
            return self.lex_number(start);
        }
        if is_ident_start(b) {
            return self.lex_word(start);
        }
        if self.starts_with("::") {
            self.pos += 2;
            return self.emit(TokenKind::DoubleColon, start);
        }
        if self.starts_with("=>") {
            self.pos += 2;
            return self.emit(TokenKind::DoubleArrow, start);
        }
        if let Some(op) = OPERATORS.iter().find(|op| self.starts_with(op)) {
            self.pos += op.len();
            return self.emit(TokenKind::Operator, start);
        }

        self.pos += 1;
        let kind = match b {
            b'\\' => TokenKind::NsSeparator,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'.' => TokenKind::Dot,
            _ => TokenKind::Operator,
        };
        self.emit(kind, start)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let b = self.peek(0)?;
        if !self.in_php {
            return Some(self.lex_inline_html(start));
        }
        Some(self.lex_php(start, b))
    }
}

/// Tokenize a whole source file, trivia included.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).collect()
}

/// Tokenize a source file, dropping whitespace, comments and tags.
pub fn significant_tokens(source: &str) -> Vec<Token<'_>> {
    Lexer::new(source).filter(|tok| !tok.kind.is_trivia()).collect()
}

/// 1-based line number of a byte offset.
pub fn line_at(source: &str, position: usize) -> usize {
    let end = position.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        significant_tokens(source).iter().map(|tok| tok.kind).collect()
    }

    #[test]
    fn class_header_tokens() {
        let tokens = significant_tokens(
            "<?php\nnamespace App\\Controllers\\Http;\nclass Blog extends Controller {}",
        );
        let texts: Vec<&str> = tokens.iter().map(|tok| tok.text).collect();
        assert_eq!(
            texts,
            vec![
                "namespace",
                "App",
                "\\",
                "Controllers",
                "\\",
                "Http",
                ";",
                "class",
                "Blog",
                "extends",
                "Controller",
                "{",
                "}"
            ]
        );
        assert_eq!(tokens[0].kind, TokenKind::Namespace);
        assert_eq!(tokens[2].kind, TokenKind::NsSeparator);
        assert_eq!(tokens[7].kind, TokenKind::Class);
        assert_eq!(tokens[9].kind, TokenKind::Extends);
    }

    #[test]
    fn hash_comment_versus_attribute() {
        assert_eq!(
            kinds("<?php # comment\n#[Prefix('/x')]"),
            vec![
                TokenKind::AttributeOpen,
                TokenKind::Identifier,
                TokenKind::LParen,
                TokenKind::StringLiteral,
                TokenKind::RParen,
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("<?php ABSTRACT Class Foo IMPLEMENTS Bar"),
            vec![
                TokenKind::Abstract,
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::Implements,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn punctuation_and_operators() {
        assert_eq!(
            kinds("<?php Foo::class => $x->y ?? [1, 2.5];"),
            vec![
                TokenKind::Identifier,
                TokenKind::DoubleColon,
                TokenKind::Class,
                TokenKind::DoubleArrow,
                TokenKind::Variable,
                TokenKind::Operator,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::LBracket,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::RBracket,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        let tokens = significant_tokens(r#"<?php 'it\'s' "tab\there" 'c:\path'"#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].unquoted(), "it's");
        assert_eq!(tokens[1].unquoted(), "tab\there");
        assert_eq!(tokens[2].unquoted(), r"c:\path");
    }

    #[test]
    fn comments_hide_code() {
        let source = "<?php /* class Hidden extends Controller */ // class Nope\nclass Real {}";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[0].kind, TokenKind::Class);
        assert_eq!(tokens[1].text, "Real");
    }

    #[test]
    fn heredoc_is_one_literal() {
        let source = "<?php $x = <<<EOT\n  class Fake extends Controller {\n  EOT;\nclass Real {}";
        let tokens = significant_tokens(source);
        let literal = tokens
            .iter()
            .find(|tok| tok.kind == TokenKind::StringLiteral)
            .expect("heredoc literal");
        assert!(literal.text.starts_with("<<<EOT"));
        assert_eq!(literal.unquoted(), "class Fake extends Controller {");
        let classes: Vec<&str> = tokens
            .windows(2)
            .filter(|pair| pair[0].kind == TokenKind::Class)
            .map(|pair| pair[1].text)
            .collect();
        assert_eq!(classes, vec!["Real"]);
    }

    #[test]
    fn inline_html_outside_tags() {
        let tokens = tokenize("<h1>hi</h1><?php echo 1; ?>tail");
        assert_eq!(tokens[0].kind, TokenKind::InlineHtml);
        assert_eq!(tokens[1].kind, TokenKind::OpenTag);
        assert_eq!(tokens.last().map(|tok| tok.kind), Some(TokenKind::InlineHtml));
        assert!(tokens.iter().any(|tok| tok.kind == TokenKind::CloseTag));
    }

    #[test]
    fn positions_and_lines() {
        let source = "<?php\n\nclass A {}";
        let tokens = significant_tokens(source);
        assert_eq!(tokens[0].position, 7);
        assert_eq!(line_at(source, tokens[0].position), 3);
    }

    #[test]
    fn words_include_keywords() {
        let tokens = significant_tokens("<?php function list() {} $var 'str'");
        assert!(tokens[0].is_word());
        assert!(tokens[1].is_word());
        assert!(!tokens.iter().any(|tok| tok.kind == TokenKind::Variable && tok.is_word()));
        assert!(!tokens.last().is_some_and(|tok| tok.is_word()));
    }
}
