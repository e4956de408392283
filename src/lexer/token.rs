use std::fmt;
use std::path::PathBuf;

use miette::SourceSpan;

/// Source location information for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// File path (if known)
    pub file: Option<PathBuf>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of file
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
}

impl SourceLocation {
    pub fn new(
        file: Option<PathBuf>,
        line: usize,
        column: usize,
        offset: usize,
        length: usize,
    ) -> Self {
        Self {
            file,
            line,
            column,
            offset,
            length,
        }
    }

    /// Create a span from this location to another
    pub fn span_to(&self, other: &SourceLocation) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
            offset: self.offset,
            length: (other.offset + other.length).saturating_sub(self.offset),
        }
    }

    /// Diagnostic span covering this location
    pub fn span(&self) -> SourceSpan {
        (self.offset, self.length).into()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}:{}:{}", path.display(), self.line, self.column),
            None => write!(f, "<input>:{}:{}", self.line, self.column),
        }
    }
}

/// Token type enumeration - all tokens of the supported HCL subset
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    For,
    In,
    If,
    Null,
    True,
    False,

    // Literals
    Integer(i64),
    Float(f64),
    String(String),

    // String interpolation parts (for "text ${expr} more text")
    StringStart(String),  // "text ${
    StringMiddle(String), // } middle ${
    StringEnd(String),    // } end"

    /// Heredoc body, kept raw; templates inside are split by the parser
    Heredoc(String),

    // Identifiers
    Ident(String),

    // Punctuation
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    LeftParen,    // (
    RightParen,   // )
    Colon,        // :
    Dot,          // .
    Comma,        // ,
    Ellipsis,     // ...
    Arrow,        // =>

    // Operators
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    Gt,       // >
    LtEq,     // <=
    GtEq,     // >=
    And,      // &&
    Or,       // ||
    Not,      // !
    Question, // ?
    Eq,       // =

    // Special
    Newline,
    Eof,
}

impl TokenKind {
    /// Get the keyword from a string, if it matches
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "for" => Some(TokenKind::For),
            "in" => Some(TokenKind::In),
            "if" => Some(TokenKind::If),
            "null" => Some(TokenKind::Null),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            _ => None,
        }
    }

    /// Keyword text, for tokens that double as identifiers in key position
    pub fn keyword_text(&self) -> Option<&'static str> {
        match self {
            TokenKind::For => Some("for"),
            TokenKind::In => Some("in"),
            TokenKind::If => Some("if"),
            TokenKind::Null => Some("null"),
            TokenKind::True => Some("true"),
            TokenKind::False => Some("false"),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::For => write!(f, "for"),
            TokenKind::In => write!(f, "in"),
            TokenKind::If => write!(f, "if"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::StringStart(s) => write!(f, "\"{}${{", s),
            TokenKind::StringMiddle(s) => write!(f, "}}{}${{", s),
            TokenKind::StringEnd(s) => write!(f, "}}{}\"", s),
            TokenKind::Heredoc(_) => write!(f, "heredoc"),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

/// A token with its location in source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_from_str() {
        assert_eq!(TokenKind::keyword_from_str("for"), Some(TokenKind::For));
        assert_eq!(TokenKind::keyword_from_str("null"), Some(TokenKind::Null));
        assert_eq!(TokenKind::keyword_from_str("locals"), None);
    }

    #[test]
    fn test_span_to() {
        let a = SourceLocation::new(None, 1, 1, 4, 2);
        let b = SourceLocation::new(None, 1, 10, 12, 3);
        let span = a.span_to(&b);
        assert_eq!(span.offset, 4);
        assert_eq!(span.length, 11);
    }
}
