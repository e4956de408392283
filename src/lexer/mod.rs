//! Lexer (tokenizer) for the HCL configuration syntax.
//!
//! Converts source text into a stream of [`token::Token`]s for the parser.
//! Newlines are only significant at the top level and directly inside `{ }`;
//! inside `( )`, `[ ]` and `${ }` they are dropped.

pub mod token;

use std::path::PathBuf;

use crate::errors::{EngineError, EngineResult};
use token::{SourceLocation, Token, TokenKind};

/// Open delimiter kinds, tracked to decide whether a newline is significant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Brace,
    Bracket,
    Paren,
    Interpolation,
}

/// Lexer for HCL source
pub struct Lexer<'a> {
    /// Source code being lexed
    source: &'a str,
    /// Characters for iteration
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    /// Current position in bytes
    position: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start position of current token
    token_start: usize,
    /// Start line of current token
    token_start_line: usize,
    /// Start column of current token
    token_start_column: usize,
    /// File path for error reporting
    file: Option<PathBuf>,
    /// Stack of currently open delimiters
    delimiters: Vec<Delimiter>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'a str, file: Option<PathBuf>) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            position: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
            file,
            delimiters: Vec::new(),
        }
    }

    /// Tokenize the entire source and return all tokens
    pub fn tokenize(&mut self) -> EngineResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Whether a newline at the current nesting level is a separator
    fn newline_significant(&self) -> bool {
        matches!(self.delimiters.last(), None | Some(Delimiter::Brace))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> EngineResult<Token> {
        loop {
            self.skip_whitespace_and_comments();

            self.token_start = self.position;
            self.token_start_line = self.line;
            self.token_start_column = self.column;

            if self.peek_char() == Some('\n') {
                self.advance();
                if self.newline_significant() {
                    return Ok(self.make_token(TokenKind::Newline));
                }
                continue;
            }
            break;
        }

        let ch = match self.peek_char() {
            None => return Ok(self.make_token(TokenKind::Eof)),
            Some(ch) => ch,
        };

        match ch {
            'a'..='z' | 'A'..='Z' | '_' => self.lex_identifier(),
            '0'..='9' => self.lex_number(),
            '"' => self.lex_string(),
            '<' if self.peek_char_at(1) == Some('<') => self.lex_heredoc(),
            '{' => {
                self.advance();
                self.delimiters.push(Delimiter::Brace);
                Ok(self.make_token(TokenKind::LeftBrace))
            }
            '}' => {
                if self.delimiters.last() == Some(&Delimiter::Interpolation) {
                    return self.continue_interpolated_string();
                }
                self.advance();
                self.delimiters.pop();
                Ok(self.make_token(TokenKind::RightBrace))
            }
            '[' => {
                self.advance();
                self.delimiters.push(Delimiter::Bracket);
                Ok(self.make_token(TokenKind::LeftBracket))
            }
            ']' => {
                self.advance();
                self.delimiters.pop();
                Ok(self.make_token(TokenKind::RightBracket))
            }
            '(' => {
                self.advance();
                self.delimiters.push(Delimiter::Paren);
                Ok(self.make_token(TokenKind::LeftParen))
            }
            ')' => {
                self.advance();
                self.delimiters.pop();
                Ok(self.make_token(TokenKind::RightParen))
            }
            ':' => self.single(TokenKind::Colon),
            ',' => self.single(TokenKind::Comma),
            '?' => self.single(TokenKind::Question),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '.' => {
                if self.peek_char_at(1) == Some('.') && self.peek_char_at(2) == Some('.') {
                    self.advance();
                    self.advance();
                    self.advance();
                    Ok(self.make_token(TokenKind::Ellipsis))
                } else {
                    self.single(TokenKind::Dot)
                }
            }
            '=' => match self.peek_char_at(1) {
                Some('=') => self.double(TokenKind::EqEq),
                Some('>') => self.double(TokenKind::Arrow),
                _ => self.single(TokenKind::Eq),
            },
            '!' => match self.peek_char_at(1) {
                Some('=') => self.double(TokenKind::NotEq),
                _ => self.single(TokenKind::Not),
            },
            '<' => match self.peek_char_at(1) {
                Some('=') => self.double(TokenKind::LtEq),
                _ => self.single(TokenKind::Lt),
            },
            '>' => match self.peek_char_at(1) {
                Some('=') => self.double(TokenKind::GtEq),
                _ => self.single(TokenKind::Gt),
            },
            '&' if self.peek_char_at(1) == Some('&') => self.double(TokenKind::And),
            '|' if self.peek_char_at(1) == Some('|') => self.double(TokenKind::Or),
            other => {
                let location = self.current_location();
                self.advance();
                Err(EngineError::UnexpectedCharacter {
                    src: self.source.to_string(),
                    span: location.span(),
                    ch: other,
                })
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> EngineResult<Token> {
        self.advance();
        Ok(self.make_token(kind))
    }

    fn double(&mut self, kind: TokenKind) -> EngineResult<Token> {
        self.advance();
        self.advance();
        Ok(self.make_token(kind))
    }

    /// Peek at the current character without consuming
    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    /// Peek at a character at offset from current position
    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.source[self.position..].chars().nth(offset)
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let (pos, ch) = self.chars.next()?;
        self.position = pos + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Skip whitespace and comments (newlines are handled by the caller)
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('#') => self.skip_line_comment(),
                Some('/') if self.peek_char_at(1) == Some('/') => self.skip_line_comment(),
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    self.advance(); // /
                    self.advance(); // *
                    loop {
                        match self.peek_char() {
                            None => break,
                            Some('*') if self.peek_char_at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Lex an identifier or keyword
    fn lex_identifier(&mut self) -> EngineResult<Token> {
        let start = self.position;

        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.position];
        let kind =
            TokenKind::keyword_from_str(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));

        Ok(self.make_token(kind))
    }

    /// Lex a number (integer or float)
    fn lex_number(&mut self) -> EngineResult<Token> {
        let start = self.position;
        let mut is_float = false;

        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek_char() == Some('.') && matches!(self.peek_char_at(1), Some(c) if c.is_ascii_digit())
        {
            is_float = true;
            self.advance(); // .
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }

        if let Some('e' | 'E') = self.peek_char() {
            is_float = true;
            self.advance();
            if let Some('+' | '-') = self.peek_char() {
                self.advance();
            }
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.source[start..self.position];

        let kind = if is_float {
            let value: f64 = text.parse().map_err(|_| {
                EngineError::unexpected_token(
                    self.source,
                    &self.token_location(),
                    "valid number",
                    text,
                    "invalid float literal",
                )
            })?;
            TokenKind::Float(value)
        } else {
            match text.parse::<i64>() {
                Ok(value) => TokenKind::Integer(value),
                // Out of i64 range: keep the magnitude as a float
                Err(_) => TokenKind::Float(text.parse::<f64>().map_err(|_| {
                    EngineError::unexpected_token(
                        self.source,
                        &self.token_location(),
                        "valid number",
                        text,
                        "invalid integer literal",
                    )
                })?),
            }
        };

        Ok(self.make_token(kind))
    }

    /// Lex a double-quoted string (may contain interpolation)
    fn lex_string(&mut self) -> EngineResult<Token> {
        self.advance(); // opening "
        match self.lex_string_segment()? {
            Segment::Closed(value) => Ok(self.make_token(TokenKind::String(value))),
            Segment::Interpolation(value) => Ok(self.make_token(TokenKind::StringStart(value))),
        }
    }

    /// Continue lexing an interpolated string after the expression
    fn continue_interpolated_string(&mut self) -> EngineResult<Token> {
        self.advance(); // closing }
        self.delimiters.pop();

        self.token_start = self.position;
        self.token_start_line = self.line;
        self.token_start_column = self.column;

        match self.lex_string_segment()? {
            Segment::Closed(value) => Ok(self.make_token(TokenKind::StringEnd(value))),
            Segment::Interpolation(value) => Ok(self.make_token(TokenKind::StringMiddle(value))),
        }
    }

    /// Lex string content up to the closing quote or the next `${`
    fn lex_string_segment(&mut self) -> EngineResult<Segment> {
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(EngineError::UnterminatedString {
                        src: self.source.to_string(),
                        span: self.token_location().span(),
                    });
                }
                Some('"') => {
                    self.advance();
                    return Ok(Segment::Closed(value));
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.lex_escape_sequence()?);
                }
                Some('$') if self.peek_char_at(1) == Some('$') && self.peek_char_at(2) == Some('{') => {
                    // $${ is a literal ${
                    self.advance();
                    self.advance();
                    self.advance();
                    value.push_str("${");
                }
                Some('$') if self.peek_char_at(1) == Some('{') => {
                    self.advance(); // $
                    self.advance(); // {
                    self.delimiters.push(Delimiter::Interpolation);
                    return Ok(Segment::Interpolation(value));
                }
                Some(ch) => {
                    self.advance();
                    value.push(ch);
                }
            }
        }
    }

    /// Lex a heredoc: `<<MARKER` or the indent-stripping `<<-MARKER`
    fn lex_heredoc(&mut self) -> EngineResult<Token> {
        self.advance(); // <
        self.advance(); // <
        let strip_indent = if self.peek_char() == Some('-') {
            self.advance();
            true
        } else {
            false
        };

        let marker_start = self.position;
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let marker = self.source[marker_start..self.position].to_string();
        if marker.is_empty() {
            return Err(EngineError::unexpected_token(
                self.source,
                &self.current_location(),
                "heredoc marker",
                self.peek_char().map(String::from).unwrap_or_default(),
                "heredocs start with <<MARKER followed by a newline",
            ));
        }
        while matches!(self.peek_char(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
        if self.peek_char() != Some('\n') {
            return Err(EngineError::unexpected_token(
                self.source,
                &self.current_location(),
                "newline after heredoc marker",
                self.peek_char().map(String::from).unwrap_or_default(),
                "heredocs start with <<MARKER followed by a newline",
            ));
        }
        self.advance();

        let mut lines: Vec<String> = Vec::new();
        loop {
            if self.peek_char().is_none() {
                return Err(EngineError::UnterminatedHeredoc {
                    src: self.source.to_string(),
                    span: self.token_location().span(),
                    marker,
                });
            }
            let line_start = self.position;
            while matches!(self.peek_char(), Some(c) if c != '\n') {
                self.advance();
            }
            let line = &self.source[line_start..self.position];
            if line.trim() == marker {
                break;
            }
            lines.push(line.trim_end_matches('\r').to_string());
            // consume the newline; a missing one means EOF and is caught above
            self.advance();
        }

        if strip_indent {
            // indent is counted in chars; leading whitespace may be multi-byte
            let indent = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
                .min()
                .unwrap_or(0);
            for line in &mut lines {
                let cut = line
                    .char_indices()
                    .take_while(|(_, c)| c.is_whitespace())
                    .nth(indent)
                    .map(|(i, _)| i)
                    .unwrap_or_else(|| line.len() - line.trim_start().len());
                *line = line[cut..].to_string();
            }
        }

        let mut body = String::new();
        for line in &lines {
            body.push_str(line);
            body.push('\n');
        }

        Ok(self.make_token(TokenKind::Heredoc(body)))
    }

    /// Lex an escape sequence
    fn lex_escape_sequence(&mut self) -> EngineResult<char> {
        let simple = match self.peek_char() {
            Some('n') => Some('\n'),
            Some('r') => Some('\r'),
            Some('t') => Some('\t'),
            Some('\\') => Some('\\'),
            Some('"') => Some('"'),
            _ => None,
        };
        if let Some(ch) = simple {
            self.advance();
            return Ok(ch);
        }

        match self.peek_char() {
            Some('u') => {
                self.advance();
                let mut hex = String::new();
                let braced = self.peek_char() == Some('{');
                if braced {
                    self.advance();
                    while matches!(self.peek_char(), Some(c) if c.is_ascii_hexdigit()) {
                        hex.push(self.advance().unwrap_or('0'));
                    }
                    if self.peek_char() != Some('}') {
                        return Err(self.escape_error(format!("\\u{{{}", hex), "unterminated unicode escape"));
                    }
                    self.advance();
                } else {
                    for _ in 0..4 {
                        match self.peek_char() {
                            Some(c) if c.is_ascii_hexdigit() => {
                                self.advance();
                                hex.push(c);
                            }
                            _ => {
                                return Err(self.escape_error(
                                    format!("\\u{}", hex),
                                    "expected four hex digits after \\u",
                                ))
                            }
                        }
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.escape_error(format!("\\u{}", hex), "invalid unicode code point"))
            }
            Some(ch) => {
                let seq = format!("\\{}", ch);
                Err(self.escape_error(
                    seq.clone(),
                    format!("'{}' is not a valid escape sequence. Use '\\\\' for literal backslash", seq),
                ))
            }
            None => Err(self.escape_error("\\<eof>", "unexpected end of file in escape sequence")),
        }
    }

    fn escape_error(&self, sequence: impl Into<String>, help: impl Into<String>) -> EngineError {
        EngineError::InvalidEscapeSequence {
            src: self.source.to_string(),
            span: self.current_location().span(),
            sequence: sequence.into(),
            help: help.into(),
        }
    }

    /// Create a token with the current token span
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.token_location())
    }

    /// Get the location for the current token
    fn token_location(&self) -> SourceLocation {
        SourceLocation::new(
            self.file.clone(),
            self.token_start_line,
            self.token_start_column,
            self.token_start,
            self.position - self.token_start,
        )
    }

    /// Get the current location
    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line, self.column, self.position, 1)
    }
}

/// Result of lexing one piece of a quoted string
enum Segment {
    /// Reached the closing quote
    Closed(String),
    /// Reached the start of an interpolation
    Interpolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source, None);
        lexer
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_attribute() {
        assert_eq!(
            lex(r#"region = "us-east-1""#),
            vec![
                TokenKind::Ident("region".into()),
                TokenKind::Eq,
                TokenKind::String("us-east-1".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(
            lex(r#""com.${local.region}.s3""#),
            vec![
                TokenKind::StringStart("com.".into()),
                TokenKind::Ident("local".into()),
                TokenKind::Dot,
                TokenKind::Ident("region".into()),
                TokenKind::StringEnd(".s3".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_escaped_interpolation() {
        assert_eq!(
            lex(r#""$${literal}""#),
            vec![TokenKind::String("${literal}".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_are_dropped() {
        let kinds = lex("x = [\n1,\n2\n]\n");
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn test_newlines_inside_braces_are_kept() {
        let kinds = lex("locals {\na = 1\n}");
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Newline).count(),
            2
        );
    }

    #[test]
    fn test_comments() {
        let kinds = lex("# hash\n// slashes\n/* block */ a = 1");
        assert_eq!(kinds[0], TokenKind::Newline);
        assert!(kinds.contains(&TokenKind::Ident("a".into())));
    }

    #[test]
    fn test_heredoc_strip_indent() {
        let kinds = lex("x = <<-EOT\n    hello\n      world\n    EOT\n");
        assert_eq!(kinds[2], TokenKind::Heredoc("hello\n  world\n".into()));
    }

    #[test]
    fn test_heredoc_strip_multibyte_indent() {
        let kinds = lex("x = <<-EOT\n\u{3000}a\n  b\nEOT\n");
        assert_eq!(kinds[2], TokenKind::Heredoc("a\n b\n".into()));
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("x = \"abc", None);
        assert!(matches!(
            lexer.tokenize(),
            Err(EngineError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_unterminated_heredoc() {
        let mut lexer = Lexer::new("x = <<EOT\nabc\n", None);
        assert!(matches!(
            lexer.tokenize(),
            Err(EngineError::UnterminatedHeredoc { .. })
        ));
    }

    #[test]
    fn test_identifier_with_dash() {
        assert_eq!(lex("no-dash")[0], TokenKind::Ident("no-dash".into()));
    }
}
