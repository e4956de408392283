//! Parser for HCL configuration files
//!
//! This module implements a recursive descent parser that produces an AST
//! from a token stream, plus the small query helpers the rest of the engine
//! uses to pick blocks and attributes out of a parsed body.

pub mod ast;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::errors::{recover, EngineError, EngineResult};
use crate::lexer::token::{SourceLocation, Token, TokenKind};
use crate::lexer::Lexer;
use ast::*;

/// Maximum parse recursion depth before the parser bails out
const MAX_PARSE_DEPTH: usize = 128;

/// A parsed file together with the text it came from
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Path of the file (may be virtual for in-memory sources)
    pub path: PathBuf,
    /// Source code (needed for error reporting)
    pub source: String,
    /// Parsed AST
    pub ast: File,
}

impl ParsedFile {
    /// Directory containing this file
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }
}

/// Parse configuration text. Any fault inside the lexer or parser is
/// converted into an error instead of unwinding out of the engine.
pub fn parse(text: &str, filename: impl Into<PathBuf>) -> EngineResult<ParsedFile> {
    let path = filename.into();
    recover("parsing configuration", || {
        let mut lexer = Lexer::new(text, Some(path.clone()));
        let tokens = lexer.tokenize()?;
        let mut parser = Parser::new(tokens, text);
        let ast = parser.parse()?;
        Ok(ParsedFile {
            path: path.clone(),
            source: text.to_string(),
            ast,
        })
    })
}

/// Read and parse a configuration file from disk
pub fn parse_file(path: &Path) -> EngineResult<ParsedFile> {
    let source =
        std::fs::read_to_string(path).map_err(|e| EngineError::io_at("read", path, e))?;
    parse(&source, path)
}

/// All top-level blocks of the given type, in declaration order
pub fn blocks_of_type<'a>(body: &'a Body, block_type: &str) -> Vec<&'a Block> {
    body.blocks().filter(|b| b.block_type == block_type).collect()
}

/// The attributes of a block that must not contain nested blocks
pub fn just_attributes<'a>(
    block: &'a Block,
    source: &str,
) -> EngineResult<IndexMap<String, &'a Expr>> {
    if let Some(nested) = block.body.blocks().next() {
        return Err(EngineError::unexpected_token(
            source,
            &nested.location,
            "attribute",
            format!("block '{}'", nested.block_type),
            format!("blocks are not allowed inside a {} block", block.block_type),
        ));
    }
    let mut attributes = IndexMap::new();
    for attr in block.body.attributes() {
        if attributes.insert(attr.name.clone(), &attr.value).is_some() {
            return Err(EngineError::unexpected_token(
                source,
                &attr.location,
                "unique attribute name",
                attr.name.clone(),
                format!("'{}' is defined more than once", attr.name),
            ));
        }
    }
    Ok(attributes)
}

/// Parser for HCL source code
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
    /// Current recursion depth
    depth: usize,
}

impl Parser {
    /// Create a new parser from a token stream
    pub fn new(mut tokens: Vec<Token>, source: impl Into<String>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, SourceLocation::default()));
        }
        Self {
            tokens,
            pos: 0,
            source: source.into(),
            depth: 0,
        }
    }

    /// Parse the entire file
    pub fn parse(&mut self) -> EngineResult<File> {
        let start_loc = self.current_location();
        let body = self.parse_body()?;

        if !self.is_at_end() {
            return Err(self.error_unexpected("end of file"));
        }

        let end_loc = self.current_location();
        Ok(File {
            body,
            location: start_loc.span_to(&end_loc),
        })
    }

    /// Parse a single expression that must consume all input
    pub fn parse_standalone_expr(&mut self) -> EngineResult<Expr> {
        self.skip_newlines();
        let expr = self.parse_expr()?;
        self.skip_newlines();
        if !self.is_at_end() {
            return Err(self.error_unexpected("end of expression"));
        }
        Ok(expr)
    }

    /// Parse body structures until `}` or end of file
    fn parse_body(&mut self) -> EngineResult<Body> {
        let mut structures = Vec::new();

        loop {
            self.skip_newlines();
            if self.is_at_end() || self.check(&TokenKind::RightBrace) {
                break;
            }

            structures.push(self.parse_structure()?);

            // Each structure ends at a newline, a closing brace, or EOF
            if !(self.check(&TokenKind::Newline)
                || self.check(&TokenKind::RightBrace)
                || self.is_at_end())
            {
                return Err(self.error_unexpected("newline"));
            }
        }

        Ok(Body { structures })
    }

    /// Parse an attribute or a block
    fn parse_structure(&mut self) -> EngineResult<Structure> {
        let start_loc = self.current_location();
        let name = self.expect_name("attribute or block name")?;

        if self.check(&TokenKind::Eq) {
            self.advance();
            let value = self.parse_expr()?;
            let end_loc = value.location().clone();
            return Ok(Structure::Attribute(Attribute {
                name,
                value,
                location: start_loc.span_to(&end_loc),
            }));
        }

        let mut labels = Vec::new();
        loop {
            match &self.current().kind {
                TokenKind::String(s) => {
                    labels.push(s.clone());
                    self.advance();
                }
                TokenKind::Ident(s) => {
                    labels.push(s.clone());
                    self.advance();
                }
                TokenKind::StringStart(_) => {
                    return Err(EngineError::unexpected_token(
                        self.source.clone(),
                        &self.current_location(),
                        "block label",
                        "string interpolation",
                        "block labels must be literal strings",
                    ));
                }
                TokenKind::LeftBrace => break,
                _ => return Err(self.error_unexpected("'=' or block body")),
            }
        }

        self.expect(&TokenKind::LeftBrace)?;
        let body = self.nested(Self::parse_body)?;
        self.expect(&TokenKind::RightBrace)?;
        let end_loc = self.previous_location();

        Ok(Structure::Block(Block {
            block_type: name,
            labels,
            body,
            location: start_loc.span_to(&end_loc),
        }))
    }

    /// Parse an expression
    fn parse_expr(&mut self) -> EngineResult<Expr> {
        self.nested(Self::parse_conditional)
    }

    /// Run `parse` one nesting level deeper, failing past MAX_PARSE_DEPTH
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> EngineResult<T>) -> EngineResult<T> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(EngineError::RecursionLimitExceeded {
                src: self.source.clone(),
                span: self.current_location().span(),
                limit: MAX_PARSE_DEPTH,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Parse conditional expression: `a ? b : c`
    fn parse_conditional(&mut self) -> EngineResult<Expr> {
        let start_loc = self.current_location();
        let condition = self.parse_or()?;

        if self.check(&TokenKind::Question) {
            self.advance();
            let then_expr = self.parse_expr()?;
            self.expect(&TokenKind::Colon)?;
            let else_expr = self.parse_expr()?;
            let end_loc = else_expr.location().clone();

            Ok(Expr::Conditional(ConditionalExpr {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                location: start_loc.span_to(&end_loc),
            }))
        } else {
            Ok(condition)
        }
    }

    /// Parse a left-associative chain of binary operators
    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> EngineResult<Expr>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> EngineResult<Expr> {
        let mut left = next(self)?;

        while let Some(op) = op_for(&self.current().kind) {
            let start_loc = left.location().clone();
            self.advance();
            let right = next(self)?;
            let end_loc = right.location().clone();

            left = Expr::Binary(BinaryExpr {
                left: Box::new(left),
                op,
                right: Box::new(right),
                location: start_loc.span_to(&end_loc),
            });
        }

        Ok(left)
    }

    /// Parse OR expression: `a || b`
    fn parse_or(&mut self) -> EngineResult<Expr> {
        self.parse_binary_level(Self::parse_and, |k| match k {
            TokenKind::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    /// Parse AND expression: `a && b`
    fn parse_and(&mut self) -> EngineResult<Expr> {
        self.parse_binary_level(Self::parse_equality, |k| match k {
            TokenKind::And => Some(BinaryOp::And),
            _ => None,
        })
    }

    /// Parse equality expression: `a == b`, `a != b`
    fn parse_equality(&mut self) -> EngineResult<Expr> {
        self.parse_binary_level(Self::parse_comparison, |k| match k {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    /// Parse comparison expression: `a < b`, `a > b`, etc.
    fn parse_comparison(&mut self) -> EngineResult<Expr> {
        self.parse_binary_level(Self::parse_additive, |k| match k {
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::LtEq => Some(BinaryOp::LtEq),
            TokenKind::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    /// Parse additive expression: `a + b`, `a - b`
    fn parse_additive(&mut self) -> EngineResult<Expr> {
        self.parse_binary_level(Self::parse_multiplicative, |k| match k {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    /// Parse multiplicative expression: `a * b`, `a / b`, `a % b`
    fn parse_multiplicative(&mut self) -> EngineResult<Expr> {
        self.parse_binary_level(Self::parse_unary, |k| match k {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    /// Parse unary expression: `!a`, `-a`
    fn parse_unary(&mut self) -> EngineResult<Expr> {
        let op = match &self.current().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        let start_loc = self.current_location();
        self.advance();
        let operand = self.parse_unary()?;
        let end_loc = operand.location().clone();

        Ok(Expr::Unary(UnaryExpr {
            op,
            operand: Box::new(operand),
            location: start_loc.span_to(&end_loc),
        }))
    }

    /// Parse postfix traversal steps: `.name`, `.0`, `[expr]`
    fn parse_postfix(&mut self) -> EngineResult<Expr> {
        let base = self.parse_primary()?;
        let start_loc = base.location().clone();
        let mut steps = Vec::new();

        loop {
            match &self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    match self.current().kind.clone() {
                        TokenKind::Integer(n) => {
                            let loc = self.current_location();
                            self.advance();
                            steps.push(TraversalStep::Index(Expr::Integer(n, loc)));
                        }
                        _ => {
                            let name = self.expect_name("attribute name")?;
                            steps.push(TraversalStep::Attr(name));
                        }
                    }
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RightBracket)?;
                    steps.push(TraversalStep::Index(index));
                }
                _ => break,
            }
        }

        if steps.is_empty() {
            return Ok(base);
        }

        let end_loc = self.previous_location();
        Ok(Expr::Traversal(TraversalExpr {
            base: Box::new(base),
            steps,
            location: start_loc.span_to(&end_loc),
        }))
    }

    /// Parse primary expression
    fn parse_primary(&mut self) -> EngineResult<Expr> {
        let start_loc = self.current_location();

        match self.current().kind.clone() {
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null(start_loc))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true, start_loc))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false, start_loc))
            }
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Integer(n, start_loc))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::Float(n, start_loc))
            }
            TokenKind::String(_) | TokenKind::StringStart(_) => {
                Ok(Expr::Template(self.parse_string_expr()?))
            }
            TokenKind::Heredoc(raw) => {
                self.advance();
                Ok(Expr::Template(self.parse_heredoc(&raw, start_loc)?))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.parse_call(name, start_loc)
                } else {
                    Ok(Expr::Variable(name, start_loc))
                }
            }
            TokenKind::LeftBracket => self.parse_array(),
            TokenKind::LeftBrace => self.parse_object(),
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RightParen)?;
                let end_loc = self.previous_location();
                Ok(Expr::Paren(Box::new(expr), start_loc.span_to(&end_loc)))
            }
            _ => Err(self.error_unexpected("expression")),
        }
    }

    /// Parse function call arguments after the name
    fn parse_call(&mut self, name: String, start_loc: SourceLocation) -> EngineResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();
        let mut expand_final = false;

        while !self.check(&TokenKind::RightParen) {
            args.push(self.parse_expr()?);
            if self.check(&TokenKind::Ellipsis) {
                self.advance();
                expand_final = true;
                break;
            }
            if !self.check(&TokenKind::RightParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }

        self.expect(&TokenKind::RightParen)?;
        let end_loc = self.previous_location();

        Ok(Expr::Call(CallExpr {
            name,
            args,
            expand_final,
            location: start_loc.span_to(&end_loc),
        }))
    }

    /// Parse a string expression (possibly with interpolations)
    fn parse_string_expr(&mut self) -> EngineResult<TemplateExpr> {
        let start_loc = self.current_location();
        let mut parts = Vec::new();

        match self.current().kind.clone() {
            TokenKind::String(s) => {
                parts.push(TemplatePart::Literal(s));
                self.advance();
            }
            TokenKind::StringStart(s) => {
                parts.push(TemplatePart::Literal(s));
                self.advance();
                parts.push(TemplatePart::Interpolation(self.parse_expr()?));

                loop {
                    match self.current().kind.clone() {
                        TokenKind::StringMiddle(s) => {
                            parts.push(TemplatePart::Literal(s));
                            self.advance();
                            parts.push(TemplatePart::Interpolation(self.parse_expr()?));
                        }
                        TokenKind::StringEnd(s) => {
                            parts.push(TemplatePart::Literal(s));
                            self.advance();
                            break;
                        }
                        _ => return Err(self.error_unexpected("string continuation or end")),
                    }
                }
            }
            _ => return Err(self.error_unexpected("string")),
        }

        let end_loc = self.previous_location();
        Ok(TemplateExpr {
            parts,
            location: start_loc.span_to(&end_loc),
        })
    }

    /// Split a heredoc body into literal text and parsed interpolations
    fn parse_heredoc(&self, raw: &str, location: SourceLocation) -> EngineResult<TemplateExpr> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '$' && chars.get(i + 1) == Some(&'$') && chars.get(i + 2) == Some(&'{') {
                literal.push_str("${");
                i += 3;
                continue;
            }
            if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
                let end = find_interpolation_end(&chars, i + 2).ok_or_else(|| {
                    EngineError::UnterminatedString {
                        src: self.source.clone(),
                        span: location.span(),
                    }
                })?;
                let inner: String = chars[i + 2..end].iter().collect();
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                parts.push(TemplatePart::Interpolation(self.parse_fragment(
                    &inner,
                    location.file.clone(),
                )?));
                i = end + 1;
                continue;
            }
            literal.push(chars[i]);
            i += 1;
        }
        parts.push(TemplatePart::Literal(literal));

        Ok(TemplateExpr { parts, location })
    }

    /// Parse an interpolation taken out of a heredoc body
    fn parse_fragment(&self, text: &str, file: Option<PathBuf>) -> EngineResult<Expr> {
        let mut lexer = Lexer::new(text, file);
        let tokens = lexer.tokenize()?;
        let mut parser = Parser::new(tokens, text);
        parser.parse_standalone_expr()
    }

    /// Parse array literal or list for-expression
    fn parse_array(&mut self) -> EngineResult<Expr> {
        let start_loc = self.current_location();
        self.expect(&TokenKind::LeftBracket)?;

        if self.check(&TokenKind::For) {
            return self.parse_for(start_loc, TokenKind::RightBracket);
        }

        let mut elements = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.parse_expr()?);
            if !self.check(&TokenKind::RightBracket) {
                self.expect(&TokenKind::Comma)?;
            }
        }

        self.expect(&TokenKind::RightBracket)?;
        let end_loc = self.previous_location();

        Ok(Expr::Array(ArrayExpr {
            elements,
            location: start_loc.span_to(&end_loc),
        }))
    }

    /// Parse object literal or object for-expression
    fn parse_object(&mut self) -> EngineResult<Expr> {
        let start_loc = self.current_location();
        self.expect(&TokenKind::LeftBrace)?;
        self.skip_separators();

        if self.check(&TokenKind::For)
            && !(self.peek_is(&TokenKind::Eq) || self.peek_is(&TokenKind::Colon))
        {
            return self.parse_for(start_loc, TokenKind::RightBrace);
        }

        let mut items = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key = self.parse_object_key()?;
            if !(self.check(&TokenKind::Eq) || self.check(&TokenKind::Colon)) {
                return Err(self.error_unexpected("'=' or ':'"));
            }
            self.advance();
            let value = self.parse_expr()?;
            items.push(ObjectItem { key, value });

            if !(self.check(&TokenKind::Comma)
                || self.check(&TokenKind::Newline)
                || self.check(&TokenKind::RightBrace))
            {
                return Err(self.error_unexpected("',' or newline"));
            }
            self.skip_separators();
        }

        self.expect(&TokenKind::RightBrace)?;
        let end_loc = self.previous_location();

        Ok(Expr::Object(ObjectExpr {
            items,
            location: start_loc.span_to(&end_loc),
        }))
    }

    /// Parse an object key
    fn parse_object_key(&mut self) -> EngineResult<ObjectKey> {
        let bare = match &self.current().kind {
            TokenKind::Ident(name) => Some(name.clone()),
            other => other.keyword_text().map(String::from),
        };
        if let Some(name) = bare {
            if self.peek_is(&TokenKind::Eq) || self.peek_is(&TokenKind::Colon) {
                self.advance();
                return Ok(ObjectKey::Ident(name));
            }
        }
        Ok(ObjectKey::Expr(self.parse_or()?))
    }

    /// Parse a for-expression after the opening bracket or brace
    fn parse_for(&mut self, start_loc: SourceLocation, close: TokenKind) -> EngineResult<Expr> {
        self.expect(&TokenKind::For)?;

        let first = self.expect_name("loop variable")?;
        let (key_var, value_var) = if self.check(&TokenKind::Comma) {
            self.advance();
            let second = self.expect_name("loop variable")?;
            (Some(first), second)
        } else {
            (None, first)
        };

        self.expect(&TokenKind::In)?;
        let collection = self.parse_expr()?;
        self.expect(&TokenKind::Colon)?;
        self.skip_newlines();

        let object_form = close == TokenKind::RightBrace;
        let (key_expr, value_expr) = if object_form {
            let key = self.parse_expr()?;
            self.expect(&TokenKind::Arrow)?;
            (Some(key), self.parse_expr()?)
        } else {
            (None, self.parse_expr()?)
        };

        let grouping = if object_form && self.check(&TokenKind::Ellipsis) {
            self.advance();
            true
        } else {
            false
        };

        self.skip_newlines();
        let condition = if self.check(&TokenKind::If) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        self.skip_newlines();
        self.expect(&close)?;
        let end_loc = self.previous_location();

        Ok(Expr::For(Box::new(ForExpr {
            key_var,
            value_var,
            collection,
            key_expr,
            value_expr,
            grouping,
            condition,
            location: start_loc.span_to(&end_loc),
        })))
    }

    /// Skip newlines and commas (separators between object items)
    fn skip_separators(&mut self) {
        while matches!(self.current().kind, TokenKind::Newline | TokenKind::Comma) {
            self.advance();
        }
    }

    // Helper methods

    /// Get the current token
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Get the current token's location
    fn current_location(&self) -> SourceLocation {
        self.current().location.clone()
    }

    /// Get the previous token's location
    fn previous_location(&self) -> SourceLocation {
        if self.pos > 0 {
            self.tokens[self.pos - 1].location.clone()
        } else {
            self.current_location()
        }
    }

    /// Check if we're at the end of input
    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    /// Check if current token matches expected kind
    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    /// Check if next token matches expected kind
    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
            .unwrap_or(false)
    }

    /// Advance to next token
    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    /// Skip newline tokens
    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// Expect a specific token kind
    fn expect(&mut self, kind: &TokenKind) -> EngineResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_unexpected(&format!("'{}'", kind)))
        }
    }

    /// Expect an identifier (keywords are accepted as names) and return it
    fn expect_name(&mut self, context: &str) -> EngineResult<String> {
        let name = match &self.current().kind {
            TokenKind::Ident(name) => name.clone(),
            other => match other.keyword_text() {
                Some(text) => text.to_string(),
                None => return Err(self.error_unexpected(context)),
            },
        };
        self.advance();
        Ok(name)
    }

    /// Create an "unexpected token" error
    fn error_unexpected(&self, expected: &str) -> EngineError {
        EngineError::unexpected_token(
            self.source.clone(),
            &self.current_location(),
            expected,
            format!("{}", self.current().kind),
            "check syntax",
        )
    }
}

/// Find the `}` that closes an interpolation starting at `start`,
/// skipping nested braces and quoted strings
fn find_interpolation_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                '\\' => i += 1,
                '"' => in_string = false,
                _ => {}
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' if depth == 0 => return Some(i),
                '}' => depth -= 1,
                _ => {}
            }
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_src(source: &str) -> File {
        parse(source, "test.hcl").unwrap().ast
    }

    fn attr_expr(source: &str) -> Expr {
        let file = parse_src(source);
        let value = file.body.attributes().next().unwrap().value.clone();
        value
    }

    #[test]
    fn test_empty_file() {
        let file = parse_src("");
        assert!(file.body.structures.is_empty());
    }

    #[test]
    fn test_attribute_and_block() {
        let file = parse_src(
            r#"
terraform {
  source = "git::https://example.com/modules.git//vpc?ref=v1.0.0"
}

dependency "vpc" {
  config_path = "../vpc"
}

inputs = { name = "x" }
"#,
        );
        let blocks: Vec<_> = file.body.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block_type, "terraform");
        assert_eq!(blocks[1].labels, vec!["vpc".to_string()]);
        assert!(file.body.attribute("inputs").is_some());
    }

    #[test]
    fn test_blocks_of_type() {
        let file = parse_src("locals {\n a = 1\n}\nlocals {\n b = 2\n}\n");
        assert_eq!(blocks_of_type(&file.body, "locals").len(), 2);
        assert_eq!(blocks_of_type(&file.body, "unit").len(), 0);
    }

    #[test]
    fn test_just_attributes_rejects_nested_blocks() {
        let parsed = parse("locals {\n inner {\n }\n}\n", "test.hcl").unwrap();
        let block = parsed.ast.body.blocks().next().unwrap();
        assert!(just_attributes(block, &parsed.source).is_err());
    }

    #[test]
    fn test_traversal() {
        match attr_expr("x = dependency.vpc.outputs.ids[0]") {
            Expr::Traversal(t) => {
                assert!(matches!(t.base.as_ref(), Expr::Variable(n, _) if n == "dependency"));
                assert_eq!(t.steps.len(), 4);
                assert!(matches!(&t.steps[3], TraversalStep::Index(_)));
            }
            other => panic!("expected traversal, got {:?}", other),
        }
    }

    #[test]
    fn test_function_call_with_expansion() {
        match attr_expr("x = concat(local.lists...)") {
            Expr::Call(call) => {
                assert_eq!(call.name, "concat");
                assert!(call.expand_final);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match attr_expr("x = 1 + 2 * 3") {
            Expr::Binary(b) => {
                assert_eq!(b.op, BinaryOp::Add);
                assert!(matches!(b.right.as_ref(), Expr::Binary(r) if r.op == BinaryOp::Mul));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional() {
        assert!(matches!(
            attr_expr("x = local.prod ? 3 : 1"),
            Expr::Conditional(_)
        ));
    }

    #[test]
    fn test_object_multiline_and_commas() {
        match attr_expr("x = {\n a = 1\n b: 2, c = 3\n}") {
            Expr::Object(o) => assert_eq!(o.items.len(), 3),
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_for_expressions() {
        match attr_expr("x = [for s in local.names : upper(s) if s != \"\"]") {
            Expr::For(f) => {
                assert!(f.key_expr.is_none());
                assert!(f.condition.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
        match attr_expr("x = {for k, v in local.m : k => v...}") {
            Expr::For(f) => {
                assert_eq!(f.key_var.as_deref(), Some("k"));
                assert!(f.grouping);
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_heredoc_interpolation() {
        match attr_expr("x = <<EOF\nregion = \"${local.region}\"\nEOF\n") {
            Expr::Template(t) => {
                assert_eq!(t.parts.len(), 3);
                assert!(matches!(&t.parts[1], TemplatePart::Interpolation(_)));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_local_references() {
        let expr = attr_expr("x = \"${local.a}-${local.b}\" == local.c.d ? upper(local.e) : \"\"");
        let refs: Vec<String> = expr.local_references().into_iter().collect();
        assert_eq!(refs, vec!["a", "b", "c", "e"]);
        assert!(!expr.references_bare_local());
        assert!(attr_expr("x = length(local)").references_bare_local());
    }

    #[test]
    fn test_missing_newline_between_attributes() {
        assert!(parse("a = 1 b = 2", "test.hcl").is_err());
    }

    #[test]
    fn test_single_line_block() {
        let file = parse_src("include \"root\" { path = find_in_parent_folders() }");
        let block = file.body.blocks().next().unwrap();
        assert_eq!(block.body.structures.len(), 1);
    }

    #[test]
    fn test_deeply_nested_blocks_rejected() {
        let depth = 10_000;
        let source = format!("{}{}", "a {\n".repeat(depth), "}\n".repeat(depth));
        match parse(&source, "test.hcl") {
            Err(EngineError::RecursionLimitExceeded { limit, .. }) => {
                assert_eq!(limit, MAX_PARSE_DEPTH)
            }
            other => panic!("expected a recursion limit error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_deeply_nested_lists_rejected() {
        let source = format!("x = {}{}\n", "[".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(
            parse(&source, "test.hcl"),
            Err(EngineError::RecursionLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_nested_blocks_within_limit() {
        let source = format!("{}{}", "a {\n".repeat(20), "}\n".repeat(20));
        assert!(parse(&source, "test.hcl").is_ok());
    }
}
