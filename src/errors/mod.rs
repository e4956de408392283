//! Error types, diagnostics, and result aliases for the engine.
//!
//! All user-facing errors are variants of [`EngineError`], rendered via `miette` diagnostics.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lexer::token::SourceLocation;

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for i in 1..=a_chars.len() {
        curr[0] = i;
        for j in 1..=b_chars.len() {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Find the best "did you mean?" suggestion from a list of candidates
pub fn find_similar(name: &str, candidates: &[String], max_distance: usize) -> Option<String> {
    let name_lower = name.to_lowercase();
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(&name_lower, &candidate.to_lowercase());
        if distance <= max_distance && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.clone());
        }
    }

    best_match
}

/// Generate a help message for an unknown name with suggestions
pub fn suggestion_help(name: &str, available: &[String], what: &str) -> String {
    // Longer names allow more typos
    let max_distance = (name.len() / 3).clamp(2, 3);

    if let Some(suggestion) = find_similar(name, available, max_distance) {
        format!("did you mean '{}'?", suggestion)
    } else if available.is_empty() {
        format!("no {} are defined in this scope", what)
    } else if available.len() <= 5 {
        format!("available {}: {}", what, available.join(", "))
    } else {
        format!("check the {} name for typos", what)
    }
}

/// Main error type for the evaluation engine
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("unexpected token")]
    #[diagnostic(code(E0001), help("{help}"))]
    UnexpectedToken {
        #[source_code]
        src: String,
        #[label("expected {expected}, found: {found}")]
        span: SourceSpan,
        expected: String,
        found: String,
        help: String,
    },

    #[error("unexpected character")]
    #[diagnostic(code(E0001), help("'{ch}' is not valid HCL syntax"))]
    UnexpectedCharacter {
        #[source_code]
        src: String,
        #[label("unexpected: '{ch}'")]
        span: SourceSpan,
        ch: char,
    },

    #[error("unterminated string")]
    #[diagnostic(code(E0004), help("add closing quote at end of string"))]
    UnterminatedString {
        #[source_code]
        src: String,
        #[label("string started here but never closed")]
        span: SourceSpan,
    },

    #[error("unterminated heredoc")]
    #[diagnostic(code(E0004), help("close the heredoc with a line containing only {marker}"))]
    UnterminatedHeredoc {
        #[source_code]
        src: String,
        #[label("heredoc started here")]
        span: SourceSpan,
        marker: String,
    },

    #[error("invalid escape sequence")]
    #[diagnostic(code(E0005), help("{help}"))]
    InvalidEscapeSequence {
        #[source_code]
        src: String,
        #[label("invalid escape: {sequence}")]
        span: SourceSpan,
        sequence: String,
        help: String,
    },

    #[error("unknown variable '{name}'")]
    #[diagnostic(code(E0002), help("{help}"))]
    UndefinedVariable {
        #[source_code]
        src: String,
        #[label("'{name}' is not defined")]
        span: SourceSpan,
        name: String,
        help: String,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    #[diagnostic(code(E0202), help("{help}"))]
    TypeMismatch {
        #[source_code]
        src: String,
        #[label("expected: {expected}, found: {found}")]
        span: SourceSpan,
        expected: String,
        found: String,
        help: String,
    },

    #[error("call to unknown function '{name}'")]
    #[diagnostic(code(E0603), help("{help}"))]
    UnknownFunction {
        #[source_code]
        src: String,
        #[label("'{name}' is not a known function")]
        span: SourceSpan,
        name: String,
        help: String,
    },

    #[error("wrong number of arguments to {function}(): expected {expected}, found {found}")]
    #[diagnostic(code(E0602))]
    ArgumentCount {
        #[source_code]
        src: String,
        #[label("called here")]
        span: SourceSpan,
        function: String,
        expected: String,
        found: usize,
    },

    #[error("error in function {function}(): {message}")]
    #[diagnostic(code(E0601))]
    FunctionFailed {
        #[source_code]
        src: String,
        #[label("call failed")]
        span: SourceSpan,
        function: String,
        message: String,
    },

    #[error("arithmetic overflow")]
    #[diagnostic(code(E0402), help("{operation}"))]
    ArithmeticOverflow {
        #[source_code]
        src: String,
        #[label("overflows a 64-bit integer")]
        span: SourceSpan,
        operation: String,
    },

    #[error("division by zero")]
    #[diagnostic(code(E0402), help("divisor must be non-zero"))]
    DivisionByZero {
        #[source_code]
        src: String,
        #[label("division by zero here")]
        span: SourceSpan,
    },

    #[error("maximum expression nesting depth exceeded")]
    #[diagnostic(code(E0403), help("expression nesting exceeds the maximum depth of {limit}"))]
    RecursionLimitExceeded {
        #[source_code]
        src: String,
        #[label("nesting too deep here")]
        span: SourceSpan,
        limit: usize,
    },

    #[error("{file}: only one locals block is allowed, found {count}")]
    #[diagnostic(code(E0301), help("merge the locals blocks into a single block"))]
    MultipleLocalsBlocks { file: String, count: usize },

    #[error("could not evaluate all locals in {file}: unresolved {names}")]
    #[diagnostic(
        code(E0302),
        help("check these locals for reference cycles: {names}")
    )]
    LocalsConvergence {
        file: String,
        names: String,
        unresolved: Vec<String>,
    },

    #[error("could not find {name} in any parent folder of {start}")]
    #[diagnostic(code(E0101), help("searched at most {max_folders} folders upward"))]
    FileNotFound {
        name: String,
        start: String,
        max_folders: usize,
    },

    #[error("dependency '{label}': config {path} does not exist")]
    #[diagnostic(code(E0501), help("check the config_path of the dependency block"))]
    DependencyNotFound { label: String, path: String },

    #[error("could not parse outputs of {path}: {message}")]
    #[diagnostic(code(E0502))]
    DependencyParse { path: String, message: String },

    #[error("could not decode output '{output}' of {path}: {message}")]
    #[diagnostic(code(E0503))]
    DependencyEncoding {
        path: String,
        output: String,
        message: String,
    },

    #[error("command `{command}` failed in {dir}: {message}")]
    #[diagnostic(code(E0504), help("{stderr}"))]
    CommandFailed {
        command: String,
        dir: String,
        message: String,
        stderr: String,
    },

    #[error("{message}")]
    #[diagnostic(code(E0701))]
    InvalidDeclaration { message: String },

    #[error("invalid stack file {path}: {summary}")]
    #[diagnostic(code(E0702), help("fix all problems listed below"))]
    StackValidation {
        path: String,
        summary: String,
        #[related]
        errors: Vec<EngineError>,
    },

    #[error("failed to generate {item}: {message}")]
    #[diagnostic(code(E0703))]
    Generation { item: String, message: String },

    #[error("cycle detected while discovering stack files: depth {depth} exceeded at {path}")]
    #[diagnostic(code(E0704), help("a stack source must not generate itself"))]
    CycleDetected { path: String, depth: usize },

    #[error("unexpected fault while {context}: {message}")]
    #[diagnostic(code(E0901))]
    RecoveredFault { context: String, message: String },

    #[error("operation cancelled")]
    #[diagnostic(code(E0902))]
    Cancelled,

    #[error("I/O error: {message}")]
    IoError { message: String },
}

impl EngineError {
    /// Create an UnexpectedToken error
    pub fn unexpected_token(
        src: impl Into<String>,
        location: &SourceLocation,
        expected: impl Into<String>,
        found: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        EngineError::UnexpectedToken {
            src: src.into(),
            span: location.span(),
            expected: expected.into(),
            found: found.into(),
            help: help.into(),
        }
    }

    /// Create an UndefinedVariable error
    pub fn undefined_variable(
        src: impl Into<String>,
        location: &SourceLocation,
        name: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        EngineError::UndefinedVariable {
            src: src.into(),
            span: location.span(),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Create a TypeMismatch error
    pub fn type_mismatch(
        src: impl Into<String>,
        location: &SourceLocation,
        expected: impl Into<String>,
        found: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        EngineError::TypeMismatch {
            src: src.into(),
            span: location.span(),
            expected: expected.into(),
            found: found.into(),
            help: help.into(),
        }
    }

    /// Create a FunctionFailed error
    pub fn function_failed(
        src: impl Into<String>,
        location: &SourceLocation,
        function: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::FunctionFailed {
            src: src.into(),
            span: location.span(),
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a Generation error
    pub fn generation(item: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Generation {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidDeclaration error
    pub fn invalid_declaration(message: impl Into<String>) -> Self {
        EngineError::InvalidDeclaration {
            message: message.into(),
        }
    }

    /// Create an IoError
    pub fn io_error(message: impl Into<String>) -> Self {
        EngineError::IoError {
            message: message.into(),
        }
    }

    /// Create an IoError for a failed operation on a path
    pub fn io_at(action: &str, path: &Path, err: std::io::Error) -> Self {
        EngineError::IoError {
            message: format!("failed to {} {}: {}", action, path.display(), err),
        }
    }

    /// Whether this error is an unresolved reference to `local.<name>`
    pub fn is_local_reference(&self) -> bool {
        matches!(self, EngineError::UndefinedVariable { name, .. } if name.starts_with("local."))
    }
}

/// Run a call that crosses the parser/decoder boundary, converting any panic
/// raised inside it into a [`EngineError::RecoveredFault`].
pub fn recover<T>(context: &str, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            tracing::warn!(context, %message, "recovered fault");
            Err(EngineError::RecoveredFault {
                context: context.to_string(),
                message,
            })
        }
    }
}

/// Display a path for error messages
pub fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Collection of errors, reported together instead of failing on the first one
#[derive(Debug, Default)]
pub struct ErrorCollection {
    errors: Vec<EngineError>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: EngineError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    /// Fold the collected errors into a single stack validation error
    pub fn into_stack_result(self, path: &Path) -> EngineResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let summary = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(EngineError::StackValidation {
            path: display_path(path),
            summary,
            errors: self.errors,
        })
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::io_error(err.to_string())
    }
}
