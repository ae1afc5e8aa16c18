use std::fmt;

use thiserror::Error;

use crate::document::ElementType;

/// Represents a byte span within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// 1-based line and column of `start` within `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let mut line = 1;
        let mut column = 1;
        for (idx, ch) in source.char_indices() {
            if idx >= self.start {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Runtime,
}

/// Rich diagnostic information surfaced to whoever supplied the script.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Runtime, message)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(span) = self.span {
            write!(f, " ({}..{})", span.start, span.end)?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            for note in &self.notes {
                writeln!(f, "  note: {note}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the embedding API.
///
/// Variants split into two tiers, see [`ScriptError::is_fatal`]: integration
/// bugs the host must fix, and script-level failures that should be reported
/// back to whoever supplied the script or the document.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Lexer, parser or runtime failure raised while running script code.
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("compile error at {line}:{column}: {}", .diagnostic.message)]
    Compile {
        diagnostic: Diagnostic,
        line: usize,
        column: usize,
    },
    #[error("field `{field}` has unsupported type {element_type}")]
    UnsupportedType {
        field: String,
        element_type: ElementType,
    },
    #[error("`{name}` holds {actual}, which cannot be converted to {requested}")]
    NotAConvertibleType {
        name: String,
        requested: &'static str,
        actual: &'static str,
    },
    #[error("uncaught exception: {0}")]
    Uncaught(String),
    #[error("runtime initialization failed: {0}")]
    RuntimeInit(String),
    #[error("script heap exhausted: budget of {budget} bytes exceeded")]
    OutOfMemory { budget: usize },
    #[error("document backing a proxy was released by the host")]
    DocumentReleased,
    #[error("function `{label}` was compiled by another scope")]
    ForeignFunction { label: String },
    #[error("function `{label}` was compiled before the scope was reset")]
    StaleFunction { label: String },
    #[error("runtime still owns {live} live scope(s)")]
    RuntimeInUse { live: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Wraps a lexer or parser diagnostic with its position in `source`.
    pub fn compile(diagnostic: Diagnostic, source: &str) -> Self {
        let (line, column) = diagnostic
            .span
            .unwrap_or(SourceSpan::new(source.len(), source.len()))
            .line_col(source);
        ScriptError::Compile {
            diagnostic,
            line,
            column,
        }
    }

    /// Fatal errors indicate a host/integration bug rather than a problem
    /// with the script or document being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScriptError::RuntimeInit(_)
                | ScriptError::OutOfMemory { .. }
                | ScriptError::DocumentReleased
                | ScriptError::ForeignFunction { .. }
                | ScriptError::StaleFunction { .. }
                | ScriptError::RuntimeInUse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
