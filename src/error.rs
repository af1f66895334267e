use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Result alias for the evaluator and built-ins.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    #[error("type error")]
    Type,
    #[error("division by zero")]
    DivisionByZero,
    #[error("undefined variable")]
    UndefinedVariable,
    #[error("arity mismatch")]
    ArityMismatch,
    #[error("index out of bounds")]
    IndexOutOfBounds,
    #[error("unknown method")]
    UnknownMethod,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message} [line {line}:{column}]")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    /// Attaches a source position unless one is already set. Built-ins
    /// construct errors without positions; the call site fills them in.
    pub fn at(mut self, line: usize, column: usize) -> Self {
        if self.line == 0 {
            self.line = line;
            self.column = column;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Runtime,
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Lexical => write!(f, "lexical error"),
            DiagnosticKind::Syntax => write!(f, "syntax error"),
            DiagnosticKind::Runtime => write!(f, "runtime error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[line {}:{}] {}: {}",
            self.line, self.column, self.kind, self.message
        )
    }
}

/// Collector threaded through scan/parse/evaluate instead of global
/// "had error" flags. Empty means the unit succeeded.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lexical(&mut self, message: impl Into<String>, line: usize, column: usize) {
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Lexical,
            message: message.into(),
            line,
            column,
        });
    }

    pub fn syntax(&mut self, message: impl Into<String>, line: usize, column: usize) {
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Syntax,
            message: message.into(),
            line,
            column,
        });
    }

    pub fn runtime(&mut self, err: RuntimeError) {
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Runtime,
            message: format!("{}: {}", err.kind, err.message),
            line: err.line,
            column: err.column,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.entries.iter().any(|d| d.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_rendering() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.syntax("Expect ';' after expression", 3, 14);

        let rendered = diagnostics.to_string();
        assert_eq!(
            rendered,
            "[line 3:14] syntax error: Expect ';' after expression\n"
        );
    }

    #[test]
    fn test_runtime_error_position_fill() {
        let err = RuntimeError::new(RuntimeErrorKind::Type, "len() takes a string or list");
        let err = err.at(2, 5);
        assert_eq!((err.line, err.column), (2, 5));

        // An already-positioned error keeps its original location.
        let err = err.at(9, 9);
        assert_eq!((err.line, err.column), (2, 5));
    }

    #[test]
    fn test_collector_kinds() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.lexical("Unexpected character '@'", 1, 1);
        diagnostics.runtime(RuntimeError::new(
            RuntimeErrorKind::DivisionByZero,
            "Division by zero",
        ));

        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.has(DiagnosticKind::Lexical));
        assert!(diagnostics.has(DiagnosticKind::Runtime));
        assert!(!diagnostics.has(DiagnosticKind::Syntax));
    }
}
