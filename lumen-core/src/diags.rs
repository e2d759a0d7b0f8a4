//! User-facing rendering of compile errors.

use crate::error::CompilerError;
use serde::Serialize;

/// Structured `(message, line, column)` view of a failed compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    /// 1-based; `None` when the error has no source location.
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl From<&CompilerError> for Diagnostic {
    fn from(err: &CompilerError) -> Self {
        let span = err.span();
        Diagnostic {
            message: err.to_string(),
            line: span.map(|s| s.line),
            column: span.map(|s| s.column),
        }
    }
}

/// `error:line:col: message`, then the offending source line and a caret.
pub fn format_diagnostic(err: &CompilerError, source: &str) -> String {
    let diag = Diagnostic::from(err);
    match (diag.line, diag.column) {
        (Some(line), Some(col)) => {
            let line_text = source.lines().nth(line.saturating_sub(1)).unwrap_or("");
            format!(
                "error:{}:{}: {}\n  {}\n  {}^",
                line,
                col,
                diag.message,
                line_text,
                " ".repeat(col.saturating_sub(1))
            )
        }
        _ => format!("error: {}", diag.message),
    }
}
