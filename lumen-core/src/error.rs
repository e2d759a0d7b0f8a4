use crate::syntax::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilerError {
    #[error("Syntax error: {0}")]
    SyntaxError(String, Option<Span>),

    #[error("Duplicate declaration of '{0}'")]
    DuplicateDeclaration(String, Option<Span>),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String, Option<Span>),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String, Option<Span>),

    #[error("Vertex stage declared without a fragment stage to consume its output")]
    MissingFragmentStage(Option<Span>),

    #[error("Unlinked varying: {0}")]
    UnlinkedVarying(String, Option<Span>),

    #[error("Invalid usage: {0}")]
    InvalidUsage(String, Option<Span>),
}

impl CompilerError {
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::SyntaxError(_, span) => *span,
            Self::DuplicateDeclaration(_, span) => *span,
            Self::UnknownIdentifier(_, span) => *span,
            Self::TypeMismatch(_, span) => *span,
            Self::MissingFragmentStage(span) => *span,
            Self::UnlinkedVarying(_, span) => *span,
            Self::InvalidUsage(_, span) => *span,
        }
    }

    /// Attach `span` unless the error already carries a location.
    pub fn with_span(mut self, span: Span) -> Self {
        let slot = match &mut self {
            Self::SyntaxError(_, s)
            | Self::DuplicateDeclaration(_, s)
            | Self::UnknownIdentifier(_, s)
            | Self::TypeMismatch(_, s)
            | Self::MissingFragmentStage(s)
            | Self::UnlinkedVarying(_, s)
            | Self::InvalidUsage(_, s) => s,
        };
        if slot.is_none() {
            *slot = Some(span);
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;

/// Location combinator for analysis results.
///
/// The innermost context that knows a span attaches it; enclosing contexts
/// calling `at` again leave the original location in place.
pub trait ResultExt<T> {
    fn at(self, span: Span) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn at(self, span: Span) -> Result<T> {
        self.map_err(|e| e.with_span(span))
    }
}

// Bail macros without span

#[macro_export]
macro_rules! bail_type {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::TypeMismatch(format!($($arg)*), None))
    };
}

#[macro_export]
macro_rules! bail_usage {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::InvalidUsage(format!($($arg)*), None))
    };
}

// Bail macros with span

#[macro_export]
macro_rules! bail_syntax_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::SyntaxError(format!($($arg)*), Some($span)))
    };
}

#[macro_export]
macro_rules! bail_type_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::TypeMismatch(format!($($arg)*), Some($span)))
    };
}

#[macro_export]
macro_rules! bail_usage_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::InvalidUsage(format!($($arg)*), Some($span)))
    };
}

#[macro_export]
macro_rules! bail_undef_at {
    ($span:expr, $name:expr) => {
        return Err($crate::error::CompilerError::UnknownIdentifier($name.to_string(), Some($span)))
    };
}
