use std::path::PathBuf;

use structml_common::Span;
use structml_syntax::SyntaxError;
use thiserror::Error;

/// Fatal errors that abort an execution.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("unterminated @{directive} block (opened at {span})")]
    UnterminatedBlock { directive: String, span: Span },

    #[error("include not found: {} (at {span})", .path.display())]
    IncludeNotFound { path: PathBuf, span: Span },

    #[error("include cycle: {} (at {span})", .chain.join(" -> "))]
    IncludeCycle { chain: Vec<String>, span: Span },

    #[error("@foreach cannot iterate over {type_name} (at {span})")]
    ForeachType { type_name: String, span: Span },

    #[error("completion failed: {message} (at {span})")]
    Provider { message: String, span: Span },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Source location the error points at, if any.
    pub fn span(&self) -> Option<&Span> {
        match self {
            RuntimeError::UnterminatedBlock { span, .. }
            | RuntimeError::IncludeNotFound { span, .. }
            | RuntimeError::IncludeCycle { span, .. }
            | RuntimeError::ForeachType { span, .. }
            | RuntimeError::Provider { span, .. } => Some(span),
            RuntimeError::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failure of a single value operation, before expression context is known.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Index(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("`{0}` overflows")]
    Overflow(&'static str),
}

/// Expression evaluation failure. Call sites decide whether it is fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("undefined variable '{0}'")]
    Undefined(String),

    #[error("type error in `{expr}`: {message}")]
    Type { expr: String, message: String },

    #[error("index error in `{expr}`: {message}")]
    Index { expr: String, message: String },

    #[error("division by zero in `{expr}`")]
    DivisionByZero { expr: String },

    #[error("overflow in `{expr}`")]
    Overflow { expr: String },
}

impl EvalError {
    /// Attach the failing sub-expression's source text to a value error.
    pub fn at(err: ValueError, expr: &str) -> Self {
        let expr = expr.to_string();
        match err {
            ValueError::Type(message) => EvalError::Type { expr, message },
            ValueError::Index(message) => EvalError::Index { expr, message },
            ValueError::DivisionByZero => EvalError::DivisionByZero { expr },
            ValueError::Overflow(_) => EvalError::Overflow { expr },
        }
    }
}

/// Errors returned by completion providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} HTTP error: {message}")]
    Http { provider: String, message: String },

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("malformed {provider} response: {message}")]
    Response { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display_lists_chain() {
        let e = RuntimeError::IncludeCycle {
            chain: vec!["a.sml".into(), "b.sml".into(), "a.sml".into()],
            span: Span::line("b.sml", 3, 10, 14),
        };
        assert_eq!(
            e.to_string(),
            "include cycle: a.sml -> b.sml -> a.sml (at b.sml:3:1)"
        );
        assert!(e.span().is_some());
    }

    #[test]
    fn eval_error_names_expression() {
        let e = EvalError::at(ValueError::Type("cannot add Int and List".into()), "1 + xs");
        assert_eq!(e.to_string(), "type error in `1 + xs`: cannot add Int and List");
        let e = EvalError::at(ValueError::DivisionByZero, "a / 0");
        assert_eq!(e.to_string(), "division by zero in `a / 0`");
    }
}
