use thiserror::Error;

/// A lexing or parsing failure inside a directive payload or expression.
///
/// `offset` is the byte offset within the text handed to the parser.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (column {})", .offset + 1)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyntaxError>;
