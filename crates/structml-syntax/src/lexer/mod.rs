pub mod cursor;
pub mod token;

pub(crate) mod scanner;

pub use scanner::Lexer;
pub use token::{Token, TokenKind};
