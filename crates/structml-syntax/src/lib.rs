pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod script;
pub mod template;

pub use ast::Expr;
pub use error::SyntaxError;
pub use parser::parse_expression;
pub use script::{Line, Script};
pub use template::Segment;
