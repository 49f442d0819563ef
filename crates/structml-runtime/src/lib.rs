pub mod connection;
pub mod error;
pub mod eval;
pub mod executor;
pub mod interpolate;
pub mod matcher;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod store;
pub mod value;

pub use error::{EvalError, ProviderError, RuntimeError};
pub use executor::{Interpreter, Options, Rendered};
pub use prompt::{CompletionResult, PromptRequest};
pub use provider::{CompletionProvider, MockProvider};
pub use store::VariableStore;
pub use value::Value;

/// Execute the script at `path` with the mock provider and default options.
pub fn run_file(path: &std::path::Path) -> error::Result<Rendered> {
    Interpreter::new(MockProvider).execute_file(path)
}
