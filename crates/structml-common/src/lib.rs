pub mod errors;
pub mod manifest;
pub mod span;

pub use errors::{Diagnostic, DiagnosticBag, Severity};
pub use manifest::{ProviderFailure, StructmlManifest};
pub use span::{Position, Span};
