use crate::span::Span;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A recoverable problem found while executing a script.
///
/// Diagnostics never stop execution; they are collected and handed back to
/// the caller alongside the rendered output.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, message)
    }

    fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            span: None,
            suggestion: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Promote a warning to an error; other severities are unchanged.
    pub fn deny(mut self) -> Self {
        if self.severity == Severity::Warning {
            self.severity = Severity::Error;
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{}: {}", prefix, self.message)?;
        if let Some(ref span) = self.span {
            write!(f, "\n  --> {}", span)?;
        }
        Ok(())
    }
}

/// Convenience collector for diagnostics during execution.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Span) {
        self.report(Diagnostic::warning(message).with_span(span));
    }

    pub fn info(&mut self, message: impl Into<String>, span: Span) {
        self.report(Diagnostic::info(message).with_span(span));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity >= Severity::Warning)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_span() {
        let diag = Diagnostic::warning("undefined variable 'x'")
            .with_span(Span::line("main.sml", 3, 20, 5));
        assert_eq!(
            diag.to_string(),
            "warning: undefined variable 'x'\n  --> main.sml:3:1"
        );
    }

    #[test]
    fn bag_tracks_severity() {
        let mut bag = DiagnosticBag::new();
        bag.info("note", Span::dummy());
        assert!(!bag.has_warnings());
        bag.warning("careful", Span::dummy());
        assert!(bag.has_warnings());
        assert!(!bag.has_errors());
        bag.report(Diagnostic::warning("careful").deny());
        assert!(bag.has_errors());
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn deny_only_promotes_warnings() {
        assert!(Diagnostic::warning("w").deny().is_error());
        assert_eq!(Diagnostic::info("i").deny().severity, Severity::Info);
    }
}
