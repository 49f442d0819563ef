use structml_syntax::template::{segment, Segment};

use crate::error::EvalError;
use crate::eval::evaluate;
use crate::store::VariableStore;
use crate::value::{escape, quote, Value};

/// How substituted values are written back into the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Literal lines and prompt files: display strings.
    Text,
    /// Directive payloads: expression-literal form outside string literals,
    /// escaped display text inside them.
    Directive,
}

/// A `{...}` span that could not be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanFailure {
    /// Text between the braces.
    pub inner: String,
    /// Byte offset of the opening `{` in the interpolated text.
    pub offset: usize,
    /// Length of the span including braces.
    pub len: usize,
    pub error: EvalError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub text: String,
    pub failures: Vec<SpanFailure>,
}

/// Replace every `{expr}` span in `text` with its evaluated value.
///
/// Failed spans become `{UNDEFINED_VAR:name}` or `{ERROR:span}` and are
/// reported in [`Interpolated::failures`]; interpolation itself never fails.
pub fn interpolate(text: &str, store: &VariableStore, mode: Mode) -> Interpolated {
    let segments = segment(text, mode == Mode::Directive);
    let mut out = Interpolated {
        text: String::with_capacity(text.len()),
        failures: Vec::new(),
    };
    render(&segments, store, mode, &mut out);
    out
}

fn render(segments: &[Segment<'_>], store: &VariableStore, mode: Mode, out: &mut Interpolated) {
    for seg in segments {
        match seg {
            Segment::Literal(s) => out.text.push_str(s),
            Segment::Braced { parts, .. } => {
                out.text.push('{');
                render(parts, store, mode, out);
                out.text.push('}');
            }
            Segment::Span {
                inner,
                start,
                quoted,
            } => {
                let rendered = match evaluate(inner.trim(), store) {
                    Ok(value) => write_value(&value, mode, *quoted),
                    Err(error) => {
                        let placeholder = placeholder(inner, &error);
                        out.failures.push(SpanFailure {
                            inner: inner.to_string(),
                            offset: *start,
                            len: inner.len() + 2,
                            error,
                        });
                        write_value(&Value::String(placeholder), mode, *quoted)
                    }
                };
                out.text.push_str(&rendered);
            }
        }
    }
}

fn write_value(value: &Value, mode: Mode, quoted: Option<char>) -> String {
    match (mode, quoted) {
        (Mode::Text, _) => value.display_string(),
        (Mode::Directive, Some(q)) => escape(&value.display_string(), q),
        (Mode::Directive, None) => value.to_literal(),
    }
}

/// Placeholder text left in place of a span that failed to evaluate.
pub fn placeholder(inner: &str, error: &EvalError) -> String {
    match error {
        EvalError::Undefined(name) => format!("{{UNDEFINED_VAR:{}}}", name),
        _ => format!("{{ERROR:{}}}", inner.trim()),
    }
}
