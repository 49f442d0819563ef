//! Line-by-line execution of a StructML script.

use std::ops::Range;
use std::path::{Path, PathBuf};

use structml_common::manifest::Settings;
use structml_common::{Diagnostic, DiagnosticBag, ProviderFailure, Span};
use structml_syntax::parser::{
    classify, parse_foreach, parse_include, parse_set, DirectiveKind, Family, IncludeTarget,
    LineKind, PromptCall, SetValue,
};
use structml_syntax::{parse_expression, Expr, Script};
use tracing::{debug, info, warn};

use crate::error::{EvalError, Result, RuntimeError};
use crate::eval::{evaluate, Evaluator};
use crate::interpolate::{interpolate, placeholder, Interpolated, Mode};
use crate::matcher::{match_block, match_if_chain};
use crate::prompt::{decode_json, PromptRequest};
use crate::provider::CompletionProvider;
use crate::store::VariableStore;
use crate::value::Value;

// ============================================================================
// Options / Rendered
// ============================================================================

/// Interpreter behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// A `@foreach` over something that is not iterable aborts execution.
    pub strict: bool,
    pub provider_failure: ProviderFailure,
    /// Keep blank script lines as empty output lines.
    pub preserve_blank_lines: bool,
}

impl Options {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            strict: settings.strict,
            provider_failure: settings.provider_failure,
            preserve_blank_lines: settings.preserve_blank_lines,
        }
    }
}

/// Result of a completed execution.
#[derive(Debug)]
pub struct Rendered {
    /// Output lines in emission order.
    pub output: Vec<String>,
    /// Variables as they stand after the last line.
    pub store: VariableStore,
    pub diagnostics: Vec<Diagnostic>,
}

impl Rendered {
    /// Output lines joined with `\n`.
    pub fn text(&self) -> String {
        self.output.join("\n")
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity >= structml_common::Severity::Warning)
    }
}

// ============================================================================
// Interpreter
// ============================================================================

/// Executes scripts against a completion provider.
pub struct Interpreter {
    provider: Box<dyn CompletionProvider>,
    options: Options,
}

impl Interpreter {
    pub fn new(provider: impl CompletionProvider + 'static) -> Self {
        Self::from_boxed(Box::new(provider))
    }

    pub fn from_boxed(provider: Box<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            options: Options::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Load and execute the script at `path` with an empty store.
    pub fn execute_file(&self, path: &Path) -> Result<Rendered> {
        self.execute_file_with(path, VariableStore::new())
    }

    /// Load and execute the script at `path`, starting from `store`.
    pub fn execute_file_with(&self, path: &Path, store: VariableStore) -> Result<Rendered> {
        let script = Script::load(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.execute_script(&script, store)
    }

    /// Execute in-memory source. `path` names the script in diagnostics and
    /// anchors relative includes.
    pub fn execute_source(&self, path: impl Into<PathBuf>, source: &str) -> Result<Rendered> {
        let script = Script::from_source(path, source);
        self.execute_script(&script, VariableStore::new())
    }

    pub fn execute_script(&self, script: &Script, store: VariableStore) -> Result<Rendered> {
        info!(script = %script.path.display(), lines = script.len(), "executing");
        let root = script
            .path
            .canonicalize()
            .unwrap_or_else(|_| script.path.clone());
        let mut execution = Execution {
            interpreter: self,
            store,
            output: Vec::new(),
            diagnostics: DiagnosticBag::new(),
            include_stack: vec![root],
        };
        execution.run(script, 0..script.len())?;
        Ok(Rendered {
            output: execution.output,
            store: execution.store,
            diagnostics: execution.diagnostics.into_diagnostics(),
        })
    }
}

// ============================================================================
// Execution state
// ============================================================================

struct Execution<'i> {
    interpreter: &'i Interpreter,
    store: VariableStore,
    output: Vec<String>,
    diagnostics: DiagnosticBag,
    /// Canonical paths of the scripts currently being executed.
    include_stack: Vec<PathBuf>,
}

impl Execution<'_> {
    fn run(&mut self, script: &Script, range: Range<usize>) -> Result<()> {
        let end = range.end;
        let mut i = range.start;
        while i < end {
            i = self.step(script, i, end)?;
        }
        Ok(())
    }

    /// Execute line `i` and return the index of the next line to run.
    fn step(&mut self, script: &Script, i: usize, end: usize) -> Result<usize> {
        let raw = script.lines[i].text.as_str();
        match classify(raw) {
            LineKind::Blank => {
                if self.interpreter.options.preserve_blank_lines {
                    self.output.push(String::new());
                }
                Ok(i + 1)
            }
            LineKind::Literal(text) => {
                let lead = raw.len() - raw.trim_start().len();
                let rendered = interpolate(text, &self.store, Mode::Text);
                self.report_failures(script, i, lead, &rendered);
                self.output.push(rendered.text);
                Ok(i + 1)
            }
            LineKind::Directive {
                kind,
                keyword,
                payload,
                payload_offset,
            } => {
                debug!(line = script.lines[i].number, directive = keyword, "directive");
                match kind {
                    DirectiveKind::Set => {
                        self.exec_set(script, i, payload, payload_offset)?;
                        Ok(i + 1)
                    }
                    DirectiveKind::Log => {
                        self.exec_log(script, i, payload, payload_offset);
                        Ok(i + 1)
                    }
                    DirectiveKind::Include => {
                        self.exec_include(script, i, payload, payload_offset)?;
                        Ok(i + 1)
                    }
                    DirectiveKind::If => self.exec_if(script, i, end),
                    DirectiveKind::Foreach => {
                        self.exec_foreach(script, i, end, payload, payload_offset)
                    }
                    DirectiveKind::ElseIf
                    | DirectiveKind::Else
                    | DirectiveKind::EndIf
                    | DirectiveKind::EndForeach => {
                        self.warning(format!("stray @{} ignored", keyword), script.span(i));
                        Ok(i + 1)
                    }
                    DirectiveKind::Unknown => {
                        let message = format!("unknown directive @{}", keyword);
                        warn!(at = %script.span(i), "{}", message);
                        self.diagnostics.report(
                            Diagnostic::warning(message)
                                .with_span(script.span(i))
                                .with_suggestion(
                                    "known directives: @set @log @include @if @elseif @else @endif @foreach @endforeach",
                                ),
                        );
                        Ok(i + 1)
                    }
                }
            }
        }
    }

    // ========================================================================
    // @set / @log
    // ========================================================================

    fn exec_set(
        &mut self,
        script: &Script,
        i: usize,
        payload: &str,
        payload_offset: usize,
    ) -> Result<()> {
        let span = script.span(i);
        let interpolated = interpolate(payload, &self.store, Mode::Directive);
        let set = match parse_set(&interpolated.text) {
            Ok(set) => set,
            Err(e) => {
                self.report_failures(script, i, payload_offset, &interpolated);
                self.warning(format!("malformed @set: {}", e), span);
                return Ok(());
            }
        };
        let name = set.name.to_string();

        let source = match set.value {
            SetValue::Prompt(call) => {
                self.report_failures(script, i, payload_offset, &interpolated);
                let value = self.exec_prompt(script, i, &call)?;
                debug!(variable = %name, kind = value.type_name(), "bound completion");
                self.store.set(name, value);
                return Ok(());
            }
            SetValue::Expression(source) => source,
        };

        match evaluate(source, &self.store) {
            Ok(value) => {
                self.report_failures(script, i, payload_offset, &interpolated);
                self.store.set(name, value);
            }
            Err(EvalError::Syntax(_)) => self.set_raw(script, i, payload, payload_offset, name),
            Err(EvalError::Undefined(ref missing)) if is_bare_reference(source, missing) => {
                self.set_raw(script, i, payload, payload_offset, name)
            }
            Err(e) => {
                self.report_failures(script, i, payload_offset, &interpolated);
                self.warning(format!("@set {}: {}", name, e), span);
            }
        }
        Ok(())
    }

    /// Bind the text-interpolated value of a `@set` that is not an expression.
    fn set_raw(
        &mut self,
        script: &Script,
        i: usize,
        payload: &str,
        payload_offset: usize,
        name: String,
    ) {
        let (raw, offset) = match parse_set(payload) {
            Ok(set) => match set.value {
                SetValue::Expression(src) => (src, substring_offset(payload, src)),
                SetValue::Prompt(_) => (payload, 0),
            },
            Err(_) => (payload, 0),
        };
        let text = interpolate(raw, &self.store, Mode::Text);
        self.report_failures(script, i, payload_offset + offset, &text);
        self.diagnostics.info(
            format!("@set {}: value is not an expression; stored as text", name),
            script.span(i),
        );
        self.store.set(name, Value::String(text.text));
    }

    fn exec_log(&mut self, script: &Script, i: usize, payload: &str, payload_offset: usize) {
        if payload.is_empty() {
            self.output.push(String::new());
            return;
        }
        let interpolated = interpolate(payload, &self.store, Mode::Directive);
        let source = interpolated.text.as_str();
        let expr = match parse_expression(source) {
            Ok(expr) => expr,
            Err(_) => {
                let text = interpolate(payload, &self.store, Mode::Text);
                self.report_failures(script, i, payload_offset, &text);
                self.output.push(text.text);
                return;
            }
        };
        self.report_failures(script, i, payload_offset, &interpolated);
        match Evaluator::new(source, &self.store).eval(&expr) {
            Ok(value) => self.output.push(value.display_string()),
            Err(e) => {
                let line = placeholder(source, &e);
                self.warning(format!("@log: {}", e), script.span(i));
                self.output.push(line);
            }
        }
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    fn exec_if(&mut self, script: &Script, i: usize, end: usize) -> Result<usize> {
        let chain = match_if_chain(script, i, end)?;
        for branch in &chain.branches {
            if self.branch_taken(script, branch.header) {
                self.run(script, branch.body.clone())?;
                break;
            }
        }
        Ok(chain.end + 1)
    }

    /// Evaluate the condition on an `@if` / `@elseif` header. `@else` is
    /// always taken; a condition that fails to evaluate is false.
    fn branch_taken(&mut self, script: &Script, header: usize) -> bool {
        let LineKind::Directive {
            kind,
            payload,
            payload_offset,
            ..
        } = classify(&script.lines[header].text)
        else {
            return false;
        };
        if kind == DirectiveKind::Else {
            return true;
        }
        let span = script.span(header);
        if payload.is_empty() {
            self.warning("missing condition; treated as false", span);
            return false;
        }
        let interpolated = interpolate(payload, &self.store, Mode::Directive);
        self.report_failures(script, header, payload_offset, &interpolated);
        if !interpolated.failures.is_empty() {
            self.warning("condition treated as false: interpolation failed", span);
            return false;
        }
        match evaluate(&interpolated.text, &self.store) {
            Ok(value) => value.is_truthy(),
            Err(e) => {
                self.warning(format!("condition treated as false: {}", e), span);
                false
            }
        }
    }

    fn exec_foreach(
        &mut self,
        script: &Script,
        i: usize,
        end: usize,
        payload: &str,
        payload_offset: usize,
    ) -> Result<usize> {
        let block = match_block(script, i, end, Family::Foreach, &[DirectiveKind::EndForeach])?;
        let next = block.terminator + 1;
        let span = script.span(i);

        let interpolated = interpolate(payload, &self.store, Mode::Directive);
        self.report_failures(script, i, payload_offset, &interpolated);
        if let Some(failure) = interpolated.failures.first() {
            self.not_iterable(format!("an invalid collection ({})", failure.error), span)?;
            return Ok(next);
        }
        let each = match parse_foreach(&interpolated.text) {
            Ok(each) => each,
            Err(e) => {
                self.warning(format!("malformed @foreach: {}", e), span);
                return Ok(next);
            }
        };

        let items = match evaluate(each.collection, &self.store) {
            Ok(value) => match value.iter_items() {
                Some(items) => items,
                None => {
                    self.not_iterable(value.type_name().to_string(), span)?;
                    return Ok(next);
                }
            },
            Err(e) => {
                self.not_iterable(format!("an invalid collection ({})", e), span)?;
                return Ok(next);
            }
        };

        debug!(var = each.var, count = items.len(), "iterating");
        let var = each.var.to_string();
        for item in items {
            self.store.set(var.clone(), item);
            self.run(script, block.body.clone())?;
        }
        Ok(next)
    }

    fn not_iterable(&mut self, type_name: String, span: Span) -> Result<()> {
        if self.interpreter.options.strict {
            return Err(RuntimeError::ForeachType { type_name, span });
        }
        self.warning(
            format!("@foreach cannot iterate over {}; body skipped", type_name),
            span,
        );
        Ok(())
    }

    // ========================================================================
    // @include
    // ========================================================================

    fn exec_include(
        &mut self,
        script: &Script,
        i: usize,
        payload: &str,
        payload_offset: usize,
    ) -> Result<()> {
        let span = script.span(i);
        let mode = if payload.starts_with('<') {
            Mode::Text
        } else {
            Mode::Directive
        };
        let interpolated = interpolate(payload, &self.store, mode);
        self.report_failures(script, i, payload_offset, &interpolated);

        let relative = match parse_include(&interpolated.text) {
            Ok(IncludeTarget::Raw(path)) => path.to_string(),
            Ok(IncludeTarget::Expression(source)) => match evaluate(source, &self.store) {
                Ok(Value::String(path)) => path,
                Ok(other) => {
                    self.warning(
                        format!("@include path must be a string, got {}", other.type_name()),
                        span,
                    );
                    return Ok(());
                }
                Err(e) => {
                    self.warning(format!("@include: {}", e), span);
                    return Ok(());
                }
            },
            Err(e) => {
                self.warning(format!("malformed @include: {}", e), span);
                return Ok(());
            }
        };

        let path = script.base_dir().join(&relative);
        if !path.is_file() {
            return Err(RuntimeError::IncludeNotFound { path, span });
        }
        let canonical = path.canonicalize().map_err(|source| RuntimeError::Io {
            path: path.clone(),
            source,
        })?;
        if let Some(first) = self.include_stack.iter().position(|p| *p == canonical) {
            let chain = self.include_stack[first..]
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            return Err(RuntimeError::IncludeCycle { chain, span });
        }

        let included = Script::load(&path).map_err(|source| RuntimeError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), depth = self.include_stack.len(), "including");
        self.include_stack.push(canonical);
        let result = self.run(&included, 0..included.len());
        self.include_stack.pop();
        result
    }

    // ========================================================================
    // @prompt
    // ========================================================================

    fn exec_prompt(&mut self, script: &Script, i: usize, call: &PromptCall) -> Result<Value> {
        let span = script.span(i);
        let text = match self.prompt_text(script, call, &span) {
            Ok(text) => text,
            Err(message) => return Ok(Value::Error(message)),
        };

        let mut request = PromptRequest::new(text);
        request.max_tokens = self.prompt_arg(call, call.max_tokens.as_ref(), &span, |v| match v {
            Value::Int(n) => u32::try_from(*n).ok(),
            _ => None,
        });
        request.temperature =
            self.prompt_arg(call, call.temperature.as_ref(), &span, |v| match v {
                Value::Int(n) => Some(*n as f64),
                Value::Float(f) => Some(*f),
                _ => None,
            });
        request.json_decode = self
            .prompt_arg(call, call.json_decode.as_ref(), &span, |v| Some(v.is_truthy()))
            .unwrap_or(false);
        request.model = self.prompt_arg(call, call.model.as_ref(), &span, |v| {
            v.as_str().map(str::to_string)
        });

        info!(
            line = script.lines[i].number,
            chars = request.text.chars().count(),
            json_decode = request.json_decode,
            "requesting completion"
        );
        let result = match self.interpreter.provider.complete(&request) {
            Ok(result) => result,
            Err(e) => {
                return match self.interpreter.options.provider_failure {
                    ProviderFailure::Abort => Err(RuntimeError::Provider {
                        message: e.to_string(),
                        span,
                    }),
                    ProviderFailure::Bind => {
                        self.warning(format!("completion failed: {}", e), span);
                        Ok(Value::Error(e.to_string()))
                    }
                };
            }
        };
        debug!(
            model = %result.model,
            tokens_in = result.tokens_in,
            tokens_out = result.tokens_out,
            "completion received"
        );

        if !request.json_decode {
            return Ok(Value::String(result.text));
        }
        match decode_json(&result.text) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.warning(
                    format!("json_decode failed ({}); keeping the raw response", e),
                    span,
                );
                Ok(Value::String(result.text))
            }
        }
    }

    /// Resolve the prompt text. `Err` carries the message of the error value
    /// to bind instead.
    fn prompt_text(
        &mut self,
        script: &Script,
        call: &PromptCall,
        span: &Span,
    ) -> std::result::Result<String, String> {
        let Some(file) = &call.file else {
            let Some(inline) = &call.inline else {
                return Err("@prompt has no text".to_string());
            };
            return match Evaluator::new(&call.source, &self.store).eval(inline) {
                Ok(value) => Ok(value.display_string()),
                Err(e) => {
                    self.warning(format!("@prompt: {}", e), span.clone());
                    Err(e.to_string())
                }
            };
        };

        if call.inline.is_some() {
            self.diagnostics.info(
                "@prompt has both file= and inline text; using the file",
                span.clone(),
            );
        }
        let relative = match Evaluator::new(&call.source, &self.store).eval(file) {
            Ok(Value::String(path)) => path,
            Ok(other) => {
                let message = format!("prompt file must be a string, got {}", other.type_name());
                self.warning(message.clone(), span.clone());
                return Err(message);
            }
            Err(e) => {
                self.warning(format!("@prompt file: {}", e), span.clone());
                return Err(e.to_string());
            }
        };

        let path = script.base_dir().join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let rendered = interpolate(content.trim(), &self.store, Mode::Text);
                for failure in &rendered.failures {
                    self.warning(
                        format!("prompt file {}: {}", path.display(), failure.error),
                        span.clone(),
                    );
                }
                Ok(rendered.text)
            }
            Err(e) => {
                let message = format!("prompt file not found: {}", path.display());
                self.warning(format!("{} ({})", message, e), span.clone());
                Err(message)
            }
        }
    }

    /// Evaluate an optional `@prompt` argument and convert it; a value of
    /// the wrong type is dropped with a warning.
    fn prompt_arg<T>(
        &mut self,
        call: &PromptCall,
        expr: Option<&Expr>,
        span: &Span,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Option<T> {
        let expr = expr?;
        let text = call.text_of(expr).to_string();
        match Evaluator::new(&call.source, &self.store).eval(expr) {
            Ok(value) => {
                let converted = convert(&value);
                if converted.is_none() {
                    self.warning(
                        format!("@prompt argument `{}` has unusable {} value", text, value.type_name()),
                        span.clone(),
                    );
                }
                converted
            }
            Err(e) => {
                self.warning(format!("@prompt argument `{}`: {}", text, e), span.clone());
                None
            }
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    fn warning(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        warn!(at = %span, "{}", message);
        self.diagnostics.warning(message, span);
    }

    /// Report interpolation failures of text that starts `base` bytes into
    /// line `i`.
    fn report_failures(&mut self, script: &Script, i: usize, base: usize, result: &Interpolated) {
        let line = script.span(i);
        for failure in &result.failures {
            let start = (base + failure.offset) as u32;
            let span = line.sub(start, start + failure.len as u32);
            self.warning(failure.error.to_string(), span);
        }
    }
}

/// Whether `source` is nothing but a reference to `name`.
fn is_bare_reference(source: &str, name: &str) -> bool {
    parse_expression(source)
        .ok()
        .is_some_and(|expr| expr.as_variable() == Some(name))
}

/// Byte offset of `part` within `whole`, when `part` is a subslice of it.
fn substring_offset(whole: &str, part: &str) -> usize {
    let offset = (part.as_ptr() as usize).wrapping_sub(whole.as_ptr() as usize);
    if offset <= whole.len() {
        offset
    } else {
        0
    }
}

// ============================================================================
// Tests
// ============================================================================
