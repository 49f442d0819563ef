use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;
use tracing::Level;

use structml_common::manifest::{self, ManifestError, StructmlManifest};
use structml_common::{Diagnostic, DiagnosticBag, ProviderFailure, Severity};
use structml_runtime::connection::provider_from_manifest;
use structml_runtime::eval::evaluate;
use structml_runtime::{
    Interpreter, MockProvider, Options, Rendered, RuntimeError, Value, VariableStore,
};

/// StructML interpreter: renders prompt-template scripts.
#[derive(Parser)]
#[command(
    name = "structml",
    version,
    about,
    long_about = "StructML interpreter.\n\nExecutes line-oriented prompt-template scripts (@set, @if, @foreach,\n@include, @prompt) and prints the rendered text.\n\nExamples:\n  structml run main.sml                   Render to stdout\n  structml run main.sml -o out.txt        Render to a file\n  structml run main.sml --mock            Render without calling a provider\n  structml run main.sml --set name=Ada    Seed a variable\n  structml check main.sml                 Report diagnostics only\n  structml init my-prompts                Create a new project"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Execute a script and print the rendered output
    Run {
        /// Path to the script
        input: PathBuf,

        /// Write the rendered output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Connection from StructML.toml used for @prompt
        #[arg(long)]
        connection: Option<String>,

        /// Answer @prompt with the mock provider
        #[arg(long, conflicts_with = "connection")]
        mock: bool,

        /// Treat a @foreach over a non-iterable value as fatal
        #[arg(long)]
        strict: bool,

        /// Abort when a completion call fails
        #[arg(long = "abort-on-provider-error")]
        abort_on_provider_error: bool,

        /// Write the final variables to a JSON file
        #[arg(long = "dump-vars", value_name = "FILE")]
        dump_vars: Option<PathBuf>,

        /// Seed a variable before execution (NAME=VALUE, repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Only print errors
        #[arg(short, long)]
        quiet: bool,

        /// Enable debug logging
        #[arg(short, long, conflicts_with = "quiet")]
        verbose: bool,
    },

    /// Execute a script against the mock provider and report diagnostics
    Check {
        /// Path to the script
        input: PathBuf,

        /// Treat a @foreach over a non-iterable value as fatal
        #[arg(long)]
        strict: bool,

        /// Report warnings as errors and fail on them
        #[arg(long = "deny-warnings")]
        deny_warnings: bool,
    },

    /// Create a new StructML project
    Init {
        /// Project directory or '.' for the current directory
        name: String,

        /// Default LLM provider (openai, anthropic, ollama)
        #[arg(short, long, default_value = "openai")]
        provider: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Run {
            input,
            output,
            connection,
            mock,
            strict,
            abort_on_provider_error,
            dump_vars,
            vars,
            quiet,
            verbose,
        } => {
            init_logging(if verbose {
                Level::DEBUG
            } else if quiet {
                Level::ERROR
            } else {
                Level::WARN
            });
            let args = RunArgs {
                connection,
                mock,
                strict,
                abort_on_provider_error,
                dump_vars,
                quiet,
            };
            run(&input, output.as_deref(), &args, &vars)
        }
        Command::Check {
            input,
            strict,
            deny_warnings,
        } => {
            init_logging(Level::ERROR);
            check(&input, strict, deny_warnings)
        }
        Command::Init { name, provider } => match run_init(&name, &provider) {
            Ok(()) => 0,
            Err(msg) => {
                eprintln!("{}", msg);
                1
            }
        },
    };
    process::exit(code);
}

fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// structml run / check
// ============================================================================

struct RunArgs {
    connection: Option<String>,
    mock: bool,
    strict: bool,
    abort_on_provider_error: bool,
    dump_vars: Option<PathBuf>,
    quiet: bool,
}

fn run(input: &Path, output: Option<&Path>, args: &RunArgs, vars: &[String]) -> i32 {
    let manifest = match load_manifest(input) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    let store = match parse_vars(vars) {
        Ok(store) => store,
        Err(msg) => {
            eprintln!("{}", msg);
            return 1;
        }
    };

    let interpreter = if args.mock {
        Interpreter::new(MockProvider)
    } else {
        match provider_from_manifest(manifest.as_ref(), args.connection.as_deref()) {
            Ok(provider) => Interpreter::from_boxed(provider),
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        }
    };

    let mut options = manifest
        .as_ref()
        .map(|m| Options::from_settings(&m.settings))
        .unwrap_or_default();
    options.strict |= args.strict;
    if args.abort_on_provider_error {
        options.provider_failure = ProviderFailure::Abort;
    }

    let rendered = match interpreter.with_options(options).execute_file_with(input, store) {
        Ok(rendered) => rendered,
        Err(e) => {
            report_fatal(&e);
            return 1;
        }
    };

    if !args.quiet {
        print_diagnostics(&rendered.diagnostics);
    }

    let text = rendered_text(&rendered);
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, &text) {
                eprintln!("error: could not write '{}': {}", path.display(), e);
                return 1;
            }
        }
        None => print!("{}", text),
    }

    if let Some(ref path) = args.dump_vars {
        let json = rendered.store.to_json();
        let pretty = format!("{:#}\n", json);
        if let Err(e) = fs::write(path, pretty) {
            eprintln!("error: could not write '{}': {}", path.display(), e);
            return 1;
        }
    }
    0
}

fn check(input: &Path, strict: bool, deny_warnings: bool) -> i32 {
    let mut options = match load_manifest(input) {
        Ok(m) => m
            .map(|m| Options::from_settings(&m.settings))
            .unwrap_or_default(),
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    options.strict |= strict;

    let rendered = match Interpreter::new(MockProvider)
        .with_options(options)
        .execute_file(input)
    {
        Ok(rendered) => rendered,
        Err(e) => {
            report_fatal(&e);
            return 1;
        }
    };

    let bag = collect_diagnostics(rendered.diagnostics, deny_warnings);
    print_diagnostics(bag.diagnostics());
    let errors = bag.diagnostics().iter().filter(|d| d.is_error()).count();
    let warnings = bag
        .diagnostics()
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    eprintln!(
        "{}: {} line(s), {} warning(s), {} error(s)",
        input.display(),
        rendered.output.len(),
        warnings,
        errors
    );
    if bag.has_errors() {
        1
    } else {
        0
    }
}

/// Gather execution diagnostics for `check`, promoting warnings when denied.
fn collect_diagnostics(diagnostics: Vec<Diagnostic>, deny_warnings: bool) -> DiagnosticBag {
    let mut bag = DiagnosticBag::new();
    for diag in diagnostics {
        bag.report(if deny_warnings { diag.deny() } else { diag });
    }
    bag
}

fn rendered_text(rendered: &Rendered) -> String {
    let mut text = rendered.text();
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Manifest for the script, or `None` when there is no `StructML.toml`.
fn load_manifest(input: &Path) -> Result<Option<StructmlManifest>, ManifestError> {
    let abs_input = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    match manifest::find_and_load_manifest(&abs_input) {
        Ok(m) => Ok(Some(m)),
        Err(ManifestError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Build the initial store from `--set NAME=VALUE` flags. A value that is
/// a valid expression is evaluated; anything else is taken as a string.
fn parse_vars(vars: &[String]) -> Result<VariableStore, String> {
    let empty = VariableStore::new();
    let mut store = VariableStore::new();
    for var in vars {
        let Some((name, raw)) = var.split_once('=') else {
            return Err(format!("error: --set expects NAME=VALUE, got '{}'", var));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("error: --set has an empty name in '{}'", var));
        }
        let value = evaluate(raw, &empty).unwrap_or_else(|_| Value::String(raw.to_string()));
        store.set(name, value);
    }
    Ok(store)
}

// ============================================================================
// Diagnostics
// ============================================================================

fn report_fatal(error: &RuntimeError) {
    let mut diag = Diagnostic::error(error.to_string());
    if let Some(span) = error.span() {
        diag = diag.with_span(span.clone());
    }
    print_diagnostics(std::slice::from_ref(&diag));
}

/// Render diagnostics with source excerpts. Files are read once each.
fn print_diagnostics(diagnostics: &[Diagnostic]) {
    let mut sources: HashMap<String, Option<String>> = HashMap::new();
    for diag in diagnostics {
        let source = diag.span.as_ref().and_then(|span| {
            sources
                .entry(span.file.clone())
                .or_insert_with(|| fs::read_to_string(&span.file).ok())
                .clone()
        });
        match source {
            Some(source) => print_diagnostic(diag, &source),
            None => print_plain(diag),
        }
    }
}

fn print_diagnostic(diag: &Diagnostic, source: &str) {
    let Some(ref span) = diag.span else {
        print_plain(diag);
        return;
    };
    let file_name = span.file.as_str();
    let (kind, color) = match diag.severity {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
        Severity::Info => (ReportKind::Advice, Color::Blue),
    };

    let start = span.start.offset as usize;
    let end = (span.end.offset as usize).max(start + 1);

    let mut report = Report::build(kind, file_name, start)
        .with_message(&diag.message)
        .with_label(
            Label::new((file_name, start..end))
                .with_message(&diag.message)
                .with_color(color),
        );

    if let Some(ref suggestion) = diag.suggestion {
        report = report.with_help(suggestion);
    }

    if report
        .finish()
        .eprint((file_name, Source::from(source)))
        .is_err()
    {
        print_plain(diag);
    }
}

fn print_plain(diag: &Diagnostic) {
    eprintln!("{}", diag);
    if let Some(ref suggestion) = diag.suggestion {
        eprintln!("   = help: {}", suggestion);
    }
    eprintln!();
}

// ============================================================================
// structml init
// ============================================================================

fn run_init(name: &str, provider: &str) -> Result<(), String> {
    let (conn_name, api_key_env, default_model, base_url) = match provider {
        "openai" => ("openai", Some("OPENAI_API_KEY"), "gpt-4o-mini", None),
        "anthropic" => (
            "anthropic",
            Some("ANTHROPIC_API_KEY"),
            "claude-3-5-haiku-latest",
            None,
        ),
        "ollama" => ("local", None, "llama3.1", Some("http://localhost:11434")),
        _ => {
            return Err(format!(
                "error: unknown provider '{}'. Valid providers: openai, anthropic, ollama",
                provider
            ));
        }
    };

    let (project_dir, project_name) = if name == "." {
        let cwd = std::env::current_dir()
            .map_err(|e| format!("error: cannot determine current directory: {}", e))?;
        let dir_name = cwd
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        (cwd, dir_name)
    } else {
        (PathBuf::from(name), name.to_string())
    };

    if project_dir.join(manifest::MANIFEST_FILE).exists() {
        return Err(
            "error: StructML project already exists in this directory\n  = help: remove StructML.toml to reinitialize, or use a different directory".to_string()
        );
    }

    fs::create_dir_all(project_dir.join("prompts"))
        .map_err(|e| format!("error: failed to create '{}': {}", project_dir.display(), e))?;

    let toml_content = generate_toml(
        &project_name,
        provider,
        conn_name,
        api_key_env,
        default_model,
        base_url,
    );
    write_file(&project_dir.join(manifest::MANIFEST_FILE), &toml_content)?;
    write_file(&project_dir.join("main.sml"), MAIN_SML)?;
    write_file(&project_dir.join("prompts/hello.txt"), HELLO_PROMPT)?;

    println!("Created StructML project \"{}\"", project_name);
    println!("  StructML.toml");
    println!("  main.sml");
    println!("  prompts/hello.txt");
    println!();
    println!("Get started:");
    if name != "." {
        println!("  cd {}", name);
    }
    match provider {
        "openai" => println!("  export OPENAI_API_KEY=\"your-key\""),
        "anthropic" => println!("  export ANTHROPIC_API_KEY=\"your-key\""),
        "ollama" => println!("  ollama serve"),
        _ => {}
    }
    println!("  structml run main.sml");

    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), String> {
    fs::write(path, content)
        .map_err(|e| format!("error: failed to write '{}': {}", path.display(), e))
}

fn generate_toml(
    project_name: &str,
    provider: &str,
    conn_name: &str,
    api_key_env: Option<&str>,
    default_model: &str,
    base_url: Option<&str>,
) -> String {
    let mut toml = format!(
        "[project]\nname = \"{}\"\nentry = \"main.sml\"\n\n[settings]\nconnection = \"{}\"\n",
        project_name, conn_name
    );

    toml.push_str(&format!("\n[connections.{}]\n", conn_name));
    toml.push_str(&format!("provider = \"{}\"\n", provider));
    if let Some(key_env) = api_key_env {
        toml.push_str(&format!("api_key_env = \"{}\"\n", key_env));
    }
    if let Some(url) = base_url {
        toml.push_str(&format!("base_url = \"{}\"\n", url));
    }
    toml.push_str(&format!("default_model = \"{}\"\n", default_model));

    toml
}

const MAIN_SML: &str = r#"@set language = "French"
@set topics = ["greetings", "numbers"]

@set greeting = @prompt(file="prompts/hello.txt", max_tokens=100)
{greeting}

@foreach topic in topics
@if topic == "numbers"
Count to three in {language}.
@else
Topic: {topic}
@endif
@endforeach
"#;

const HELLO_PROMPT: &str = "Say hello in {language} in one short sentence.\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_flags_evaluate_or_fall_back_to_text() {
        let vars = vec![
            "n=3".to_string(),
            "name=Ada Lovelace".to_string(),
            "xs=[1, 2]".to_string(),
        ];
        let store = parse_vars(&vars).unwrap();
        assert_eq!(store.get("n"), Some(&Value::Int(3)));
        assert_eq!(store.get("name"), Some(&Value::String("Ada Lovelace".into())));
        assert_eq!(
            store.get("xs"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn deny_warnings_turns_warnings_into_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.sml");
        fs::write(&path, "{missing}\n").unwrap();
        let rendered = Interpreter::new(MockProvider).execute_file(&path).unwrap();

        let lenient = collect_diagnostics(rendered.diagnostics.clone(), false);
        assert!(lenient.has_warnings());
        assert!(!lenient.has_errors());

        let denied = collect_diagnostics(rendered.diagnostics, true);
        assert!(denied.has_errors());
        assert_eq!(check(&path, false, false), 0);
        assert_eq!(check(&path, false, true), 1);
    }

    #[test]
    fn set_flag_without_equals_is_rejected() {
        assert!(parse_vars(&["oops".to_string()]).is_err());
        assert!(parse_vars(&["=1".to_string()]).is_err());
    }

    #[test]
    fn generated_manifest_parses() {
        let toml = generate_toml(
            "demo",
            "anthropic",
            "anthropic",
            Some("ANTHROPIC_API_KEY"),
            "claude-3-5-haiku-latest",
            None,
        );
        let m = manifest::parse_manifest(&toml, PathBuf::from(".")).unwrap();
        assert_eq!(m.project.as_ref().map(|p| p.name.as_str()), Some("demo"));
        assert_eq!(m.default_connection().map(|(name, _)| name), Some("anthropic"));
    }

    #[test]
    fn starter_script_runs_with_mock() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::create_dir_all(dir.join("prompts")).unwrap();
        fs::write(dir.join("main.sml"), MAIN_SML).unwrap();
        fs::write(dir.join("prompts/hello.txt"), HELLO_PROMPT).unwrap();

        let rendered = Interpreter::new(MockProvider)
            .execute_file(&dir.join("main.sml"))
            .unwrap();

        assert_eq!(
            rendered.output,
            vec![
                "[mock response to: Say hello in French in one short sentence.]",
                "Topic: greetings",
                "Count to three in French.",
            ]
        );
        assert!(rendered.warnings().next().is_none());
    }
}
