use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_compiler::{CompileOptions, Compiler, DEFAULT_USING};
use ember_host::{stdlib, HostTypeRegistry, Value};
use ember_syntax::error::{line_col, Diagnostic, DiagnosticCode};
use ember_vm::{RuntimeConfig, RuntimeError, RuntimeErrorCode};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the default optimization level.
pub const OPT_LEVEL_VAR: &str = "EMBER_OPT_LEVEL";

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", "error".red().bold(), message.to_string().red());
    std::process::exit(1);
}

pub fn read_source(path: &Path) -> String {
    if !path.exists() {
        fail(format!("File not found: {}", path.display()));
    }
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => fail(format!("Failed to read {}: {}", path.display(), e)),
    }
}

pub fn core_registry() -> Arc<HostTypeRegistry> {
    match stdlib::core_registry() {
        Ok(r) => Arc::new(r),
        Err(e) => fail(format!("Failed to build the core library: {}", e)),
    }
}

/// `--opt` wins, then `EMBER_OPT_LEVEL`, then the compiler default.
pub fn resolve_opt_level(flag: Option<u8>) -> u8 {
    if let Some(level) = flag {
        return level;
    }
    match std::env::var(OPT_LEVEL_VAR) {
        Ok(raw) => match raw.trim().parse() {
            Ok(level) => level,
            Err(_) => fail(format!("{} must be a small number, got '{}'", OPT_LEVEL_VAR, raw)),
        },
        Err(_) => CompileOptions::default().optimization_level,
    }
}

/// The default namespace followed by any extra `--using` namespaces.
pub fn with_default_using(extra: &[String]) -> Vec<String> {
    let mut usings = vec![DEFAULT_USING.to_string()];
    for ns in extra {
        let ns = ns.to_lowercase();
        if !usings.contains(&ns) {
            usings.push(ns);
        }
    }
    usings
}

pub fn compile_options(path: &Path, opt: Option<u8>, usings: &[String]) -> CompileOptions {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("script")
        .to_string();
    CompileOptions {
        name,
        optimization_level: resolve_opt_level(opt),
        usings: with_default_using(usings),
        ..CompileOptions::default()
    }
}

pub fn new_compiler(registry: &Arc<HostTypeRegistry>, source: &str) -> Compiler {
    let mut compiler = Compiler::new(Arc::clone(registry));
    compiler.set_src(source);
    compiler
}

pub fn load_config(path: Option<&PathBuf>) -> RuntimeConfig {
    let Some(path) = path else {
        return RuntimeConfig::default();
    };
    let text = read_source(path);
    match serde_json::from_str(&text) {
        Ok(config) => config,
        Err(e) => fail(format!("Invalid config {}: {}", path.display(), e)),
    }
}

/// Parse `name=value`. Numbers, `true`, `false` and `null` keep their type;
/// anything else (optionally quoted) is a string.
pub fn parse_in_var(raw: &str) -> Result<(String, Value), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected name=value, got '{}'", raw));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", raw));
    }
    Ok((name.to_lowercase(), parse_value(value.trim())))
}

fn parse_value(text: &str) -> Value {
    match text {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = text.parse::<f64>() {
                return Value::Number(n);
            }
            let unquoted = text
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(text);
            Value::Str(unquoted.to_string())
        }
    }
}

pub fn render_diagnostic(source: &str, err: &Diagnostic) {
    eprintln!(
        "{} {}: {}",
        err.header.red().bold(),
        format!("E{}", err.code.number()).red(),
        err.message.red()
    );
    let (line, col) = line_col(source, err.offset);
    eprintln!("  --> line {}, column {}", line, col);
    if let Some(src_line) = source.lines().nth(line - 1) {
        let line_num_str = format!("{:3} | ", line);
        eprintln!("     |");
        eprintln!("{}{}", line_num_str.bright_black(), src_line);
        let mut marker = " ".repeat(line_num_str.len() + col.saturating_sub(1));
        marker.push('^');
        eprintln!("{}{}", marker.red(), " error here".red());
        eprintln!("     |");
    }
    provide_diagnostic_hint(err.code);
}

pub fn render_runtime_error(err: &RuntimeError) {
    eprintln!(
        "{} {}: {}",
        err.header.red().bold(),
        format!("E{}", err.code.number()).red(),
        err.message.red()
    );
    provide_runtime_hint(err.code);
}

fn hint(text: &str, example: &str) {
    eprintln!("{}", format!("Help: {}", text).yellow());
    if !example.is_empty() {
        eprintln!("    {}", example.bright_black());
    }
}

fn provide_diagnostic_hint(code: DiagnosticCode) {
    match code {
        DiagnosticCode::UnterminatedString => hint("Strings are closed with a matching '\"'.", ""),
        DiagnosticCode::UseBeforeDeclaration => {
            hint("Declare variables with 'var' before using them.", "var [count] = [0]")
        }
        DiagnosticCode::InvalidOperands => hint(
            "Operators group from the right without precedence; bracket sub-expressions.",
            "var [x] = [[a] * [2]] + [1]",
        ),
        DiagnosticCode::InvalidMember | DiagnosticCode::AmbiguousMatch => {
            hint("Check the member name and the 'using' lines that bring it into scope.", "using math")
        }
        DiagnosticCode::BreakOutsideLoop | DiagnosticCode::ContinueOutsideLoop => hint(
            "'break' and 'continue' only work inside while, for, foreach and loop.",
            "",
        ),
        DiagnosticCode::FunctionsNotSupported => hint("Scripts cannot declare functions; the host provides them.", ""),
        DiagnosticCode::UnexpectedEnd => hint("Every block needs a matching 'end'.", "if [x] > [1]\n      print [x]\n    end"),
        _ => {}
    }
}

fn provide_runtime_hint(code: RuntimeErrorCode) {
    match code {
        RuntimeErrorCode::InVarTypeError => hint("Pass the input with --in name=value using the declared type.", ""),
        RuntimeErrorCode::StackOverflow | RuntimeErrorCode::ReferenceTableFull => {
            hint("Raise the capacity with --config <file.json>.", "{ \"stack_capacity\": 1024 }")
        }
        _ => {}
    }
}
