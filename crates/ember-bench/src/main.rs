use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ember_bytecode::CompiledScript;
use ember_compiler::{CompileOptions, Compiler};
use ember_host::{stdlib, HostTypeRegistry};
use ember_vm::{InVars, Runtime, RuntimeConfig, RuntimeError, RuntimeListener};

#[derive(Parser, Debug)]
#[command(name = "ember-bench", about = "Run Ember benchmarks")]
struct Cli {
    /// Specific test(s) to run (by name, e.g. fibonacci). If omitted, runs all discovered scripts.
    #[arg(short = 't', long = "test", action = ArgAction::Append)]
    tests: Vec<String>,

    /// Iterations per test and optimization level (measured)
    #[arg(short = 'n', long = "iterations", default_value_t = 10)]
    iterations: u32,

    /// Warmup iterations (not measured)
    #[arg(short = 'w', long = "warmup", default_value_t = 2)]
    warmup: u32,

    /// Optimization levels to measure
    #[arg(long = "opt", action = ArgAction::Append, default_values_t = [0u8, 1u8])]
    levels: Vec<u8>,

    /// Scripts directory; default: benchmark/scripts
    #[arg(long = "dir")]
    dir: Option<PathBuf>,

    /// Output JSON file path; default: benchmark/results/<timestamp>.json
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Show script output while measuring
    #[arg(long = "verbose", default_value_t = false)]
    verbose: bool,

    /// List discovered tests and exit
    #[arg(long = "list", default_value_t = false)]
    list: bool,
}

#[derive(Debug, Serialize)]
struct BenchResult {
    name: String,
    optimization_level: u8,
    iterations: u32,
    bytecode_bytes: usize,
    avg_compile_ms: f64,
    avg_exec_ms: f64,
    min_exec_ms: f64,
    max_exec_ms: f64,
}

#[derive(Debug, Serialize)]
struct OutputDoc {
    timestamp: String,
    ember_version: String,
    benchmarks: Vec<BenchResult>,
}

#[derive(Debug, Clone)]
struct ScriptCase {
    name: String,
    path: PathBuf,
}

/// Swallows script output unless `--verbose`.
struct BenchListener {
    verbose: bool,
}

impl RuntimeListener for BenchListener {
    fn on_print(&mut self, text: &str) {
        if self.verbose {
            println!("{}", text);
        }
    }

    fn on_error(&mut self, error: &RuntimeError) {
        eprintln!("{}", error);
    }
}

fn workspace_root() -> PathBuf {
    // crates/ember-bench -> crates -> root
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or(manifest)
}

fn discover_scripts(dir: &Path) -> Vec<ScriptCase> {
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for e in entries.flatten() {
            let p = e.path();
            if p.extension().and_then(|s| s.to_str()) == Some("ember") {
                let name = p.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
                out.push(ScriptCase { name, path: p });
            }
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

fn exit_with(message: impl std::fmt::Display, code: i32) -> ! {
    eprintln!("{}", message);
    std::process::exit(code);
}

fn compile(registry: &Arc<HostTypeRegistry>, case: &ScriptCase, src: &str, level: u8) -> Result<CompiledScript, String> {
    let mut compiler = Compiler::new(Arc::clone(registry));
    compiler.set_src(src);
    compiler
        .compile(&CompileOptions::named(&case.name).with_optimization_level(level))
        .map_err(|e| format!("{}: {}", case.name, e))
}

fn measure_script(
    registry: &Arc<HostTypeRegistry>,
    case: &ScriptCase,
    src: &str,
    level: u8,
    cli: &Cli,
) -> Result<BenchResult, String> {
    let mut runtime = Runtime::with_listener(
        Arc::clone(registry),
        RuntimeConfig::default(),
        BenchListener { verbose: cli.verbose },
    );
    let inputs = InVars::new();

    let script = compile(registry, case, src, level)?;
    for _ in 0..cli.warmup {
        runtime
            .run_script(&script, &inputs)
            .map_err(|e| format!("{}: {}", case.name, e))?;
    }

    let mut compiles = Vec::with_capacity(cli.iterations as usize);
    let mut execs = Vec::with_capacity(cli.iterations as usize);
    for _ in 0..cli.iterations {
        let t = Instant::now();
        let script = compile(registry, case, src, level)?;
        compiles.push(dur_ms(t.elapsed()));

        let t = Instant::now();
        runtime
            .run_script(&script, &inputs)
            .map_err(|e| format!("{}: {}", case.name, e))?;
        execs.push(dur_ms(t.elapsed()));
    }

    let (avg_c, _, _) = stats(&compiles);
    let (avg_e, min_e, max_e) = stats(&execs);
    debug!(script = %case.name, level, "measured");
    Ok(BenchResult {
        name: case.name.clone(),
        optimization_level: level,
        iterations: cli.iterations,
        bytecode_bytes: script.bytecode.len(),
        avg_compile_ms: avg_c,
        avg_exec_ms: avg_e,
        min_exec_ms: min_e,
        max_exec_ms: max_e,
    })
}

fn dur_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn stats(vals: &[f64]) -> (f64, f64, f64) {
    let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg = if vals.is_empty() {
        0.0
    } else {
        vals.iter().sum::<f64>() / (vals.len() as f64)
    };
    (avg, min, max)
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let root = workspace_root();
    let dir = cli.dir.clone().unwrap_or_else(|| root.join("benchmark/scripts"));
    let mut scripts = discover_scripts(&dir);

    if cli.list {
        println!("Discovered tests:");
        for s in &scripts {
            println!("- {} ({})", s.name, s.path.display());
        }
        return;
    }

    if !cli.tests.is_empty() {
        let wanted: std::collections::HashSet<_> = cli.tests.iter().map(|s| s.to_lowercase()).collect();
        scripts.retain(|s| wanted.contains(&s.name.to_lowercase()));
        if scripts.is_empty() {
            exit_with("No matching tests. Use --list to see available.", 2);
        }
    }

    if scripts.is_empty() {
        exit_with(format!("No .ember scripts found in {}.", dir.display()), 2);
    }

    let registry = match stdlib::core_registry() {
        Ok(r) => Arc::new(r),
        Err(e) => exit_with(format!("Failed to build the core library: {}", e), 1),
    };

    let mut results = Vec::new();
    for case in &scripts {
        let src = match fs::read_to_string(&case.path) {
            Ok(s) => s,
            Err(e) => exit_with(format!("Failed to read {}: {}", case.path.display(), e), 1),
        };
        for &level in &cli.levels {
            let result = match measure_script(&registry, case, &src, level, &cli) {
                Ok(r) => r,
                Err(e) => exit_with(e, 1),
            };
            println!(
                "{:>12} -O{}: exec avg={:.3}ms min={:.3}ms max={:.3}ms | compile={:.3}ms | {} bytes",
                result.name,
                level,
                result.avg_exec_ms,
                result.min_exec_ms,
                result.max_exec_ms,
                result.avg_compile_ms,
                result.bytecode_bytes
            );
            results.push(result);
        }
    }

    let out_path = match cli.output.clone() {
        Some(p) => p,
        None => {
            // Windows-safe filename timestamp
            let ts_file = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%SZ").to_string();
            root.join("benchmark/results").join(format!("{}.json", ts_file))
        }
    };

    let doc = OutputDoc {
        timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ember_version: env!("CARGO_PKG_VERSION").to_string(),
        benchmarks: results,
    };

    let json = match serde_json::to_string_pretty(&doc) {
        Ok(j) => j,
        Err(e) => exit_with(format!("Failed to serialize results: {}", e), 1),
    };
    if let Some(parent) = out_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            exit_with(format!("Failed to create {}: {}", parent.display(), e), 1);
        }
    }
    if let Err(e) = fs::write(&out_path, json) {
        exit_with(format!("Failed to write {}: {}", out_path.display(), e), 1);
    }

    info!(path = %out_path.display(), "saved results");
    println!("\nSaved results to {}", out_path.display());
}
