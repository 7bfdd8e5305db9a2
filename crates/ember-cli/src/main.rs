mod common;
mod repl;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ember_vm::{InVars, RuntimeError, RuntimeListener, RuntimeWarning, Runtime};
use owo_colors::OwoColorize;

use common::{
    compile_options, core_registry, fail, init_tracing, load_config, new_compiler, parse_in_var, read_source,
    render_diagnostic, render_runtime_error, with_default_using,
};

#[derive(Parser, Debug)]
#[command(name = "ember", version, about = "Compile and run Ember scripts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile and run a script
    Run {
        file: PathBuf,
        /// Value for an `in` variable, as name=value (repeatable)
        #[arg(long = "in", value_name = "NAME=VALUE")]
        inputs: Vec<String>,
        /// Optimization level (0 disables counted loops); overrides EMBER_OPT_LEVEL
        #[arg(long)]
        opt: Option<u8>,
        /// Extra namespace to import (repeatable)
        #[arg(long = "using", value_name = "NAMESPACE")]
        usings: Vec<String>,
        /// JSON file with runtime capacities
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Report the first diagnostic, if any, without running
    Check {
        file: PathBuf,
        #[arg(long = "using", value_name = "NAMESPACE")]
        usings: Vec<String>,
    },
    /// Print the compiled bytecode
    Disasm {
        file: PathBuf,
        #[arg(long)]
        opt: Option<u8>,
        #[arg(long = "using", value_name = "NAMESPACE")]
        usings: Vec<String>,
        /// Print the compiled script as JSON instead
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Interactive session
    Repl {
        #[arg(long)]
        opt: Option<u8>,
    },
}

/// Script output to stdout, warnings to stderr. Errors are rendered by the
/// caller.
pub struct CliListener;

impl RuntimeListener for CliListener {
    fn on_print(&mut self, text: &str) {
        println!("{}", text);
    }

    fn on_warning(&mut self, warning: &RuntimeWarning) {
        eprintln!(
            "{} {}: {}",
            warning.code.header().yellow().bold(),
            format!("W{}", warning.code.number()).yellow(),
            warning.message.yellow()
        );
    }

    fn on_error(&mut self, _error: &RuntimeError) {}
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        None => repl::start_repl(None),
        Some(Command::Repl { opt }) => repl::start_repl(opt),
        Some(Command::Run {
            file,
            inputs,
            opt,
            usings,
            config,
        }) => run(&file, &inputs, opt, &usings, config.as_ref()),
        Some(Command::Check { file, usings }) => check(&file, &usings),
        Some(Command::Disasm {
            file,
            opt,
            usings,
            json,
        }) => disasm(&file, opt, &usings, json),
    }
}

fn run(file: &Path, raw_inputs: &[String], opt: Option<u8>, usings: &[String], config: Option<&PathBuf>) {
    let mut inputs = InVars::new();
    for raw in raw_inputs {
        match parse_in_var(raw) {
            Ok((name, value)) => {
                inputs.insert(name, value);
            }
            Err(e) => fail(format!("--in {}", e)),
        }
    }
    let config = load_config(config);

    let src = read_source(file);
    let registry = core_registry();
    let script = match new_compiler(&registry, &src).compile(&compile_options(file, opt, usings)) {
        Ok(s) => s,
        Err(e) => {
            render_diagnostic(&src, &e);
            std::process::exit(1);
        }
    };

    let mut runtime = Runtime::with_listener(registry, config, CliListener);
    if let Err(e) = runtime.run_script(&script, &inputs) {
        render_runtime_error(&e);
        std::process::exit(1);
    }
    if !runtime.returned_value().is_null() {
        println!("{} {}", "=>".bright_black(), runtime.returned_value().to_string().bright_blue());
    }
}

fn check(file: &Path, usings: &[String]) {
    let src = read_source(file);
    let registry = core_registry();
    if let Err(e) = new_compiler(&registry, &src).analyze(&with_default_using(usings)) {
        render_diagnostic(&src, &e);
        std::process::exit(1);
    }
    println!("{}: {}", file.display(), "ok".green());
}

fn disasm(file: &Path, opt: Option<u8>, usings: &[String], json: bool) {
    let src = read_source(file);
    let registry = core_registry();
    let script = match new_compiler(&registry, &src).compile(&compile_options(file, opt, usings)) {
        Ok(s) => s,
        Err(e) => {
            render_diagnostic(&src, &e);
            std::process::exit(1);
        }
    };
    if json {
        match serde_json::to_string_pretty(&script) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(format!("Failed to serialize: {}", e)),
        }
    } else {
        print!("{}", script.disassemble());
    }
}
