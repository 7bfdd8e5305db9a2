use std::io::{self, Write};

use ember_compiler::CompileOptions;
use ember_syntax::error::DiagnosticCode;
use ember_syntax::token::TokenKind;
use ember_vm::{InVars, Runtime, RuntimeConfig};
use owo_colors::OwoColorize;

use crate::common::{core_registry, new_compiler, render_diagnostic, render_runtime_error, resolve_opt_level};
use crate::CliListener;

const BLOCK_KEYWORDS: [&str; 6] = ["if", "while", "for", "foreach", "loop", "function"];

/// Each complete input is compiled and run as its own script; nothing
/// carries over between inputs.
pub fn start_repl(opt: Option<u8>) {
    println!("{}", "Ember REPL. Type :help for help, :quit to exit.".bold().green());

    let registry = core_registry();
    let mut runtime = Runtime::with_listener(registry.clone(), RuntimeConfig::default(), CliListener);
    let mut options = CompileOptions::named("repl").with_optimization_level(resolve_opt_level(opt));
    let mut show_bytecode = false;

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "ember> " } else { "...  > " };
        print!("{}", prompt.cyan());
        let _ = io::stdout().flush();

        let mut line = String::new();
        let n = match io::stdin().read_line(&mut line) {
            Ok(n) => n,
            Err(_) => {
                println!("<input error>");
                break;
            }
        };
        if n == 0 {
            println!("\nGoodbye.");
            break;
        }
        let trimmed = line.trim();

        if buffer.is_empty() && trimmed.starts_with(':') {
            let mut parts = trimmed.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(":quit" | ":q" | ":exit"), _) => {
                    println!("Goodbye.");
                    break;
                }
                (Some(":help" | ":h"), _) => print_help(),
                (Some(":disasm"), _) => {
                    show_bytecode = !show_bytecode;
                    println!("bytecode listing {}", if show_bytecode { "on" } else { "off" });
                }
                (Some(":opt"), Some(level)) => match level.parse() {
                    Ok(level) => {
                        options.optimization_level = level;
                        println!("optimization level {}", level);
                    }
                    Err(_) => println!("{}", "Usage: :opt <level>".red()),
                },
                (Some(":using"), Some(ns)) => {
                    let ns = ns.to_lowercase();
                    if !options.usings.contains(&ns) {
                        options.usings.push(ns);
                    }
                    println!("usings: {}", options.usings.join(", "));
                }
                _ => println!("{}", "Unknown command. Type :help.".red()),
            }
            continue;
        }

        buffer.push_str(&line);
        if !is_complete(&buffer) {
            continue;
        }

        let compiled = new_compiler(&registry, &buffer).compile(&options);
        match compiled {
            Ok(script) => {
                if show_bytecode {
                    print!("{}", script.disassemble().bright_black());
                }
                match runtime.run_script(&script, &InVars::new()) {
                    Ok(()) if !runtime.returned_value().is_null() => {
                        println!("{}", runtime.returned_value().to_string().bright_blue());
                    }
                    Ok(()) => {}
                    Err(e) => render_runtime_error(&e),
                }
            }
            Err(e) => render_diagnostic(&buffer, &e),
        }
        buffer.clear();
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}  {}", ":help".yellow(), "Show this help");
    println!("  {}  {}", ":quit".yellow(), "Exit the REPL");
    println!("  {}  {}", ":disasm".yellow(), "Toggle the bytecode listing");
    println!("  {}  {}", ":opt N".yellow(), "Set the optimization level");
    println!("  {}  {}", ":using NS".yellow(), "Import a namespace for later inputs");
    println!("Blocks continue until their closing 'end'.");
}

/// Whether every block and bracket in `input` is closed. Tokenizer errors
/// other than an open string or comment count as complete so they get
/// reported.
fn is_complete(input: &str) -> bool {
    let tokens = match ember_lexer::tokenize(input) {
        Ok(t) => t,
        Err(e) => {
            return !matches!(
                e.code,
                DiagnosticCode::UnterminatedString | DiagnosticCode::UnterminatedComment
            )
        }
    };
    let mut blocks = 0i32;
    let mut brackets = 0i32;
    for tk in &tokens {
        match tk.kind {
            TokenKind::OpenBracket => brackets += 1,
            TokenKind::ClosedBracket => brackets -= 1,
            TokenKind::Keyword if BLOCK_KEYWORDS.contains(&tk.lexeme.as_str()) => blocks += 1,
            TokenKind::Keyword if tk.lexeme == "end" => blocks -= 1,
            _ => {}
        }
    }
    blocks <= 0 && brackets <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_must_close() {
        assert!(is_complete("print [1]\n"));
        assert!(!is_complete("if [true]\n"));
        assert!(!is_complete("while [true]\n if [false]\n end\n"));
        assert!(is_complete("loop [2]\n print [1]\nend\n"));
        assert!(!is_complete("print [[1] + \n"));
        assert!(!is_complete("print [\"open\n"));
    }
}
