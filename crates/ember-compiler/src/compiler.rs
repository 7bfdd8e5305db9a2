//! Compiler facade: source text in, compiled script out.

use std::collections::BTreeMap;
use std::sync::Arc;

use ember_analyzer::{Analysis, Analyzer};
use ember_bytecode::{CompiledScript, InVarSlot};
use ember_host::HostTypeRegistry;
use ember_parser::Parser;
use ember_syntax::ast::Script;
use ember_syntax::error::{error_at, DiagnosticCode, Result};
use tracing::debug;

use crate::builder::ScriptBuilder;
use crate::CompileOptions;

/// Runs the four compiler stages over the current source, stopping at the
/// first diagnostic.
pub struct Compiler {
    registry: Arc<HostTypeRegistry>,
    source: String,
}

impl Compiler {
    pub fn new(registry: Arc<HostTypeRegistry>) -> Self {
        Self {
            registry,
            source: String::new(),
        }
    }

    pub fn set_src(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn registry(&self) -> &Arc<HostTypeRegistry> {
        &self.registry
    }

    fn front_end(&self, usings: &[String]) -> Result<(Script, Analysis)> {
        let tokens = ember_lexer::tokenize(&self.source)?;
        debug!(tokens = tokens.len(), "tokenized");
        let mut script = Parser::new(tokens).parse_script()?;
        debug!(statements = script.statements.len(), "parsed");
        let analysis = Analyzer::new(&self.registry, usings).analyze(&mut script)?;
        Ok((script, analysis))
    }

    /// Check the source without generating code.
    pub fn analyze(&self, usings: &[String]) -> Result<()> {
        self.front_end(usings).map(|_| ())
    }

    pub fn compile(&self, options: &CompileOptions) -> Result<CompiledScript> {
        let (script, analysis) = self.front_end(&options.usings)?;
        let built = ScriptBuilder::new(&self.registry, &analysis, options.optimization_level).build(&script)?;

        let mut in_vars = BTreeMap::new();
        for v in &analysis.in_vars {
            let Some(&slot) = built.slots.get(&v.name) else {
                return error_at(
                    DiagnosticCode::UnsupportedConstruct,
                    0,
                    format!("input variable '{}' has no slot", v.name),
                );
            };
            in_vars.insert(v.name.clone(), InVarSlot { ty: v.ty, slot });
        }

        debug!(
            name = %options.name,
            bytes = built.bytecode.len(),
            locals = built.locals_count,
            stack = built.max_stack_hint,
            "compiled"
        );
        Ok(CompiledScript {
            name: options.name.clone(),
            runtime_kind: options.runtime_kind,
            bytecode: built.bytecode,
            string_pool: built.strings,
            locals_count: built.locals_count,
            max_stack_hint: built.max_stack_hint,
            in_vars,
        })
    }
}
