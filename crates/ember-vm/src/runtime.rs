//! The embedding entry point: binds inputs, runs a compiled script and
//! resets afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use ember_bytecode::{CompiledScript, RuntimeKind};
use ember_host::{HostTypeRegistry, ScriptObject, Value};
use tracing::{debug, info_span};

use crate::config::RuntimeConfig;
use crate::error::{fail, RuntimeErrorCode, RuntimeResult};
use crate::listener::{RuntimeListener, StdoutListener};
use crate::machine::{run_range, Exec, Machine};
use crate::refs::Payload;

/// Values for a script's `in` variables, keyed by name.
pub type InVars = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Exited,
}

/// Executes compiled scripts against a host registry.
///
/// A runtime may run many scripts, one at a time. Every run ends with the
/// stack, locals and reference table emptied, whether it succeeded or not;
/// only the returned value survives until the next run.
pub struct Runtime<L: RuntimeListener = StdoutListener> {
    registry: Arc<HostTypeRegistry>,
    machine: Machine,
    listener: L,
    state: RunState,
    returned: Value,
}

impl Runtime<StdoutListener> {
    pub fn new(registry: Arc<HostTypeRegistry>) -> Self {
        Self::with_listener(registry, RuntimeConfig::default(), StdoutListener)
    }
}

impl<L: RuntimeListener> Runtime<L> {
    pub fn with_listener(registry: Arc<HostTypeRegistry>, config: RuntimeConfig, listener: L) -> Self {
        Self {
            registry,
            machine: Machine::new(
                config.stack_capacity,
                config.locals_capacity,
                config.reference_capacity,
            ),
            listener,
            state: RunState::Idle,
            returned: Value::Null,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    pub fn registry(&self) -> &Arc<HostTypeRegistry> {
        &self.registry
    }

    /// Value of the last `return`, `null` if the script did not return one.
    pub fn returned_value(&self) -> &Value {
        &self.returned
    }

    /// The returned host object, if the last run returned one.
    pub fn returned_object(&self) -> Option<&Arc<dyn ScriptObject>> {
        self.returned.as_object()
    }

    /// Run `script` with `inputs` bound to its `in` variables.
    ///
    /// Errors are also delivered to the listener before being returned.
    pub fn run_script(&mut self, script: &CompiledScript, inputs: &InVars) -> RuntimeResult<()> {
        let span = info_span!("run", script = %script.name);
        let _guard = span.enter();

        self.returned = Value::Null;
        self.state = RunState::Running;
        let outcome = self.execute(script, inputs);
        self.state = RunState::Exited;
        self.reset(script);
        self.state = RunState::Idle;

        match outcome {
            Ok(()) => {
                debug!(returned = ?self.returned, "script finished");
                Ok(())
            }
            Err(e) => {
                debug!(code = e.code.number(), "script failed: {}", e.message);
                self.listener.on_error(&e);
                Err(e)
            }
        }
    }

    fn execute(&mut self, script: &CompiledScript, inputs: &InVars) -> RuntimeResult<()> {
        if script.runtime_kind != RuntimeKind::Bytecode {
            return fail(RuntimeErrorCode::InvalidBytecode, "Unsupported runtime kind");
        }
        self.machine.prepare(script.locals_count);
        self.bind_inputs(script, inputs)?;

        let mut exec = Exec {
            script,
            registry: &self.registry,
            listener: &mut self.listener,
        };
        run_range(&mut self.machine, &mut exec, 0, script.bytecode.len())?;
        if let Some(value) = self.machine.returned.take() {
            self.returned = value;
        }
        Ok(())
    }

    fn bind_inputs(&mut self, script: &CompiledScript, inputs: &InVars) -> RuntimeResult<()> {
        let mut supplied: HashMap<String, &Value> = HashMap::with_capacity(inputs.len());
        for (name, value) in inputs {
            let name = name.to_lowercase();
            if !script.in_vars.contains_key(&name) {
                debug!(name = %name, "ignoring value for unknown in variable");
            }
            supplied.insert(name, value);
        }

        for (name, slot) in &script.in_vars {
            let value = supplied.get(name).map_or(Value::Null, |v| (*v).clone());
            let actual = self.registry.type_of_value(&value);
            if !HostTypeRegistry::runtime_accepts(slot.ty, actual) {
                return fail(
                    RuntimeErrorCode::InVarTypeError,
                    format!(
                        "In variable '{}' expected {}, found {}",
                        name,
                        self.registry.type_name(slot.ty),
                        self.registry.type_name(actual)
                    ),
                );
            }
            let i = self.machine.local_index(slot.slot)?;
            let v = self.machine.from_value(value)?;
            self.machine.locals[i] = v;
        }
        Ok(())
    }

    /// Return every slot the run still holds and report leaked references.
    fn reset(&mut self, script: &CompiledScript) {
        let held: Vec<_> = self
            .machine
            .stack
            .drain(..)
            .chain(self.machine.locals.iter_mut().map(std::mem::take))
            .collect();
        for v in held {
            // A stale handle here only means the slot is already gone.
            let _ = self.machine.release(v);
        }

        let leaked = self.machine.refs.drain();
        if leaked.is_empty() {
            return;
        }
        let mut exec = Exec {
            script,
            registry: &self.registry,
            listener: &mut self.listener,
        };
        for (h, payload) in leaked {
            let what = match payload {
                Payload::Str(s) => format!("string {:?}", s),
                Payload::Object(o) => format!("object {}", o.display()),
            };
            exec.warn(
                RuntimeErrorCode::ReferenceNotRemoved,
                format!("reference not removed: handle {} ({})", h, what),
            );
        }
    }
}

impl<L: RuntimeListener> std::fmt::Debug for Runtime<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state)
            .field("returned", &self.returned)
            .finish_non_exhaustive()
    }
}

