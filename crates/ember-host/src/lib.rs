//! Host integration for Ember.
//!
//! A host application describes the types and members scripts may use with a
//! [`RegistryBuilder`]. The finished [`HostTypeRegistry`] is read-only and is
//! shared (behind an `Arc`) between the compiler, which resolves member names
//! to stable IDs, and every runtime, which calls the registered closures.
//!
//! ```rust
//! use std::sync::Arc;
//! use ember_host::{RegistryBuilder, Value};
//! use ember_syntax::ScriptType;
//!
//! let mut builder = RegistryBuilder::new();
//! builder.static_method("game", "Score", vec![], ScriptType::Long, |_ctx, _args| {
//!     Ok(Value::Number(42.0))
//! });
//! let registry = Arc::new(builder.build());
//! assert_eq!(registry.static_methods("game", "score").len(), 1);
//! ```

pub mod builder;
pub mod error;
pub mod object;
pub mod registry;
pub mod stdlib;
pub mod value;

pub use builder::RegistryBuilder;
pub use error::HostError;
pub use object::ScriptObject;
pub use registry::*;
pub use value::Value;

/// Callbacks available to host methods while a script runs.
pub trait HostContext {
    /// Deliver text printed by the script.
    fn print(&mut self, text: &str);

    /// Registry of the running script, when the caller has one.
    fn registry(&self) -> Option<&HostTypeRegistry> {
        None
    }
}

/// A context that collects printed lines, handy for tests and tools.
#[derive(Debug, Default)]
pub struct BufferContext {
    pub lines: Vec<String>,
}

impl HostContext for BufferContext {
    fn print(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}
