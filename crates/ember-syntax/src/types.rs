//! Static script types shared by the analyzer, the code generator and the VM.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a host type inside a host type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostTypeId(pub u32);

/// Identifier of a host method (static or instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u32);

/// Identifier of a host property (static or instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

/// Identifier of a host constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstructorId(pub u32);

/// Statically tracked type of a value.
///
/// `Long` and `Double` share one runtime representation (an `f64`); `Long`
/// only records that the value is known to be a whole number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    /// Could be anything; forces runtime checks.
    Dynamic,
    /// The result of a member that returns nothing.
    Void,
    Null,
    Bool,
    Long,
    Double,
    String,
    Object(HostTypeId),
}

impl ScriptType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ScriptType::Long | ScriptType::Double)
    }

    /// Whether a value of this static type may live in the reference table.
    pub fn may_be_ref(self) -> bool {
        matches!(
            self,
            ScriptType::Dynamic | ScriptType::String | ScriptType::Object(_)
        )
    }

    /// Whether `null` may flow into a slot declared with this type.
    pub fn is_nullable(self) -> bool {
        matches!(
            self,
            ScriptType::Dynamic | ScriptType::Null | ScriptType::String | ScriptType::Object(_)
        )
    }

    /// Whether a value of static type `arg` may flow into a slot of type `self`
    /// without a conversion. `Dynamic` arguments are accepted here and checked
    /// at runtime instead.
    pub fn accepts(self, arg: ScriptType) -> bool {
        if self == arg || self == ScriptType::Dynamic || arg == ScriptType::Dynamic {
            return arg != ScriptType::Void;
        }
        match (self, arg) {
            (ScriptType::Double, ScriptType::Long) => true,
            (param, ScriptType::Null) => param.is_nullable(),
            _ => false,
        }
    }

    /// Resolve one of the built-in type names. Host types are resolved by the
    /// registry instead.
    pub fn builtin(name: &str) -> Option<ScriptType> {
        match name {
            "var" | "dynamic" | "object" => Some(ScriptType::Dynamic),
            "bool" => Some(ScriptType::Bool),
            "long" | "int" => Some(ScriptType::Long),
            "double" | "number" => Some(ScriptType::Double),
            "string" => Some(ScriptType::String),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptType::Dynamic => f.write_str("dynamic"),
            ScriptType::Void => f.write_str("void"),
            ScriptType::Null => f.write_str("null"),
            ScriptType::Bool => f.write_str("bool"),
            ScriptType::Long => f.write_str("long"),
            ScriptType::Double => f.write_str("double"),
            ScriptType::String => f.write_str("string"),
            ScriptType::Object(id) => write!(f, "object#{}", id.0),
        }
    }
}
