//! The read-only catalog of host types and members.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use ember_syntax::ast::Literal;
use ember_syntax::types::{ConstructorId, HostTypeId, MethodId, PropertyId, ScriptType};

use crate::error::HostError;
use crate::object::ScriptObject;
use crate::value::{is_whole, Value};
use crate::HostContext;

/// Result of a host callback.
pub type HostResult<T = Value> = Result<T, HostError>;

/// Adapter for static and instance methods. The receiver is `None` for
/// static methods.
pub type MethodFn = Arc<
    dyn Fn(&mut dyn HostContext, Option<&Arc<dyn ScriptObject>>, &[Value]) -> HostResult
        + Send
        + Sync,
>;
pub type GetterFn = Arc<dyn Fn(Option<&Arc<dyn ScriptObject>>) -> HostResult + Send + Sync>;
pub type SetterFn =
    Arc<dyn Fn(Option<&Arc<dyn ScriptObject>>, Value) -> HostResult<()> + Send + Sync>;
pub type ConstructorFn = Arc<dyn Fn(&[Value]) -> HostResult<Arc<dyn ScriptObject>> + Send + Sync>;

/// `Count` property plus `GetItem` method that make a type usable in
/// `foreach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    pub count: PropertyId,
    pub get_item: MethodId,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub id: HostTypeId,
    pub namespace: String,
    pub name: String,
    pub iteration: Option<Iteration>,
}

#[derive(Clone)]
pub struct MethodDef {
    pub id: MethodId,
    pub namespace: String,
    pub name: String,
    /// Owning type for instance methods.
    pub owner: Option<HostTypeId>,
    pub params: Vec<ScriptType>,
    pub returns: ScriptType,
    pub func: MethodFn,
}

#[derive(Clone)]
pub struct PropertyDef {
    pub id: PropertyId,
    pub namespace: String,
    pub name: String,
    pub owner: Option<HostTypeId>,
    pub ty: ScriptType,
    pub getter: Option<GetterFn>,
    pub setter: Option<SetterFn>,
}

#[derive(Debug, Clone)]
pub struct ConstDef {
    pub namespace: String,
    pub name: String,
    pub value: Literal,
}

#[derive(Clone)]
pub struct ConstructorDef {
    pub id: ConstructorId,
    pub ty: HostTypeId,
    pub params: Vec<ScriptType>,
    pub func: ConstructorFn,
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish()
    }
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("ty", &self.ty)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("id", &self.id)
            .field("ty", &self.ty)
            .field("params", &self.params)
            .finish()
    }
}

/// Split `ns.name` at the last `.`.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rfind('.') {
        Some(i) => (Some(&name[..i]), &name[i + 1..]),
        None => (None, name),
    }
}

/// Read-only host catalog. Every member has a stable ID equal to its
/// registration index. All names are stored lowercase.
#[derive(Debug, Default)]
pub struct HostTypeRegistry {
    pub(crate) types: Vec<TypeDef>,
    pub(crate) rust_types: HashMap<TypeId, HostTypeId>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) properties: Vec<PropertyDef>,
    pub(crate) consts: Vec<ConstDef>,
    pub(crate) constructors: Vec<ConstructorDef>,
}

impl HostTypeRegistry {
    pub fn namespaces(&self) -> BTreeSet<&str> {
        let mut set = BTreeSet::new();
        set.extend(self.types.iter().map(|t| t.namespace.as_str()));
        set.extend(
            self.methods
                .iter()
                .filter(|m| m.owner.is_none())
                .map(|m| m.namespace.as_str()),
        );
        set.extend(
            self.properties
                .iter()
                .filter(|p| p.owner.is_none())
                .map(|p| p.namespace.as_str()),
        );
        set.extend(self.consts.iter().map(|c| c.namespace.as_str()));
        set
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces().contains(namespace)
    }

    pub fn type_def(&self, id: HostTypeId) -> Option<&TypeDef> {
        self.types.get(id.0 as usize)
    }

    pub fn method(&self, id: MethodId) -> Option<&MethodDef> {
        self.methods.get(id.0 as usize)
    }

    pub fn property(&self, id: PropertyId) -> Option<&PropertyDef> {
        self.properties.get(id.0 as usize)
    }

    pub fn constructor(&self, id: ConstructorId) -> Option<&ConstructorDef> {
        self.constructors.get(id.0 as usize)
    }

    pub fn types_named(&self, namespace: &str, name: &str) -> Vec<&TypeDef> {
        self.types
            .iter()
            .filter(|t| t.namespace == namespace && t.name == name)
            .collect()
    }

    pub fn static_methods(&self, namespace: &str, name: &str) -> Vec<&MethodDef> {
        self.methods
            .iter()
            .filter(|m| m.owner.is_none() && m.namespace == namespace && m.name == name)
            .collect()
    }

    pub fn static_properties(&self, namespace: &str, name: &str) -> Vec<&PropertyDef> {
        self.properties
            .iter()
            .filter(|p| p.owner.is_none() && p.namespace == namespace && p.name == name)
            .collect()
    }

    pub fn consts(&self, namespace: &str, name: &str) -> Vec<&ConstDef> {
        self.consts
            .iter()
            .filter(|c| c.namespace == namespace && c.name == name)
            .collect()
    }

    pub fn instance_methods(&self, ty: HostTypeId, name: &str) -> Vec<&MethodDef> {
        self.methods
            .iter()
            .filter(|m| m.owner == Some(ty) && m.name == name)
            .collect()
    }

    pub fn instance_properties(&self, ty: HostTypeId, name: &str) -> Vec<&PropertyDef> {
        self.properties
            .iter()
            .filter(|p| p.owner == Some(ty) && p.name == name)
            .collect()
    }

    pub fn constructors_of(&self, ty: HostTypeId) -> Vec<&ConstructorDef> {
        self.constructors.iter().filter(|c| c.ty == ty).collect()
    }

    /// Resolve a type name against `namespaces`, or against the explicit
    /// prefix when the name is qualified. Built-in type names win.
    pub fn resolve_type(&self, namespaces: &[String], name: &str) -> Vec<ScriptType> {
        if let Some(t) = ScriptType::builtin(name) {
            return vec![t];
        }
        let (prefix, short) = split_qualified(name);
        let found: Vec<&TypeDef> = match prefix {
            Some(ns) => self.types_named(ns, short),
            None => namespaces
                .iter()
                .flat_map(|ns| self.types_named(ns, short))
                .collect(),
        };
        found.into_iter().map(|t| ScriptType::Object(t.id)).collect()
    }

    /// Host type of a registered object, by its concrete Rust type.
    pub fn type_of_object(&self, object: &dyn ScriptObject) -> Option<HostTypeId> {
        self.rust_types.get(&object.as_any().type_id()).copied()
    }

    /// Runtime script type of a value. Unregistered objects report
    /// `Dynamic`.
    pub fn type_of_value(&self, value: &Value) -> ScriptType {
        match value {
            Value::Null => ScriptType::Null,
            Value::Number(n) if is_whole(*n) => ScriptType::Long,
            Value::Number(_) => ScriptType::Double,
            Value::Bool(_) => ScriptType::Bool,
            Value::Str(_) => ScriptType::String,
            Value::Object(o) => self
                .type_of_object(o.as_ref())
                .map_or(ScriptType::Dynamic, ScriptType::Object),
        }
    }

    /// Display name of a script type, using registered names for host types.
    pub fn type_name(&self, ty: ScriptType) -> String {
        match ty {
            ScriptType::Object(id) => match self.type_def(id) {
                Some(def) => format!("{}.{}", def.namespace, def.name),
                None => ty.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Whether a runtime value of type `actual` may be stored where
    /// `expected` is declared. A whole number satisfies `double`; an
    /// unregistered object only satisfies `dynamic`.
    pub fn runtime_accepts(expected: ScriptType, actual: ScriptType) -> bool {
        match (expected, actual) {
            (ScriptType::Dynamic, _) => true,
            (_, ScriptType::Null) => expected.is_nullable(),
            (ScriptType::Double, ScriptType::Long) => true,
            (ScriptType::Long, ScriptType::Double) => false,
            (e, a) => e == a,
        }
    }
}
