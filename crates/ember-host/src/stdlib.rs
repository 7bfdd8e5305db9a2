//! Core library available to every script: `system`, `math` and
//! `collections`.

use std::any::Any;
use std::sync::Mutex;

use ember_syntax::ast::Literal;
use ember_syntax::types::ScriptType;

use crate::builder::RegistryBuilder;
use crate::error::HostError;
use crate::object::ScriptObject;
use crate::registry::{HostResult, HostTypeRegistry};
use crate::value::Value;

/// Namespace visible without a `using` statement.
pub const SYSTEM: &str = "system";
pub const MATH: &str = "math";
pub const COLLECTIONS: &str = "collections";

/// Growable list of script values.
#[derive(Debug, Default)]
pub struct List {
    items: Mutex<Vec<Value>>,
}

impl List {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            items: Mutex::new(values),
        }
    }

    fn with_items<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> HostResult<R> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| HostError::failed("list lock poisoned"))?;
        Ok(f(&mut items))
    }

    pub fn len(&self) -> usize {
        self.with_items(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: f64) -> HostResult {
        self.with_items(|v| {
            if index < 0.0 || index.fract() != 0.0 || index as usize >= v.len() {
                Err(HostError::IndexOutOfRange {
                    index,
                    len: v.len(),
                })
            } else {
                Ok(v[index as usize].clone())
            }
        })?
    }

    pub fn push(&self, value: Value) -> HostResult<()> {
        self.with_items(|v| v.push(value))
    }

    pub fn clear(&self) -> HostResult<()> {
        self.with_items(|v| v.clear())
    }
}

impl ScriptObject for List {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> String {
        self.with_items(|v| {
            let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
            format!("[{}]", parts.join(", "))
        })
        .unwrap_or_else(|_| "[?]".to_string())
    }
}

fn number_arg(args: &[Value], index: usize, member: &str) -> HostResult<f64> {
    args.get(index)
        .and_then(Value::as_number)
        .ok_or_else(|| HostError::ArgumentType {
            member: member.to_string(),
            index,
            expected: "a number",
        })
}

fn first(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Null)
}

/// Registered objects report `namespace.name`; everything else its kind.
fn type_name_of(registry: Option<&HostTypeRegistry>, value: &Value) -> String {
    let registered = match (value, registry) {
        (Value::Object(o), Some(r)) => r
            .type_of_object(o.as_ref())
            .map(|id| r.type_name(ScriptType::Object(id))),
        _ => None,
    };
    registered.unwrap_or_else(|| value.kind_name().to_string())
}

/// Register the core library into `builder`.
pub fn register(builder: &mut RegistryBuilder) -> HostResult<()> {
    builder.static_method(SYSTEM, "Print", vec![ScriptType::Dynamic], ScriptType::Void, |ctx, args| {
        ctx.print(&first(args).to_string());
        Ok(Value::Null)
    });
    builder.static_method(SYSTEM, "ToString", vec![ScriptType::Dynamic], ScriptType::String, |_, args| {
        Ok(Value::Str(first(args).to_string()))
    });
    builder.static_method(SYSTEM, "TypeName", vec![ScriptType::Dynamic], ScriptType::String, |ctx, args| {
        Ok(Value::Str(type_name_of(ctx.registry(), &first(args))))
    });

    builder.static_method(MATH, "Abs", vec![ScriptType::Double], ScriptType::Double, |_, args| {
        Ok(Value::Number(number_arg(args, 0, "abs")?.abs()))
    });
    builder.static_method(MATH, "Sqrt", vec![ScriptType::Double], ScriptType::Double, |_, args| {
        Ok(Value::Number(number_arg(args, 0, "sqrt")?.sqrt()))
    });
    builder.static_method(MATH, "Min", vec![ScriptType::Double, ScriptType::Double], ScriptType::Double, |_, args| {
        Ok(Value::Number(number_arg(args, 0, "min")?.min(number_arg(args, 1, "min")?)))
    });
    builder.static_method(MATH, "Max", vec![ScriptType::Double, ScriptType::Double], ScriptType::Double, |_, args| {
        Ok(Value::Number(number_arg(args, 0, "max")?.max(number_arg(args, 1, "max")?)))
    });
    builder.static_method(MATH, "Pow", vec![ScriptType::Double, ScriptType::Double], ScriptType::Double, |_, args| {
        Ok(Value::Number(number_arg(args, 0, "pow")?.powf(number_arg(args, 1, "pow")?)))
    });
    builder.static_method(MATH, "Floor", vec![ScriptType::Double], ScriptType::Long, |_, args| {
        Ok(Value::Number(number_arg(args, 0, "floor")?.floor()))
    });
    builder.constant(MATH, "PI", Literal::Double(std::f64::consts::PI));

    let list = builder.register_type::<List>(COLLECTIONS, "List");
    builder.constructor(list, vec![], |_| Ok(List::default()));
    builder.instance_method::<List, _>(list, "Add", vec![ScriptType::Dynamic], ScriptType::Void, |_, this, args| {
        this.push(first(args))?;
        Ok(Value::Null)
    });
    builder.instance_method::<List, _>(list, "GetItem", vec![ScriptType::Long], ScriptType::Dynamic, |_, this, args| {
        this.get(number_arg(args, 0, "getitem")?)
    });
    builder.instance_method::<List, _>(list, "Clear", vec![], ScriptType::Void, |_, this, _| {
        this.clear()?;
        Ok(Value::Null)
    });
    builder.instance_property::<List, _>(list, "Count", ScriptType::Long, |this| {
        Ok(Value::Number(this.len() as f64))
    });
    builder.iterable(list, "Count", "GetItem")
}

/// A registry holding only the core library.
pub fn core_registry() -> HostResult<HostTypeRegistry> {
    let mut builder = RegistryBuilder::new();
    register(&mut builder)?;
    Ok(builder.build())
}
