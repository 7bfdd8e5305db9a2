//! Explicit registration of host types and members.

use std::any::TypeId;
use std::sync::Arc;

use ember_syntax::ast::Literal;
use ember_syntax::types::{ConstructorId, HostTypeId, MethodId, PropertyId, ScriptType};
use tracing::debug;

use crate::error::HostError;
use crate::object::ScriptObject;
use crate::registry::*;
use crate::value::Value;
use crate::HostContext;

/// Builds a [`HostTypeRegistry`]. Names are case-insensitive and stored
/// lowercase.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: HostTypeRegistry,
}

fn downcast<'a, T: ScriptObject>(
    this: Option<&'a Arc<dyn ScriptObject>>,
    member: &str,
) -> HostResult<&'a T> {
    this.and_then(|o| o.as_any().downcast_ref::<T>())
        .ok_or_else(|| HostError::Receiver(member.to_string()))
}

fn method_fn<F>(f: F) -> MethodFn
where
    F: Fn(&mut dyn HostContext, Option<&Arc<dyn ScriptObject>>, &[Value]) -> HostResult
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn getter_fn<F>(f: F) -> GetterFn
where
    F: Fn(Option<&Arc<dyn ScriptObject>>) -> HostResult + Send + Sync + 'static,
{
    Arc::new(f)
}

fn setter_fn<F>(f: F) -> SetterFn
where
    F: Fn(Option<&Arc<dyn ScriptObject>>, Value) -> HostResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the Rust type `T` as the script type `namespace.name`.
    pub fn register_type<T: ScriptObject>(&mut self, namespace: &str, name: &str) -> HostTypeId {
        let id = HostTypeId(self.registry.types.len() as u32);
        self.registry.types.push(TypeDef {
            id,
            namespace: namespace.to_lowercase(),
            name: name.to_lowercase(),
            iteration: None,
        });
        self.registry.rust_types.insert(TypeId::of::<T>(), id);
        id
    }

    fn namespace_of(&self, ty: HostTypeId) -> String {
        self.registry
            .type_def(ty)
            .map(|t| t.namespace.clone())
            .unwrap_or_default()
    }

    fn push_method(
        &mut self,
        namespace: String,
        name: &str,
        owner: Option<HostTypeId>,
        params: Vec<ScriptType>,
        returns: ScriptType,
        func: MethodFn,
    ) -> MethodId {
        let id = MethodId(self.registry.methods.len() as u32);
        self.registry.methods.push(MethodDef {
            id,
            namespace,
            name: name.to_lowercase(),
            owner,
            params,
            returns,
            func,
        });
        id
    }

    fn push_property(
        &mut self,
        namespace: String,
        name: &str,
        owner: Option<HostTypeId>,
        ty: ScriptType,
        getter: Option<GetterFn>,
        setter: Option<SetterFn>,
    ) -> PropertyId {
        let id = PropertyId(self.registry.properties.len() as u32);
        self.registry.properties.push(PropertyDef {
            id,
            namespace,
            name: name.to_lowercase(),
            owner,
            ty,
            getter,
            setter,
        });
        id
    }

    pub fn static_method<F>(
        &mut self,
        namespace: &str,
        name: &str,
        params: Vec<ScriptType>,
        returns: ScriptType,
        f: F,
    ) -> MethodId
    where
        F: Fn(&mut dyn HostContext, &[Value]) -> HostResult + Send + Sync + 'static,
    {
        let func = method_fn(move |ctx, _this, args| f(ctx, args));
        self.push_method(namespace.to_lowercase(), name, None, params, returns, func)
    }

    pub fn instance_method<T, F>(
        &mut self,
        ty: HostTypeId,
        name: &str,
        params: Vec<ScriptType>,
        returns: ScriptType,
        f: F,
    ) -> MethodId
    where
        T: ScriptObject,
        F: Fn(&mut dyn HostContext, &T, &[Value]) -> HostResult + Send + Sync + 'static,
    {
        let member = name.to_lowercase();
        let func = method_fn(move |ctx, this, args| {
            let this = downcast::<T>(this, &member)?;
            f(ctx, this, args)
        });
        let namespace = self.namespace_of(ty);
        self.push_method(namespace, name, Some(ty), params, returns, func)
    }

    /// Read-only static property.
    pub fn static_property<G>(
        &mut self,
        namespace: &str,
        name: &str,
        ty: ScriptType,
        get: G,
    ) -> PropertyId
    where
        G: Fn() -> HostResult + Send + Sync + 'static,
    {
        let getter = getter_fn(move |_| get());
        self.push_property(namespace.to_lowercase(), name, None, ty, Some(getter), None)
    }

    pub fn static_property_rw<G, S>(
        &mut self,
        namespace: &str,
        name: &str,
        ty: ScriptType,
        get: G,
        set: S,
    ) -> PropertyId
    where
        G: Fn() -> HostResult + Send + Sync + 'static,
        S: Fn(Value) -> HostResult<()> + Send + Sync + 'static,
    {
        let getter = getter_fn(move |_| get());
        let setter = setter_fn(move |_, v| set(v));
        self.push_property(
            namespace.to_lowercase(),
            name,
            None,
            ty,
            Some(getter),
            Some(setter),
        )
    }

    /// Read-only instance property.
    pub fn instance_property<T, G>(
        &mut self,
        owner: HostTypeId,
        name: &str,
        ty: ScriptType,
        get: G,
    ) -> PropertyId
    where
        T: ScriptObject,
        G: Fn(&T) -> HostResult + Send + Sync + 'static,
    {
        let member = name.to_lowercase();
        let getter = getter_fn(move |this| get(downcast::<T>(this, &member)?));
        let namespace = self.namespace_of(owner);
        self.push_property(namespace, name, Some(owner), ty, Some(getter), None)
    }

    pub fn instance_property_rw<T, G, S>(
        &mut self,
        owner: HostTypeId,
        name: &str,
        ty: ScriptType,
        get: G,
        set: S,
    ) -> PropertyId
    where
        T: ScriptObject,
        G: Fn(&T) -> HostResult + Send + Sync + 'static,
        S: Fn(&T, Value) -> HostResult<()> + Send + Sync + 'static,
    {
        let member = name.to_lowercase();
        let get_member = member.clone();
        let getter = getter_fn(move |this| get(downcast::<T>(this, &get_member)?));
        let setter = setter_fn(move |this, v| set(downcast::<T>(this, &member)?, v));
        let namespace = self.namespace_of(owner);
        self.push_property(namespace, name, Some(owner), ty, Some(getter), Some(setter))
    }

    /// A named constant. Scripts see it folded into a literal.
    pub fn constant(&mut self, namespace: &str, name: &str, value: Literal) {
        self.registry.consts.push(ConstDef {
            namespace: namespace.to_lowercase(),
            name: name.to_lowercase(),
            value,
        });
    }

    pub fn constructor<T, F>(&mut self, ty: HostTypeId, params: Vec<ScriptType>, f: F) -> ConstructorId
    where
        T: ScriptObject,
        F: Fn(&[Value]) -> HostResult<T> + Send + Sync + 'static,
    {
        let id = ConstructorId(self.registry.constructors.len() as u32);
        let func: ConstructorFn = Arc::new(move |args: &[Value]| {
            let obj: Arc<dyn ScriptObject> = Arc::new(f(args)?);
            Ok(obj)
        });
        self.registry.constructors.push(ConstructorDef {
            id,
            ty,
            params,
            func,
        });
        id
    }

    /// Make `ty` iterable with `foreach` through an instance property
    /// returning the item count and a one-argument item accessor.
    pub fn iterable(&mut self, ty: HostTypeId, count: &str, get_item: &str) -> HostResult<()> {
        let count = count.to_lowercase();
        let get_item = get_item.to_lowercase();
        let count_id = match self.registry.instance_properties(ty, &count).as_slice() {
            [p] if p.getter.is_some() => p.id,
            _ => {
                return Err(HostError::failed(format!(
                    "iteration count property '{}' is not registered",
                    count
                )))
            }
        };
        let get_item_id = match self.registry.instance_methods(ty, &get_item).as_slice() {
            [m] if m.params.len() == 1 => m.id,
            _ => {
                return Err(HostError::failed(format!(
                    "iteration item method '{}' is not registered",
                    get_item
                )))
            }
        };
        match self.registry.types.get_mut(ty.0 as usize) {
            Some(def) => {
                def.iteration = Some(Iteration {
                    count: count_id,
                    get_item: get_item_id,
                });
                Ok(())
            }
            None => Err(HostError::failed(format!("unknown host type {}", ty.0))),
        }
    }

    pub fn build(self) -> HostTypeRegistry {
        let r = &self.registry;
        debug!(
            types = r.types.len(),
            methods = r.methods.len(),
            properties = r.properties.len(),
            consts = r.consts.len(),
            constructors = r.constructors.len(),
            "host registry built"
        );
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::BufferContext;

    #[derive(Debug, Default)]
    struct Counter {
        value: AtomicI64,
    }

    impl ScriptObject for Counter {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn counter_registry() -> (HostTypeRegistry, HostTypeId, MethodId, PropertyId) {
        let mut b = RegistryBuilder::new();
        let ty = b.register_type::<Counter>("Game", "Counter");
        b.constructor(ty, vec![], |_| Ok(Counter::default()));
        let bump = b.instance_method::<Counter, _>(ty, "Bump", vec![ScriptType::Long], ScriptType::Void, |_, c, args| {
            let by = args.first().and_then(Value::as_number).unwrap_or(1.0) as i64;
            c.value.fetch_add(by, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let value = b.instance_property_rw::<Counter, _, _>(
            ty,
            "Value",
            ScriptType::Long,
            |c| Ok(Value::Number(c.value.load(Ordering::SeqCst) as f64)),
            |c, v| {
                c.value.store(v.as_number().unwrap_or(0.0) as i64, Ordering::SeqCst);
                Ok(())
            },
        );
        (b.build(), ty, bump, value)
    }

    #[test]
    fn test_names_are_lowercase_and_ids_stable() {
        let (registry, ty, bump, value) = counter_registry();
        assert_eq!(registry.type_def(ty).map(|t| t.name.as_str()), Some("counter"));
        assert_eq!(registry.instance_methods(ty, "bump")[0].id, bump);
        assert_eq!(registry.instance_properties(ty, "value")[0].id, value);
        assert_eq!(registry.instance_methods(ty, "bump")[0].namespace, "game");
        assert!(registry.has_namespace("game"));
    }

    #[test]
    fn test_adapters_downcast_receiver() {
        let (registry, ty, bump, value) = counter_registry();
        let ctor = &registry.constructors_of(ty)[0];
        let obj = (ctor.func)(&[]).unwrap();
        assert_eq!(registry.type_of_object(obj.as_ref()), Some(ty));

        let mut ctx = BufferContext::default();
        let m = registry.method(bump).unwrap();
        (m.func)(&mut ctx, Some(&obj), &[Value::Number(5.0)]).unwrap();
        let p = registry.property(value).unwrap();
        let got = (p.getter.as_ref().unwrap())(Some(&obj)).unwrap();
        assert_eq!(got, Value::Number(5.0));

        let err = (m.func)(&mut ctx, None, &[]).unwrap_err();
        assert_eq!(err, HostError::Receiver("bump".to_string()));
    }

    #[test]
    fn test_iterable_requires_members() {
        let mut b = RegistryBuilder::new();
        let ty = b.register_type::<Counter>("game", "counter");
        assert!(b.iterable(ty, "Count", "GetItem").is_err());
    }

    #[test]
    fn test_resolve_type() {
        let (registry, ty, _, _) = counter_registry();
        let usings = vec!["game".to_string()];
        assert_eq!(registry.resolve_type(&usings, "counter"), vec![ScriptType::Object(ty)]);
        assert_eq!(registry.resolve_type(&[], "game.counter"), vec![ScriptType::Object(ty)]);
        assert!(registry.resolve_type(&[], "counter").is_empty());
        assert_eq!(registry.resolve_type(&[], "string"), vec![ScriptType::String]);
    }
}
