/// A value on the operand stack or in a local slot.
///
/// Numbers are always `f64`. Strings and objects live in the reference table
/// and are addressed by handle; every `StringRef`/`ObjectRef` held by the
/// stack or a local owns one reference count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScriptVar {
    #[default]
    Null,
    Double(f64),
    Bool(bool),
    StringRef(u32),
    ObjectRef(u32),
}

impl ScriptVar {
    pub fn handle(self) -> Option<u32> {
        match self {
            ScriptVar::StringRef(h) | ScriptVar::ObjectRef(h) => Some(h),
            _ => None,
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            ScriptVar::Null => "null",
            ScriptVar::Double(n) if ember_host::value::is_whole(n) => "long",
            ScriptVar::Double(_) => "double",
            ScriptVar::Bool(_) => "bool",
            ScriptVar::StringRef(_) => "string",
            ScriptVar::ObjectRef(_) => "object",
        }
    }
}
