use std::any::Any;
use std::fmt;

/// A host object that scripts can hold references to.
///
/// The runtime keeps one reference-table slot per distinct object (compared
/// by `Arc` pointer). `on_acquire` runs when the first script reference is
/// taken and `on_release` when the last one is dropped.
pub trait ScriptObject: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    fn on_acquire(&self) {}

    fn on_release(&self) {}

    /// Text produced when the object is printed or converted to a string.
    fn display(&self) -> String {
        format!("{:?}", self)
    }
}
