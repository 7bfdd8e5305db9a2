//! Type Context: the stack of frames tracking the static type of every
//! variable along the current control-flow path.

use std::collections::HashMap;

use ember_syntax::types::ScriptType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Global,
    /// One branch of an `if`; may or may not run.
    Condition,
    /// A loop header and body.
    Loop,
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    bindings: HashMap<String, ScriptType>,
}

/// Lookups walk from the innermost frame to the global frame.
#[derive(Debug, Clone)]
pub struct TypeContext {
    frames: Vec<Frame>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                kind: FrameKind::Global,
                bindings: HashMap::new(),
            }],
        }
    }

    pub fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            kind,
            bindings: HashMap::new(),
        });
    }

    /// Leave the innermost frame, merging its bindings into the parent.
    ///
    /// A Condition frame widens to `Dynamic` every symbol whose type differs
    /// from the outer binding or that has no outer binding. A Loop frame
    /// overwrites the outer binding. The global frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (name, ty) in frame.bindings {
            match frame.kind {
                FrameKind::Condition => {
                    if self.lookup(&name) != Some(ty) {
                        self.set(&name, ScriptType::Dynamic);
                    }
                }
                FrameKind::Loop | FrameKind::Global => self.set(&name, ty),
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ScriptType> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.bindings.get(name).copied())
    }

    /// Bind `name` in the innermost frame.
    pub fn set(&mut self, name: &str, ty: ScriptType) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings.insert(name.to_string(), ty);
        }
    }

    pub fn in_loop(&self) -> bool {
        self.frames.iter().any(|f| f.kind == FrameKind::Loop)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_widens_changed_and_new() {
        let mut ctx = TypeContext::new();
        ctx.set("x", ScriptType::Long);
        ctx.set("y", ScriptType::Long);
        ctx.push(FrameKind::Condition);
        ctx.set("x", ScriptType::String);
        ctx.set("y", ScriptType::Long);
        ctx.set("z", ScriptType::Bool);
        ctx.pop();
        assert_eq!(ctx.lookup("x"), Some(ScriptType::Dynamic));
        assert_eq!(ctx.lookup("y"), Some(ScriptType::Long));
        assert_eq!(ctx.lookup("z"), Some(ScriptType::Dynamic));
    }

    #[test]
    fn test_nested_condition_propagates() {
        let mut ctx = TypeContext::new();
        ctx.set("x", ScriptType::Long);
        ctx.push(FrameKind::Condition);
        ctx.push(FrameKind::Condition);
        ctx.set("x", ScriptType::Double);
        ctx.pop();
        assert_eq!(ctx.lookup("x"), Some(ScriptType::Dynamic));
        ctx.pop();
        assert_eq!(ctx.lookup("x"), Some(ScriptType::Dynamic));
    }

    #[test]
    fn test_loop_overwrites() {
        let mut ctx = TypeContext::new();
        ctx.set("x", ScriptType::Long);
        ctx.push(FrameKind::Loop);
        assert!(ctx.in_loop());
        ctx.set("x", ScriptType::Double);
        ctx.set("k", ScriptType::String);
        ctx.pop();
        assert_eq!(ctx.lookup("x"), Some(ScriptType::Double));
        assert_eq!(ctx.lookup("k"), Some(ScriptType::String));
        assert!(!ctx.in_loop());
    }

    #[test]
    fn test_global_frame_survives_pop() {
        let mut ctx = TypeContext::new();
        ctx.set("x", ScriptType::Bool);
        ctx.pop();
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("x"), Some(ScriptType::Bool));
    }
}
