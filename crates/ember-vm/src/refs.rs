//! Reference-counted storage for strings and host objects.

use std::collections::HashMap;
use std::sync::Arc;

use ember_host::ScriptObject;

use crate::error::{fail, RuntimeErrorCode, RuntimeResult};

#[derive(Debug, Clone)]
pub enum Payload {
    Str(String),
    Object(Arc<dyn ScriptObject>),
}

#[derive(Debug)]
struct Entry {
    payload: Payload,
    count: u32,
}

/// Fixed-capacity slot array with a free list.
///
/// A slot lives from the add-reference that takes its count from 0 to 1
/// until the release that drops it back to 0. Each distinct object (by `Arc`
/// pointer) occupies at most one slot; its `on_acquire` hook runs when the
/// slot is created and `on_release` when it is freed.
#[derive(Debug)]
pub struct ReferenceTable {
    slots: Vec<Option<Entry>>,
    free: Vec<u32>,
    capacity: usize,
    objects: HashMap<usize, u32>,
}

fn object_key(object: &Arc<dyn ScriptObject>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl ReferenceTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            objects: HashMap::new(),
        }
    }

    fn allocate(&mut self, payload: Payload) -> RuntimeResult<u32> {
        let entry = Some(Entry { payload, count: 1 });
        if let Some(h) = self.free.pop() {
            self.slots[h as usize] = entry;
            return Ok(h);
        }
        if self.slots.len() >= self.capacity {
            return fail(
                RuntimeErrorCode::ReferenceTableFull,
                format!("Reference table is full ({} slots)", self.capacity),
            );
        }
        self.slots.push(entry);
        Ok((self.slots.len() - 1) as u32)
    }

    /// Store a new string with one reference.
    pub fn insert_string(&mut self, s: String) -> RuntimeResult<u32> {
        self.allocate(Payload::Str(s))
    }

    /// Take one reference to `object`, reusing its slot when it already has
    /// one.
    pub fn acquire_object(&mut self, object: Arc<dyn ScriptObject>) -> RuntimeResult<u32> {
        let key = object_key(&object);
        if let Some(&h) = self.objects.get(&key) {
            self.add_ref(h)?;
            return Ok(h);
        }
        let hook = Arc::clone(&object);
        let h = self.allocate(Payload::Object(object))?;
        self.objects.insert(key, h);
        hook.on_acquire();
        Ok(h)
    }

    fn entry_mut(&mut self, h: u32) -> RuntimeResult<&mut Entry> {
        match self.slots.get_mut(h as usize).and_then(Option::as_mut) {
            Some(e) => Ok(e),
            None => fail(RuntimeErrorCode::InvalidReference, format!("Invalid reference handle {}", h)),
        }
    }

    pub fn add_ref(&mut self, h: u32) -> RuntimeResult<()> {
        let entry = self.entry_mut(h)?;
        entry.count += 1;
        Ok(())
    }

    /// Drop one reference, freeing the slot when it was the last.
    pub fn release(&mut self, h: u32) -> RuntimeResult<()> {
        let entry = self.entry_mut(h)?;
        entry.count -= 1;
        if entry.count > 0 {
            return Ok(());
        }
        if let Some(Entry { payload, .. }) = self.slots[h as usize].take() {
            self.free.push(h);
            if let Payload::Object(o) = payload {
                self.objects.remove(&object_key(&o));
                o.on_release();
            }
        }
        Ok(())
    }

    pub fn get(&self, h: u32) -> Option<&Payload> {
        self.slots.get(h as usize)?.as_ref().map(|e| &e.payload)
    }

    pub fn string(&self, h: u32) -> RuntimeResult<&str> {
        match self.get(h) {
            Some(Payload::Str(s)) => Ok(s),
            _ => fail(RuntimeErrorCode::InvalidReference, format!("Handle {} is not a string", h)),
        }
    }

    pub fn object(&self, h: u32) -> RuntimeResult<&Arc<dyn ScriptObject>> {
        match self.get(h) {
            Some(Payload::Object(o)) => Ok(o),
            _ => fail(RuntimeErrorCode::InvalidReference, format!("Handle {} is not an object", h)),
        }
    }

    pub fn count(&self, h: u32) -> Option<u32> {
        self.slots.get(h as usize)?.as_ref().map(|e| e.count)
    }

    /// Number of live slots.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Free every remaining slot, running release hooks, and return what was
    /// still alive.
    pub fn drain(&mut self) -> Vec<(u32, Payload)> {
        let mut leaked = Vec::new();
        for (h, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.take() {
                if let Payload::Object(o) = &entry.payload {
                    o.on_release();
                }
                leaked.push((h as u32, entry.payload));
            }
        }
        self.slots.clear();
        self.free.clear();
        self.objects.clear();
        leaked
    }
}
