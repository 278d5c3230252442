// handles.rs - Session-owned table of host-held engine references
//
// Every ScriptValue and ScriptFunction indexes into this table instead of
// holding an engine reference itself. The session empties the table before
// its context goes away, so handles still alive in host code (or captured by
// bound receivers) turn inert rather than pinning engine objects.

use rquickjs::{Persistent, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub(crate) type HandleId = u64;

#[derive(Default)]
pub(crate) struct HandleTable {
    next_id: Cell<HandleId>,
    entries: RefCell<HashMap<HandleId, Persistent<Value<'static>>>>,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, value: Persistent<Value<'static>>) -> HandleId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().insert(id, value);
        id
    }

    /// A fresh reference to the entry, if it is still held.
    pub(crate) fn get(&self, id: HandleId) -> Option<Persistent<Value<'static>>> {
        self.entries.borrow().get(&id).cloned()
    }

    // Releasing a reference can finalize a bound receiver whose own handles
    // come back here, so entries always leave the table before they drop.
    pub(crate) fn remove(&self, id: HandleId) -> Option<Persistent<Value<'static>>> {
        self.entries.borrow_mut().remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Release every held reference.
    pub(crate) fn clear(&self) {
        let released = std::mem::take(&mut *self.entries.borrow_mut());
        if !released.is_empty() {
            tracing::debug!(count = released.len(), "releasing live handles");
        }
        drop(released);
    }
}
