use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{DebugObject, DebugValue};

/// What a `variablesReference` stands for.
#[derive(Clone)]
pub enum RefEntry {
    /// A scope captured by a `scopes` request; its variables are the snapshot taken then.
    Scope {
        frame_index: usize,
        scope_index: usize,
        variables: Vec<(String, DebugValue)>,
    },
    Object(Arc<dyn DebugObject>),
}

/// Handles for lazily expanded values, valid for a single stop.
///
/// Owned by the protocol thread. Ids start at 1 and are never reused until [`RefTable::clear`].
#[derive(Default)]
pub struct RefTable {
    last_id: i64,
    entries: HashMap<i64, RefEntry>,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entry: RefEntry) -> i64 {
        self.last_id += 1;
        self.entries.insert(self.last_id, entry);
        self.last_id
    }

    pub fn add_scope(&mut self, frame_index: usize, scope_index: usize, variables: Vec<(String, DebugValue)>) -> i64 {
        self.insert(RefEntry::Scope {
            frame_index,
            scope_index,
            variables,
        })
    }

    pub fn add_object(&mut self, object: Arc<dyn DebugObject>) -> i64 {
        self.insert(RefEntry::Object(object))
    }

    pub fn get(&self, id: i64) -> Option<&RefEntry> {
        self.entries.get(&id)
    }

    /// Keeps a scope snapshot in step with a successful `setVariable`. Object handles read
    /// through to the live object and need no update.
    pub fn update_scope_variable(&mut self, id: i64, name: &str, value: DebugValue) {
        if let Some(RefEntry::Scope { variables, .. }) = self.entries.get_mut(&id) {
            if let Some(slot) = variables.iter_mut().find(|(key, _)| key == name) {
                slot.1 = value;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every handle and restarts numbering.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_id = 0;
    }
}
