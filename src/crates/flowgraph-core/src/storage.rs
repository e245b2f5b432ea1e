//! Per-run keyed storage
//!
//! One [`RuntimeStorage`] exists per run and outlives every node instance in
//! it. It holds three things: socket values keyed `(node_id, socket_name)`,
//! the graph-variable map, and the generation-scoped executed set that gives
//! non-callable nodes their at-most-once guarantee.
//!
//! Reads are lock-free through `dashmap`; writes are per-key linearizable.
//! The executed set relies on `DashSet::insert` returning whether the value
//! was newly inserted, which is the compare-and-set that prevents double
//! entry under concurrent initiators.
//!
//! Generations exist for scoped sub-runs (group nodes, parallel loop
//! iterations). Ordinary loops are real loops in node code and never touch
//! the generation stack.

use std::sync::{Arc, RwLock};

use dashmap::{DashMap, DashSet};

use crate::model::SocketValue;

/// Keyed store of socket values, variables, and executed flags
pub struct RuntimeStorage {
    /// `(node_id, socket_name)` -> value
    values: DashMap<(String, String), SocketValue>,
    /// variable id -> value
    variables: DashMap<String, SocketValue>,
    /// Generation stack; the top set is the active scope
    executed: RwLock<Vec<Arc<DashSet<String>>>>,
    /// Parent scope for layered reads, if this is a child
    parent: Option<Arc<RuntimeStorage>>,
    /// Whether variable reads fall through to the parent
    inherit_variables: bool,
    /// Scope name, for diagnostics
    scope: String,
}

impl Default for RuntimeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeStorage {
    /// Create a root storage scope
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            variables: DashMap::new(),
            executed: RwLock::new(vec![Arc::new(DashSet::new())]),
            parent: None,
            inherit_variables: false,
            scope: "root".into(),
        }
    }

    /// Create a layered child scope
    ///
    /// Writes land in the child; socket reads fall through to the parent.
    /// Variable reads fall through only when `inherit_variables` is set.
    pub fn create_child(
        self: &Arc<Self>,
        scope: impl Into<String>,
        inherit_variables: bool,
    ) -> Arc<RuntimeStorage> {
        Arc::new(Self {
            values: DashMap::new(),
            variables: DashMap::new(),
            executed: RwLock::new(vec![Arc::new(DashSet::new())]),
            parent: Some(self.clone()),
            inherit_variables,
            scope: scope.into(),
        })
    }

    /// Scope name
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Read a socket value
    pub fn get(&self, node_id: &str, socket: &str) -> Option<SocketValue> {
        if let Some(value) = self
            .values
            .get(&(node_id.to_string(), socket.to_string()))
        {
            return Some(value.clone());
        }
        self.parent.as_ref()?.get(node_id, socket)
    }

    /// Whether a socket value is present in this scope or a parent
    pub fn contains(&self, node_id: &str, socket: &str) -> bool {
        self.get(node_id, socket).is_some()
    }

    /// Write a socket value into this scope
    pub fn set(&self, node_id: &str, socket: &str, value: SocketValue) {
        self.values
            .insert((node_id.to_string(), socket.to_string()), value);
    }

    /// Read a variable
    pub fn get_variable(&self, id: &str) -> Option<SocketValue> {
        if let Some(value) = self.variables.get(id) {
            return Some(value.clone());
        }
        if self.inherit_variables {
            return self.parent.as_ref()?.get_variable(id);
        }
        None
    }

    /// Write a variable into this scope
    pub fn set_variable(&self, id: &str, value: SocketValue) {
        self.variables.insert(id.to_string(), value);
    }

    /// Mark a node executed in the active generation
    ///
    /// Returns `true` when this call was the first in the generation; the
    /// atomicity of the underlying insert is the at-most-once guarantee.
    pub fn mark_executed(&self, node_id: &str) -> bool {
        self.active_generation().insert(node_id.to_string())
    }

    /// Whether a node has executed in the active generation
    pub fn is_executed(&self, node_id: &str) -> bool {
        self.active_generation().contains(node_id)
    }

    /// Push a generation, shadowing the executed set
    pub fn push_generation(&self) {
        self.executed
            .write()
            .expect("generation stack poisoned")
            .push(Arc::new(DashSet::new()));
    }

    /// Pop a generation, restoring the previous executed set
    ///
    /// The root generation is never popped.
    pub fn pop_generation(&self) {
        let mut stack = self.executed.write().expect("generation stack poisoned");
        if stack.len() > 1 {
            stack.pop();
        }
    }

    /// Depth of the generation stack
    pub fn generation_depth(&self) -> usize {
        self.executed.read().expect("generation stack poisoned").len()
    }

    fn active_generation(&self) -> Arc<DashSet<String>> {
        self.executed
            .read()
            .expect("generation stack poisoned")
            .last()
            .expect("generation stack never empty")
            .clone()
    }
}

impl std::fmt::Debug for RuntimeStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeStorage")
            .field("scope", &self.scope)
            .field("values", &self.values.len())
            .field("variables", &self.variables.len())
            .field("generations", &self.generation_depth())
            .finish()
    }
}
