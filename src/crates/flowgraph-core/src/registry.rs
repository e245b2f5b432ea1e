//! Node definition discovery and lookup
//!
//! The registry owns every [`NodeDefinition`] for the process lifetime.
//! Modules register during startup; afterwards the registry is effectively
//! frozen for any given run, which holds `Arc`s to the definitions it uses.
//!
//! Resolution is id-first. Display-name lookup exists as a compatibility
//! fallback for graphs persisted without definition ids; when several
//! definitions share a name, the first registered wins and a warning is
//! logged.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::builder::NodeDefinition;
use crate::error::{EngineError, Result};
use crate::node::NodeModule;

/// Process-lifetime registry of node definitions
#[derive(Default)]
pub struct NodeRegistry {
    /// Definitions in registration order; the order is the name-collision
    /// tie-break and the base for the sorted listing
    ordered: Vec<Arc<NodeDefinition>>,
    /// id -> index into `ordered`
    by_id: HashMap<String, usize>,
    /// module name -> definition ids it contributed
    modules: HashMap<String, Vec<String>>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect all definitions from a module
    ///
    /// A duplicate id within the module or against an already-registered
    /// module is a [`EngineError::DefinitionConflict`]; definitions
    /// registered before the conflicting one stay registered.
    pub fn register_module(&mut self, module: &dyn NodeModule) -> Result<()> {
        let module_name = module.name().to_string();
        let mut ids = Vec::new();

        for definition in module.definitions() {
            if self.by_id.contains_key(&definition.id) {
                return Err(EngineError::DefinitionConflict {
                    id: definition.id,
                    module: module_name,
                });
            }
            debug!(definition = %definition.id, module = %module_name, "registering node definition");
            ids.push(definition.id.clone());
            self.by_id.insert(definition.id.clone(), self.ordered.len());
            self.ordered.push(Arc::new(definition));
        }

        self.modules.entry(module_name).or_default().extend(ids);
        Ok(())
    }

    /// Detach a module's definitions
    ///
    /// New nodes of those definitions are rejected from now on; runs already
    /// holding the `Arc`s complete normally.
    pub fn remove_module(&mut self, module_name: &str) {
        let Some(ids) = self.modules.remove(module_name) else {
            return;
        };
        for id in &ids {
            if let Some(index) = self.by_id.remove(id) {
                // Tombstone rather than shift: keeps stored indices stable.
                self.ordered[index] = Arc::new(NodeDefinition::placeholder(
                    id.clone(),
                    self.ordered[index].name.clone(),
                ));
            }
        }
        debug!(module = %module_name, removed = ids.len(), "module removed");
    }

    /// Primary lookup by definition id
    pub fn resolve_by_id(&self, id: &str) -> Option<Arc<NodeDefinition>> {
        self.by_id.get(id).map(|&i| self.ordered[i].clone())
    }

    /// Whether `ordered[index]` is the live entry for its id (tombstones
    /// from `remove_module` and re-registered ids fail this)
    fn is_live(&self, index: usize, definition: &NodeDefinition) -> bool {
        self.by_id.get(&definition.id) == Some(&index)
    }

    /// Fallback lookup by display name
    ///
    /// Picks the first definition in registration order; logs a warning
    /// because name resolution is ambiguous by construction.
    pub fn resolve_by_name(&self, name: &str) -> Option<Arc<NodeDefinition>> {
        let found = self
            .ordered
            .iter()
            .enumerate()
            .find(|(i, d)| d.name == name && self.is_live(*i, d))
            .map(|(_, d)| d)?;
        warn!(
            name = %name,
            definition = %found.id,
            "resolved node definition by display name; persist definition ids to avoid ambiguity"
        );
        Some(found.clone())
    }

    /// All live definitions, ordered (category, name, id) for stable UI lists
    pub fn definitions(&self) -> Vec<Arc<NodeDefinition>> {
        let mut list: Vec<_> = self
            .ordered
            .iter()
            .enumerate()
            .filter(|(i, d)| self.is_live(*i, d))
            .map(|(_, d)| d.clone())
            .collect();
        list.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    /// Number of live definitions
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the registry has no live definitions
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("definitions", &self.by_id.len())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
