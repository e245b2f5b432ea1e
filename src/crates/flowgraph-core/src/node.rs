//! Node capability traits and the service container
//!
//! A node type is a value with a schema and a behavior: `configure` declares
//! sockets on a [`NodeBuilder`](crate::builder::NodeBuilder), `execute` runs
//! against a per-dispatch [`NodeContext`](crate::context::NodeContext).
//! Dispatch is a direct call through the definition's executor variant; there
//! is no reflection.
//!
//! Extension crates group their node types into a [`NodeModule`] and hand it
//! to the [`NodeRegistry`](crate::registry::NodeRegistry).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::builder::{NodeBuilder, NodeDefinition};
use crate::context::NodeContext;
use crate::error::Result;

/// A class-based node: schema plus behavior
///
/// One instance exists per canvas node per run. `on_created` runs exactly
/// once per (run, node) before the first `execute`; `execute` may run many
/// times for callable nodes. Instance fields need interior mutability if the
/// node keeps state across triggers.
#[async_trait]
pub trait GraphNode: Send + Sync + 'static {
    /// Declare metadata and sockets on the builder
    fn configure(builder: NodeBuilder) -> NodeBuilder
    where
        Self: Sized;

    /// One-time per-run initialization with access to injected services
    async fn on_created(&self, services: &ServiceContainer) -> Result<()> {
        let _ = services;
        Ok(())
    }

    /// Execute the node against its per-dispatch context
    async fn execute(&self, ctx: &NodeContext, cancel: &CancellationToken) -> Result<()>;
}

/// A named provider of node definitions
///
/// Discovery visits each module once and collects its definitions. Modules
/// are detachable: removing one rejects new nodes of its definitions while
/// runs already holding them complete normally.
pub trait NodeModule: Send + Sync {
    /// Stable module name, used in conflict diagnostics
    fn name(&self) -> &str;

    /// The definitions this module contributes
    fn definitions(&self) -> Vec<NodeDefinition>;
}

/// A node module built from a name and a list of definitions
pub struct StaticModule {
    name: String,
    definitions: Vec<NodeDefinition>,
}

impl StaticModule {
    /// Create a module from pre-built definitions
    pub fn new(name: impl Into<String>, definitions: Vec<NodeDefinition>) -> Self {
        Self {
            name: name.into(),
            definitions,
        }
    }
}

impl NodeModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn definitions(&self) -> Vec<NodeDefinition> {
        self.definitions.clone()
    }
}

/// Type-map service container injected into nodes
///
/// Holds one shared instance per type. Nodes fetch collaborators by type
/// through [`ServiceContainer::get`]; the engine itself stores nothing here.
#[derive(Default)]
pub struct ServiceContainer {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service instance, replacing any previous one of the type
    pub fn insert<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    /// Fetch a service by type
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Whether a service of the type is registered
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.services.len())
            .finish()
    }
}
