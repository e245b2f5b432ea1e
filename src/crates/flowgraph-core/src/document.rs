//! Persisted graph documents
//!
//! The JSON document shape carries what the engine needs plus editor-only
//! geometry (positions, sizes, overlays) that round-trips opaquely. Loading
//! resolves every `definition_id` against the registry; unknown definitions
//! produce warnings and their nodes are kept as non-executable placeholders
//! excluded from the executable projection.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::model::{ConnectionData, GraphData, GraphEvent, GraphVariable, NodeData};
use crate::registry::NodeRegistry;
use crate::variables;

/// Current document schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Canvas position of a node; opaque to the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Canvas size of a node; opaque to the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// A node with its editor geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasNode {
    /// The node itself
    pub data: NodeData,
    /// Editor position
    #[serde(default)]
    pub position: Point,
    /// Editor size
    #[serde(default)]
    pub size: Size,
}

/// The persisted graph document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    /// Format version for migrations
    pub schema_version: u32,
    /// Nodes with geometry
    pub nodes: Vec<CanvasNode>,
    /// All connections
    #[serde(default)]
    pub connections: Vec<ConnectionData>,
    /// Declared variables
    #[serde(default)]
    pub variables: Vec<GraphVariable>,
    /// Declared events
    #[serde(default)]
    pub events: Vec<GraphEvent>,
    /// Editor overlays (comments, frames); opaque to the engine
    #[serde(default)]
    pub overlays: Vec<Value>,
}

/// Result of projecting a document into executable form
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The executable projection
    pub graph: GraphData,
    /// Node ids kept out of execution because their definition is unknown
    pub placeholders: Vec<String>,
    /// Human-readable load warnings
    pub warnings: Vec<String>,
}

impl GraphDocument {
    /// Wrap an executable graph in a fresh document
    pub fn from_graph(graph: GraphData) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            nodes: graph
                .nodes
                .into_iter()
                .map(|data| CanvasNode {
                    data,
                    position: Point::default(),
                    size: Size::default(),
                })
                .collect(),
            connections: graph.connections,
            variables: graph.variables,
            events: graph.events,
            overlays: Vec::new(),
        }
    }

    /// Parse a document from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize the document to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Project into executable form against a registry
    ///
    /// Nodes whose `definition_id` resolves nothing (and is not a
    /// variable/event form) become placeholders: they stay in the document
    /// but are excluded from the projection along with their connections.
    pub fn resolve(&self, registry: &NodeRegistry) -> LoadOutcome {
        let mut warnings = Vec::new();
        let mut placeholders = Vec::new();

        if self.schema_version > SCHEMA_VERSION {
            warnings.push(format!(
                "document schema version {} is newer than supported version {}",
                self.schema_version, SCHEMA_VERSION
            ));
        }

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for canvas in &self.nodes {
            let node = &canvas.data;
            let known = variables::recognize(&node.definition_id).is_some()
                || registry.resolve_by_id(&node.definition_id).is_some()
                || registry.resolve_by_name(&node.name).is_some();
            if known {
                nodes.push(node.clone());
            } else {
                warn!(node = %node.name, definition = %node.definition_id, "unknown definition; keeping placeholder");
                warnings.push(format!(
                    "node '{}' references unknown definition '{}' and will not execute",
                    node.name, node.definition_id
                ));
                placeholders.push(node.id.clone());
            }
        }

        let connections = self
            .connections
            .iter()
            .filter(|c| {
                !placeholders.contains(&c.output_node_id) && !placeholders.contains(&c.input_node_id)
            })
            .cloned()
            .collect();

        LoadOutcome {
            graph: GraphData {
                nodes,
                connections,
                variables: self.variables.clone(),
                events: self.events.clone(),
            },
            placeholders,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::node::StaticModule;
    use serde_json::json;

    fn registry_with(defs: Vec<crate::builder::NodeDefinition>) -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register_module(&StaticModule::new("test", defs))
            .unwrap();
        registry
    }

    fn start_definition() -> crate::builder::NodeDefinition {
        NodeBuilder::new("flow.start")
            .name("Start")
            .execution_initiator()
            .on_execute(|_ctx, _cancel| Box::pin(async { Ok(()) }))
            .build()
    }

    #[test]
    fn test_document_round_trip() {
        let registry = registry_with(vec![start_definition()]);
        let graph = GraphData {
            nodes: vec![registry.resolve_by_id("flow.start").unwrap().create_node()],
            ..Default::default()
        };
        let document = GraphDocument::from_graph(graph);

        let text = document.to_json().unwrap();
        let back = GraphDocument::from_json(&text).unwrap();
        assert_eq!(back.schema_version, SCHEMA_VERSION);
        assert_eq!(back.nodes.len(), 1);
        assert_eq!(back.nodes[0].data.definition_id, "flow.start");
    }

    #[test]
    fn test_schema_version_serializes_camel_case() {
        let document = GraphDocument::from_graph(GraphData::default());
        let value: Value = serde_json::from_str(&document.to_json().unwrap()).unwrap();
        assert_eq!(value["schemaVersion"], json!(SCHEMA_VERSION));
    }

    #[test]
    fn test_unknown_definition_becomes_placeholder() {
        let registry = registry_with(vec![start_definition()]);

        let known = registry.resolve_by_id("flow.start").unwrap().create_node();
        let unknown = NodeData {
            id: "ghost".into(),
            name: "Ghost".into(),
            definition_id: "missing.def".into(),
            callable: true,
            exec_init: false,
            inputs: vec![],
            outputs: vec![],
        };
        let mut document = GraphDocument::from_graph(GraphData {
            nodes: vec![known.clone(), unknown],
            ..Default::default()
        });
        document.connections = vec![ConnectionData::execution(
            known.id.clone(),
            "Exit",
            "ghost",
            "Enter",
        )];

        let outcome = document.resolve(&registry);
        assert_eq!(outcome.placeholders, vec!["ghost".to_string()]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.graph.nodes.len(), 1);
        assert!(outcome.graph.connections.is_empty());
        // The document itself still carries the placeholder node.
        assert_eq!(document.nodes.len(), 2);
    }

    #[test]
    fn test_variable_nodes_need_no_registry_entry() {
        let registry = registry_with(vec![]);
        let node = NodeData {
            id: "n1".into(),
            name: "Get count".into(),
            definition_id: "variable.get.v1".into(),
            callable: false,
            exec_init: false,
            inputs: vec![],
            outputs: vec![],
        };
        let document = GraphDocument::from_graph(GraphData {
            nodes: vec![node],
            ..Default::default()
        });

        let outcome = document.resolve(&registry);
        assert!(outcome.placeholders.is_empty());
        assert_eq!(outcome.graph.nodes.len(), 1);
    }
}
