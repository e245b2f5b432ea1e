//! Headless graph runner
//!
//! A thin façade for running persisted graphs without an editor: project
//! the document, validate, and hand the executable graph to the service.
//! Used by the CLI, tests, and automation layers.

use std::sync::Arc;

use tracing::warn;

use crate::document::GraphDocument;
use crate::error::Result;
use crate::model::{GraphData, SocketValue};
use crate::service::{ExecutionService, RunParams, RunResult};
use crate::validate::{GraphValidator, ValidationReport};

/// Outcome of a headless run attempt
#[derive(Debug)]
pub enum RunOutcome {
    /// The validator rejected the graph; nothing executed
    Rejected(ValidationReport),
    /// The graph executed; the result may still carry a fault
    Finished(RunResult),
}

impl RunOutcome {
    /// Collapse into a plain result, turning rejection into
    /// [`EngineError::Validation`](crate::error::EngineError::Validation)
    pub fn into_result(self) -> Result<RunResult> {
        match self {
            Self::Rejected(report) => {
                let message = report
                    .first_error()
                    .map(|d| d.message.clone())
                    .unwrap_or_else(|| "graph rejected".into());
                Err(crate::error::EngineError::Validation(message))
            }
            Self::Finished(result) => Ok(result),
        }
    }
}

/// Document-in, result-out driver
pub struct HeadlessRunner {
    service: Arc<ExecutionService>,
}

impl HeadlessRunner {
    /// Create a runner over a service
    pub fn new(service: Arc<ExecutionService>) -> Self {
        Self { service }
    }

    /// The underlying service
    pub fn service(&self) -> &Arc<ExecutionService> {
        &self.service
    }

    /// Validate a document without executing it
    pub fn validate(&self, document: &GraphDocument) -> ValidationReport {
        let outcome = document.resolve(self.service.registry());
        GraphValidator::validate(&outcome.graph.nodes, &outcome.graph.connections)
    }

    /// Run a parsed document
    ///
    /// Placeholder nodes are excluded with warnings; a graph the validator
    /// rejects never reaches the runtime.
    pub async fn run_document(&self, document: &GraphDocument, params: RunParams) -> RunOutcome {
        let outcome = document.resolve(self.service.registry());
        for warning in &outcome.warnings {
            warn!("{warning}");
        }

        let report = GraphValidator::validate(&outcome.graph.nodes, &outcome.graph.connections);
        if report.has_errors() {
            return RunOutcome::Rejected(report);
        }

        RunOutcome::Finished(self.service.execute(&outcome.graph, params).await)
    }

    /// Run a document from a JSON string
    pub async fn run_json(&self, text: &str, params: RunParams) -> Result<RunOutcome> {
        let document = GraphDocument::from_json(text)?;
        Ok(self.run_document(&document, params).await)
    }

    /// Run an already-projected graph
    pub async fn run_graph(&self, graph: &GraphData, params: RunParams) -> RunOutcome {
        let report = GraphValidator::validate(&graph.nodes, &graph.connections);
        if report.has_errors() {
            return RunOutcome::Rejected(report);
        }
        RunOutcome::Finished(self.service.execute(graph, params).await)
    }
}

/// Override variable defaults by variable name
///
/// Values parse as JSON when possible and fall back to plain strings, so
/// `--set count=3` and `--set name=world` both do what they look like.
pub fn apply_variable_overrides(graph: &mut GraphData, overrides: &[(String, String)]) {
    for (name, raw) in overrides {
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));
        match graph.variables.iter_mut().find(|v| &v.name == name) {
            Some(variable) => {
                variable.default_value =
                    Some(SocketValue::new(variable.type_name.clone(), value));
            }
            None => warn!(variable = %name, "override ignored; no such graph variable"),
        }
    }
}
