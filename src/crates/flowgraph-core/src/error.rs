//! Error types for graph validation and execution
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! EngineError
//! ├── Validation          - Graph rejected by the validator
//! ├── DefinitionConflict  - Duplicate definition id within a module
//! ├── DefinitionMissing   - Node's definition_id unresolvable at run time
//! ├── NodeNotFound        - Dispatch target unknown to the runtime
//! ├── NoImplementation    - Definition has neither class nor inline executor
//! ├── DataCycle           - Runtime fallback for cyclic data resolution
//! ├── ExecDepthExceeded   - Exec-flow cycle hit the call-depth guard
//! ├── Cancelled           - Cancellation token tripped
//! ├── Node                - User fault raised inside a node body
//! ├── Serialization       - JSON (de)serialization failures
//! └── Io                  - File I/O around graph load/store
//! ```
//!
//! Validation problems and `DefinitionMissing` abort a run before any node
//! executes. A `Node` fault or `ExecDepthExceeded` fails the initiator whose
//! tree contains it; concurrent initiators are cancelled through the shared
//! token and surface as `Cancelled`.

use thiserror::Error;

/// Convenience result type using [`EngineError`]
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type for all engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Graph rejected by the validator; execution never started
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A module tried to register two definitions with the same id
    #[error("definition '{id}' registered twice by module '{module}'")]
    DefinitionConflict {
        /// Conflicting definition id
        id: String,
        /// Module that supplied the duplicate
        module: String,
    },

    /// A node's `definition_id` (and display-name fallback) resolved nothing
    #[error("node '{node}' references unknown definition '{definition_id}'")]
    DefinitionMissing {
        /// Node whose definition is missing
        node: String,
        /// The unresolvable definition id
        definition_id: String,
    },

    /// A dispatch targeted a node id the runtime does not know
    #[error("node '{0}' not found in graph")]
    NodeNotFound(String),

    /// The resolved definition carries no executor of any kind
    #[error("definition '{0}' has no executor")]
    NoImplementation(String),

    /// Cyclic data dependency discovered during lazy resolution
    ///
    /// Normally prevented by validation; this is the runtime defense. The
    /// path lists the nodes from the resolution root to the back edge.
    #[error("data cycle during input resolution: {}", path.join(" -> "))]
    DataCycle {
        /// Resolution path ending at the revisited node
        path: Vec<String>,
    },

    /// The call-depth guard tripped, usually on an execution-flow cycle
    #[error("call depth limit {limit} exceeded at node '{node}'")]
    ExecDepthExceeded {
        /// Node whose dispatch crossed the limit
        node: String,
        /// Configured limit
        limit: usize,
    },

    /// Cancellation token tripped; the run unwound cleanly
    #[error("execution cancelled")]
    Cancelled,

    /// Error raised by user code inside a node body
    #[error("node '{node}' failed: {error}")]
    Node {
        /// Name of the failing node
        node: String,
        /// Error message from the node body
        error: String,
    },

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error around graph load/store
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a user-fault error with node context
    pub fn node(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Node {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create a missing-definition error
    pub fn definition_missing(node: impl Into<String>, definition_id: impl Into<String>) -> Self {
        Self::DefinitionMissing {
            node: node.into(),
            definition_id: definition_id.into(),
        }
    }

    /// Stable kind tag for events and run results
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::DefinitionConflict { .. } => ErrorKind::DefinitionConflict,
            Self::DefinitionMissing { .. } => ErrorKind::DefinitionMissing,
            Self::NodeNotFound(_) => ErrorKind::NodeNotFound,
            Self::NoImplementation(_) => ErrorKind::NoImplementation,
            Self::DataCycle { .. } => ErrorKind::DataCycle,
            Self::ExecDepthExceeded { .. } => ErrorKind::ExecDepthExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Node { .. } => ErrorKind::UserFault,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Discriminant-only view of [`EngineError`], carried on failure events
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DefinitionConflict,
    DefinitionMissing,
    NodeNotFound,
    NoImplementation,
    DataCycle,
    ExecDepthExceeded,
    Cancelled,
    UserFault,
    Serialization,
    Io,
}
