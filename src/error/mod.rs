use thiserror::Error;

use crate::graph::OperationId;
use crate::operations::OperationKind;
use crate::thought::ThoughtId;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Payload error: {message}")]
    Payload { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Text-generation backend errors.
///
/// These never reach the graph engine directly: adapters retry them and
/// report a shortfall in the number of completions instead.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    ///
    /// Client errors other than rate limiting and undecodable bodies are final.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::InvalidResponse { .. } => false,
            BackendError::Unavailable { .. }
            | BackendError::Timeout { .. }
            | BackendError::Http(_) => true,
        }
    }
}

/// Structural errors in a graph of operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph has no operations")]
    Empty,

    #[error("Unknown operation: {id}")]
    UnknownOperation { id: OperationId },

    #[error("Operation {id} cannot be its own successor")]
    SelfLoop { id: OperationId },

    #[error("Duplicate edge: {from} -> {to}")]
    DuplicateEdge { from: OperationId, to: OperationId },

    #[error("Graph contains a cycle through operations {involved:?}")]
    Cycle { involved: Vec<OperationId> },

    #[error("Graph is not connected: operations {unreachable:?} are unreachable from {root}")]
    Disconnected {
        root: OperationId,
        unreachable: Vec<OperationId>,
    },
}

/// A contract violation raised by a single operation.
///
/// Carries enough context to diagnose the failure without backend
/// request or response bodies.
#[derive(Debug, Error)]
#[error(
    "{kind} operation {operation} [{parameters}] with {input_thoughts} input thoughts: {violation}"
)]
pub struct OperationError {
    /// The offending operation.
    pub operation: OperationId,
    /// Its kind.
    pub kind: OperationKind,
    /// Rendered static parameters of the operation.
    pub parameters: String,
    /// Number of thoughts the operation received from its predecessors.
    pub input_thoughts: usize,
    /// What went wrong.
    pub violation: ContractViolation,
}

/// Programming or configuration errors that halt a run.
#[derive(Debug, Error, PartialEq)]
pub enum ContractViolation {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("thought {thought_id} is missing required field '{field}'")]
    MissingField { thought_id: ThoughtId, field: String },

    #[error("parser returned {actual} scores for {expected} thoughts")]
    ScoreCountMismatch { expected: usize, actual: usize },

    #[error("no strategy registered for this operation kind")]
    MissingStrategy,

    #[error("operation requires at least one predecessor")]
    NoPredecessors,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for graph construction
pub type GraphResult<T> = Result<T, GraphError>;
