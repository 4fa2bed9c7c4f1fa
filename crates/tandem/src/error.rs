//! Error taxonomy for handler runs.

use crate::batch_result::BatchResult;
use crate::response::Response;

/// A required operation failed and the run was aborted.
#[derive(Debug, Clone)]
pub struct RequiredFailure {
    /// Position of the failing batch in the queue.
    pub batch_index: usize,
    /// The failing batch, with successes and errors in submission order.
    pub batch: BatchResult,
    /// Results of the batches that completed before the failing one.
    pub completed: Vec<Response>,
}

/// One or more optional operations failed but every batch ran.
#[derive(Debug, Clone)]
pub struct OptionalFailure {
    /// Accumulated results of the whole run, errors kept in place.
    pub results: Response,
    /// Indices of the batches that recorded optional errors.
    pub failed_batches: Vec<usize>,
    /// Total optional errors across the run.
    pub error_count: usize,
}

/// Errors surfaced by a [`RequestsHandler`](crate::RequestsHandler).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("one or many required requests failed (batch {})", .0.batch_index)]
    RequiredFailure(RequiredFailure),

    #[error("one or many optional requests failed ({} errors)", .0.error_count)]
    OptionalFailure(OptionalFailure),

    #[error("group '{0}' already exists")]
    DuplicateGroup(String),

    #[error("handler configuration error: {0}")]
    Configuration(String),

    /// Batch counters disagree with each other. Should be unreachable.
    #[error("an unknown requests handler error occurred: {0}")]
    Unknown(String),
}

impl EngineError {
    /// Soft failure: the run completed and carries partial data.
    pub fn is_warning(&self) -> bool {
        matches!(self, EngineError::OptionalFailure(_))
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_warning()
    }

    /// Whatever results the failing run produced, if any.
    pub fn partial_results(&self) -> Option<Response> {
        match self {
            EngineError::RequiredFailure(failure) => Some(failure.batch.to_response()),
            EngineError::OptionalFailure(failure) => Some(failure.results.clone()),
            EngineError::DuplicateGroup(_)
            | EngineError::Configuration(_)
            | EngineError::Unknown(_) => None,
        }
    }
}

/// Result type for handler operations.
pub type EngineResult<T> = Result<T, EngineError>;
