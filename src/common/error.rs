//! Error taxonomy for the ingestion pipeline.
//!
//! Each component reports its own error type; the coordinator folds them
//! into [`PipelineError`], which is what callers of the intake API see.

use axum::http::StatusCode;
use std::io;
use std::path::PathBuf;

use crate::common::response::ApiError;

/// Failures of the on-disk storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("upload stream interrupted: {0}")]
    Stream(String),

    #[error("upload stream was empty")]
    Empty,

    #[error("upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },
}

impl StorageError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Failures of the durable catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Terminal failure reason of a transcode job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobFailure {
    /// Engine exited unsuccessfully or could not be started. Carries stderr.
    #[error("{0}")]
    Engine(String),

    #[error("engine reported success but {} is missing or lists no segments", .0.display())]
    MissingOutput(PathBuf),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("transcode worker dropped the job")]
    WorkerLost,
}

/// Error returned by the pipeline coordinator for a rejected request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Engine(JobFailure),

    #[error("timeout")]
    Timeout,

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl From<JobFailure> for PipelineError {
    fn from(failure: JobFailure) -> Self {
        match failure {
            JobFailure::Timeout => PipelineError::Timeout,
            other => PipelineError::Engine(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::Storage(_) => "StorageError",
            PipelineError::Engine(_) => "EngineError",
            PipelineError::Timeout => "TimeoutError",
            PipelineError::Catalog(_) => "CatalogError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Storage(StorageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Storage(StorageError::Empty) => StatusCode::BAD_REQUEST,
            PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(format!("{}: {}", err.kind(), err), err.status_code())
    }
}
