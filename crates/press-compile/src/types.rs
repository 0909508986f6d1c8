use crate::job::JobId;
use crate::preflight::Violation;
use press_layout::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Invalid trim size: {0}")]
    InvalidTrimSize(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Pre-flight validation blocked: {} critical violation(s)", .0.len())]
    ValidationBlocked(Vec<Violation>),
    #[error("Render failed for page {page_id}: {cause}")]
    RenderFailed { page_id: PageId, cause: String },
    #[error("Merge failed: {0}")]
    MergeFailed(#[from] MergeError),
    #[error("Immutability violation: artifact {key} already exists")]
    ImmutabilityViolation { key: String },
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: &'static str,
        to: &'static str,
    },
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Job repository error: {0}")]
    Repository(String),
    #[error("Content provider error: {0}")]
    Provider(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<LayoutError> for CompileError {
    fn from(err: LayoutError) -> Self {
        match err {
            LayoutError::InvalidTrimSize(key) => CompileError::InvalidTrimSize(key),
        }
    }
}

impl CompileError {
    /// Status code a request handler should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            CompileError::InvalidTrimSize(_) | CompileError::InvalidRequest(_) => 400,
            CompileError::JobNotFound(_) | CompileError::NotFound(_) => 404,
            CompileError::ValidationBlocked(_) => 422,
            _ => 500,
        }
    }
}

/// Errors raised while assembling the final book. All of them fail the job
/// as a whole.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Page fragment {index} contains no pages")]
    EmptyFragment { index: usize },
    #[error("No pages to merge")]
    NoPages,
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Editor-assigned page identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the scrapbook collection a book is compiled from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
