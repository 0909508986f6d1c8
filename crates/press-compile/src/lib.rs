//! Print-ready book compilation
//!
//! Pages are rendered to single-page PDF fragments in small batches, cached
//! by content version, and merged into one write-once book artifact.

pub mod config;
pub mod fingerprint;
pub mod fulfillment;
pub mod job;
pub mod merge;
pub mod orchestrator;
pub mod preflight;
pub mod provider;
pub mod render;
pub mod repository;
pub mod signing;
pub mod store;
pub mod types;

pub use config::CompileConfig;
pub use fingerprint::{ContentFingerprint, PageRef, UniquenessToken};
pub use job::{CompilationJob, FailureStage, JobId, JobStatus};
pub use merge::{BookMetadata, MergedBook, merge_book, merge_book_async};
pub use orchestrator::{
    BatchOutcome, BatchTrigger, CompileRequest, CompileResponse, MergeOutcome, Orchestrator,
};
pub use provider::{ElementKind, PageContentProvider, PageElement};
pub use render::{RasterizeError, Rasterizer, RenderGeometry, RenderRequest, RetryPolicy};
pub use repository::{FsJobRepository, JobRepository, MemoryJobRepository};
pub use signing::{CapabilityToken, TokenIssuer, UrlSigner};
pub use store::{
    ArtifactStore, CommittedBook, FsObjectStore, MemoryObjectStore, ObjectMetadata, ObjectStore,
    PutOutcome, StoreOp,
};
pub use types::*;

pub use press_layout;
