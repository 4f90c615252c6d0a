//! Error taxonomy for the generation pipeline.
//!
//! Only a small set of errors is allowed to escape the orchestrator and fail
//! an assignment: missing source content, a generation backend that stays
//! down through its retries, and storage violations. Decode problems and
//! media-synthesis problems are absorbed locally as fallbacks/placeholders
//! and never appear here.

use thiserror::Error;

/// Storage-level failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The (assignment, variant_type) pair already has a persisted variant.
    #[error("variant '{variant_type}' already exists for assignment {assignment_id}")]
    DuplicateVariant {
        assignment_id: String,
        variant_type: String,
    },

    /// Referenced assignment does not exist.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),

    /// Referenced variant does not exist.
    #[error("variant not found: {0}")]
    VariantNotFound(String),
}

/// Errors that can escape the orchestrator and mark an assignment `failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither raw text nor a readable source file yielded any content.
    #[error("no content found in assignment")]
    NoContent,

    /// The generation backend failed after its bounded retries.
    #[error("generation backend error: {0}")]
    Backend(String),

    /// No generation backend is configured (missing API key).
    #[error("generation backend unavailable (no API key configured)")]
    BackendUnavailable,

    /// Storage error (uniqueness violation, missing record).
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Scratch-directory or artifact I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Regeneration requested for a variant type we do not support.
    #[error("regeneration not supported for variant type: {0}")]
    UnsupportedVariant(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
