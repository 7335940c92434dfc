//! Error types for the core.
//!
//! Only `StoreError` and `TranscriptionError` ever reach a caller. Extraction and
//! scoring errors are recovered inside the parser and the scorer.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("audio is empty")]
    Empty,

    #[error("speech could not be understood")]
    Unintelligible,

    #[error("transcription service failed: {0}")]
    Service(String),
}

/// Why an extractor's output was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("extractor failed: {0}")]
    Collaborator(String),

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("type must be \"task\" or \"event\", got {0:?}")]
    InvalidKind(String),

    #[error("title is missing or empty")]
    EmptyTitle,
}

/// Why an assisted scoring response was discarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("scorer failed: {0}")]
    Collaborator(String),

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("task {0} missing from scores")]
    MissingId(String),

    #[error("task {0} scored more than once")]
    DuplicateId(String),

    #[error("score for unknown task {0}")]
    UnknownId(String),

    #[error("score for task {0} is not a finite number")]
    NonNumericScore(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}
