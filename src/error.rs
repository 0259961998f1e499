//! Error types for the assistant core

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Authentication failures. Recoverable: the caller re-prompts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,

    #[error("unknown user: {0}")]
    UnknownUser(String),
}

/// Speech service failures. Recoverable: the caller re-prompts for input.
#[derive(Error, Debug, Clone)]
pub enum TranscriptionError {
    #[error("no speech detected")]
    NoSpeechDetected,

    #[error("speech service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// File analysis failures, surfaced through the JobHandle.
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("read failure: {0}")]
    ReadFailure(String),
}

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("job error: {0}")]
    Job(String),

    #[error("understanding service error: {0}")]
    Understanding(String),

    #[error("profile store error: {0}")]
    Profile(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
