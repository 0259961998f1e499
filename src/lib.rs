//! Desktop Assistant Intent Dispatch Core
//!
//! A local assistant core that:
//! - Accepts voice or text input (transcription behind a trait)
//! - Classifies user intent with a confidence threshold
//! - Dispatches each intent to exactly one registered handler
//! - Runs slow work as supervised, cancellable background jobs
//! - Keeps per-user profiles and a single bounded-context session
//!
//! INTERACTIVE LOOP:
//! INPUT → CLASSIFY → DISPATCH → HANDLE (sync or job) → RECORD → RESPOND

pub mod api;
pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod profile;
pub mod session;
pub mod transcription;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::{IntentClassifier, KeywordUnderstanding};
