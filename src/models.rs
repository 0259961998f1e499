//! Core data models for the assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Chat,
    FileAnalysis,
    SystemAction,
    Unknown,
}

impl IntentKind {
    /// Kinds a handler can be registered for. Unknown is never dispatched.
    pub const DISPATCHABLE: &'static [IntentKind] = &[
        IntentKind::Chat,
        IntentKind::FileAnalysis,
        IntentKind::SystemAction,
    ];
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentKind::Chat => "chat",
            IntentKind::FileAnalysis => "file_analysis",
            IntentKind::SystemAction => "system_action",
            IntentKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Structured representation of what the user wants, derived from raw input.
/// Created per input event by the classifier; immutable; consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intent_id: Uuid,
    pub kind: IntentKind,
    /// JSON object of handler parameters (e.g. {"path": "doc.pdf"})
    pub parameters: Value,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

impl Intent {
    pub fn new(kind: IntentKind, parameters: Value, confidence: f32, raw_text: String) -> Self {
        Self {
            intent_id: Uuid::new_v4(),
            kind,
            parameters,
            confidence: confidence.clamp(0.0, 1.0),
            raw_text,
            created_at: Utc::now(),
        }
    }

    /// Low-confidence or unintelligible input that must not be dispatched.
    pub fn unknown(raw_text: String, confidence: f32) -> Self {
        Self::new(
            IntentKind::Unknown,
            Value::Object(serde_json::Map::new()),
            confidence,
            raw_text,
        )
    }
}

//
// ================= Task Result =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Chat,
    Analysis,
    Action,
    /// Asynchronous work accepted; carries the job id.
    Pending,
    /// Unknown intent short-circuited without touching a handler.
    Clarification,
    /// A handler fault caught at the dispatch boundary.
    HandlerError,
}

/// What the dispatcher emits to the output channel. The presentation
/// layer renders it; no rendering logic lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub kind: ResultKind,
    pub payload: Value,
    /// Human-readable detail, always present on failures.
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    fn make(kind: ResultKind, payload: Value, detail: String, job_id: Option<Uuid>) -> Self {
        Self {
            kind,
            payload,
            detail,
            job_id,
            created_at: Utc::now(),
        }
    }

    pub fn chat(payload: Value, detail: String) -> Self {
        Self::make(ResultKind::Chat, payload, detail, None)
    }

    pub fn analysis(payload: Value, detail: String) -> Self {
        Self::make(ResultKind::Analysis, payload, detail, None)
    }

    pub fn action(payload: Value, detail: String) -> Self {
        Self::make(ResultKind::Action, payload, detail, None)
    }

    pub fn pending(job: &JobHandle) -> Self {
        Self::make(
            ResultKind::Pending,
            serde_json::json!({ "job_id": job.job_id, "kind": job.kind }),
            format!("{} job accepted", job.kind),
            Some(job.job_id),
        )
    }

    pub fn clarification(raw_text: &str) -> Self {
        Self::make(
            ResultKind::Clarification,
            serde_json::json!({ "raw_text": raw_text }),
            "I didn't catch that. Could you rephrase?".to_string(),
            None,
        )
    }

    pub fn handler_error(detail: String) -> Self {
        Self::make(ResultKind::HandlerError, Value::Null, detail, None)
    }
}

//
// ================= Jobs =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FileAnalysis,
    SpeechCapture,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::FileAnalysis => "file_analysis",
            JobKind::SpeechCapture => "speech_capture",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are absorbing: no transition may leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Tracking record for asynchronous handler work. Mutated only by the
/// Job Supervisor; sessions reference it by job_id, never own it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_or_error: Option<Value>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            result_or_error: None,
            submitted_at: now,
            updated_at: now,
        }
    }
}

/// Completion/failure event pushed to the interactive loop over the
/// notification channel. Workers never mutate the session directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNotification {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_or_error: Option<Value>,
}

//
// ================= Profile =================
//

/// Durable per-user record. Owned exclusively by the profile store;
/// mutated only on credential update, never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}
