//! Session manager: the single active authenticated session
//!
//! Owns zero-or-one Session value. Authentication replaces any previous
//! session (cancelling its jobs); failed attempts mutate nothing. The
//! conversation context is a bounded FIFO of intent/result pairs.

use crate::error::AssistantError;
use crate::jobs::JobSupervisor;
use crate::models::{Intent, TaskResult, UserProfile};
use crate::profile::ProfileService;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Longest session title derived from the first utterance.
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on retained intent/result pairs; oldest evicted first.
    pub max_context_entries: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_context_entries: 50,
        }
    }
}

/// One dispatched intent and what came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub intent: Intent,
    pub result: TaskResult,
    pub recorded_at: DateTime<Utc>,
}

/// The authenticated, stateful context for one user's interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub started_at: DateTime<Utc>,
    /// Derived from the first utterance, like a chat title.
    pub title: Option<String>,
    context: VecDeque<ContextEntry>,
    active_jobs: Vec<Uuid>,
}

impl Session {
    pub fn new(profile: &UserProfile) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: profile.user_id.clone(),
            display_name: profile.display_name.clone(),
            started_at: Utc::now(),
            title: None,
            context: VecDeque::new(),
            active_jobs: Vec::new(),
        }
    }

    /// Append an entry, evicting the oldest when the bound is exceeded.
    pub fn append(&mut self, entry: ContextEntry, max_entries: usize) {
        if self.title.is_none() && !entry.intent.raw_text.trim().is_empty() {
            self.title = Some(derive_title(&entry.intent.raw_text));
        }

        self.context.push_back(entry);
        while self.context.len() > max_entries {
            self.context.pop_front();
        }
    }

    pub fn context(&self) -> impl Iterator<Item = &ContextEntry> {
        self.context.iter()
    }

    /// N most recent entries, newest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ContextEntry> {
        self.context.iter().rev().take(count)
    }

    pub fn context_len(&self) -> usize {
        self.context.len()
    }

    pub fn track_job(&mut self, job_id: Uuid) {
        if !self.active_jobs.contains(&job_id) {
            self.active_jobs.push(job_id);
        }
    }

    pub fn active_jobs(&self) -> &[Uuid] {
        &self.active_jobs
    }
}

fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    }
}

/// Tracks the single active session. Mutated only from the interactive
/// path; job workers report back over the notification channel instead.
pub struct SessionManager {
    profiles: ProfileService,
    jobs: JobSupervisor,
    active: RwLock<Option<Session>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(profiles: ProfileService, jobs: JobSupervisor) -> Self {
        Self::with_config(profiles, jobs, SessionConfig::default())
    }

    pub fn with_config(profiles: ProfileService, jobs: JobSupervisor, config: SessionConfig) -> Self {
        Self {
            profiles,
            jobs,
            active: RwLock::new(None),
            config,
        }
    }

    /// Authenticate a user. On success any previously active session is
    /// replaced and its jobs cancelled (single-session policy). A failed
    /// attempt returns AuthError and mutates nothing.
    pub async fn authenticate(&self, user_id: &str, credential: &str) -> Result<Session> {
        match self.profiles.verify(user_id, credential).await? {
            Err(auth_error) => {
                warn!(user_id, error = %auth_error, "authentication rejected");
                Err(auth_error.into())
            }
            Ok(profile) => {
                let session = Session::new(&profile);
                let replaced = {
                    let mut active = self.active.write().await;
                    active.replace(session.clone())
                };

                if let Some(old) = replaced {
                    info!(
                        old_session = %old.session_id,
                        new_session = %session.session_id,
                        "replacing active session"
                    );
                    self.jobs.cancel_all(old.active_jobs()).await;
                }

                info!(session_id = %session.session_id, user_id, "session started");
                Ok(session)
            }
        }
    }

    /// Destroy the active session and cancel its jobs. Returns false if
    /// no session was active.
    pub async fn logout(&self) -> bool {
        let old = {
            let mut active = self.active.write().await;
            active.take()
        };

        match old {
            Some(session) => {
                info!(session_id = %session.session_id, "session ended");
                self.jobs.cancel_all(session.active_jobs()).await;
                true
            }
            None => false,
        }
    }

    /// Snapshot of the active session, if any.
    pub async fn active_session(&self) -> Option<Session> {
        let active = self.active.read().await;
        active.clone()
    }

    /// Record an intent/result pair, evicting the oldest entry when the
    /// configured bound is exceeded. Errors if no session is active.
    pub async fn append_context(&self, intent: Intent, result: TaskResult) -> Result<()> {
        let mut active = self.active.write().await;
        let Some(session) = active.as_mut() else {
            return Err(AssistantError::Session(
                "no active session to record context against".to_string(),
            ));
        };

        session.append(
            ContextEntry {
                intent,
                result,
                recorded_at: Utc::now(),
            },
            self.config.max_context_entries,
        );
        Ok(())
    }

    /// Reference a job from the active session so logout/replacement can
    /// cancel it.
    pub async fn track_job(&self, job_id: Uuid) -> Result<()> {
        let mut active = self.active.write().await;
        let Some(session) = active.as_mut() else {
            return Err(AssistantError::Session(
                "no active session to track job against".to_string(),
            ));
        };
        session.track_job(job_id);
        Ok(())
    }

    /// Drop all retained context from the active session (system action).
    pub async fn clear_context(&self) -> Result<()> {
        let mut active = self.active.write().await;
        let Some(session) = active.as_mut() else {
            return Err(AssistantError::Session("no active session".to_string()));
        };
        session.context.clear();
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntentKind, JobKind, JobStatus};
    use crate::profile::InMemoryProfileStore;
    use std::sync::Arc;

    async fn manager_with_users(config: SessionConfig) -> (SessionManager, JobSupervisor) {
        let profiles = ProfileService::new(Arc::new(InMemoryProfileStore::new()));
        profiles
            .register("alice", "Alice", "correct-pw-123")
            .await
            .unwrap();
        profiles.register("bob", "Bob", "bobs-password").await.unwrap();

        let (jobs, _rx) = JobSupervisor::new();
        (
            SessionManager::with_config(profiles, jobs.clone(), config),
            jobs,
        )
    }

    fn chat_entry(text: &str) -> (Intent, TaskResult) {
        let intent = Intent::new(
            IntentKind::Chat,
            serde_json::json!({}),
            0.9,
            text.to_string(),
        );
        let result = TaskResult::chat(serde_json::json!({ "answer": "ok" }), "ok".to_string());
        (intent, result)
    }

    #[tokio::test]
    async fn test_failed_auth_mutates_nothing() {
        let (manager, _jobs) = manager_with_users(SessionConfig::default()).await;

        let before = manager.authenticate("alice", "correct-pw-123").await.unwrap();

        let err = manager.authenticate("alice", "wrong-pw").await.unwrap_err();
        assert!(matches!(
            err,
            AssistantError::Auth(crate::error::AuthError::InvalidCredential)
        ));

        let unknown = manager.authenticate("carol", "whatever").await.unwrap_err();
        assert!(matches!(
            unknown,
            AssistantError::Auth(crate::error::AuthError::UnknownUser(_))
        ));

        // The existing session survived both failed attempts.
        let active = manager.active_session().await.unwrap();
        assert_eq!(active.session_id, before.session_id);
    }

    #[tokio::test]
    async fn test_single_session_replacement_cancels_jobs() {
        let (manager, jobs) = manager_with_users(SessionConfig::default()).await;

        manager.authenticate("alice", "correct-pw-123").await.unwrap();

        let handle = jobs
            .submit(JobKind::FileAnalysis, async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(serde_json::Value::Null)
            })
            .await;
        manager.track_job(handle.job_id).await.unwrap();

        let bob_session = manager.authenticate("bob", "bobs-password").await.unwrap();

        let active = manager.active_session().await.unwrap();
        assert_eq!(active.session_id, bob_session.session_id);
        assert_eq!(active.user_id, "bob");

        // Not left Pending: the replaced session's job was cancelled.
        assert_eq!(jobs.poll(handle.job_id).await, Some(JobStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_context_bound_and_order() {
        let (manager, _jobs) =
            manager_with_users(SessionConfig { max_context_entries: 3 }).await;
        manager.authenticate("alice", "correct-pw-123").await.unwrap();

        for i in 0..5 {
            let (intent, result) = chat_entry(&format!("message {}", i));
            manager.append_context(intent, result).await.unwrap();
        }

        let session = manager.active_session().await.unwrap();
        assert_eq!(session.context_len(), 3);

        // Oldest evicted FIFO; survivors in call order.
        let texts: Vec<_> = session
            .context()
            .map(|entry| entry.intent.raw_text.clone())
            .collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn test_clear_context_drops_entries_and_needs_session() {
        let (manager, _jobs) = manager_with_users(SessionConfig::default()).await;

        // Nothing to clear without an active session.
        assert!(manager.clear_context().await.is_err());

        manager.authenticate("alice", "correct-pw-123").await.unwrap();
        let (intent, result) = chat_entry("hello");
        manager.append_context(intent, result).await.unwrap();

        manager.clear_context().await.unwrap();
        let session = manager.active_session().await.unwrap();
        assert_eq!(session.context_len(), 0);
    }

    #[tokio::test]
    async fn test_append_without_session_errors() {
        let (manager, _jobs) = manager_with_users(SessionConfig::default()).await;
        let (intent, result) = chat_entry("hello");
        assert!(manager.append_context(intent, result).await.is_err());
    }

    #[tokio::test]
    async fn test_logout_cancels_jobs() {
        let (manager, jobs) = manager_with_users(SessionConfig::default()).await;
        manager.authenticate("alice", "correct-pw-123").await.unwrap();

        let handle = jobs
            .submit(JobKind::SpeechCapture, async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(serde_json::Value::Null)
            })
            .await;
        manager.track_job(handle.job_id).await.unwrap();

        assert!(manager.logout().await);
        assert!(manager.active_session().await.is_none());
        assert_eq!(jobs.poll(handle.job_id).await, Some(JobStatus::Cancelled));

        // Idempotent-safe: nothing left to log out.
        assert!(!manager.logout().await);
    }

    #[tokio::test]
    async fn test_title_from_first_message() {
        let (manager, _jobs) = manager_with_users(SessionConfig::default()).await;
        manager.authenticate("alice", "correct-pw-123").await.unwrap();

        let (intent, result) =
            chat_entry("please summarize the quarterly report I uploaded yesterday");
        manager.append_context(intent, result).await.unwrap();

        let session = manager.active_session().await.unwrap();
        let title = session.title.unwrap();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }
}
