//! Task dispatcher
//!
//! Routes a classified intent to exactly one handler and records the
//! exchange in the active session. Handler faults stop at this boundary:
//! they become `HandlerError` results, never errors that kill the
//! interactive loop.

use crate::error::AssistantError;
use crate::handlers::HandlerRegistry;
use crate::jobs::JobSupervisor;
use crate::models::{Intent, IntentKind, JobKind, TaskResult};
use crate::session::SessionManager;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TaskDispatcher {
    registry: Arc<HandlerRegistry>,
    sessions: Arc<SessionManager>,
    jobs: JobSupervisor,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        sessions: Arc<SessionManager>,
        jobs: JobSupervisor,
    ) -> Self {
        Self {
            registry,
            sessions,
            jobs,
        }
    }

    /// Checks at startup that every dispatchable intent kind has a
    /// registered handler.
    pub fn validate_registry(&self) -> Result<()> {
        for kind in IntentKind::DISPATCHABLE {
            if self.registry.resolve(*kind).is_none() {
                return Err(AssistantError::Configuration(format!(
                    "no handler registered for intent kind '{}'",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Dispatch a single intent and return its result. Requires an
    /// active session; the (intent, result) pair is appended to the
    /// session context before returning.
    pub async fn dispatch(&self, intent: Intent) -> Result<TaskResult> {
        let session = self
            .sessions
            .active_session()
            .await
            .ok_or_else(|| AssistantError::Session("no active session".to_string()))?;

        info!(
            intent_id = %intent.intent_id,
            kind = %intent.kind,
            confidence = intent.confidence,
            "dispatching intent"
        );

        let result = match intent.kind {
            IntentKind::Unknown => TaskResult::clarification(&intent.raw_text),
            kind => {
                let handler = self.registry.resolve(kind).ok_or_else(|| {
                    AssistantError::Configuration(format!(
                        "no handler registered for intent kind '{}'",
                        kind
                    ))
                })?;

                if handler.is_synchronous() {
                    // Run on a spawned task so a panicking handler is
                    // caught instead of unwinding through the loop.
                    let parameters = intent.parameters.clone();
                    let snapshot = session.clone();
                    let joined = tokio::spawn(async move {
                        handler.execute(&parameters, &snapshot).await
                    })
                    .await;

                    match joined {
                        Ok(Ok(result)) => result,
                        Ok(Err(e)) => {
                            warn!(intent_id = %intent.intent_id, error = %e, "handler failed");
                            TaskResult::handler_error(e.to_string())
                        }
                        Err(e) => {
                            warn!(intent_id = %intent.intent_id, "handler panicked");
                            TaskResult::handler_error(format!("handler panicked: {}", e))
                        }
                    }
                } else {
                    let job_kind = match kind {
                        IntentKind::FileAnalysis => JobKind::FileAnalysis,
                        other => {
                            return Err(AssistantError::Configuration(format!(
                                "no background job kind for intent '{}'",
                                other
                            )))
                        }
                    };

                    let parameters = intent.parameters.clone();
                    let snapshot = session.clone();
                    let handle = self
                        .jobs
                        .submit(job_kind, async move {
                            let result = handler.execute(&parameters, &snapshot).await?;
                            Ok(result.payload)
                        })
                        .await;

                    if let Err(e) = self.sessions.track_job(handle.job_id).await {
                        warn!(job_id = %handle.job_id, error = %e, "could not track job on session");
                    }

                    TaskResult::pending(&handle)
                }
            }
        };

        // Context append failure (session replaced mid-dispatch) is not
        // worth losing the result over.
        if let Err(e) = self
            .sessions
            .append_context(intent, result.clone())
            .await
        {
            warn!(error = %e, "could not append dispatch result to session context");
        }

        Ok(result)
    }
}
