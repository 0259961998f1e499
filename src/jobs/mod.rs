//! Job supervisor for long-running handler work
//!
//! Runs asynchronous handler work off the interactive path, tracks job
//! status, and reports completion/failure over a notification channel.
//! Workers never mutate the session directly.

use crate::models::{JobHandle, JobKind, JobNotification, JobStatus};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Buffered completions before the interactive loop must drain them.
const NOTIFICATION_CHANNEL_SIZE: usize = 64;

struct TrackedJob {
    handle: JobHandle,
    cancel: CancellationToken,
}

/// Apply a status transition, enforcing monotonicity: terminal states
/// are absorbing and Running never returns to Pending.
fn apply_transition(
    handle: &mut JobHandle,
    next: JobStatus,
    result_or_error: Option<Value>,
) -> bool {
    if handle.status.is_terminal() {
        return false;
    }
    if handle.status == JobStatus::Running && next == JobStatus::Pending {
        return false;
    }
    if handle.status == next {
        return false;
    }

    handle.status = next;
    if result_or_error.is_some() {
        handle.result_or_error = result_or_error;
    }
    handle.updated_at = chrono::Utc::now();
    true
}

/// Supervises spawned jobs: at-most-one execution per handle, monotonic
/// status transitions, cooperative cancellation.
#[derive(Clone)]
pub struct JobSupervisor {
    jobs: Arc<RwLock<HashMap<Uuid, TrackedJob>>>,
    notifications: mpsc::Sender<JobNotification>,
}

impl JobSupervisor {
    /// Create a supervisor and the notification receiver the interactive
    /// loop drains for completion events.
    pub fn new() -> (Self, mpsc::Receiver<JobNotification>) {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_SIZE);
        (
            Self {
                jobs: Arc::new(RwLock::new(HashMap::new())),
                notifications: tx,
            },
            rx,
        )
    }

    /// Submit work for supervised execution. Returns immediately with a
    /// Pending handle; the caller never blocks on the work itself.
    pub async fn submit<Fut>(&self, kind: JobKind, work: Fut) -> JobHandle
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handle = JobHandle::new(kind);
        let cancel = CancellationToken::new();
        let job_id = handle.job_id;

        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(
                job_id,
                TrackedJob {
                    handle: handle.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        debug!(%job_id, %kind, "job submitted");

        let supervisor = self.clone();
        tokio::spawn(async move {
            // Cancelled before it started: do not run the work at all.
            if !supervisor
                .transition(job_id, JobStatus::Running, None)
                .await
            {
                return;
            }

            let mut inner = tokio::spawn(work);

            tokio::select! {
                _ = cancel.cancelled() => {
                    // Status was already marked Cancelled by cancel();
                    // stop the work at its next await point.
                    inner.abort();
                }
                joined = &mut inner => {
                    match joined {
                        Ok(Ok(value)) => {
                            supervisor
                                .transition(job_id, JobStatus::Succeeded, Some(value))
                                .await;
                        }
                        Ok(Err(e)) => {
                            supervisor
                                .transition(
                                    job_id,
                                    JobStatus::Failed,
                                    Some(serde_json::json!({ "error": e.to_string() })),
                                )
                                .await;
                        }
                        Err(join_err) if join_err.is_panic() => {
                            warn!(%job_id, "job panicked");
                            supervisor
                                .transition(
                                    job_id,
                                    JobStatus::Failed,
                                    Some(serde_json::json!({ "error": "job panicked" })),
                                )
                                .await;
                        }
                        Err(_) => {
                            // Aborted via cancellation; already terminal.
                        }
                    }
                }
            }
        });

        handle
    }

    /// Current status of a job, or None for an unknown id.
    pub async fn poll(&self, job_id: Uuid) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id).map(|tracked| tracked.handle.status)
    }

    /// Full handle snapshot including result_or_error.
    pub async fn handle(&self, job_id: Uuid) -> Option<JobHandle> {
        let jobs = self.jobs.read().await;
        jobs.get(&job_id).map(|tracked| tracked.handle.clone())
    }

    /// Mark a job Cancelled and signal the running work to stop at its
    /// next checkpoint. Returns false for unknown or already-terminal jobs.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let notification = {
            let mut jobs = self.jobs.write().await;
            let Some(tracked) = jobs.get_mut(&job_id) else {
                return false;
            };
            if !apply_transition(&mut tracked.handle, JobStatus::Cancelled, None) {
                return false;
            }
            tracked.cancel.cancel();
            JobNotification {
                job_id,
                kind: tracked.handle.kind,
                status: JobStatus::Cancelled,
                result_or_error: None,
            }
        };

        debug!(%job_id, "job cancelled");
        self.notify(notification).await;
        true
    }

    /// Drop terminal handles whose last update is older than `retention`,
    /// so long-lived processes do not accumulate settled jobs forever.
    /// Pending/Running jobs are never pruned; callers pick the cadence
    /// (and accept that polling a pruned id returns None).
    pub async fn prune_terminal(&self, retention: chrono::Duration) -> usize {
        let cutoff = chrono::Utc::now() - retention;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, tracked| {
            !tracked.handle.status.is_terminal() || tracked.handle.updated_at > cutoff
        });
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "settled jobs pruned");
        }
        pruned
    }

    /// Best-effort cancellation of a set of jobs (session teardown).
    pub async fn cancel_all(&self, job_ids: &[Uuid]) -> usize {
        let mut cancelled = 0;
        for job_id in job_ids {
            if self.cancel(*job_id).await {
                cancelled += 1;
            }
        }
        cancelled
    }

    async fn transition(
        &self,
        job_id: Uuid,
        next: JobStatus,
        result_or_error: Option<Value>,
    ) -> bool {
        let notification = {
            let mut jobs = self.jobs.write().await;
            let Some(tracked) = jobs.get_mut(&job_id) else {
                return false;
            };
            if !apply_transition(&mut tracked.handle, next, result_or_error) {
                return false;
            }
            if next.is_terminal() {
                Some(JobNotification {
                    job_id,
                    kind: tracked.handle.kind,
                    status: next,
                    result_or_error: tracked.handle.result_or_error.clone(),
                })
            } else {
                None
            }
        };

        if let Some(notification) = notification {
            self.notify(notification).await;
        }
        true
    }

    async fn notify(&self, notification: JobNotification) {
        if self.notifications.send(notification).await.is_err() {
            warn!("notification channel closed; completion event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_transition_monotonicity() {
        let mut handle = JobHandle::new(JobKind::FileAnalysis);

        assert!(apply_transition(&mut handle, JobStatus::Running, None));
        // No reverse transition.
        assert!(!apply_transition(&mut handle, JobStatus::Pending, None));

        assert!(apply_transition(&mut handle, JobStatus::Succeeded, None));
        // Terminal states are absorbing.
        assert!(!apply_transition(&mut handle, JobStatus::Running, None));
        assert!(!apply_transition(&mut handle, JobStatus::Failed, None));
        assert!(!apply_transition(&mut handle, JobStatus::Cancelled, None));
        assert_eq!(handle.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_job_succeeds_and_notifies() {
        let (supervisor, mut rx) = JobSupervisor::new();

        let handle = supervisor
            .submit(JobKind::FileAnalysis, async {
                Ok(serde_json::json!({ "summary": "3 lines" }))
            })
            .await;
        assert_eq!(handle.status, JobStatus::Pending);

        let notification = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("notification within timeout")
            .expect("channel open");

        assert_eq!(notification.job_id, handle.job_id);
        assert_eq!(notification.status, JobStatus::Succeeded);
        assert_eq!(
            supervisor.poll(handle.job_id).await,
            Some(JobStatus::Succeeded)
        );

        let settled = supervisor.handle(handle.job_id).await.unwrap();
        assert_eq!(
            settled.result_or_error.unwrap()["summary"],
            serde_json::json!("3 lines")
        );
    }

    #[tokio::test]
    async fn test_failing_job_is_captured_not_propagated() {
        let (supervisor, mut rx) = JobSupervisor::new();

        let handle = supervisor
            .submit(JobKind::FileAnalysis, async {
                Err(crate::error::AnalysisError::ReadFailure("no such file".to_string()).into())
            })
            .await;

        let notification = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.status, JobStatus::Failed);

        let settled = supervisor.handle(handle.job_id).await.unwrap();
        assert_eq!(settled.status, JobStatus::Failed);
        let error = settled.result_or_error.unwrap();
        assert!(error["error"].as_str().unwrap().contains("no such file"));
    }

    #[tokio::test]
    async fn test_panicking_job_is_captured() {
        let (supervisor, mut rx) = JobSupervisor::new();

        let handle = supervisor
            .submit(JobKind::FileAnalysis, async { panic!("boom") })
            .await;

        let notification = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.job_id, handle.job_id);
        assert_eq!(notification.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let (supervisor, mut rx) = JobSupervisor::new();

        let handle = supervisor
            .submit(JobKind::SpeechCapture, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            })
            .await;

        assert!(supervisor.cancel(handle.job_id).await);
        assert_eq!(
            supervisor.poll(handle.job_id).await,
            Some(JobStatus::Cancelled)
        );

        let notification = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.status, JobStatus::Cancelled);

        // Cancelling a settled job is a no-op.
        assert!(!supervisor.cancel(handle.job_id).await);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_rejected() {
        let (supervisor, mut rx) = JobSupervisor::new();

        let handle = supervisor
            .submit(JobKind::FileAnalysis, async { Ok(Value::Null) })
            .await;

        timeout(Duration::from_secs(5), rx.recv()).await.unwrap();

        assert!(!supervisor.cancel(handle.job_id).await);
        assert_eq!(
            supervisor.poll(handle.job_id).await,
            Some(JobStatus::Succeeded)
        );
    }

    #[tokio::test]
    async fn test_prune_drops_only_stale_terminal_jobs() {
        let (supervisor, mut rx) = JobSupervisor::new();

        let settled = supervisor
            .submit(JobKind::FileAnalysis, async { Ok(Value::Null) })
            .await;
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap();

        let running = supervisor
            .submit(JobKind::SpeechCapture, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            })
            .await;

        // Generous retention keeps the fresh terminal handle around.
        assert_eq!(supervisor.prune_terminal(chrono::Duration::hours(1)).await, 0);
        assert!(supervisor.poll(settled.job_id).await.is_some());

        // Zero retention drops it; the running job survives.
        assert_eq!(supervisor.prune_terminal(chrono::Duration::zero()).await, 1);
        assert_eq!(supervisor.poll(settled.job_id).await, None);
        assert!(supervisor.poll(running.job_id).await.is_some());

        supervisor.cancel(running.job_id).await;
    }

    #[tokio::test]
    async fn test_unknown_job_id() {
        let (supervisor, _rx) = JobSupervisor::new();
        let missing = Uuid::new_v4();
        assert_eq!(supervisor.poll(missing).await, None);
        assert!(!supervisor.cancel(missing).await);
    }
}
