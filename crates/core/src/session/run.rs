//! Run session lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::attempt::{AttemptOutcome, AttemptRequest, ErrorKind, RequestSummary};
use crate::notify::{Notification, Notifier};
use crate::race::RaceCoordinator;

use super::{CancelSignal, LogEvent, LogSink};

/// Lifecycle of a run: `starting → running → finished | error | cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Starting,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    fn for_outcome(outcome: &AttemptOutcome) -> Self {
        if outcome.ok {
            Self::Finished
        } else if outcome.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Error
        }
    }
}

/// Point-in-time view of a session for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub session_id: Uuid,
    pub running: bool,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub request: RequestSummary,
    pub logs: Vec<LogEvent>,
    pub result: Option<AttemptOutcome>,
}

#[derive(Debug)]
struct Progress {
    state: RunState,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<AttemptOutcome>,
}

/// Everything that belongs to one user submission: its log, its cancel
/// signal, its lifecycle state and its final outcome.
///
/// Credentials are not retained; only the request summary is.
#[derive(Debug)]
pub struct RunSession {
    id: Uuid,
    summary: RequestSummary,
    started_at: DateTime<Utc>,
    log: LogSink,
    cancel: CancelSignal,
    progress: RwLock<Progress>,
}

impl RunSession {
    pub fn new(request: &AttemptRequest, log: LogSink) -> Self {
        Self {
            id: Uuid::new_v4(),
            summary: request.summary(),
            started_at: Utc::now(),
            log,
            cancel: CancelSignal::new(),
            progress: RwLock::new(Progress {
                state: RunState::Starting,
                finished_at: None,
                outcome: None,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn summary(&self) -> &RequestSummary {
        &self.summary
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub async fn state(&self) -> RunState {
        self.progress.read().await.state
    }

    pub async fn is_running(&self) -> bool {
        self.state().await.is_active()
    }

    pub async fn outcome(&self) -> Option<AttemptOutcome> {
        self.progress.read().await.outcome.clone()
    }

    /// Request cancellation. Returns `false` once the run has ended; a
    /// repeated request while workers are still shutting down is accepted.
    pub async fn stop(&self) -> bool {
        if !self.is_running().await {
            return false;
        }
        if self.cancel.set() {
            self.log.warn("stop requested");
        }
        true
    }

    /// Snapshot with the newest `max_logs` log events.
    pub async fn status(&self, max_logs: usize) -> RunStatus {
        let progress = self.progress.read().await;
        RunStatus {
            session_id: self.id,
            running: progress.state.is_active(),
            state: progress.state,
            started_at: self.started_at,
            finished_at: progress.finished_at,
            request: self.summary.clone(),
            logs: self.log.snapshot(max_logs),
            result: progress.outcome.clone(),
        }
    }

    /// Run `request` on a background task.
    ///
    /// On success the notifier is called once on a detached task; its
    /// failure is logged and does not change the outcome.
    pub fn spawn(
        self: &Arc<Self>,
        coordinator: Arc<RaceCoordinator>,
        notifier: Arc<dyn Notifier>,
        request: AttemptRequest,
    ) -> JoinHandle<AttemptOutcome> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.progress.write().await.state = RunState::Running;
            info!(session = %session.id, "run started");

            let outcome = coordinator.run(&request, &session.cancel, &session.log).await;
            session.finish(&outcome).await;

            if outcome.ok {
                let notification = Notification::for_success(session.summary.clone(), outcome.clone());
                let log = session.log.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&notification).await {
                        warn!(notifier = notifier.name(), error = %e, "notification failed");
                        log.warn(format!("notification failed: {}", e));
                    }
                });
            }
            outcome
        })
    }

    async fn finish(&self, outcome: &AttemptOutcome) {
        let state = RunState::for_outcome(outcome);
        {
            let mut progress = self.progress.write().await;
            progress.state = state;
            progress.finished_at = Some(Utc::now());
            progress.outcome = Some(outcome.clone());
        }

        match state {
            RunState::Finished => self.log.success("run finished"),
            RunState::Cancelled => self.log.info("run cancelled"),
            _ => self.log.error(format!(
                "run ended: {}",
                outcome.error.unwrap_or(ErrorKind::Unexpected).as_str()
            )),
        }
        info!(session = %self.id, state = ?state, "run ended");
    }
}
