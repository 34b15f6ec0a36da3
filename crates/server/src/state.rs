use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use seatrace_core::{
    AttemptRequest, Config, DriverFactory, EngineSettings, LogSink, Notifier, RaceCoordinator,
    RequestError, RunSession, SanitizedConfig,
};

use crate::metrics::RUNS_STARTED_TOTAL;

/// Why a run could not be started.
#[derive(Debug)]
pub enum StartError {
    AlreadyRunning,
    Invalid(RequestError),
}

/// Why a stop request was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum StopError {
    NoSession,
    NotRunning,
}

/// Shared application state
///
/// Holds at most one run session. A new run replaces the previous session
/// once it has finished.
pub struct AppState {
    config: Config,
    coordinator: Arc<RaceCoordinator>,
    notifier: Arc<dyn Notifier>,
    current: RwLock<Option<Arc<RunSession>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        factory: Arc<dyn DriverFactory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let coordinator = Arc::new(RaceCoordinator::new(
            Arc::new(EngineSettings::from(&config)),
            factory,
            config.race.clone(),
        ));
        Self {
            config,
            coordinator,
            notifier,
            current: RwLock::new(None),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn coordinator(&self) -> &Arc<RaceCoordinator> {
        &self.coordinator
    }

    /// The latest session, running or finished.
    pub async fn current(&self) -> Option<Arc<RunSession>> {
        self.current.read().await.clone()
    }

    /// Validate `request` and start it on a new session.
    pub async fn start(&self, request: AttemptRequest) -> Result<Arc<RunSession>, StartError> {
        let request = request.for_worker(0);
        request
            .validate(&self.coordinator.limits())
            .map_err(StartError::Invalid)?;

        // The write lock is held across the check so two starts cannot race.
        let mut current = self.current.write().await;
        if let Some(session) = current.as_ref() {
            if session.is_running().await {
                return Err(StartError::AlreadyRunning);
            }
        }

        let session = Arc::new(RunSession::new(&request, LogSink::default()));
        info!(session = %session.id(), request = %session.summary(), "starting run");
        session.spawn(self.coordinator.clone(), self.notifier.clone(), request);
        RUNS_STARTED_TOTAL.inc();

        *current = Some(session.clone());
        Ok(session)
    }

    /// Ask the running session to stop.
    pub async fn stop(&self) -> Result<Arc<RunSession>, StopError> {
        let session = self.current().await.ok_or(StopError::NoSession)?;
        if session.stop().await {
            Ok(session)
        } else {
            Err(StopError::NotRunning)
        }
    }
}
