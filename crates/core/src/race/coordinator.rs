//! Runs staggered workers against one cancel signal.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use rand::Rng;
use tracing::{info, warn};

use crate::attempt::{
    AttemptMachine, AttemptOutcome, AttemptRequest, EngineSettings, ErrorKind, RequestLimits,
};
use crate::driver::{launch_session, DriverFactory};
use crate::metrics;
use crate::session::{CancelSignal, LogSink, WorkerLog};

use super::RaceConfig;

type WinnerCell = Arc<Mutex<Option<AttemptOutcome>>>;

/// Launches and supervises the workers of a run.
///
/// A request with `concurrency == 1` runs one worker inline. Larger requests
/// spawn one task per worker, started `index * stagger + jitter` apart. The
/// first worker to succeed stores its outcome and sets the cancel signal
/// before closing its browser; the others stop at their next checkpoint. If
/// two succeed before noticing each other, the first stored outcome is kept.
pub struct RaceCoordinator {
    settings: Arc<EngineSettings>,
    factory: Arc<dyn DriverFactory>,
    config: RaceConfig,
}

impl RaceCoordinator {
    pub fn new(
        settings: Arc<EngineSettings>,
        factory: Arc<dyn DriverFactory>,
        config: RaceConfig,
    ) -> Self {
        Self {
            settings,
            factory,
            config,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Bounds requests are validated against.
    pub fn limits(&self) -> RequestLimits {
        RequestLimits {
            max_concurrency: self.config.max_concurrency,
            min_level: self.settings.pacing.min_level,
            max_level: self.settings.pacing.max_level,
        }
    }

    /// Run `request` to a single terminal outcome.
    pub async fn run(
        &self,
        request: &AttemptRequest,
        cancel: &CancelSignal,
        log: &LogSink,
    ) -> AttemptOutcome {
        if let Err(e) = request.validate(&self.limits()) {
            log.error(format!("invalid request: {}", e));
            return AttemptOutcome::failed(None, ErrorKind::InvalidRequest, e.to_string());
        }

        let workers = request.concurrency;
        log.info(format!(
            "starting {} worker(s): {}",
            workers,
            request.summary()
        ));

        if workers == 1 {
            return run_worker(
                self.settings.clone(),
                self.factory.clone(),
                request.for_worker(0),
                cancel.clone(),
                log.for_worker(0),
                None,
            )
            .await;
        }

        let stagger = Duration::from_millis(
            request.stagger_ms.unwrap_or(self.config.default_stagger_ms),
        );
        let winner: WinnerCell = Arc::new(Mutex::new(None));

        let handles: Vec<_> = (0..workers)
            .map(|index| {
                let delay = start_delay(index, stagger, self.config.stagger_jitter_ms);
                let settings = self.settings.clone();
                let factory = self.factory.clone();
                let request = request.for_worker(index);
                let cancel = cancel.clone();
                let log = log.for_worker(index);
                let winner = winner.clone();

                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return AttemptOutcome::cancelled(Some(index)),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }

                    run_worker(settings, factory, request, cancel, log, Some(winner)).await
                })
            })
            .collect();

        let mut failures = Vec::new();
        for (index, result) in join_all(handles).await.into_iter().enumerate() {
            match result {
                Ok(outcome) if outcome.ok => {}
                Ok(outcome) => failures.push(outcome),
                Err(e) => {
                    log.error(format!("[worker {}] task failed: {}", index, e));
                    failures.push(AttemptOutcome::failed(
                        Some(index),
                        ErrorKind::Unexpected,
                        e.to_string(),
                    ));
                }
            }
        }

        if let Some(outcome) = lock(&winner).take() {
            info!(worker = ?outcome.worker, "race won");
            return outcome;
        }
        if cancel.is_set() {
            return AttemptOutcome::cancelled(None);
        }

        let reasons: Vec<String> = failures
            .iter()
            .map(|o| {
                format!(
                    "worker {}: {}",
                    o.worker.map(|w| w.to_string()).unwrap_or_else(|| "?".into()),
                    o.error.unwrap_or(ErrorKind::Unexpected).as_str()
                )
            })
            .collect();
        let message = format!("no worker succeeded ({})", reasons.join(", "));
        log.error(&message);
        AttemptOutcome::failed(None, ErrorKind::NoWorkerSucceeded, message)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start offset for worker `index`; worker 0 starts immediately.
fn start_delay(index: usize, stagger: Duration, jitter_ms: u64) -> Duration {
    if index == 0 {
        return Duration::ZERO;
    }
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    stagger * index as u32 + Duration::from_millis(jitter)
}

/// Launch a browser for one worker, run its state machine, and always quit.
///
/// In a race a success is published to `winner` and the cancel signal is set
/// before the browser is closed.
async fn run_worker(
    settings: Arc<EngineSettings>,
    factory: Arc<dyn DriverFactory>,
    request: AttemptRequest,
    cancel: CancelSignal,
    log: WorkerLog,
    winner: Option<WinnerCell>,
) -> AttemptOutcome {
    let index = request.worker_index;
    if cancel.is_set() {
        return AttemptOutcome::cancelled(Some(index));
    }

    log.info(format!("launching browser ({})", factory.name()));
    let driver = match launch_session(factory.as_ref(), index, request.headless).await {
        Ok(driver) => driver,
        Err(e) => {
            let message = format!("browser launch failed: {}", e);
            log.error(&message);
            metrics::WORKER_OUTCOMES
                .with_label_values(&[ErrorKind::DriverLaunchFailed.as_str()])
                .inc();
            return AttemptOutcome::failed(Some(index), ErrorKind::DriverLaunchFailed, message);
        }
    };

    metrics::WORKERS_ACTIVE.inc();
    let machine = AttemptMachine::new(&request, &settings, driver.as_ref(), &cancel, log.clone());
    let outcome = match AssertUnwindSafe(machine.run()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = format!("worker crashed: {}", panic_message(panic.as_ref()));
            log.error(&message);
            AttemptOutcome::failed(Some(index), ErrorKind::Unexpected, message)
        }
    };

    if outcome.ok {
        if let Some(winner) = &winner {
            lock(winner).get_or_insert_with(|| outcome.clone());
            if cancel.set() {
                log.info("won the race, stopping the other workers");
            }
        }
    }

    if let Err(e) = driver.quit().await {
        warn!(worker = index, error = %e, "failed to quit browser session");
    }
    metrics::WORKERS_ACTIVE.dec();

    let result = match outcome.error {
        None if outcome.ok => "succeeded",
        Some(kind) => kind.as_str(),
        None => ErrorKind::Unexpected.as_str(),
    };
    metrics::WORKER_OUTCOMES.with_label_values(&[result]).inc();
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
