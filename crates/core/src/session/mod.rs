//! Run-scoped state shared between the caller and the workers.
//!
//! A [`RunSession`] bundles the user-visible [`LogSink`], the one-way
//! [`CancelSignal`] and the run's lifecycle state and outcome.

mod cancel;
mod log;
mod run;

pub use cancel::CancelSignal;
pub use log::{LogEvent, LogSink, Severity, WorkerLog, DEFAULT_LOG_CAPACITY, STATUS_LOG_TAIL};
pub use run::{RunSession, RunState, RunStatus};
