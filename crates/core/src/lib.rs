pub mod attempt;
pub mod config;
pub mod driver;
pub mod layout;
pub mod metrics;
pub mod notify;
pub mod pacing;
pub mod race;
pub mod schedule;
pub mod session;
pub mod testing;

pub use attempt::{
    AttemptMachine, AttemptOutcome, AttemptRequest, AttemptState, ClaimKind, ClaimMode,
    EngineSettings, ErrorKind, RequestError, RequestLimits, RequestSummary, ResultRow, SeatKind,
    SeatPreference, SiteConfig,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
    SanitizedConfig, ServerConfig,
};
pub use driver::{
    ChromeDriverFactory, Driver, DriverConfig, DriverError, DriverFactory, ElementRef,
    HeadlessMode, Locator, SessionSpec, WebDriverSession,
};
pub use layout::{detect_columns, ColumnMap, ColumnRole, LayoutConfig, LayoutDetection};
pub use notify::{
    create_notifier, CompositeNotifier, LogNotifier, Notification, Notifier, NotifyConfig,
    NotifyError, WebhookNotifier,
};
pub use pacing::{PacingConfig, PacingController, PollTier};
pub use race::{RaceConfig, RaceCoordinator};
pub use schedule::{resolve_slot, ClockTime, ResolvedSlot, ScheduleError};
pub use session::{
    CancelSignal, LogEvent, LogSink, RunSession, RunState, RunStatus, Severity, WorkerLog,
};
