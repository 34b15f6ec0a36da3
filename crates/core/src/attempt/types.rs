//! Request and outcome types for booking attempts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::ColumnRole;
use crate::schedule::ClockTime;

pub const MIN_NUM_TO_CHECK: usize = 1;
pub const MAX_NUM_TO_CHECK: usize = 10;

/// Seat class that can be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatKind {
    Standard,
    Premium,
}

impl SeatKind {
    pub fn role(&self) -> ColumnRole {
        match self {
            Self::Standard => ColumnRole::Standard,
            Self::Premium => ColumnRole::Premium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatPreference {
    #[default]
    Standard,
    Premium,
    /// Either class, tried in `seat_order`.
    Either,
}

/// Whether to claim a seat outright or join the waitlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    #[default]
    Reserve,
    Waitlist,
}

/// What a successful attempt obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Reserve,
    Waitlist,
    None,
}

impl From<ClaimMode> for ClaimKind {
    fn from(mode: ClaimMode) -> Self {
        match mode {
            ClaimMode::Reserve => Self::Reserve,
            ClaimMode::Waitlist => Self::Waitlist,
        }
    }
}

/// Why an attempt ended without a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UserCancelled,
    AuthenticationFailed,
    NavigationBlocked,
    DriverLaunchFailed,
    DateUnavailable,
    InvalidRequest,
    NoWorkerSucceeded,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCancelled => "user_cancelled",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NavigationBlocked => "navigation_blocked",
            Self::DriverLaunchFailed => "driver_launch_failed",
            Self::DateUnavailable => "date_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::NoWorkerSucceeded => "no_worker_succeeded",
            Self::Unexpected => "unexpected",
        }
    }
}

/// Request validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("origin and destination must differ")]
    SameStation,

    #[error("numToCheck must be between 1 and 10, got {0}")]
    NumToCheckOutOfRange(usize),

    #[error("concurrency must be between 1 and {max}, got {value}")]
    ConcurrencyOutOfRange { value: usize, max: usize },

    #[error("aggressiveness must be between {min} and {max}, got {value}")]
    AggressivenessOutOfRange { value: u8, min: u8, max: u8 },

    #[error("seatOrder must list standard and premium once each")]
    InvalidSeatOrder,
}

/// Bounds a request is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_concurrency: usize,
    pub min_level: u8,
    pub max_level: u8,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            min_level: 1,
            max_level: 5,
        }
    }
}

/// One user submission. Never mutated after dispatch; each worker gets a
/// copy with its own `worker_index`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRequest {
    #[serde(default)]
    pub user_id: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default, alias = "departureStation")]
    pub origin: String,

    #[serde(default, alias = "arrivalStation")]
    pub destination: String,

    pub date: NaiveDate,

    pub time: ClockTime,

    #[serde(default = "default_num_to_check")]
    pub num_to_check: usize,

    #[serde(default)]
    pub seat_preference: SeatPreference,

    #[serde(default = "default_seat_order")]
    pub seat_order: Vec<SeatKind>,

    #[serde(default)]
    pub mode: ClaimMode,

    /// Only consider rows run by this carrier.
    #[serde(default)]
    pub carrier: Option<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay between worker starts. Falls back to the configured default.
    #[serde(default)]
    pub stagger_ms: Option<u64>,

    /// Pacing level. Falls back to the configured default.
    #[serde(default)]
    pub aggressiveness: Option<u8>,

    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(skip)]
    pub worker_index: usize,
}

fn default_num_to_check() -> usize {
    3
}

fn default_seat_order() -> Vec<SeatKind> {
    vec![SeatKind::Standard, SeatKind::Premium]
}

fn default_concurrency() -> usize {
    1
}

fn default_headless() -> bool {
    true
}

impl std::fmt::Debug for AttemptRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptRequest")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("origin", &self.origin)
            .field("destination", &self.destination)
            .field("date", &self.date)
            .field("time", &self.time)
            .field("num_to_check", &self.num_to_check)
            .field("seat_preference", &self.seat_preference)
            .field("mode", &self.mode)
            .field("carrier", &self.carrier)
            .field("concurrency", &self.concurrency)
            .field("worker_index", &self.worker_index)
            .finish()
    }
}

impl AttemptRequest {
    pub fn new(
        user_id: impl Into<String>,
        password: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        date: NaiveDate,
        time: ClockTime,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
            origin: origin.into(),
            destination: destination.into(),
            date,
            time,
            num_to_check: default_num_to_check(),
            seat_preference: SeatPreference::default(),
            seat_order: default_seat_order(),
            mode: ClaimMode::default(),
            carrier: None,
            concurrency: default_concurrency(),
            stagger_ms: None,
            aggressiveness: None,
            headless: default_headless(),
            worker_index: 0,
        }
    }

    pub fn validate(&self, limits: &RequestLimits) -> Result<(), RequestError> {
        if self.user_id.trim().is_empty() {
            return Err(RequestError::MissingField("userId"));
        }
        if self.password.is_empty() {
            return Err(RequestError::MissingField("password"));
        }
        if self.origin.trim().is_empty() {
            return Err(RequestError::MissingField("origin"));
        }
        if self.destination.trim().is_empty() {
            return Err(RequestError::MissingField("destination"));
        }
        if self.origin.trim() == self.destination.trim() {
            return Err(RequestError::SameStation);
        }
        if !(MIN_NUM_TO_CHECK..=MAX_NUM_TO_CHECK).contains(&self.num_to_check) {
            return Err(RequestError::NumToCheckOutOfRange(self.num_to_check));
        }
        if self.concurrency == 0 || self.concurrency > limits.max_concurrency {
            return Err(RequestError::ConcurrencyOutOfRange {
                value: self.concurrency,
                max: limits.max_concurrency,
            });
        }
        if let Some(level) = self.aggressiveness {
            if level < limits.min_level || level > limits.max_level {
                return Err(RequestError::AggressivenessOutOfRange {
                    value: level,
                    min: limits.min_level,
                    max: limits.max_level,
                });
            }
        }
        if self.seat_preference == SeatPreference::Either {
            let ok = self.seat_order.len() == 2
                && self.seat_order.contains(&SeatKind::Standard)
                && self.seat_order.contains(&SeatKind::Premium);
            if !ok {
                return Err(RequestError::InvalidSeatOrder);
            }
        }
        Ok(())
    }

    /// Seat classes to try in a row, in order.
    pub fn seat_order(&self) -> Vec<SeatKind> {
        match self.seat_preference {
            SeatPreference::Standard => vec![SeatKind::Standard],
            SeatPreference::Premium => vec![SeatKind::Premium],
            SeatPreference::Either => self.seat_order.clone(),
        }
    }

    /// Copy for worker `index`.
    pub fn for_worker(&self, index: usize) -> Self {
        Self {
            worker_index: index,
            ..self.clone()
        }
    }

    /// Date as the `YYYYMMDD` value used by the date select.
    pub fn date_value(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            date: self.date,
            time: self.time,
            mode: self.mode,
            seat_preference: self.seat_preference,
            carrier: self.carrier.clone(),
            concurrency: self.concurrency,
        }
    }
}

/// Credential-free view of a request, safe to log and return from the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    pub time: ClockTime,
    pub mode: ClaimMode,
    pub seat_preference: SeatPreference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub concurrency: usize,
}

impl std::fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} → {} on {} at {}",
            self.origin, self.destination, self.date, self.time
        )
    }
}

/// Terminal result of a worker or a whole race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub ok: bool,
    pub kind: ClaimKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<SeatKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,
}

impl AttemptOutcome {
    pub fn succeeded(worker: usize, mode: ClaimMode, seat: Option<SeatKind>) -> Self {
        Self {
            ok: true,
            kind: mode.into(),
            seat,
            error: None,
            message: None,
            worker: Some(worker),
        }
    }

    pub fn failed(worker: Option<usize>, error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            kind: ClaimKind::None,
            seat: None,
            error: Some(error),
            message: Some(message.into()),
            worker,
        }
    }

    pub fn cancelled(worker: Option<usize>) -> Self {
        Self::failed(worker, ErrorKind::UserCancelled, "cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.error == Some(ErrorKind::UserCancelled)
    }
}
