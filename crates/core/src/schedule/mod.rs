//! Departure time slot resolution.
//!
//! The search form offers a list of departure slots with free-form labels
//! ("08", "0800", "080000", "08:00", "08 (시)"). [`resolve_slot`] picks the
//! slot to request for a target clock time: an exact match, otherwise the
//! earliest slot after the target, otherwise the latest slot of the day.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minutes value used for labels with an hour of 24 or more.
pub const END_OF_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("none of the {0} time slot labels could be parsed")]
    NoParsableSlot(usize),

    #[error("invalid clock time '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// A wall-clock time of day.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ScheduleError> {
        if hour >= 24 || minute >= 60 {
            return Err(ScheduleError::InvalidTime(format!("{}:{}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }
}

impl FromStr for ClockTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour = h.parse::<u8>().map_err(|_| invalid())?;
        let minute = m.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The slot chosen for a target time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSlot {
    /// Position of the slot in the label list passed to [`resolve_slot`].
    pub index: usize,
    pub label: String,
    pub minutes: u32,
}

/// Parse a slot label into minutes since midnight.
///
/// Labels with a colon are read as `H:MM`. Otherwise the leading digit run is
/// read as `H`/`HH`, `HHMM` or `HHMMSS` (seconds ignored). Hours of 24 and
/// above clamp to [`END_OF_DAY`]; minutes of 60 and above are rejected.
pub fn parse_slot_minutes(label: &str) -> Option<u32> {
    let label = label.trim();

    let (hour, minute) = if let Some((h, m)) = label.split_once(':') {
        let h = leading_digits(h.trim());
        let m = leading_digits(m.trim());
        if h.is_empty() || h.len() > 2 || m.is_empty() || m.len() > 2 {
            return None;
        }
        (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)
    } else {
        let digits = leading_digits(label);
        match digits.len() {
            1 | 2 => (digits.parse::<u32>().ok()?, 0),
            4 | 6 => (digits[..2].parse::<u32>().ok()?, digits[2..4].parse::<u32>().ok()?),
            _ => return None,
        }
    };

    if minute >= 60 {
        return None;
    }
    if hour >= 24 {
        return Some(END_OF_DAY);
    }
    Some(hour * 60 + minute)
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// Choose the slot to request for `target`.
///
/// Unparsable labels are ignored. Fails only when no label parses.
pub fn resolve_slot<S: AsRef<str>>(
    target: ClockTime,
    labels: &[S],
) -> Result<ResolvedSlot, ScheduleError> {
    let mut slots: Vec<ResolvedSlot> = labels
        .iter()
        .enumerate()
        .filter_map(|(index, label)| {
            parse_slot_minutes(label.as_ref()).map(|minutes| ResolvedSlot {
                index,
                label: label.as_ref().to_string(),
                minutes,
            })
        })
        .collect();

    slots.sort_by_key(|s| s.minutes);

    let wanted = target.minutes_since_midnight();
    let chosen = slots
        .iter()
        .find(|s| s.minutes == wanted)
        .or_else(|| slots.iter().find(|s| s.minutes >= wanted))
        .or_else(|| slots.last())
        .cloned();

    chosen.ok_or(ScheduleError::NoParsableSlot(labels.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_label_forms() {
        assert_eq!(parse_slot_minutes("8"), Some(480));
        assert_eq!(parse_slot_minutes("08"), Some(480));
        assert_eq!(parse_slot_minutes("0830"), Some(510));
        assert_eq!(parse_slot_minutes("083000"), Some(510));
        assert_eq!(parse_slot_minutes("8:30"), Some(510));
        assert_eq!(parse_slot_minutes(" 14 (시) "), Some(840));
        assert_eq!(parse_slot_minutes("24"), Some(END_OF_DAY));
        assert_eq!(parse_slot_minutes("2530"), Some(END_OF_DAY));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_slot_minutes(""), None);
        assert_eq!(parse_slot_minutes("선택"), None);
        assert_eq!(parse_slot_minutes("123"), None);
        assert_eq!(parse_slot_minutes("0875"), None);
        assert_eq!(parse_slot_minutes("8:75"), None);
        assert_eq!(parse_slot_minutes("12345678"), None);
    }

    #[test]
    fn test_resolve_exact_match() {
        let labels = ["06", "08", "10", "12"];
        let slot = resolve_slot(t("08:00"), &labels).unwrap();
        assert_eq!(slot.index, 1);
        assert_eq!(slot.label, "08");
    }

    #[test]
    fn test_resolve_next_later_slot() {
        let labels = ["060000", "080000", "100000"];
        let slot = resolve_slot(t("09:00"), &labels).unwrap();
        assert_eq!(slot.index, 2);
        assert_eq!(slot.minutes, 600);
    }

    #[test]
    fn test_resolve_falls_back_to_latest() {
        let labels = ["06", "08", "10"];
        let slot = resolve_slot(t("22:00"), &labels).unwrap();
        assert_eq!(slot.label, "10");
    }

    #[test]
    fn test_resolve_unordered_labels_and_noise() {
        let labels = ["선택", "14", "06", "10"];
        let slot = resolve_slot(t("07:30"), &labels).unwrap();
        assert_eq!(slot.index, 3);
        assert_eq!(slot.label, "10");
    }

    #[test]
    fn test_resolve_no_parsable_labels() {
        let labels = ["선택", "--"];
        assert_eq!(
            resolve_slot(t("08:00"), &labels),
            Err(ScheduleError::NoParsableSlot(2))
        );
    }

    #[test]
    fn test_clock_time_parse_and_display() {
        assert_eq!(t("7:05").to_string(), "07:05");
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("12:60".parse::<ClockTime>().is_err());
        assert!("1200".parse::<ClockTime>().is_err());
        assert!("12:5".parse::<ClockTime>().is_err());
    }

    #[test]
    fn test_clock_time_serde() {
        let time: ClockTime = serde_json::from_str("\"09:30\"").unwrap();
        assert_eq!(time.minutes_since_midnight(), 570);
        assert_eq!(serde_json::to_string(&time).unwrap(), "\"09:30\"");
        assert!(serde_json::from_str::<ClockTime>("\"nine\"").is_err());
    }
}
