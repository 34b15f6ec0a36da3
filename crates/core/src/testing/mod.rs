//! Testing utilities and mock implementations.
//!
//! [`MockSite`] scripts a booking site (login dialogs, result rows per worker
//! and poll, claim responses) and records everything the engine does to it.
//! [`MockDriverFactory`] launches [`MockDriver`] sessions over a shared site,
//! so whole races run without a browser.
//!
//! # Example
//!
//! ```rust,ignore
//! use seatrace_core::testing::{fixtures, ClaimResponse, MockDriverFactory, MockRow, MockSite};
//!
//! let site = MockSite::builder()
//!     .rows(|_worker, poll| {
//!         if poll < 3 { vec![] } else { vec![MockRow::train("SRT", "매진", "예약하기", "-")] }
//!     })
//!     .claim(|_| ClaimResponse::confirmed())
//!     .build();
//! let factory = MockDriverFactory::new(site.clone());
//!
//! // Run a race with the factory...
//! assert_eq!(site.claims().await.len(), 1);
//! ```

mod mock_driver;
mod mock_notifier;
mod mock_site;

pub use mock_driver::{MockDriver, MockDriverFactory};
pub use mock_notifier::MockNotifier;
pub use mock_site::{
    ClaimEvent, ClaimResponse, MockCell, MockEvent, MockFilterControl, MockRow, MockSite,
    MockSiteBuilder,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::NaiveDate;

    use crate::attempt::{AttemptRequest, EngineSettings, SiteConfig};
    use crate::config::Config;
    use crate::pacing::{PacingConfig, PacingSpan};
    use crate::race::RaceConfig;
    use crate::schedule::ClockTime;
    use crate::session::LogSink;

    pub fn log() -> LogSink {
        LogSink::default()
    }

    /// A valid request for 수서 → 부산 on 2026-03-14 at 09:00.
    pub fn request() -> AttemptRequest {
        AttemptRequest::new(
            "user",
            "secret",
            "수서",
            "부산",
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap_or_default(),
            ClockTime::new(9, 0).unwrap_or_default(),
        )
    }

    /// Millisecond-scale waits so mock runs finish quickly.
    pub fn fast_settings() -> EngineSettings {
        EngineSettings {
            site: SiteConfig {
                dialog_timeout_ms: 50,
                new_window_timeout_ms: 50,
                success_timeout_ms: 100,
                ..Default::default()
            },
            layout: Default::default(),
            pacing: PacingConfig {
                implicit_wait: PacingSpan::new(0, 0),
                no_rows: PacingSpan::new(20, 10),
                rows_no_claim: PacingSpan::new(20, 10),
                claim_attempted: PacingSpan::new(10, 5),
                jitter: PacingSpan::new(5, 0),
                auth_retry: PacingSpan::new(10, 5),
                ..Default::default()
            },
        }
    }

    pub fn fast_race() -> RaceConfig {
        RaceConfig {
            max_concurrency: 4,
            default_stagger_ms: 20,
            stagger_jitter_ms: 5,
        }
    }

    /// A full configuration with [`fast_settings`] and [`fast_race`].
    pub fn fast_config() -> Config {
        let settings = fast_settings();
        Config {
            site: settings.site,
            layout: settings.layout,
            pacing: settings.pacing,
            race: fast_race(),
            ..Default::default()
        }
    }
}
