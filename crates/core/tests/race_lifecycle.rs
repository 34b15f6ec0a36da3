//! Race lifecycle integration tests.
//!
//! These tests run whole races against the simulated booking site:
//! launch -> login -> search -> poll -> claim -> quit, across one or more
//! workers sharing a cancel signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use seatrace_core::{
    testing::{fixtures, ClaimResponse, MockDriverFactory, MockEvent, MockRow, MockSite},
    AttemptOutcome, AttemptRequest, CancelSignal, ClaimKind, ClaimMode, DriverError, DriverFactory,
    EngineSettings, ErrorKind, LogSink, RaceCoordinator, SeatKind, SeatPreference,
};

/// Test helper wiring a coordinator to a mock site.
struct TestHarness {
    site: Arc<MockSite>,
    factory: Arc<MockDriverFactory>,
    coordinator: RaceCoordinator,
    log: LogSink,
}

impl TestHarness {
    fn new(site: Arc<MockSite>) -> Self {
        let factory = Arc::new(MockDriverFactory::new(site.clone()));
        let coordinator = RaceCoordinator::new(
            Arc::new(fixtures::fast_settings()),
            Arc::clone(&factory) as Arc<dyn DriverFactory>,
            fixtures::fast_race(),
        );
        Self {
            site,
            factory,
            coordinator,
            log: fixtures::log(),
        }
    }

    async fn run(&self, request: &AttemptRequest) -> AttemptOutcome {
        self.run_with_cancel(request, &CancelSignal::new()).await
    }

    async fn run_with_cancel(
        &self,
        request: &AttemptRequest,
        cancel: &CancelSignal,
    ) -> AttemptOutcome {
        tokio::time::timeout(
            Duration::from_secs(10),
            self.coordinator.run(request, cancel, &self.log),
        )
        .await
        .expect("race did not finish")
    }

    /// Every launched browser must have been quit.
    async fn assert_all_quit(&self) {
        let launched = self.factory.launches().await.len();
        assert_eq!(self.site.quits().await, launched);
    }
}

fn racing(request: AttemptRequest, workers: usize) -> AttemptRequest {
    AttemptRequest {
        concurrency: workers,
        stagger_ms: Some(10),
        ..request
    }
}

#[tokio::test]
async fn test_premium_lost_then_standard_on_same_poll() {
    let site = MockSite::builder()
        .dates(&["20250601"])
        .rows(|_, poll| {
            if poll < 3 {
                vec![]
            } else {
                vec![MockRow::train("SRT", "예약하기", "예약하기", "-")]
            }
        })
        .claim(|event| {
            if event.column == 6 {
                ClaimResponse::lost()
            } else {
                ClaimResponse::confirmed()
            }
        })
        .build();
    let harness = TestHarness::new(site);

    let mut request = fixtures::request();
    request.date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    request.seat_preference = SeatPreference::Either;
    request.seat_order = vec![SeatKind::Premium, SeatKind::Standard];

    let outcome = harness.run(&request).await;
    assert!(outcome.ok, "unexpected outcome: {:?}", outcome);
    assert_eq!(outcome.kind, ClaimKind::Reserve);
    assert_eq!(outcome.seat, Some(SeatKind::Standard));
    assert_eq!(outcome.worker, Some(0));

    let claims = harness.site.claims().await;
    assert_eq!(claims.len(), 2);
    assert_eq!((claims[0].poll, claims[0].column), (3, 6));
    assert_eq!((claims[1].poll, claims[1].column), (3, 7));
    // The lost claim navigated away, so the second control was re-located.
    assert_eq!(claims[1].via, "script");

    let events = harness.site.events().await;
    assert!(events.contains(&MockEvent::Back { worker: 0 }));
    assert_eq!(harness.site.login_attempts().await, 1);
    harness.assert_all_quit().await;
}

/// Worker `winner` can claim on its first poll; every other worker would
/// find a seat from poll `later` on if it kept polling.
fn contested_site(winner: usize, later: u64, quit_delay: Duration) -> Arc<MockSite> {
    MockSite::builder()
        .rows(move |worker, poll| {
            if worker == winner || poll >= later {
                vec![MockRow::train("SRT", "매진", "예약하기", "-")]
            } else {
                vec![]
            }
        })
        .claim(|_| ClaimResponse::confirmed())
        .quit_delay(quit_delay)
        .build()
}

#[tokio::test]
async fn test_first_successful_worker_wins_and_stops_the_rest() {
    let harness = TestHarness::new(contested_site(1, 25, Duration::ZERO));

    let outcome = harness.run(&racing(fixtures::request(), 3)).await;
    assert!(outcome.ok);
    assert_eq!(outcome.worker, Some(1));

    let claims = harness.site.claims().await;
    assert_eq!(claims.len(), 1);
    assert_eq!((claims[0].worker, claims[0].poll), (1, 1));
    harness.assert_all_quit().await;
}

#[tokio::test]
async fn test_slow_browser_shutdown_does_not_delay_stopping_siblings() {
    let harness = TestHarness::new(contested_site(0, 25, Duration::from_millis(800)));

    let outcome = harness.run(&racing(fixtures::request(), 2)).await;
    assert!(outcome.ok);
    assert_eq!(outcome.worker, Some(0));

    let claims = harness.site.claims().await;
    assert_eq!(claims.len(), 1, "duplicate claims: {:?}", claims);
    assert_eq!(claims[0].worker, 0);
    harness.assert_all_quit().await;
}

#[tokio::test]
async fn test_single_worker_matches_race_outcome() {
    let site = || {
        MockSite::builder()
            .rows(|_, _| vec![MockRow::train("SRT", "매진", "예약하기", "-")])
            .claim(|_| ClaimResponse::confirmed())
            .build()
    };

    let single = TestHarness::new(site()).run(&fixtures::request()).await;
    let raced = TestHarness::new(site())
        .run(&racing(fixtures::request(), 2))
        .await;

    assert!(single.ok && raced.ok);
    assert_eq!(single.kind, raced.kind);
    assert_eq!(single.seat, raced.seat);
}

#[tokio::test]
async fn test_single_worker_launch_failure() {
    let site = MockSite::builder()
        .launch_error(DriverError::LaunchFailed("chromedriver exited".into()))
        .build();
    let harness = TestHarness::new(site);

    let outcome = harness.run(&fixtures::request()).await;
    assert!(!outcome.ok);
    assert_eq!(outcome.error, Some(ErrorKind::DriverLaunchFailed));
    assert_eq!(outcome.worker, Some(0));
    assert_eq!(harness.site.quits().await, 0);
}

#[tokio::test]
async fn test_no_worker_succeeded_lists_reasons() {
    let site = MockSite::builder()
        .launch_error(DriverError::LaunchFailed("chromedriver exited".into()))
        .login_dialog("비밀번호가 일치하지 않습니다.")
        .build();
    let harness = TestHarness::new(site);

    let outcome = harness.run(&racing(fixtures::request(), 2)).await;
    assert!(!outcome.ok);
    assert_eq!(outcome.error, Some(ErrorKind::NoWorkerSucceeded));
    assert_eq!(outcome.worker, None);

    let message = outcome.message.unwrap();
    assert!(message.contains("driver_launch_failed"), "{}", message);
    assert!(message.contains("authentication_failed"), "{}", message);
    harness.assert_all_quit().await;
}

#[tokio::test]
async fn test_cancel_stops_every_worker() {
    let harness = TestHarness::new(MockSite::builder().build());
    let cancel = CancelSignal::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.set();
    });

    let outcome = harness
        .run_with_cancel(&racing(fixtures::request(), 3), &cancel)
        .await;
    assert_eq!(outcome.error, Some(ErrorKind::UserCancelled));
    assert!(harness.site.claims().await.is_empty());
    assert!(harness.site.queries().await > 0);
    harness.assert_all_quit().await;
}

#[tokio::test]
async fn test_cancel_before_start_launches_nothing() {
    let harness = TestHarness::new(MockSite::builder().build());
    let cancel = CancelSignal::new();
    cancel.set();

    let outcome = harness.run_with_cancel(&fixtures::request(), &cancel).await;
    assert!(outcome.is_cancelled());
    assert!(harness.factory.launches().await.is_empty());
}

#[tokio::test]
async fn test_invalid_request_is_refused_without_launching() {
    let harness = TestHarness::new(MockSite::builder().build());

    let outcome = harness.run(&racing(fixtures::request(), 9)).await;
    assert_eq!(outcome.error, Some(ErrorKind::InvalidRequest));
    assert!(harness.factory.launches().await.is_empty());
}

#[tokio::test]
async fn test_waitlist_race_through_coordinator() {
    let site = MockSite::builder()
        .rows(|_, _| vec![MockRow::train("SRT", "매진", "매진", "신청하기")])
        .claim(|_| ClaimResponse::confirmed())
        .build();
    let harness = TestHarness::new(site);

    let request = AttemptRequest {
        mode: ClaimMode::Waitlist,
        ..fixtures::request()
    };
    let outcome = harness.run(&request).await;
    assert!(outcome.ok);
    assert_eq!(outcome.kind, ClaimKind::Waitlist);
    assert_eq!(outcome.seat, None);
    assert_eq!(harness.site.claims().await[0].column, 8);
}

#[test]
fn test_engine_settings_from_config() {
    let mut config = fixtures::fast_config();
    config.layout.default_columns.standard = 5;

    let settings = EngineSettings::from(&config);
    assert_eq!(settings.layout.default_columns.standard, 5);
    assert_eq!(settings.site.dialog_timeout_ms, 50);
}
