//! Bounded polling helpers.
//!
//! Each helper polls with exponential backoff (50ms doubling up to 400ms) and
//! gives up quietly once its timeout elapses. A zero timeout performs exactly
//! one check. Driver errors during polling count as "not yet".

use std::time::{Duration, Instant};

use tracing::trace;

use super::{Driver, DriverError, ElementRef, Locator};

const INITIAL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_INTERVAL: Duration = Duration::from_millis(400);

pub(crate) async fn poll_until<T, F, Fut>(timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let start = Instant::now();
    let mut interval = INITIAL_INTERVAL;

    loop {
        if let Some(found) = probe().await {
            return Some(found);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return None;
        }

        tokio::time::sleep(interval.min(timeout - elapsed)).await;
        interval = (interval * 2).min(MAX_INTERVAL);
    }
}

/// Wait for a JavaScript dialog and return its text.
pub async fn wait_for_dialog(driver: &dyn Driver, timeout: Duration) -> Option<String> {
    poll_until(timeout, || async {
        match driver.dialog_text().await {
            Ok(text) => text,
            Err(e) => {
                trace!(error = %e, "dialog probe failed");
                None
            }
        }
    })
    .await
}

/// Wait until `locator` matches at least one element.
///
/// Still empty after `timeout` yields an empty list. A driver error ends the
/// wait and is returned to the caller.
pub async fn wait_for_elements(
    driver: &dyn Driver,
    locator: &Locator,
    timeout: Duration,
) -> Result<Vec<ElementRef>, DriverError> {
    poll_until(timeout, || async {
        match driver.find_all(locator).await {
            Ok(found) if found.is_empty() => None,
            other => Some(other),
        }
    })
    .await
    .unwrap_or_else(|| Ok(Vec::new()))
}

/// Wait for a window handle that was not in `before`.
pub async fn wait_for_new_window(
    driver: &dyn Driver,
    before: &[String],
    timeout: Duration,
) -> Option<String> {
    poll_until(timeout, || async {
        match driver.window_handles().await {
            Ok(handles) => handles.into_iter().find(|h| !before.contains(h)),
            Err(e) => {
                trace!(error = %e, "window probe failed");
                None
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_until_zero_timeout_checks_once() {
        let mut calls = 0;
        let result: Option<()> = poll_until(Duration::ZERO, || {
            calls += 1;
            async { None }
        })
        .await;
        assert!(result.is_none());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_poll_until_returns_first_hit() {
        let mut calls = 0;
        let result = poll_until(Duration::from_secs(5), || {
            calls += 1;
            let n = calls;
            async move { (n == 3).then_some(n) }
        })
        .await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn test_wait_for_elements_is_bounded() {
        use crate::attempt::SiteConfig;
        use crate::testing::{MockDriver, MockRow, MockSite};

        let site = MockSite::builder()
            .rows(|_, poll| {
                if poll < 2 {
                    vec![]
                } else {
                    vec![MockRow::train("SRT", "-", "-", "-")]
                }
            })
            .build();
        let driver = MockDriver::new(0, site);
        driver.goto_search().await;
        let rows = SiteConfig::default().result_rows;

        let start = Instant::now();
        let found = wait_for_elements(&driver, &rows, Duration::from_millis(100)).await;
        assert!(found.unwrap().is_empty());
        assert!(start.elapsed() < Duration::from_secs(2));

        let query = driver.find(&SiteConfig::default().query_button).await.unwrap();
        driver.click(&query).await.unwrap();
        driver.click(&driver.find(&SiteConfig::default().query_button).await.unwrap()).await.unwrap();
        let found = wait_for_elements(&driver, &rows, Duration::from_secs(5)).await;
        assert_eq!(found.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_until_gives_up() {
        let start = Instant::now();
        let result: Option<()> = poll_until(Duration::from_millis(120), || async { None }).await;
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(120));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
