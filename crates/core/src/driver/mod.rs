//! Browser driver abstraction.
//!
//! The [`Driver`] trait is the only way the attempt engine touches a browser.
//! [`WebDriverSession`] speaks the W3C WebDriver protocol to a chromedriver
//! spawned by [`ChromeDriverFactory`].

mod config;
mod launcher;
mod types;
pub mod wait;
mod webdriver;

pub use config::DriverConfig;
pub use launcher::ChromeDriverFactory;
pub use types::*;
pub use webdriver::WebDriverSession;

use tracing::warn;

/// Launch a session for `worker_index`, retrying once with legacy headless
/// mode when the browser rejects `--headless=new`.
pub async fn launch_session(
    factory: &dyn DriverFactory,
    worker_index: usize,
    headless: bool,
) -> Result<Box<dyn Driver>, DriverError> {
    let spec = SessionSpec {
        worker_index,
        headless: headless.then_some(HeadlessMode::New),
    };

    match factory.launch(&spec).await {
        Ok(driver) => Ok(driver),
        Err(e) if headless && is_headless_rejection(&e) => {
            warn!(worker = worker_index, error = %e, "new headless mode rejected, retrying with legacy flag");
            crate::metrics::HEADLESS_FALLBACKS.inc();
            let legacy = SessionSpec {
                headless: Some(HeadlessMode::Legacy),
                ..spec
            };
            factory.launch(&legacy).await
        }
        Err(e) => Err(e),
    }
}

fn is_headless_rejection(error: &DriverError) -> bool {
    match error {
        DriverError::LaunchFailed(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("headless") || msg.contains("unrecognized") || msg.contains("unknown flag")
        }
        _ => false,
    }
}
