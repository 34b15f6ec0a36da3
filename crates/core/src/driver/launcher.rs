//! Local ChromeDriver launcher.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::{Driver, DriverConfig, DriverError, DriverFactory, SessionSpec, WebDriverSession};

/// Spawns one chromedriver + browser per session.
///
/// Worker N gets chromedriver port `port_base + N`, remote-debugging port
/// `debug_port_base + N` and its own temporary profile directory, so
/// concurrent workers never share cookies or state.
pub struct ChromeDriverFactory {
    config: DriverConfig,
    client: Client,
}

impl ChromeDriverFactory {
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DriverError::LaunchFailed(format!("http client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn browser_args(&self, spec: &SessionSpec, profile: &Path) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(mode) = spec.headless {
            args.push(mode.flag().to_string());
        }
        args.extend(
            ["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(format!("--window-size={}", self.config.window_size));
        args.push(format!("--user-data-dir={}", profile.display()));
        args.push(format!(
            "--remote-debugging-port={}",
            self.config.debug_port_base as usize + spec.worker_index
        ));
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    fn capabilities(&self, spec: &SessionSpec, profile: &Path) -> Value {
        let mut chrome_options = json!({ "args": self.browser_args(spec, profile) });
        if let Some(binary) = self.config.resolve_browser_binary() {
            chrome_options["binary"] = json!(binary.display().to_string());
        }
        json!({
            "alwaysMatch": {
                "browserName": "chrome",
                "unhandledPromptBehavior": "ignore",
                "goog:chromeOptions": chrome_options,
            }
        })
    }

    fn spawn_service(&self, port: usize) -> Result<Child, DriverError> {
        let binary = self.config.resolve_chromedriver();
        debug!(binary = %binary.display(), port, "spawning chromedriver");
        Command::new(&binary)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::LaunchFailed(format!("{}: {}", binary.display(), e)))
    }

    /// Poll `/status` with backoff until the service reports ready.
    async fn wait_ready(&self, base_url: &str) -> Result<(), DriverError> {
        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        let start = Instant::now();
        let mut interval = Duration::from_millis(50);

        loop {
            if let Ok(response) = self.client.get(format!("{}/status", base_url)).send().await {
                if let Ok(body) = response.json::<Value>().await {
                    if body["value"]["ready"].as_bool().unwrap_or(false) {
                        return Ok(());
                    }
                }
            }

            if start.elapsed() >= timeout {
                return Err(DriverError::LaunchFailed(format!(
                    "chromedriver at {} not ready after {}s",
                    base_url, self.config.startup_timeout_secs
                )));
            }

            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(Duration::from_millis(500));
        }
    }
}

#[async_trait]
impl DriverFactory for ChromeDriverFactory {
    fn name(&self) -> &'static str {
        "chromedriver"
    }

    async fn launch(&self, spec: &SessionSpec) -> Result<Box<dyn Driver>, DriverError> {
        let port = self.config.port_base as usize + spec.worker_index;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut builder = tempfile::Builder::new();
        let prefix = format!("seatrace-worker{}-", spec.worker_index);
        builder.prefix(&prefix);
        let profile = match &self.config.profile_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| DriverError::LaunchFailed(format!("profile dir: {}", e)))?;

        let mut service = self.spawn_service(port)?;
        if let Err(e) = self.wait_ready(&base_url).await {
            let _ = service.kill().await;
            return Err(e);
        }

        let capabilities = self.capabilities(spec, profile.path());
        let session = match WebDriverSession::create(self.client.clone(), &base_url, capabilities).await {
            Ok(session) => session,
            Err(e) => {
                let _ = service.kill().await;
                return Err(e);
            }
        };

        info!(
            worker = spec.worker_index,
            port,
            headless = ?spec.headless,
            profile = %profile.path().display(),
            "browser session started"
        );

        Ok(Box::new(session.with_service(service, profile)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::HeadlessMode;
    use std::path::PathBuf;

    fn factory() -> ChromeDriverFactory {
        ChromeDriverFactory::new(DriverConfig {
            browser_binary: Some(PathBuf::from("/opt/chrome")),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_browser_args_per_worker() {
        let spec = SessionSpec {
            worker_index: 2,
            headless: Some(HeadlessMode::New),
        };
        let args = factory().browser_args(&spec, Path::new("/tmp/p2"));
        assert_eq!(args[0], "--headless=new");
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--window-size=1280,1000".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/p2".to_string()));
        assert!(args.contains(&"--remote-debugging-port=9224".to_string()));
    }

    #[test]
    fn test_browser_args_headed_and_legacy() {
        let headed = SessionSpec {
            worker_index: 0,
            headless: None,
        };
        let args = factory().browser_args(&headed, Path::new("/tmp/p0"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));

        let legacy = SessionSpec {
            worker_index: 0,
            headless: Some(HeadlessMode::Legacy),
        };
        let args = factory().browser_args(&legacy, Path::new("/tmp/p0"));
        assert_eq!(args[0], "--headless");
    }

    #[test]
    fn test_capabilities_include_binary() {
        let spec = SessionSpec {
            worker_index: 0,
            headless: Some(HeadlessMode::New),
        };
        let caps = factory().capabilities(&spec, Path::new("/tmp/p"));
        let options = &caps["alwaysMatch"]["goog:chromeOptions"];
        assert_eq!(options["binary"], "/opt/chrome");
        assert_eq!(caps["alwaysMatch"]["unhandledPromptBehavior"], "ignore");
    }
}
