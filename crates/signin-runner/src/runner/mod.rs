pub mod flow;

use crate::config::{BrowserConfig, Config};
use crate::{Error, Result};
use signin_agent::{Agent, LaunchOptions, PageDocument, Profile};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Result of running a flow.
#[derive(Debug)]
pub struct RunResult {
    /// Whether the run succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Step labels dispatched in the last attempt.
    pub steps: Vec<String>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    /// Number of retry attempts made.
    pub retries: u32,
}

/// Load a profile by built-in name, or from a path relative to `base_path`.
pub fn load_profile(name_or_path: &str, base_path: impl AsRef<Path>) -> Result<Profile> {
    if signin_agent::profile::BUILTIN_PROFILES.contains(&name_or_path) {
        return Ok(Profile::builtin(name_or_path)?);
    }
    let path = base_path.as_ref().join(name_or_path);
    Ok(Profile::load(path)?)
}

fn launch_options(config: &BrowserConfig) -> LaunchOptions {
    LaunchOptions {
        headless: config.headless,
        proxy: config.proxy.clone(),
        user_agent: config.user_agent.clone(),
        viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
        viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
    }
}

/// Runs sign-in flows in one browser.
pub struct Runner {
    agent: Agent<PageDocument>,
}

impl Runner {
    /// Launch a browser and load the config's profile.
    pub async fn new(config: &Config) -> Result<Self> {
        Self::with_base_path(config, ".").await
    }

    /// Like [`Runner::new`], resolving a profile path against `base_path`.
    pub async fn with_base_path(config: &Config, base_path: impl AsRef<Path>) -> Result<Self> {
        let profile = load_profile(&config.profile, base_path)?;
        debug!(
            "Launching browser (headless: {}, proxy: {:?}, profile: {})",
            config.browser.headless, config.browser.proxy, profile.name
        );
        let document = PageDocument::launch(launch_options(&config.browser)).await?;
        Ok(Self {
            agent: Agent::new(document, profile),
        })
    }

    pub fn agent(&self) -> &Agent<PageDocument> {
        &self.agent
    }

    /// Get a reference to the page.
    pub fn page(&self) -> &eoka::Page {
        self.agent.document().page()
    }

    /// Run the flow with retry support.
    pub async fn run(&mut self, config: &Config) -> Result<RunResult> {
        let start = Instant::now();
        let retry_config = config.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let max_attempts = retry_config.map(|r| r.attempts).unwrap_or(1);
        let retry_delay = retry_config.map(|r| r.delay_ms).unwrap_or(0);

        self.agent
            .set_credentials(&config.credentials.username, &config.credentials.password);

        let mut last_error = None;
        let mut last_steps = Vec::new();
        let mut retries = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                retries += 1;
                info!("Retry attempt {}/{}", attempt, max_attempts);
                if retry_delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay)).await;
                }
            }

            match self.run_once(config).await {
                Ok(report) if report.success => {
                    return Ok(RunResult {
                        success: true,
                        error: None,
                        steps: report.steps,
                        duration_ms: start.elapsed().as_millis() as u64,
                        retries,
                    });
                }
                Ok(report) => {
                    last_steps = report.steps;
                    last_error = Some("success conditions not met".to_string());
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt, e);
                    last_steps.clear();
                    last_error = Some(e.to_string());
                    // A page the profile cannot handle will not change on retry.
                    if matches!(e, Error::UnknownStep { .. } | Error::Agent(_)) {
                        break;
                    }
                }
            }
        }

        self.handle_failure(config).await;
        Ok(RunResult {
            success: false,
            error: last_error,
            steps: last_steps,
            duration_ms: start.elapsed().as_millis() as u64,
            retries,
        })
    }

    async fn handle_failure(&self, config: &Config) {
        let Some(screenshot_path) = config
            .on_failure
            .as_ref()
            .and_then(|f| f.screenshot.as_ref())
        else {
            return;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = screenshot_path.replace("{timestamp}", &timestamp.to_string());
        info!("Saving failure screenshot to: {}", path);
        match self.agent.document().screenshot().await {
            Ok(data) => {
                if let Err(e) = std::fs::write(&path, data) {
                    warn!("Failed to save screenshot: {}", e);
                }
            }
            Err(e) => warn!("Failed to take screenshot: {}", e),
        }
    }

    async fn run_once(&mut self, config: &Config) -> Result<flow::FlowReport> {
        info!("Navigating to: {}", config.target.url);
        self.agent.document().goto(&config.target.url).await?;
        flow::run_flow(&self.agent, &config.flow, config.success.as_ref()).await
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.agent.into_document().close().await?;
        Ok(())
    }
}
