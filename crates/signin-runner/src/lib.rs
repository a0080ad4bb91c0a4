//! # signin-runner
//!
//! Drive a sign-in flow to completion. A YAML config names the login page,
//! the profile and the account; the runner then loops: wait for a step title,
//! read its label, dispatch it, let the page settle. It stops once no step
//! title shows up or the success conditions hold.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use signin_runner::{Config, Runner, Vars};
//!
//! # #[tokio::main]
//! # async fn main() -> signin_runner::Result<()> {
//! let vars = Vars::new().set("user", "alice@example.com");
//! let config = Config::load("xbox.yaml", &vars)?;
//! let mut runner = Runner::new(&config).await?;
//! let result = runner.run(&config).await?;
//! println!("Success: {}", result.success);
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::{
    BrowserConfig, Condition, Config, CredentialsConfig, FlowSettings, OnFailure, RetryConfig,
    SuccessCondition, TargetUrl, VarDecl, Vars, Viewport,
};
pub use runner::flow::{check_success, run_flow, FlowReport, Surface};
pub use runner::{load_profile, RunResult, Runner};

use signin_agent::Envelope;

/// Result type for signin-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or a flow run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error(transparent)]
    Agent(#[from] signin_agent::Error),

    /// The page shows a step the profile has no entry for.
    #[error("no handler for step '{label}' (buttons: {})", .buttons.join(", "))]
    UnknownStep { label: String, buttons: Vec<String> },

    #[error("step '{label}' failed: {envelope}")]
    StepFailed { label: String, envelope: Envelope },

    /// The same step kept coming back after being dispatched.
    #[error("stalled on step '{label}' ({repeats} dispatches in a row)")]
    Stalled { label: String, repeats: usize },

    #[error("gave up after {0} steps")]
    StepLimit(usize),

    /// Reading the page failed outside any step.
    #[error("page error: {0}")]
    Page(Envelope),
}

#[cfg(test)]
mod tests {
    use super::*;
    use signin_agent::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::Config("test error".into());
        assert_eq!(err.to_string(), "config error: test error");

        let err = Error::UnknownStep {
            label: "Stay signed in?".into(),
            buttons: vec!["Yes".into(), "No".into()],
        };
        assert_eq!(
            err.to_string(),
            "no handler for step 'Stay signed in?' (buttons: Yes, No)"
        );

        let err = Error::StepFailed {
            label: "Sign in".into(),
            envelope: Envelope::failure(ErrorKind::NotFound, "Button not found: Next"),
        };
        assert_eq!(
            err.to_string(),
            "step 'Sign in' failed: NOT_FOUND: Button not found: Next"
        );
    }
}
