//! # signin-agent
//!
//! Step-aware sign-in automation. The agent reads the label of the step a
//! login page shows, looks it up in a [`Profile`], and performs that step's
//! action: typing the username or password, or pressing the button that
//! moves the flow along.
//!
//! Every operation answers with an [`Envelope`] carrying a numeric code
//! (`SUCCESS`, `EXCEPTION`, `NO_HANDLER`, `NOT_FOUND`, `TIMEOUT`) and
//! optional payload, so a host can drive the agent over any text channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use signin_agent::{Agent, PageDocument, Profile};
//!
//! # #[tokio::main]
//! # async fn main() -> signin_agent::Result<()> {
//! let document = PageDocument::launch(Default::default()).await?;
//! document.goto("https://login.live.com").await?;
//!
//! let mut agent = Agent::new(document, Profile::builtin("en-US")?);
//! agent.set_credentials("alice@example.com", "secret");
//!
//! let title = agent.wait_for(&agent.profile().selectors.any_title(), None).await;
//! if title.is_success() {
//!     let label = agent.current_step_label().await;
//!     let result = agent.dispatch(label.title.as_deref().unwrap_or_default()).await;
//!     println!("{}", result);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod dom;
pub mod envelope;
pub mod page;
pub mod profile;
pub mod protocol;
pub mod steps;
pub mod wait;

pub use agent::Agent;
pub use dom::{Document, DomError, DomEvent, MemoryDocument};
pub use envelope::{Envelope, ErrorKind};
pub use page::{LaunchOptions, PageDocument};
pub use profile::{ButtonRole, FailurePolicy, Profile, Selectors, StepMatch};
pub use protocol::Request;
pub use steps::{Credentials, Interaction, Step};

/// Result type for signin-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from loading profiles and setting up documents.
///
/// Boundary operations never return these; they answer with envelopes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("document error: {0}")]
    Dom(#[from] DomError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("missing field".into());
        assert_eq!(err.to_string(), "config error: missing field");

        let err = Error::from(DomError::Detached);
        assert_eq!(
            err.to_string(),
            "document error: node is no longer attached to the document"
        );
    }
}
