//! Recognized sign-in steps, their handlers, and the dispatch executor.
//!
//! Each [`Step`] expands into a short plan of [`Interaction`]s built from the
//! profile and the caller's [`Credentials`]. The executor runs the plan
//! through the agent's primitives and folds the results into one envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::dom::Document;
use crate::envelope::{Envelope, ErrorKind};
use crate::profile::{ButtonRole, FailurePolicy, Profile, StepMatch};
use crate::Result;

/// Username and password consumed by the handlers.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A step of the sign-in flow the agent knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Account name entry.
    EnterUsername,
    EnterPassword,
    /// A one-time-code prompt; ask for other methods instead.
    ShowOtherWays,
    /// Method picker or email verification; choose the password.
    UsePassword,
    /// Windows Hello / biometric enrollment offer.
    SkipFastSignIn,
    /// "Are you trying to sign in to <app>?" confirmation.
    ConfirmApp,
    /// Passkey creation failed.
    DismissPasskeyError,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::EnterUsername,
        Step::EnterPassword,
        Step::ShowOtherWays,
        Step::UsePassword,
        Step::SkipFastSignIn,
        Step::ConfirmApp,
        Step::DismissPasskeyError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EnterUsername => "enter_username",
            Self::EnterPassword => "enter_password",
            Self::ShowOtherWays => "show_other_ways",
            Self::UsePassword => "use_password",
            Self::SkipFastSignIn => "skip_fast_sign_in",
            Self::ConfirmApp => "confirm_app",
            Self::DismissPasskeyError => "dismiss_passkey_error",
        }
    }

    /// Buttons this step's handler presses.
    pub fn buttons(self) -> &'static [ButtonRole] {
        match self {
            Self::EnterUsername | Self::EnterPassword => &[ButtonRole::Next],
            Self::ShowOtherWays => &[ButtonRole::OtherWays],
            Self::UsePassword => &[ButtonRole::UsePassword],
            Self::SkipFastSignIn => &[ButtonRole::Skip],
            Self::ConfirmApp => &[ButtonRole::Continue],
            Self::DismissPasskeyError => &[ButtonRole::Cancel],
        }
    }

    /// The ordered interactions that perform this step.
    pub fn plan(self, profile: &Profile, credentials: &Credentials) -> Result<Vec<Interaction>> {
        let click = |role| -> Result<Interaction> {
            Ok(Interaction::ClickText(profile.button(role)?.to_string()))
        };
        Ok(match self {
            Self::EnterUsername => vec![
                Interaction::Type {
                    selector: profile.selectors.username.clone(),
                    value: credentials.username.clone(),
                    secret: false,
                },
                click(ButtonRole::Next)?,
            ],
            Self::EnterPassword => vec![
                Interaction::Type {
                    selector: profile.selectors.password.clone(),
                    value: credentials.password.clone(),
                    secret: true,
                },
                click(ButtonRole::Next)?,
            ],
            Self::ShowOtherWays => vec![click(ButtonRole::OtherWays)?],
            Self::UsePassword => vec![click(ButtonRole::UsePassword)?],
            Self::SkipFastSignIn => vec![click(ButtonRole::Skip)?],
            Self::ConfirmApp => vec![click(ButtonRole::Continue)?],
            Self::DismissPasskeyError => vec![click(ButtonRole::Cancel)?],
        })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive call within a handler.
#[derive(Clone, PartialEq, Eq)]
pub enum Interaction {
    Type {
        selector: String,
        value: String,
        /// Keep the value out of logs.
        secret: bool,
    },
    ClickText(String),
}

impl fmt::Debug for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type {
                selector,
                value,
                secret,
            } => {
                let shown = if *secret { "<redacted>" } else { value.as_str() };
                write!(f, "type({}, {:?})", selector, shown)
            }
            Self::ClickText(text) => write!(f, "click_text({:?})", text),
        }
    }
}

impl<D: Document> Agent<D> {
    /// Perform the action for the step the page shows, using the stored credentials.
    pub async fn dispatch(&self, label: &str) -> Envelope {
        self.dispatch_with(label, self.credentials()).await
    }

    /// Perform the action for `label` with explicit credentials.
    ///
    /// Unknown labels yield `NO_HANDLER` without touching the document. A
    /// failing interaction is reported with its own code, so a missing field
    /// stays `NOT_FOUND` rather than becoming `EXCEPTION`.
    pub async fn dispatch_with(&self, label: &str, credentials: &Credentials) -> Envelope {
        let step = match self.profile().recognize(label) {
            StepMatch::Known(step) => step,
            StepMatch::Unrecognized(label) => {
                debug!("dispatch: no handler for '{}'", label);
                return Envelope::failure(ErrorKind::NoHandler, format!("No handler for: {}", label));
            }
        };

        let plan = match step.plan(self.profile(), credentials) {
            Ok(plan) => plan,
            Err(e) => return Envelope::exception(e.to_string()),
        };
        info!("dispatch: '{}' -> {} ({} interactions)", label, step, plan.len());

        let policy = self.profile().on_failure;
        let mut first_failure: Option<Envelope> = None;
        for (i, interaction) in plan.iter().enumerate() {
            debug!("{} [{}/{}]: {:?}", step, i + 1, plan.len(), interaction);
            let result = self.perform(interaction).await;
            if result.is_success() {
                continue;
            }

            warn!("{} failed at {:?}: {}", step, interaction, result);
            let failure = Envelope::failure(
                result.code,
                format!("{}: {}", step, result.message.unwrap_or_default()),
            );
            match policy {
                FailurePolicy::Abort => return failure,
                FailurePolicy::Continue => {
                    first_failure.get_or_insert(failure);
                }
            }
        }
        first_failure.unwrap_or_else(Envelope::success)
    }

    async fn perform(&self, interaction: &Interaction) -> Envelope {
        match interaction {
            Interaction::Type {
                selector, value, ..
            } => self.type_text(selector, value).await,
            Interaction::ClickText(text) => self.click_by_visible_text(text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_step_has_a_plan() {
        let profile = Profile::builtin("en-US").unwrap();
        let creds = Credentials::new("alice", "secret");
        for step in Step::ALL {
            let plan = step.plan(&profile, &creds).unwrap();
            assert!(!plan.is_empty(), "{} has an empty plan", step);
        }
    }

    #[test]
    fn test_password_plan() {
        let profile = Profile::builtin("zh-CN").unwrap();
        let plan = Step::EnterPassword
            .plan(&profile, &Credentials::new("alice", "secret"))
            .unwrap();
        assert_eq!(
            plan,
            vec![
                Interaction::Type {
                    selector: r#"[id="passwordEntry"]"#.into(),
                    value: "secret".into(),
                    secret: true,
                },
                Interaction::ClickText("下一步".into()),
            ]
        );
    }

    #[test]
    fn test_secrets_are_redacted() {
        let creds = Credentials::new("alice", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));

        let typed = Interaction::Type {
            selector: "#p".into(),
            value: "hunter2".into(),
            secret: true,
        };
        assert!(!format!("{:?}", typed).contains("hunter2"));
    }
}
