//! The step loop: recognize, dispatch, settle, until the flow is done.

use std::future::Future;
use std::time::Duration;

use signin_agent::{Agent, Document, ErrorKind, MemoryDocument, PageDocument};
use tracing::{debug, info, warn};

use crate::config::{Condition, FlowSettings, SuccessCondition};
use crate::{Error, Result};

/// Page-level operations the loop needs on top of [`Document`].
pub trait Surface: Document {
    /// Current URL.
    fn location(&self) -> impl Future<Output = Result<String>> + Send;

    /// Text of the whole page.
    fn page_text(&self) -> impl Future<Output = Result<String>> + Send;

    /// Re-install page-side support after the page may have changed.
    fn prepare(&self) -> impl Future<Output = Result<()>> + Send;
}

impl Surface for PageDocument {
    async fn location(&self) -> Result<String> {
        Ok(self.url().await?)
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.text().await?)
    }

    async fn prepare(&self) -> Result<()> {
        Ok(self.install().await?)
    }
}

impl Surface for MemoryDocument {
    async fn location(&self) -> Result<String> {
        Ok(MemoryDocument::location(self))
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.text())
    }

    async fn prepare(&self) -> Result<()> {
        Ok(())
    }
}

/// What a finished loop did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowReport {
    /// Labels dispatched, in order.
    pub steps: Vec<String>,
    /// Whether the success conditions held at the end.
    pub success: bool,
}

/// Run the step loop on the agent's page.
///
/// The loop ends successfully once the success conditions hold, or, without
/// conditions, once no step title appears within `step_timeout_ms` after at
/// least one step was dispatched. Unknown
/// steps, failed dispatches, repeated steps and the step limit end it with an
/// error.
pub async fn run_flow<S: Surface>(
    agent: &Agent<S>,
    settings: &FlowSettings,
    success: Option<&SuccessCondition>,
) -> Result<FlowReport> {
    let title_selector = agent.profile().selectors.any_title();
    let step_timeout = Duration::from_millis(settings.step_timeout_ms);
    let mut report = FlowReport::default();
    let mut repeats = 0;

    loop {
        if let Some(conditions) = success {
            if check_success(agent, conditions).await? {
                info!("success conditions met after {} steps", report.steps.len());
                report.success = true;
                return Ok(report);
            }
        }

        agent.document().prepare().await?;
        let waited = agent.wait_for(&title_selector, Some(step_timeout)).await;
        match waited.code {
            ErrorKind::Success => {}
            ErrorKind::Timeout => {
                // Without conditions, a flow that never showed a step did not sign in.
                report.success = match success {
                    Some(conditions) => check_success(agent, conditions).await?,
                    None => !report.steps.is_empty(),
                };
                info!(
                    "no step shown after {} steps (success: {})",
                    report.steps.len(),
                    report.success
                );
                return Ok(report);
            }
            _ => return Err(Error::Page(waited)),
        }

        let current = agent.current_step_label().await;
        let label = match (current.code, current.title) {
            (ErrorKind::Success, Some(title)) => title,
            // The title went away between the wait and the read.
            (ErrorKind::NotFound, _) => continue,
            (_, _) => {
                return Err(Error::Page(signin_agent::Envelope::exception(
                    current.message.unwrap_or_default(),
                )))
            }
        };

        if report.steps.len() >= settings.max_steps {
            return Err(Error::StepLimit(settings.max_steps));
        }
        if report.steps.last() == Some(&label) {
            repeats += 1;
        } else {
            repeats = 1;
        }
        if repeats > settings.max_repeats {
            warn!("step '{}' keeps coming back", label);
            return Err(Error::Stalled {
                label,
                repeats: repeats - 1,
            });
        }

        let result = agent.dispatch(&label).await;
        match result.code {
            ErrorKind::Success => {
                debug!("step {}: '{}'", report.steps.len() + 1, label);
                report.steps.push(label);
            }
            ErrorKind::NoHandler => {
                let buttons = agent.list_buttons().await.buttons.unwrap_or_default();
                return Err(Error::UnknownStep { label, buttons });
            }
            _ => {
                return Err(Error::StepFailed {
                    label,
                    envelope: result,
                })
            }
        }

        if settings.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(settings.settle_ms)).await;
        }
    }
}

/// Evaluate success conditions against the agent's page.
pub async fn check_success<S: Surface>(
    agent: &Agent<S>,
    conditions: &SuccessCondition,
) -> Result<bool> {
    if let Some(ref any) = conditions.any {
        for cond in any {
            if check_condition(agent, cond).await? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Some(ref all) = conditions.all {
        for cond in all {
            if !check_condition(agent, cond).await? {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

async fn check_condition<S: Surface>(agent: &Agent<S>, condition: &Condition) -> Result<bool> {
    match condition {
        Condition::UrlContains(pattern) => Ok(agent.document().location().await?.contains(pattern)),
        Condition::TextContains(pattern) => {
            Ok(agent.document().page_text().await?.contains(pattern))
        }
        Condition::SelectorExists(selector) => {
            let found = agent.exists(selector).await;
            match found.code {
                ErrorKind::Success => Ok(true),
                ErrorKind::NotFound => Ok(false),
                _ => Err(Error::Page(found)),
            }
        }
    }
}
