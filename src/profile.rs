//! Flow profiles: the configuration data that ties a sign-in UI to the agent.
//!
//! A profile names the selectors the handlers type into, the visible labels
//! of the buttons they press, and which step label maps to which [`Step`].
//! Labels are matched exactly, so each UI language gets its own profile.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::steps::Step;
use crate::{Error, Result};

const ZH_CN: &str = include_str!("../profiles/zh-CN.yaml");
const EN_US: &str = include_str!("../profiles/en-US.yaml");

/// Names accepted by [`Profile::builtin`].
pub const BUILTIN_PROFILES: &[&str] = &["zh-CN", "en-US"];

/// A button the handlers press, identified by role rather than label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonRole {
    Next,
    OtherWays,
    UsePassword,
    Skip,
    Continue,
    Cancel,
}

impl ButtonRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::OtherWays => "other_ways",
            Self::UsePassword => "use_password",
            Self::Skip => "skip",
            Self::Continue => "continue",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ButtonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do when one interaction of a handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Attempt every interaction, then report the first failure.
    #[default]
    Continue,
    /// Stop at the first failed interaction and report it.
    Abort,
}

/// Selectors the agent resolves on every call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub username: String,
    pub password: String,
    /// Element carrying the current step title.
    pub step_title: String,
    /// Older title container, tried when `step_title` is absent.
    pub legacy_title: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            username: r#"[id="usernameEntry"]"#.into(),
            password: r#"[id="passwordEntry"]"#.into(),
            step_title: r#"[data-testid="title"]"#.into(),
            legacy_title: "div#appConfirmPageTitle.text-title".into(),
        }
    }
}

impl Selectors {
    /// Selector list matching either title location.
    pub fn any_title(&self) -> String {
        format!("{}, {}", self.step_title, self.legacy_title)
    }
}

/// Outcome of looking a label up in the step table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMatch<'a> {
    Known(Step),
    Unrecognized(&'a str),
}

/// A complete flow profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,

    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default)]
    pub selectors: Selectors,

    /// Visible button labels by role.
    #[serde(default)]
    pub buttons: HashMap<ButtonRole, String>,

    /// Step label (exact text) to step.
    #[serde(default)]
    pub steps: HashMap<String, Step>,

    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl Profile {
    /// Load a profile from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a profile from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let profile: Profile = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    /// One of the profiles shipped with the crate (see [`BUILTIN_PROFILES`]).
    pub fn builtin(name: &str) -> Result<Self> {
        match name {
            "zh-CN" => Self::parse(ZH_CN),
            "en-US" => Self::parse(EN_US),
            other => Err(Error::Config(format!(
                "unknown built-in profile '{}' (available: {})",
                other,
                BUILTIN_PROFILES.join(", ")
            ))),
        }
    }

    /// A built-in profile name, or else a path to a YAML file.
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        if BUILTIN_PROFILES.contains(&name_or_path) {
            Self::builtin(name_or_path)
        } else {
            Self::load(name_or_path)
        }
    }

    /// Exact-match lookup of a step label.
    pub fn recognize<'a>(&self, label: &'a str) -> StepMatch<'a> {
        match self.steps.get(label) {
            Some(step) => StepMatch::Known(*step),
            None => StepMatch::Unrecognized(label),
        }
    }

    /// Visible label of a button role.
    pub fn button(&self, role: ButtonRole) -> Result<&str> {
        self.buttons
            .get(&role)
            .map(String::as_str)
            .filter(|label| !label.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("profile '{}' has no label for button '{}'", self.name, role))
            })
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        let selectors = [
            ("selectors.username", &self.selectors.username),
            ("selectors.password", &self.selectors.password),
            ("selectors.step_title", &self.selectors.step_title),
            ("selectors.legacy_title", &self.selectors.legacy_title),
        ];
        for (field, value) in selectors {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", field)));
            }
        }
        for (label, step) in &self.steps {
            if label.trim().is_empty() {
                return Err(Error::Config(format!("empty label for step '{}'", step)));
            }
            for role in step.buttons() {
                self.button(*role)?;
            }
        }
        Ok(())
    }
}
