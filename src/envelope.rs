//! The uniform result value returned by every boundary operation.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome code carried by every [`Envelope`].
///
/// The numeric values are part of the wire contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    /// The operation fully completed its intended effect.
    Success = 0,
    /// An unexpected failure occurred while acting.
    Exception = 1,
    /// No dispatch entry exists for the given label.
    NoHandler = 2,
    /// A required element or selector did not resolve.
    NotFound = 3,
    /// A bounded wait expired.
    Timeout = 4,
}

impl ErrorKind {
    /// Wire value of this code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Exception),
            2 => Some(Self::NoHandler),
            3 => Some(Self::NotFound),
            4 => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Exception => "EXCEPTION",
            Self::NoHandler => "NO_HANDLER",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code).ok_or_else(|| {
            de::Error::invalid_value(de::Unexpected::Unsigned(code as u64), &"an error code 0-4")
        })
    }
}

/// Result of one boundary operation: a code, an optional message, and the
/// operation-specific payload field, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Field value after `type`, or current value from `getValue`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Trimmed text content from `getText`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Step label from `currentStepLabel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Button labels from `listButtons`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<String>>,
    /// Readiness flag from `ready`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

impl Envelope {
    fn bare(code: ErrorKind) -> Self {
        Self {
            code,
            message: None,
            value: None,
            text: None,
            title: None,
            buttons: None,
            ready: None,
        }
    }

    pub fn success() -> Self {
        Self::bare(ErrorKind::Success)
    }

    /// A failure envelope with a message.
    pub fn failure(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::bare(code)
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::failure(ErrorKind::Exception, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(ErrorKind::NotFound, message)
    }

    pub fn with_value(mut self, value: Option<String>) -> Self {
        self.value = value;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<String>) -> Self {
        self.buttons = Some(buttons);
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Serialize to the textual form handed back across the boundary.
    pub fn to_json(&self) -> String {
        // Only strings, bools and a u8 are serialized, which cannot fail.
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"code\":{}}}", ErrorKind::Exception.code()))
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(ref message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorKind::Success.code(), 0);
        assert_eq!(ErrorKind::Exception.code(), 1);
        assert_eq!(ErrorKind::NoHandler.code(), 2);
        assert_eq!(ErrorKind::NotFound.code(), 3);
        assert_eq!(ErrorKind::Timeout.code(), 4);
        assert_eq!(ErrorKind::from_code(5), None);
    }

    #[test]
    fn test_success_serializes_code_only() {
        assert_eq!(Envelope::success().to_json(), r#"{"code":0}"#);
    }

    #[test]
    fn test_failure_carries_message() {
        let json = Envelope::not_found("Element not found: #x").to_json();
        assert_eq!(json, r##"{"code":3,"message":"Element not found: #x"}"##);
    }

    #[test]
    fn test_buttons_payload() {
        let env = Envelope::success().with_buttons(vec!["A".into(), "B".into()]);
        assert_eq!(env.to_json(), r#"{"code":0,"buttons":["A","B"]}"#);
    }

    #[test]
    fn test_parse_rejects_unknown_code() {
        let parsed: Result<Envelope, _> = serde_json::from_str(r#"{"code":9}"#);
        assert!(parsed.is_err());

        let parsed: Envelope = serde_json::from_str(r#"{"code":4,"message":"late"}"#).unwrap();
        assert_eq!(parsed.code, ErrorKind::Timeout);
        assert_eq!(parsed.message.as_deref(), Some("late"));
    }
}
