//! Text boundary between a host and the agent.
//!
//! A request is a JSON object tagged by `op`, with camelCase field names:
//!
//! ```json
//! {"op": "type", "selector": "#usernameEntry", "value": "alice"}
//! {"op": "waitFor", "selector": "[data-testid=\"title\"]", "timeoutMs": 3000}
//! ```
//!
//! Every request yields exactly one serialized [`Envelope`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::agent::Agent;
use crate::dom::Document;
use crate::envelope::Envelope;

/// One boundary operation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    SetCredentials { username: String, password: String },
    Dispatch { label: String },
    Exists { selector: String },
    Click { selector: String },
    ClickByVisibleText { text: String },
    Type { selector: String, value: String },
    GetText { selector: String },
    GetValue { selector: String },
    WaitFor {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    CurrentStepLabel,
    ListButtons,
    Ready,
}

impl Request {
    /// The `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            Self::SetCredentials { .. } => "setCredentials",
            Self::Dispatch { .. } => "dispatch",
            Self::Exists { .. } => "exists",
            Self::Click { .. } => "click",
            Self::ClickByVisibleText { .. } => "clickByVisibleText",
            Self::Type { .. } => "type",
            Self::GetText { .. } => "getText",
            Self::GetValue { .. } => "getValue",
            Self::WaitFor { .. } => "waitFor",
            Self::CurrentStepLabel => "currentStepLabel",
            Self::ListButtons => "listButtons",
            Self::Ready => "ready",
        }
    }
}

// Requests carry passwords; only the op is shown.
impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Request({})", self.op())
    }
}

impl<D: Document> Agent<D> {
    /// Execute one request.
    pub async fn call(&mut self, request: Request) -> Envelope {
        debug!("call: {}", request.op());
        match request {
            Request::SetCredentials { username, password } => {
                self.set_credentials(username, password)
            }
            Request::Dispatch { label } => self.dispatch(&label).await,
            Request::Exists { selector } => self.exists(&selector).await,
            Request::Click { selector } => self.click(&selector).await,
            Request::ClickByVisibleText { text } => self.click_by_visible_text(&text).await,
            Request::Type { selector, value } => self.type_text(&selector, &value).await,
            Request::GetText { selector } => self.get_text(&selector).await,
            Request::GetValue { selector } => self.get_value(&selector).await,
            Request::WaitFor {
                selector,
                timeout_ms,
            } => {
                self.wait_for(&selector, timeout_ms.map(Duration::from_millis))
                    .await
            }
            Request::CurrentStepLabel => self.current_step_label().await,
            Request::ListButtons => self.list_buttons().await,
            Request::Ready => self.ready().await,
        }
    }

    /// Execute a JSON request and return the JSON envelope.
    ///
    /// A request that does not parse is answered with `EXCEPTION`.
    pub async fn call_json(&mut self, request: &str) -> String {
        let envelope = match serde_json::from_str::<Request>(request) {
            Ok(request) => self.call(request).await,
            Err(e) => Envelope::exception(format!("malformed request: {}", e)),
        };
        envelope.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let req: Request =
            serde_json::from_str(r#"{"op":"waitFor","selector":"#a","timeoutMs":200}"#).unwrap();
        assert_eq!(
            req,
            Request::WaitFor {
                selector: "#a".into(),
                timeout_ms: Some(200)
            }
        );

        let req: Request = serde_json::from_str(r#"{"op":"waitFor","selector":"#a"}"#).unwrap();
        assert_eq!(
            req,
            Request::WaitFor {
                selector: "#a".into(),
                timeout_ms: None
            }
        );

        let req: Request = serde_json::from_str(r#"{"op":"listButtons"}"#).unwrap();
        assert_eq!(req, Request::ListButtons);

        let req: Request =
            serde_json::from_str(r#"{"op":"clickByVisibleText","text":"Next"}"#).unwrap();
        assert_eq!(req.op(), "clickByVisibleText");
    }

    #[test]
    fn test_op_tag_matches_serialization() {
        let req = Request::Type {
            selector: "#u".into(),
            value: "v".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["op"], req.op());
    }

    #[test]
    fn test_debug_hides_password() {
        let req = Request::SetCredentials {
            username: "alice".into(),
            password: "hunter2".into(),
        };
        assert_eq!(format!("{:?}", req), "Request(setCredentials)");
    }

    #[test]
    fn test_rejects_unknown() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"navigate","url":"x"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"op":"click"}"#).is_err());
    }
}
