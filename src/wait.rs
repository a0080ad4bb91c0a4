//! Waiting for elements to appear.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::agent::{dom_failure, Agent};
use crate::dom::Document;
use crate::envelope::{Envelope, ErrorKind};

/// Timeout used when the caller does not give one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Delay between presence checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl<D: Document> Agent<D> {
    /// Poll until `selector` matches an element or `timeout` elapses.
    ///
    /// The first check happens immediately, so an element already present
    /// succeeds without delay. The timeout is reported once more than
    /// `timeout` has passed since the call; a zero timeout still gets the
    /// immediate check and at most one poll.
    pub async fn wait_for(&self, selector: &str, timeout: Option<Duration>) -> Envelope {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let start = Instant::now();
        loop {
            match self.document().count(selector).await {
                Ok(0) => {}
                Ok(_) => {
                    debug!("wait_for: {} after {:?}", selector, start.elapsed());
                    return Envelope::success();
                }
                Err(e) => return dom_failure(e),
            }
            if start.elapsed() > timeout {
                debug!("wait_for: {} timed out after {:?}", selector, timeout);
                return Envelope::failure(
                    ErrorKind::Timeout,
                    format!("Timeout waiting for: {}", selector),
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::Element;
    use crate::dom::MemoryDocument;
    use crate::profile::Profile;

    fn agent(doc: &MemoryDocument) -> Agent<MemoryDocument> {
        Agent::new(doc.clone(), Profile::builtin("en-US").unwrap())
    }

    #[tokio::test]
    async fn test_present_element_returns_immediately() {
        let doc = MemoryDocument::with([Element::new("div").id("ready")]);
        let start = Instant::now();
        let result = agent(&doc).wait_for("#ready", None).await;
        assert_eq!(result.code, ErrorKind::Success);
        assert!(start.elapsed() < POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_timeout_message() {
        let doc = MemoryDocument::new();
        let start = Instant::now();
        let result = agent(&doc)
            .wait_for("#never", Some(Duration::from_millis(250)))
            .await;
        assert_eq!(result.code, ErrorKind::Timeout);
        assert_eq!(result.message.as_deref(), Some("Timeout waiting for: #never"));
        assert!(start.elapsed() > Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_exception() {
        let doc = MemoryDocument::new();
        let result = agent(&doc).wait_for("[", Some(Duration::from_millis(10))).await;
        assert_eq!(result.code, ErrorKind::Exception);
    }
}
