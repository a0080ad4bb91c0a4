//! The agent and its element interaction primitives.
//!
//! Every primitive resolves its selector against the document at call time,
//! performs one operation and reports the outcome as an [`Envelope`]. Nothing
//! escapes as an error: document failures become `EXCEPTION` envelopes, and a
//! node that detached mid-call becomes `NOT_FOUND`.

use tracing::debug;

use crate::dom::{Document, DomError};
use crate::envelope::Envelope;
use crate::profile::Profile;
use crate::steps::Credentials;

/// Drives one document on behalf of a host.
pub struct Agent<D: Document> {
    document: D,
    profile: Profile,
    credentials: Credentials,
}

/// Envelope for a document error. A node that vanished mid-call counts as missing.
pub(crate) fn dom_failure(err: DomError) -> Envelope {
    match err {
        DomError::NoMatch(_) | DomError::Detached => Envelope::not_found(err.to_string()),
        other => Envelope::exception(other.to_string()),
    }
}

impl<D: Document> Agent<D> {
    /// Create an agent with empty credentials.
    pub fn new(document: D, profile: Profile) -> Self {
        Self {
            document,
            profile,
            credentials: Credentials::default(),
        }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn into_document(self) -> D {
        self.document
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Replace the credentials the handlers consume. Always succeeds.
    pub fn set_credentials(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Envelope {
        self.credentials = Credentials::new(username, password);
        debug!("credentials set for '{}'", self.credentials.username);
        Envelope::success()
    }

    /// Report whether the page-side support is installed.
    pub async fn ready(&self) -> Envelope {
        match self.document.ready().await {
            Ok(ready) => Envelope::success().with_ready(ready),
            Err(e) => dom_failure(e),
        }
    }

    pub async fn exists(&self, selector: &str) -> Envelope {
        match self.document.count(selector).await {
            Ok(0) => Envelope::not_found(format!("Element not found: {}", selector)),
            Ok(_) => Envelope::success(),
            Err(e) => dom_failure(e),
        }
    }

    pub async fn click(&self, selector: &str) -> Envelope {
        debug!("click: {}", selector);
        match self.document.click(selector).await {
            Ok(()) => Envelope::success(),
            Err(e) => dom_failure(e),
        }
    }

    /// Click the first button-role element whose trimmed text or value is `text`.
    pub async fn click_by_visible_text(&self, text: &str) -> Envelope {
        match self.document.click_button(text).await {
            Ok(true) => {
                debug!("click_by_visible_text: '{}'", text);
                Envelope::success()
            }
            Ok(false) => Envelope::not_found(format!("Button not found: {}", text)),
            Err(e) => dom_failure(e),
        }
    }

    /// Type `value` into the element one character at a time.
    ///
    /// The field is cleared and each character appended through the platform
    /// value setter, with an `input` event after every character, then a
    /// `change` event. Frameworks that ignore bulk assignments see each
    /// keystroke. On failure the partially typed value stays in the field.
    pub async fn type_text(&self, selector: &str, value: &str) -> Envelope {
        debug!("type: {} ({} chars)", selector, value.chars().count());
        match self.document.type_text(selector, value).await {
            Ok(typed) => Envelope::success().with_value(typed),
            Err(e) => dom_failure(e),
        }
    }

    pub async fn get_text(&self, selector: &str) -> Envelope {
        match self.document.text_content(selector).await {
            Ok(text) => Envelope::success().with_text(text.trim()),
            Err(e) => dom_failure(e),
        }
    }

    /// Current value; no `value` field for elements without one.
    pub async fn get_value(&self, selector: &str) -> Envelope {
        match self.document.value(selector).await {
            Ok(value) => Envelope::success().with_value(value),
            Err(e) => dom_failure(e),
        }
    }

    /// Trimmed, non-empty labels of all button-role elements in document order.
    pub async fn list_buttons(&self) -> Envelope {
        match self.document.button_labels().await {
            Ok(labels) => Envelope::success().with_buttons(labels),
            Err(e) => dom_failure(e),
        }
    }

    /// Label of the step the page currently shows.
    ///
    /// Tries the step-title marker first, then the legacy title container.
    pub async fn current_step_label(&self) -> Envelope {
        let selectors = &self.profile.selectors;
        let candidates = [selectors.step_title.as_str(), selectors.legacy_title.as_str()];
        match self.document.first_text(&candidates).await {
            Ok(Some(text)) => Envelope::success().with_title(text.trim()),
            Ok(None) => Envelope::not_found("Title element not found"),
            Err(e) => dom_failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{Element, Fault};
    use crate::dom::MemoryDocument;
    use crate::envelope::ErrorKind;

    fn agent(doc: &MemoryDocument) -> Agent<MemoryDocument> {
        Agent::new(doc.clone(), Profile::builtin("en-US").unwrap())
    }

    #[tokio::test]
    async fn test_click_by_value_attribute() {
        let doc = MemoryDocument::with([
            Element::new("input").attr("type", "submit").attr("role", "button").value("Go"),
            Element::button("").attr("value", "Next").id("icon"),
        ]);
        let result = agent(&doc).click_by_visible_text("Next").await;
        assert_eq!(result.code, ErrorKind::Success);
        assert_eq!(doc.click_count(doc.find("#icon").unwrap()), 1);
    }

    #[tokio::test]
    async fn test_type_reaches_framework_state() {
        let doc = MemoryDocument::with([Element::controlled_input("email").value("old")]);
        let id = doc.find("#email").unwrap();

        let result = agent(&doc).type_text("#email", "bob@example.com").await;
        assert_eq!(result.code, ErrorKind::Success);
        assert_eq!(result.value.as_deref(), Some("bob@example.com"));
        assert_eq!(doc.framework_value(id).as_deref(), Some("bob@example.com"));
        assert_eq!(doc.focused(), None);
    }

    #[tokio::test]
    async fn test_type_dispatches_one_input_per_char() {
        use crate::dom::memory::EventKind;

        let doc = MemoryDocument::with([Element::input("name")]);
        let id = doc.find("#name").unwrap();
        agent(&doc).type_text("#name", "héllo").await;

        let kinds: Vec<EventKind> = doc.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::Focus));
        assert_eq!(kinds.last(), Some(&EventKind::Blur));
        assert_eq!(doc.event_counts(id).get(&EventKind::Input), Some(&5));
        assert_eq!(doc.event_counts(id).get(&EventKind::Change), Some(&1));
    }

    #[tokio::test]
    async fn test_type_failure_leaves_partial_value() {
        let doc = MemoryDocument::with([Element::input("code")]);
        let id = doc.find("#code").unwrap();
        doc.fail_on(id, Fault::InputAfter(2));

        let result = agent(&doc).type_text("#code", "123456").await;
        assert_eq!(result.code, ErrorKind::Exception);
        assert_eq!(result.message.as_deref(), Some("input listener threw"));
        assert_eq!(doc.platform_value(id).as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_type_into_non_input_is_exception() {
        let doc = MemoryDocument::with([Element::new("div").id("d")]);
        let result = agent(&doc).type_text("#d", "x").await;
        assert_eq!(result.code, ErrorKind::Exception);
    }

    #[tokio::test]
    async fn test_click_exception() {
        let doc = MemoryDocument::with([Element::button("Boom").id("b")]);
        doc.fail_on(doc.find("#b").unwrap(), Fault::Click);
        let result = agent(&doc).click("#b").await;
        assert_eq!(result.code, ErrorKind::Exception);
        assert_eq!(result.message.as_deref(), Some("click handler threw"));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_exception() {
        let doc = MemoryDocument::new();
        let result = agent(&doc).exists("div[").await;
        assert_eq!(result.code, ErrorKind::Exception);
    }

    #[tokio::test]
    async fn test_get_text_and_value() {
        let doc = MemoryDocument::with([
            Element::new("p").id("msg").text("  Welcome back \n"),
            Element::input("user").value("alice"),
        ]);
        let agent = agent(&doc);

        let text = agent.get_text("#msg").await;
        assert_eq!(text.text.as_deref(), Some("Welcome back"));

        let value = agent.get_value("#user").await;
        assert_eq!(value.value.as_deref(), Some("alice"));

        let none = agent.get_value("#msg").await;
        assert_eq!(none.code, ErrorKind::Success);
        assert_eq!(none.value, None);
    }

    #[tokio::test]
    async fn test_step_label_prefers_marker() {
        let doc = MemoryDocument::with([
            Element::new("div")
                .id("appConfirmPageTitle")
                .attr("class", "text-title")
                .text("Legacy"),
            Element::new("h1").attr("data-testid", "title").text(" Enter your password "),
        ]);
        let agent = agent(&doc);
        let label = agent.current_step_label().await;
        assert_eq!(label.title.as_deref(), Some("Enter your password"));

        doc.edit(|tree| tree.remove_matching("[data-testid=title]")).unwrap();
        let label = agent.current_step_label().await;
        assert_eq!(label.title.as_deref(), Some("Legacy"));

        doc.edit(|tree| tree.remove_matching(".text-title")).unwrap();
        let label = agent.current_step_label().await;
        assert_eq!(label.code, ErrorKind::NotFound);
        assert_eq!(label.message.as_deref(), Some("Title element not found"));
    }

    #[tokio::test]
    async fn test_missing_element_messages() {
        let doc = MemoryDocument::new();
        let agent = agent(&doc);

        for result in [
            agent.exists("#gone").await,
            agent.click("#gone").await,
            agent.get_text("#gone").await,
            agent.get_value("#gone").await,
            agent.type_text("#gone", "x").await,
        ] {
            assert_eq!(result.code, ErrorKind::NotFound);
            assert_eq!(result.message.as_deref(), Some("Element not found: #gone"));
        }

        let result = agent.click_by_visible_text("Next").await;
        assert_eq!(result.message.as_deref(), Some("Button not found: Next"));
    }

    #[tokio::test]
    async fn test_click_hook_can_replace_buttons() {
        let doc = MemoryDocument::with([Element::button("Next").id("first")]);
        doc.on_click("#first", |tree| {
            tree.navigate("about:next", [Element::button("Next").id("second")]);
        })
        .unwrap();
        let agent = agent(&doc);

        assert_eq!(agent.click_by_visible_text("Next").await.code, ErrorKind::Success);
        assert_eq!(agent.click_by_visible_text("Next").await.code, ErrorKind::Success);
        assert_eq!(doc.click_count(doc.find("#second").unwrap()), 1);
    }

    #[tokio::test]
    async fn test_ready_flag() {
        let doc = MemoryDocument::new();
        let agent = agent(&doc);
        assert_eq!(agent.ready().await.ready, Some(true));
        doc.set_ready(false);
        assert_eq!(agent.ready().await.ready, Some(false));
    }
}
