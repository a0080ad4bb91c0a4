//! The document the agent acts on.
//!
//! [`Document`] is the seam between the agent's primitives and a concrete
//! page: [`crate::page::PageDocument`] drives a live browser tab over CDP,
//! [`memory::MemoryDocument`] is an in-process tree used in tests.
//!
//! Elements are addressed by selector and resolved again on every call,
//! because the page may re-render between calls. Each operation runs to
//! completion as one unit: the page gets no chance to run between resolving
//! an element and acting on it.

pub mod memory;

use std::future::Future;

pub use memory::MemoryDocument;

/// Selector matching every button-role element, in document order.
pub const BUTTON_SELECTOR: &str = r#"button, [role="button"]"#;

/// Errors raised by a [`Document`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Nothing matched the selector.
    #[error("Element not found: {0}")]
    NoMatch(String),

    /// The element was removed from the document while being acted on.
    #[error("node is no longer attached to the document")]
    Detached,

    #[error("element does not accept a value: <{0}>")]
    NotInputCapable(String),

    /// The page raised an error while executing the operation.
    #[error("{0}")]
    Script(String),

    #[error("document unavailable: {0}")]
    Unavailable(String),
}

pub type DomResult<T> = std::result::Result<T, DomError>;

/// Synthetic events the agent dispatches. Both bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    Input,
    Change,
}

impl DomEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Change => "change",
        }
    }
}

/// Minimal DOM surface the agent needs.
///
/// Operations on a single element fail with [`DomError::NoMatch`] when the
/// selector matches nothing.
pub trait Document: Send + Sync {
    /// Number of elements matching `selector`.
    fn count(&self, selector: &str) -> impl Future<Output = DomResult<usize>> + Send;

    /// Activate the first match as a user click would.
    fn click(&self, selector: &str) -> impl Future<Output = DomResult<()>> + Send;

    /// Untrimmed text content of the first match and its descendants.
    fn text_content(&self, selector: &str) -> impl Future<Output = DomResult<String>> + Send;

    /// The first match's `value` property; `None` for elements without one.
    fn value(&self, selector: &str) -> impl Future<Output = DomResult<Option<String>>> + Send;

    /// Type into the first match one character at a time.
    ///
    /// Focuses the element, clears it through the platform property setter,
    /// then for each character appends it through that setter and fires a
    /// bubbling `input` event. A bubbling `change` event and a blur follow.
    /// Setters a framework installed on the element are bypassed. Returns the
    /// final value. On failure the characters typed so far stay in place.
    fn type_text(
        &self,
        selector: &str,
        value: &str,
    ) -> impl Future<Output = DomResult<Option<String>>> + Send;

    /// Click the first button-role element whose trimmed text, or whose
    /// value, equals `text`. `false` when no button matches.
    fn click_button(&self, text: &str) -> impl Future<Output = DomResult<bool>> + Send;

    /// Trimmed, non-empty text of every button-role element, in document order.
    fn button_labels(&self) -> impl Future<Output = DomResult<Vec<String>>> + Send;

    /// Untrimmed text of the first element matching the earliest selector in
    /// `selectors` that matches anything.
    fn first_text(
        &self,
        selectors: &[&str],
    ) -> impl Future<Output = DomResult<Option<String>>> + Send;

    /// Whether the agent's page-side support is installed.
    fn ready(&self) -> impl Future<Output = DomResult<bool>> + Send {
        async { Ok(true) }
    }
}
