//! In-process [`Document`] with framework-controlled inputs.
//!
//! Controlled inputs model the value tracking virtual-DOM frameworks do: the
//! framework remembers the last value it saw, assigning `el.value` goes
//! through the framework's own setter (which updates that memory), and an
//! `input` event only updates framework state when the platform value differs
//! from the remembered one. Values written through the platform setter are
//! therefore observed, bulk assignments through the intercepted setter are not.
//!
//! Selectors are evaluated by `scraper` against an HTML rendering of the
//! attached tree. Nestings the HTML parser would rearrange (a `div` inside a
//! `p`, nested buttons) do not match the way they are built.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use scraper::{Html, Selector};

use super::{Document, DomError, DomEvent, DomResult, BUTTON_SELECTOR};

/// Attribute carrying the arena index in the rendered HTML.
const NODE_ATTR: &str = "data-memory-node";

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn parse_selector(selector: &str) -> DomResult<Selector> {
    Selector::parse(selector).map_err(|_| DomError::InvalidSelector(selector.to_string()))
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Handle to a node in a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Something observable that happened to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Focus,
    Blur,
    Click,
    Input,
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub node: NodeId,
    pub kind: EventKind,
}

/// Injected failure for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Focus,
    Click,
    /// Fail the input event after this many successful ones.
    InputAfter(usize),
}

/// Declarative element description used to build documents.
#[derive(Debug, Clone, Default)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    value: Option<String>,
    controlled: bool,
    children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn button(text: impl Into<String>) -> Self {
        Self::new("button").text(text)
    }

    pub fn input(id: impl Into<String>) -> Self {
        Self::new("input").id(id)
    }

    /// An input whose value is owned by a framework.
    pub fn controlled_input(id: impl Into<String>) -> Self {
        Self::input(id).controlled()
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Initial value for value-bearing elements.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn controlled(mut self) -> Self {
        self.controlled = true;
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }
}

type ClickHook = Arc<dyn Fn(&mut DomTree) + Send + Sync>;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    attached: bool,
    // Platform value for value-bearing elements.
    value: Option<String>,
    // Framework state and the value the framework last saw, for controlled inputs.
    model: Option<String>,
    tracked: Option<String>,
    clicks: usize,
    inputs: usize,
    fault: Option<Fault>,
}

impl NodeData {
    fn has_value(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }
}

/// The tree behind a [`MemoryDocument`].
pub struct DomTree {
    nodes: Vec<NodeData>,
    root: NodeId,
    focused: Option<NodeId>,
    events: Vec<EventRecord>,
    hooks: Vec<(String, ClickHook)>,
    mutations: usize,
    ready: bool,
    location: String,
}

impl Default for DomTree {
    fn default() -> Self {
        let root = NodeData {
            tag: "#document".into(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            attached: true,
            value: None,
            model: None,
            tracked: None,
            clicks: 0,
            inputs: 0,
            fault: None,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            focused: None,
            events: Vec::new(),
            hooks: Vec::new(),
            mutations: 0,
            ready: true,
            location: "about:blank".into(),
        }
    }
}

impl DomTree {
    /// Append an element (and its children) under `parent`, or the document root.
    pub fn append(&mut self, parent: Option<NodeId>, element: Element) -> NodeId {
        let parent = parent.unwrap_or(self.root);
        let id = NodeId(self.nodes.len());
        let has_value = matches!(element.tag.as_str(), "input" | "textarea" | "select");
        let value = has_value.then(|| element.value.clone().unwrap_or_default());
        let (model, tracked) = if element.controlled && has_value {
            (value.clone(), value.clone())
        } else {
            (None, None)
        };
        let attached = self.nodes[parent.0].attached;
        self.nodes.push(NodeData {
            tag: element.tag,
            attrs: element.attrs,
            text: element.text,
            children: Vec::new(),
            parent: Some(parent),
            attached,
            value,
            model,
            tracked,
            clicks: 0,
            inputs: 0,
            fault: None,
        });
        self.nodes[parent.0].children.push(id);
        for child in element.children {
            self.append(Some(id), child);
        }
        id
    }

    /// Detach a node and its subtree from the document.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            self.nodes[node.0].attached = false;
            stack.extend(self.nodes[node.0].children.iter().copied());
        }
        if self.focused.is_some_and(|f| !self.nodes[f.0].attached) {
            self.focused = None;
        }
    }

    /// Remove every element matching `selector`.
    pub fn remove_matching(&mut self, selector: &str) -> DomResult<usize> {
        let found = self.select_all(selector)?;
        for id in &found {
            self.remove(*id);
        }
        Ok(found.len())
    }

    /// Replace the whole document with `elements` at a new location.
    pub fn navigate(&mut self, url: impl Into<String>, elements: impl IntoIterator<Item = Element>) {
        let children = std::mem::take(&mut self.nodes[self.root.0].children);
        for child in children {
            self.remove(child);
        }
        for element in elements {
            self.append(None, element);
        }
        self.location = url.into();
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.nodes[id.0].text = text.into();
    }

    /// Assign through the framework's intercepted setter (`el.value = v`).
    pub fn assign_value(&mut self, id: NodeId, value: &str) {
        let node = &mut self.nodes[id.0];
        if node.has_value() {
            node.value = Some(value.to_string());
            if node.tracked.is_some() {
                node.tracked = Some(value.to_string());
            }
        }
    }

    /// Attached elements matching `selector`, in document order.
    pub fn select_all(&self, selector: &str) -> DomResult<Vec<NodeId>> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_fragment(&self.to_html());
        Ok(html
            .select(&selector)
            .filter_map(|el| el.value().attr(NODE_ATTR)?.parse::<usize>().ok())
            .map(NodeId)
            .collect())
    }

    fn matches(&self, selector: &str, id: NodeId) -> bool {
        self.select_all(selector)
            .map(|found| found.contains(&id))
            .unwrap_or(false)
    }

    fn first(&self, selector: &str) -> DomResult<NodeId> {
        self.select_all(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| DomError::NoMatch(selector.to_string()))
    }

    fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.nodes[self.root.0].children {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        let _ = write!(out, r#"<{} {}="{}""#, node.tag, NODE_ATTR, id.0);
        for (name, value) in &node.attrs {
            let _ = write!(out, r#" {}=""#, name);
            escape_into(out, value, true);
            out.push('"');
        }
        out.push('>');
        if VOID_TAGS.contains(&node.tag.as_str()) {
            return;
        }
        escape_into(out, &node.text, false);
        for child in &node.children {
            self.write_html(*child, out);
        }
        let _ = write!(out, "</{}>", node.tag);
    }

    fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn live(&self, id: NodeId) -> DomResult<&NodeData> {
        match self.nodes.get(id.0) {
            Some(node) if node.attached => Ok(node),
            _ => Err(DomError::Detached),
        }
    }

    fn live_mut(&mut self, id: NodeId) -> DomResult<&mut NodeData> {
        match self.nodes.get_mut(id.0) {
            Some(node) if node.attached => Ok(node),
            _ => Err(DomError::Detached),
        }
    }

    fn text_of(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        let mut out = node.text.clone();
        for child in &node.children {
            out.push_str(&self.text_of(*child));
        }
        out
    }

    fn record(&mut self, node: NodeId, kind: EventKind) {
        self.mutations += 1;
        self.events.push(EventRecord { node, kind });
    }

    fn focus(&mut self, id: NodeId) -> DomResult<()> {
        if self.live(id)?.fault == Some(Fault::Focus) {
            return Err(DomError::Script("focus failed".into()));
        }
        self.focused = Some(id);
        self.record(id, EventKind::Focus);
        Ok(())
    }

    fn blur(&mut self, id: NodeId) -> DomResult<()> {
        self.live(id)?;
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.record(id, EventKind::Blur);
        Ok(())
    }

    fn click(&mut self, id: NodeId) -> DomResult<()> {
        let node = self.live_mut(id)?;
        if node.fault == Some(Fault::Click) {
            return Err(DomError::Script("click handler threw".into()));
        }
        node.clicks += 1;
        self.record(id, EventKind::Click);

        let hooks: Vec<ClickHook> = self
            .hooks
            .iter()
            .filter(|(selector, _)| self.matches(selector, id))
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        for hook in hooks {
            (hook.as_ref())(self);
        }
        Ok(())
    }

    fn set_native_value(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        let node = self.live_mut(id)?;
        if !node.has_value() {
            return Err(DomError::NotInputCapable(node.tag.clone()));
        }
        node.value = Some(value.to_string());
        self.mutations += 1;
        Ok(())
    }

    fn dispatch_event(&mut self, id: NodeId, event: DomEvent) -> DomResult<()> {
        let node = self.live_mut(id)?;
        let kind = match event {
            DomEvent::Input => {
                if let Some(Fault::InputAfter(limit)) = node.fault {
                    if node.inputs >= limit {
                        return Err(DomError::Script("input listener threw".into()));
                    }
                }
                node.inputs += 1;
                if node.tracked.is_some() && node.tracked != node.value {
                    node.tracked = node.value.clone();
                    node.model = node.value.clone();
                }
                EventKind::Input
            }
            DomEvent::Change => EventKind::Change,
        };
        self.record(id, kind);
        Ok(())
    }

    fn value_of(&self, id: NodeId) -> DomResult<Option<String>> {
        let data = self.live(id)?;
        if data.has_value() {
            return Ok(data.value.clone());
        }
        if data.tag == "button" {
            return Ok(Some(self.attribute(id, "value").unwrap_or("").to_string()));
        }
        Ok(None)
    }

    fn type_text(&mut self, id: NodeId, value: &str) -> DomResult<Option<String>> {
        self.focus(id)?;
        self.set_native_value(id, "")?;
        for ch in value.chars() {
            let mut next = self.live(id)?.value.clone().unwrap_or_default();
            next.push(ch);
            self.set_native_value(id, &next)?;
            self.dispatch_event(id, DomEvent::Input)?;
        }
        self.dispatch_event(id, DomEvent::Change)?;
        self.blur(id)?;
        Ok(self.live(id)?.value.clone())
    }

    fn click_button(&mut self, text: &str) -> DomResult<bool> {
        for id in self.select_all(BUTTON_SELECTOR)? {
            let matched = self.text_of(id).trim() == text
                || self.value_of(id)?.as_deref() == Some(text);
            if matched {
                self.click(id)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn button_labels(&self) -> DomResult<Vec<String>> {
        Ok(self
            .select_all(BUTTON_SELECTOR)?
            .into_iter()
            .map(|id| self.text_of(id).trim().to_string())
            .filter(|label| !label.is_empty())
            .collect())
    }

    fn first_text(&self, selectors: &[&str]) -> DomResult<Option<String>> {
        for selector in selectors {
            if let Some(id) = self.select_all(selector)?.into_iter().next() {
                return Ok(Some(self.text_of(id)));
            }
        }
        Ok(None)
    }
}

/// Shared handle to an in-memory document. Clones refer to the same tree.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    tree: Arc<Mutex<DomTree>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document whose root holds `elements`.
    pub fn with(elements: impl IntoIterator<Item = Element>) -> Self {
        let doc = Self::new();
        for element in elements {
            doc.append(element);
        }
        doc
    }

    fn tree(&self) -> MutexGuard<'_, DomTree> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> DomResult<MutexGuard<'_, DomTree>> {
        self.tree
            .lock()
            .map_err(|_| DomError::Unavailable("document lock poisoned".into()))
    }

    /// Run `f` with exclusive access to the tree.
    pub fn edit<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        f(&mut self.tree())
    }

    pub fn append(&self, element: Element) -> NodeId {
        self.tree().append(None, element)
    }

    pub fn append_to(&self, parent: NodeId, element: Element) -> NodeId {
        self.tree().append(Some(parent), element)
    }

    pub fn remove(&self, id: NodeId) {
        self.tree().remove(id);
    }

    /// First attached element matching `selector`.
    pub fn find(&self, selector: &str) -> Option<NodeId> {
        self.tree().select_all(selector).ok()?.into_iter().next()
    }

    /// Run `hook` after every click on an element matching `selector`.
    pub fn on_click(
        &self,
        selector: &str,
        hook: impl Fn(&mut DomTree) + Send + Sync + 'static,
    ) -> DomResult<()> {
        parse_selector(selector)?;
        self.tree().hooks.push((selector.to_string(), Arc::new(hook)));
        Ok(())
    }

    pub fn fail_on(&self, id: NodeId, fault: Fault) {
        self.tree().nodes[id.0].fault = Some(fault);
    }

    pub fn set_ready(&self, ready: bool) {
        self.tree().ready = ready;
    }

    pub fn location(&self) -> String {
        self.tree().location.clone()
    }

    /// Text content of the whole document.
    pub fn text(&self) -> String {
        let tree = self.tree();
        tree.text_of(tree.root)
    }

    pub fn click_count(&self, id: NodeId) -> usize {
        self.tree().nodes[id.0].clicks
    }

    /// Platform value of a value-bearing element.
    pub fn platform_value(&self, id: NodeId) -> Option<String> {
        self.tree().nodes[id.0].value.clone()
    }

    /// Value as the framework sees it; `None` for uncontrolled elements.
    pub fn framework_value(&self, id: NodeId) -> Option<String> {
        self.tree().nodes[id.0].model.clone()
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.tree().focused
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.tree().events.clone()
    }

    /// Number of state-changing operations performed through [`Document`].
    pub fn mutation_count(&self) -> usize {
        self.tree().mutations
    }

    /// Per-kind event counts for one node.
    pub fn event_counts(&self, id: NodeId) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for record in self.tree().events.iter().filter(|r| r.node == id) {
            *counts.entry(record.kind).or_insert(0) += 1;
        }
        counts
    }
}

// Every operation holds the tree lock from resolution to the last effect.
impl Document for MemoryDocument {
    async fn count(&self, selector: &str) -> DomResult<usize> {
        Ok(self.lock()?.select_all(selector)?.len())
    }

    async fn click(&self, selector: &str) -> DomResult<()> {
        let mut tree = self.lock()?;
        let id = tree.first(selector)?;
        tree.click(id)
    }

    async fn text_content(&self, selector: &str) -> DomResult<String> {
        let tree = self.lock()?;
        let id = tree.first(selector)?;
        Ok(tree.text_of(id))
    }

    async fn value(&self, selector: &str) -> DomResult<Option<String>> {
        let tree = self.lock()?;
        let id = tree.first(selector)?;
        tree.value_of(id)
    }

    async fn type_text(&self, selector: &str, value: &str) -> DomResult<Option<String>> {
        let mut tree = self.lock()?;
        let id = tree.first(selector)?;
        tree.type_text(id, value)
    }

    async fn click_button(&self, text: &str) -> DomResult<bool> {
        self.lock()?.click_button(text)
    }

    async fn button_labels(&self) -> DomResult<Vec<String>> {
        self.lock()?.button_labels()
    }

    async fn first_text(&self, selectors: &[&str]) -> DomResult<Option<String>> {
        self.lock()?.first_text(selectors)
    }

    async fn ready(&self) -> DomResult<bool> {
        Ok(self.lock()?.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_order_and_removal() {
        let doc = MemoryDocument::with([
            Element::new("form")
                .id("f")
                .child(Element::button("A"))
                .child(Element::new("div").attr("role", "button").text("B")),
            Element::button("C"),
        ]);
        let tree = doc.tree();
        let found = tree.select_all(r#"button, [role="button"]"#).unwrap();
        let texts: Vec<String> = found.iter().map(|id| tree.text_of(*id)).collect();
        assert_eq!(texts, ["A", "B", "C"]);
        drop(tree);

        let form = doc.find("#f").unwrap();
        doc.remove(form);
        assert_eq!(doc.find("button").map(|id| doc.edit(|t| t.text_of(id))), Some("C".into()));
    }

    #[test]
    fn test_intercepted_assignment_is_not_observed() {
        let doc = MemoryDocument::with([Element::controlled_input("name")]);
        let id = doc.find("#name").unwrap();

        doc.edit(|tree| {
            tree.assign_value(id, "bulk");
            tree.dispatch_event(id, DomEvent::Input).unwrap();
        });
        assert_eq!(doc.platform_value(id).as_deref(), Some("bulk"));
        assert_eq!(doc.framework_value(id).as_deref(), Some(""));

        doc.edit(|tree| {
            tree.set_native_value(id, "native").unwrap();
            tree.dispatch_event(id, DomEvent::Input).unwrap();
        });
        assert_eq!(doc.framework_value(id).as_deref(), Some("native"));
    }

    #[test]
    fn test_detached_nodes_error() {
        let doc = MemoryDocument::with([Element::input("x")]);
        let id = doc.find("#x").unwrap();
        doc.remove(id);
        let err = doc.edit(|tree| tree.set_native_value(id, "v")).unwrap_err();
        assert_eq!(err, DomError::Detached);
    }

    #[test]
    fn test_click_hook_mutates_tree() {
        let doc = MemoryDocument::with([Element::button("Next").id("next")]);
        doc.on_click("#next", |tree| {
            tree.append(None, Element::new("h1").attr("data-testid", "title").text("Done"));
        })
        .unwrap();
        let id = doc.find("#next").unwrap();
        doc.edit(|tree| tree.click(id)).unwrap();
        assert!(doc.find("[data-testid=title]").is_some());
        assert_eq!(doc.click_count(id), 1);
    }

    #[test]
    fn test_navigate_replaces_document() {
        let doc = MemoryDocument::with([Element::button("Next").id("next")]);
        let old = doc.find("#next").unwrap();
        doc.edit(|tree| tree.navigate("https://example.com/done", [Element::new("p").text("Welcome")]));

        assert_eq!(doc.location(), "https://example.com/done");
        assert_eq!(doc.text(), "Welcome");
        assert!(doc.find("#next").is_none());
        let err = doc.edit(|tree| tree.click(old)).unwrap_err();
        assert_eq!(err, DomError::Detached);
    }

    #[test]
    fn test_css_selectors() {
        let doc = MemoryDocument::with([
            Element::new("h1").text("Title"),
            Element::button("A").id("a"),
            Element::button("B").attr("class", "primary"),
            Element::button("C").id("c").attr("data-label", r#"say "hi" & <go>"#),
        ]);
        let a = doc.find("#a").unwrap();
        let c = doc.find("#c").unwrap();

        assert_eq!(doc.edit(|t| t.select_all("h1 + button")).unwrap(), [a]);
        assert_eq!(doc.edit(|t| t.select_all("button:not(.primary)")).unwrap(), [a, c]);
        assert_eq!(doc.edit(|t| t.select_all(".primary ~ button")).unwrap(), [c]);
        assert_eq!(
            doc.edit(|t| t.select_all(r#"[data-label='say "hi" & <go>']"#)).unwrap(),
            [c]
        );
        assert_eq!(
            doc.edit(|t| t.select_all("button[")).unwrap_err(),
            DomError::InvalidSelector("button[".into())
        );
    }

    #[tokio::test]
    async fn test_missing_element_is_no_match() {
        let doc = MemoryDocument::with([Element::button("A")]);
        assert_eq!(doc.count("#x").await.unwrap(), 0);
        assert_eq!(
            doc.click("#x").await.unwrap_err(),
            DomError::NoMatch("#x".into())
        );
        assert_eq!(doc.mutation_count(), 0);
    }
}
