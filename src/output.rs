//! Output tree.
//!
//! Wikification appends into a [`Document`]: an arena of nodes addressed by [`NodeId`]. Handlers only ever
//! append, so a node's position in its parent never changes once created (except for the trailing `<br>`
//! the scan loop removes when a loop macro aborts).
//!
//! ```text
//! Fragment(0)
//!  ├─ Text "plain "
//!  ├─ Error "macro <<nope>> does not exist"   source: "<<nope>>"
//!  └─ Element <a class="link-internal" data-passage="Cave">
//!      └─ Text "Go"
//! ```

use crate::Engine;
use crate::engine::ShadowCallback;
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::rc::Rc;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Container without markup of its own (the document root, captured output).
    Fragment,
    Element { tag: String, attrs: BTreeMap<String, String> },
    Text(String),
    /// Verbatim HTML passed through from the source.
    Markup(String),
    /// Inline error marker: the message and the source text that caused it.
    Error { message: String, source: String },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

const VOID_TAGS: &[&str] =
    &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "dd", "div", "dl", "dt", "figure", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Arena-backed output tree. Node 0 is the root fragment.
#[derive(Clone)]
pub struct Document {
    nodes: Vec<Node>,
    actions: HashMap<NodeId, Rc<ShadowCallback>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").field("html", &self.to_html(self.root())).field("actions", &self.actions.len()).finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Document { nodes: vec![Node { kind: NodeKind::Fragment, parent: None, children: Vec::new() }], actions: HashMap::new() }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].children.last().copied()
    }

    /// Tag name, for element nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, parent: Some(parent), children: Vec::new() });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Creates a detached fragment, used to collect output that is discarded or moved later.
    pub fn create_fragment(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind: NodeKind::Fragment, parent: None, children: Vec::new() });
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(parent, NodeKind::Text(text.to_string()))
    }

    pub fn append_markup(&mut self, parent: NodeId, html: &str) -> NodeId {
        self.push(parent, NodeKind::Markup(html.to_string()))
    }

    pub fn create_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.push(parent, NodeKind::Element { tag: tag.to_ascii_lowercase(), attrs: BTreeMap::new() })
    }

    pub fn append_error(&mut self, parent: NodeId, message: &str, source: &str) -> NodeId {
        self.push(parent, NodeKind::Error { message: message.to_string(), source: source.to_string() })
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            attrs.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            let entry = attrs.entry("class".to_string()).or_default();
            for name in class.split_whitespace() {
                if !entry.split_whitespace().any(|c| c == name) {
                    if !entry.is_empty() {
                        entry.push(' ');
                    }
                    entry.push_str(name);
                }
            }
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class").is_some_and(|c| c.split_whitespace().any(|n| n == class))
    }

    /// Moves every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) {
        let children = std::mem::take(&mut self.nodes[from.0].children);
        for child in &children {
            self.nodes[child.0].parent = Some(to);
        }
        self.nodes[to.0].children.extend(children);
    }

    /// Detaches the last child of `parent` when it is an element with tag `tag`.
    pub fn remove_last_child_if(&mut self, parent: NodeId, tag: &str) -> bool {
        let Some(last) = self.last_child(parent) else { return false };
        if self.tag(last) != Some(tag) {
            return false;
        }
        self.nodes[parent.0].children.pop();
        self.nodes[last.0].parent = None;
        true
    }

    /// True when block-level markup may start here: at the start of `parent`, or after a line break or a
    /// block element.
    pub fn has_block_context(&self, parent: NodeId) -> bool {
        match self.last_child(parent) {
            None => true,
            Some(last) => self.tag(last).is_some_and(|tag| tag == "br" || BLOCK_TAGS.contains(&tag)),
        }
    }

    /// Attaches a deferred action to an element.
    pub fn set_action(&mut self, id: NodeId, action: Rc<ShadowCallback>) {
        self.actions.insert(id, action);
    }

    pub fn has_action(&self, id: NodeId) -> bool {
        self.actions.contains_key(&id)
    }

    /// Runs the deferred action attached to `id`, if any. Returns whether an action ran.
    pub fn activate(&self, id: NodeId, engine: &Engine) -> Result<bool> {
        match self.actions.get(&id) {
            Some(action) => {
                action.call(engine)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.walk(id, &mut |doc, node| {
            if let NodeKind::Text(text) = doc.kind(node) {
                out.push_str(text);
            }
        });
        out
    }

    /// Messages of every error marker under `id`, in document order.
    pub fn errors(&self, id: NodeId) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(id, &mut |doc, node| {
            if let NodeKind::Error { message, .. } = doc.kind(node) {
                out.push(message.clone());
            }
        });
        out
    }

    /// Every element under `id` (inclusive) with the given tag, in document order.
    pub fn find_all(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, &mut |doc, node| {
            if doc.tag(node) == Some(tag) {
                out.push(node);
            }
        });
        out
    }

    fn walk(&self, id: NodeId, visit: &mut dyn FnMut(&Document, NodeId)) {
        visit(self, id);
        for &child in self.children(id) {
            self.walk(child, visit);
        }
    }

    /// Serializes the subtree under `id` as HTML. Error markers render as `<mark class="error">`.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Fragment => {
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Markup(html) => out.push_str(html),
            NodeKind::Error { message, source } => {
                let _ = write!(out, "<mark class=\"error\" title=\"{}\">{}</mark>", escape(source, true), escape(message, false));
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{}\"", escape(value, true));
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

fn escape(text: &str, attr: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes_tree() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_text(root, "a < b ");
        let strong = doc.create_element(root, "STRONG");
        doc.add_class(strong, "x");
        doc.add_class(strong, "x y");
        doc.append_text(strong, "bold");
        doc.create_element(root, "br");

        assert_eq!(doc.to_html(root), "a &lt; b <strong class=\"x y\">bold</strong><br>");
        assert_eq!(doc.text_content(root), "a < b bold");
        assert!(doc.has_block_context(root));
    }

    #[test]
    fn remove_last_child_only_matches_tag() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_text(root, "x");
        assert!(!doc.remove_last_child_if(root, "br"));
        doc.create_element(root, "br");
        assert!(doc.remove_last_child_if(root, "br"));
        assert_eq!(doc.children(root).len(), 1);
    }

    #[test]
    fn errors_are_collected_in_order() {
        let mut doc = Document::new();
        let root = doc.root();
        let span = doc.create_element(root, "span");
        doc.append_error(span, "first", "<<a>>");
        doc.append_error(root, "second", "<<b>>");
        assert_eq!(doc.errors(root), vec!["first".to_string(), "second".to_string()]);
        assert!(!doc.has_block_context(root));
    }

    #[test]
    fn move_children_reparents() {
        let mut doc = Document::new();
        let root = doc.root();
        let scratch = doc.create_fragment();
        let t = doc.append_text(scratch, "moved");
        doc.move_children(scratch, root);
        assert_eq!(doc.parent(t), Some(root));
        assert!(doc.children(scratch).is_empty());
        assert_eq!(doc.text_content(root), "moved");
    }
}
