use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

pub type Attrs = BTreeMap<String, AttrValue>;

/// Tags that never hold children.
pub const VOID_TAGS: &[&str] = &["img", "br", "hr", "input", "source", "wbr"];

/// Tags that count as content even without any text.
pub const MEDIA_TAGS: &[&str] = &["img", "video", "audio", "iframe", "embed", "object"];

/// Tags that stand on their own at the top level of a document.
pub const BLOCK_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "ul",
    "ol",
    "li",
    "div",
    "pre",
    "hr",
    "figure",
    "table",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

pub fn is_media_tag(tag: &str) -> bool {
    MEDIA_TAGS.contains(&tag)
}

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an element or void node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Str(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Bool(_) => None,
        }
    }

    /// The attribute as it is written into markup.
    pub fn to_markup(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// One node of a document tree.
///
/// Nodes are deliberately not `Clone`: every live element carries a unique
/// [`NodeId`], and [`Node::duplicate`] is the only way to copy a subtree.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Void(VoidNode),
    Text(TextNode),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(skip, default = "NodeId::next")]
    pub id: NodeId,
    pub tag: String,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            id: NodeId::next(),
            tag: tag.into(),
            attrs,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoidNode {
    #[serde(skip, default = "NodeId::next")]
    pub id: NodeId,
    pub tag: String,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
}

impl Node {
    pub fn element(tag: impl Into<String>, attrs: Attrs, children: Vec<Node>) -> Self {
        let mut el = ElementNode::new(tag, attrs);
        el.children = children;
        Node::Element(el)
    }

    pub fn void(tag: impl Into<String>, attrs: Attrs) -> Self {
        Node::Void(VoidNode {
            id: NodeId::next(),
            tag: tag.into(),
            attrs,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode { text: text.into() })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
        Node::element("p", Attrs::default(), children)
    }

    pub fn image(src: impl Into<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("src".to_string(), AttrValue::Str(src.into()));
        Node::void("img", attrs)
    }

    pub fn id(&self) -> Option<NodeId> {
        match self {
            Node::Element(el) => Some(el.id),
            Node::Void(v) => Some(v.id),
            Node::Text(_) => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element(el) => Some(&el.tag),
            Node::Void(v) => Some(&v.tag),
            Node::Text(_) => None,
        }
    }

    pub fn attrs(&self) -> Option<&Attrs> {
        match self {
            Node::Element(el) => Some(&el.attrs),
            Node::Void(v) => Some(&v.attrs),
            Node::Text(_) => None,
        }
    }

    pub fn attrs_mut(&mut self) -> Option<&mut Attrs> {
        match self {
            Node::Element(el) => Some(&mut el.attrs),
            Node::Void(v) => Some(&mut v.attrs),
            Node::Text(_) => None,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs()?.get(key)
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(el) => &el.children,
            Node::Void(_) | Node::Text(_) => &[],
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attrs().is_some_and(|attrs| has_class(attrs, class))
    }

    pub fn add_class(&mut self, class: &str) {
        if let Some(attrs) = self.attrs_mut() {
            add_class(attrs, class);
        }
    }

    pub fn remove_class(&mut self, class: &str) {
        if let Some(attrs) = self.attrs_mut() {
            remove_class(attrs, class);
        }
    }

    /// Concatenated text of this node and all of its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(&t.text),
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
            Node::Void(_) => {}
        }
    }

    /// Deep copy with fresh identities for every copied node.
    pub fn duplicate(&self) -> Node {
        match self {
            Node::Element(el) => Node::Element(ElementNode {
                id: NodeId::next(),
                tag: el.tag.clone(),
                attrs: el.attrs.clone(),
                children: el.children.iter().map(Node::duplicate).collect(),
            }),
            Node::Void(v) => Node::Void(VoidNode {
                id: NodeId::next(),
                tag: v.tag.clone(),
                attrs: v.attrs.clone(),
            }),
            Node::Text(t) => Node::Text(t.clone()),
        }
    }

    /// Visits this node and its descendants in document order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

pub(crate) fn has_class(attrs: &Attrs, class: &str) -> bool {
    attrs
        .get("class")
        .and_then(AttrValue::as_str)
        .is_some_and(|list| list.split_whitespace().any(|c| c == class))
}

pub(crate) fn add_class(attrs: &mut Attrs, class: &str) {
    if has_class(attrs, class) {
        return;
    }
    let next = match attrs.get("class").and_then(AttrValue::as_str) {
        Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
        _ => class.to_string(),
    };
    attrs.insert("class".to_string(), AttrValue::Str(next));
}

pub(crate) fn remove_class(attrs: &mut Attrs, class: &str) {
    let Some(existing) = attrs.get("class").and_then(AttrValue::as_str) else {
        return;
    };
    let remaining: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
    if remaining.is_empty() {
        attrs.remove("class");
    } else {
        let joined = remaining.join(" ");
        attrs.insert("class".to_string(), AttrValue::Str(joined));
    }
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

/// Declarative description of a node tree, turned into live nodes by [`build`].
///
/// Deserializes from `{"tag": "a", "attrs": {...}, "child": [...]}`; a bare
/// string is a text node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeDescriptor {
    Text(String),
    Element {
        #[serde(default)]
        tag: String,
        #[serde(default)]
        attrs: Attrs,
        #[serde(default, alias = "child")]
        children: Vec<NodeDescriptor>,
    },
}

impl NodeDescriptor {
    pub fn element(tag: impl Into<String>) -> Self {
        NodeDescriptor::Element {
            tag: tag.into(),
            attrs: Attrs::default(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        if let NodeDescriptor::Element { attrs, .. } = &mut self {
            attrs.insert(key.into(), value.into());
        }
        self
    }

    pub fn child(mut self, child: impl Into<NodeDescriptor>) -> Self {
        if let NodeDescriptor::Element { children, .. } = &mut self {
            children.push(child.into());
        }
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<&str> for NodeDescriptor {
    fn from(value: &str) -> Self {
        NodeDescriptor::Text(value.to_string())
    }
}

impl From<String> for NodeDescriptor {
    fn from(value: String) -> Self {
        NodeDescriptor::Text(value)
    }
}

/// Builds a live node tree from a descriptor.
///
/// The descriptor is only borrowed; every node in the result is freshly
/// allocated, so later changes to the descriptor cannot reach the tree.
pub fn build(descriptor: &NodeDescriptor) -> Result<Node, NodeError> {
    match descriptor {
        NodeDescriptor::Text(text) => Ok(Node::text(text.clone())),
        NodeDescriptor::Element {
            tag,
            attrs,
            children,
        } => {
            let tag = tag.trim().to_ascii_lowercase();
            if tag.is_empty() {
                return Err(NodeError::Validation("descriptor is missing a tag".into()));
            }
            if is_void_tag(&tag) {
                if !children.is_empty() {
                    return Err(NodeError::Validation(format!(
                        "<{tag}> cannot have children"
                    )));
                }
                return Ok(Node::void(tag, attrs.clone()));
            }
            let children = children.iter().map(build).collect::<Result<Vec<_>, _>>()?;
            Ok(Node::element(tag, attrs.clone(), children))
        }
    }
}
