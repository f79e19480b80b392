use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::node::{self, AttrValue, Attrs, ElementNode, Node, NodeId, VoidNode, is_void_tag};

pub type Path = Vec<usize>;

/// The live content tree: a root container and its block children.
#[derive(Debug, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip, default = "NodeId::next")]
    id: NodeId,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            id: NodeId::next(),
            attrs: Attrs::default(),
            children,
        }
    }

    /// Identity of the root container. Usable as a query scope.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn has_class(&self, class: &str) -> bool {
        node::has_class(&self.attrs, class)
    }

    pub fn add_class(&mut self, class: &str) {
        node::add_class(&mut self.attrs, class);
    }

    pub fn remove_class(&mut self, class: &str) {
        node::remove_class(&mut self.attrs, class);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id == self.id || self.path_of(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let path = self.path_of(id)?;
        node_ref(&self.children, &path)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let path = self.path_of(id)?;
        node_mut(&mut self.children, &path)
    }

    /// Block-level children of the root, skipping stray text.
    pub fn blocks(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|n| n.id().is_some())
    }

    pub fn path_of(&self, id: NodeId) -> Option<Path> {
        fn walk(children: &[Node], id: NodeId, path: &mut Path) -> bool {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                if node.id() == Some(id) || walk(node.children(), id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }

        if id == self.id {
            return Some(Vec::new());
        }
        let mut path = Vec::new();
        walk(&self.children, id, &mut path).then_some(path)
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        let path = self.path_of(id)?;
        let (_, parent_path) = path.split_last()?;
        if parent_path.is_empty() {
            return Some(self.id);
        }
        node_ref(&self.children, parent_path)?.id()
    }

    /// The direct child of the root that contains `id` (or is `id`).
    pub fn enclosing_block(&self, id: NodeId) -> Option<NodeId> {
        let path = self.path_of(id)?;
        let first = *path.first()?;
        self.children.get(first)?.id()
    }

    /// Siblings of `id` in document order, excluding the node itself.
    pub fn siblings_of(&self, id: NodeId) -> Vec<&Node> {
        let Some(path) = self.path_of(id) else {
            return Vec::new();
        };
        let Some((&index, parent_path)) = path.split_last() else {
            return Vec::new();
        };
        let Some(children) = self.children_at(parent_path) else {
            return Vec::new();
        };
        children
            .iter()
            .enumerate()
            .filter(|(ix, _)| *ix != index)
            .map(|(_, node)| node)
            .collect()
    }

    /// First descendant of `scope` matching `selector`, in document order.
    pub fn query_first(&self, selector: &Selector, scope: NodeId) -> Option<&Node> {
        fn walk<'a>(children: &'a [Node], selector: &Selector) -> Option<&'a Node> {
            for node in children {
                if selector.matches(node) {
                    return Some(node);
                }
                if let Some(found) = walk(node.children(), selector) {
                    return Some(found);
                }
            }
            None
        }

        walk(self.scope_children(scope)?, selector)
    }

    /// Every descendant of `scope` matching `selector`, in document order.
    pub fn query_all(&self, selector: &Selector, scope: NodeId) -> Vec<&Node> {
        let mut found = Vec::new();
        let Some(children) = self.scope_children(scope) else {
            return found;
        };
        for child in children {
            child.walk(&mut |node| {
                if selector.matches(node) {
                    found.push(node);
                }
            });
        }
        found
    }

    /// Inserts `node` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, node: Node) -> Result<(), NodeError> {
        let path = self
            .path_of(reference)
            .ok_or(NodeError::Detached(reference))?;
        let Some((&index, parent_path)) = path.split_last() else {
            return Err(NodeError::Detached(reference));
        };
        let parent_path = parent_path.to_vec();
        let children = self
            .children_at_mut(&parent_path)
            .ok_or(NodeError::Detached(reference))?;
        children.insert(index + 1, node);
        tracing::trace!(reference = %reference, "inserted sibling");
        Ok(())
    }

    /// Appends `node` as the last child of `parent` (which may be the root).
    pub fn append(&mut self, parent: NodeId, node: Node) -> Result<(), NodeError> {
        let path = self.path_of(parent).ok_or(NodeError::Detached(parent))?;
        let children = self
            .children_at_mut(&path)
            .ok_or(NodeError::Detached(parent))?;
        children.push(node);
        Ok(())
    }

    /// Detaches `id` from its parent. Detached or unknown ids are a no-op.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let path = self.path_of(id)?;
        let (&index, parent_path) = path.split_last()?;
        let parent_path = parent_path.to_vec();
        let children = self.children_at_mut(&parent_path)?;
        tracing::trace!(node = %id, "removed node");
        Some(children.remove(index))
    }

    fn scope_children(&self, scope: NodeId) -> Option<&[Node]> {
        if scope == self.id {
            return Some(&self.children);
        }
        self.get(scope).map(Node::children)
    }

    fn children_at(&self, parent_path: &[usize]) -> Option<&[Node]> {
        if parent_path.is_empty() {
            return Some(&self.children);
        }
        node_ref(&self.children, parent_path).map(Node::children)
    }

    fn children_at_mut(&mut self, parent_path: &[usize]) -> Option<&mut Vec<Node>> {
        if parent_path.is_empty() {
            return Some(&mut self.children);
        }
        match node_mut(&mut self.children, parent_path)? {
            Node::Element(el) => Some(&mut el.children),
            Node::Void(_) | Node::Text(_) => None,
        }
    }
}

fn node_ref<'a>(children: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (&first, rest) = path.split_first()?;
    let node = children.get(first)?;
    if rest.is_empty() {
        return Some(node);
    }
    node_ref(node.children(), rest)
}

fn node_mut<'a>(children: &'a mut [Node], path: &[usize]) -> Option<&'a mut Node> {
    let (&first, rest) = path.split_first()?;
    let node = children.get_mut(first)?;
    if rest.is_empty() {
        return Some(node);
    }
    match node {
        Node::Element(el) => node_mut(&mut el.children, rest),
        Node::Void(_) | Node::Text(_) => None,
    }
}

/// Structural lookup key: `tag`, `#id`, `.class`, or a combination such as
/// `li.big-hook`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into().to_ascii_lowercase()),
            ..Self::default()
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn class(class: impl Into<String>) -> Self {
        Self {
            classes: vec![class.into()],
            ..Self::default()
        }
    }

    pub fn parse(selector: &str) -> Self {
        let mut out = Self::default();
        let mut kind = ' ';
        let mut current = String::new();

        let flush = |kind: char, current: &mut String, out: &mut Self| {
            if current.is_empty() {
                return;
            }
            let token = std::mem::take(current);
            match kind {
                '#' => out.id = Some(token),
                '.' => out.classes.push(token),
                _ => out.tag = Some(token.to_ascii_lowercase()),
            }
        };

        for ch in selector.trim().chars() {
            if ch == '#' || ch == '.' {
                flush(kind, &mut current, &mut out);
                kind = ch;
            } else {
                current.push(ch);
            }
        }
        flush(kind, &mut current, &mut out);
        out
    }

    pub fn matches(&self, node: &Node) -> bool {
        let Some(tag) = node.tag() else {
            return false;
        };
        if self.tag.is_none() && self.id.is_none() && self.classes.is_empty() {
            return false;
        }
        if self.tag.as_deref().is_some_and(|wanted| wanted != tag) {
            return false;
        }
        if let Some(wanted) = &self.id {
            if node.attr("id").and_then(AttrValue::as_str) != Some(wanted.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|class| node.has_class(class))
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

fn tag_specific_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "target", "rel", "download"],
        "img" => &["src", "alt", "width", "height", "srcset"],
        "blockquote" | "q" => &["cite"],
        "ol" => &["start", "reversed", "type"],
        "ul" => &["type"],
        _ => &[],
    }
}

/// Produces a copy of `node` under `new_tag`.
///
/// Attributes specific to the old tag that the new tag does not understand
/// are dropped; children are carried over as fresh copies. The tree is left
/// untouched: swapping the result in is the caller's job.
pub fn change_tag(node: &Node, new_tag: &str) -> Node {
    let new_tag = new_tag.to_ascii_lowercase();
    let Some(old_tag) = node.tag() else {
        return node.duplicate();
    };

    let old_specific = tag_specific_attrs(old_tag);
    let new_specific = tag_specific_attrs(&new_tag);
    let attrs: Attrs = node
        .attrs()
        .into_iter()
        .flatten()
        .filter(|(key, _)| {
            !old_specific.contains(&key.as_str()) || new_specific.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if is_void_tag(&new_tag) {
        return Node::Void(VoidNode {
            id: NodeId::next(),
            tag: new_tag,
            attrs,
        });
    }

    let mut el = ElementNode::new(new_tag, attrs);
    el.children = node.children().iter().map(Node::duplicate).collect();
    Node::Element(el)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeDescriptor, build};

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let a = Node::paragraph("a");
        let b = build(
            &NodeDescriptor::element("blockquote")
                .attr("cite", "https://example.com")
                .attr("class", "quote")
                .child("b")
                .child(NodeDescriptor::element("img").attr("id", "img1").attr("src", "x.png")),
        )
        .unwrap();
        let c = Node::paragraph("c");
        let ids = (a.id().unwrap(), b.id().unwrap(), c.id().unwrap());
        (Document::new(vec![a, b, c]), ids.0, ids.1, ids.2)
    }

    #[test]
    fn siblings_exclude_self_in_order() {
        let (doc, a, b, c) = sample();
        let siblings: Vec<_> = doc.siblings_of(b).iter().filter_map(|n| n.id()).collect();
        assert_eq!(siblings, vec![a, c]);
    }

    #[test]
    fn siblings_of_detached_node_are_empty() {
        let (doc, ..) = sample();
        let stray = Node::paragraph("x");
        assert!(doc.siblings_of(stray.id().unwrap()).is_empty());
        assert!(doc.siblings_of(doc.id()).is_empty());
    }

    #[test]
    fn query_by_tag_id_and_class() {
        let (doc, _, b, _) = sample();
        let img = doc.query_first(&Selector::parse("#img1"), doc.id()).unwrap();
        assert_eq!(img.tag(), Some("img"));
        assert_eq!(doc.query_all(&Selector::tag("p"), doc.id()).len(), 2);
        assert_eq!(
            doc.query_first(&Selector::parse("blockquote.quote"), doc.id())
                .and_then(Node::id),
            Some(b)
        );
        assert!(doc.query_first(&Selector::tag("h2"), doc.id()).is_none());
        assert!(doc.query_all(&Selector::tag("p"), b).is_empty());
    }

    #[test]
    fn insert_after_places_next_sibling() {
        let (mut doc, a, b, _) = sample();
        let new = Node::paragraph("new");
        let new_id = new.id().unwrap();
        doc.insert_after(a, new).unwrap();
        assert_eq!(doc.children[1].id(), Some(new_id));
        assert_eq!(doc.children[2].id(), Some(b));
    }

    #[test]
    fn insert_after_detached_reference_fails() {
        let (mut doc, ..) = sample();
        let stray = Node::paragraph("x").id().unwrap();
        let err = doc.insert_after(stray, Node::paragraph("y")).unwrap_err();
        assert!(matches!(err, NodeError::Detached(id) if id == stray));
        let root = doc.id();
        assert!(doc.insert_after(root, Node::paragraph("y")).is_err());
    }

    #[test]
    fn remove_is_noop_when_detached() {
        let (mut doc, a, ..) = sample();
        assert!(doc.remove(a).is_some());
        assert!(doc.remove(a).is_none());
        assert!(!doc.contains(a));
    }

    #[test]
    fn change_tag_keeps_children_and_drops_tag_specific_attrs() {
        let (doc, _, b, _) = sample();
        let old = doc.get(b).unwrap();
        let new = change_tag(old, "p");
        assert_eq!(new.tag(), Some("p"));
        assert!(new.attr("cite").is_none());
        assert!(new.has_class("quote"));
        assert_eq!(new.text_content(), "b");
        assert_eq!(new.children().len(), 2);
        assert_ne!(new.id(), old.id());
        assert_ne!(new.children()[1].id(), old.children()[1].id());
        // the tree itself is untouched
        assert!(doc.contains(b));
    }

    #[test]
    fn enclosing_block_and_parent() {
        let (doc, _, b, _) = sample();
        let img = doc
            .query_first(&Selector::tag("img"), doc.id())
            .and_then(Node::id)
            .unwrap();
        assert_eq!(doc.enclosing_block(img), Some(b));
        assert_eq!(doc.parent_of(img), Some(b));
        assert_eq!(doc.parent_of(b), Some(doc.id()));
    }
}
