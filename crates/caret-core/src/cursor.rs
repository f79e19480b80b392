use crate::node::{NodeId, clamp_to_char_boundary};
use crate::tree::Document;
use crate::viewport::{Layout, Rect};

/// A logical caret: a node and a byte offset into its text content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
    pub node: NodeId,
    pub offset: usize,
}

/// Owns the current cursor reference.
///
/// The tracker only ever stores nodes that were present in the document when
/// the caret was placed; the editor repoints it after every mutation.
#[derive(Debug, Default)]
pub struct CursorTracker {
    current: Option<Caret>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Caret> {
        self.current
    }

    pub fn node(&self) -> Option<NodeId> {
        self.current.map(|caret| caret.node)
    }

    /// Places the caret at `offset` within `node`'s text.
    ///
    /// `None` or a node that is not in `doc` leaves the caret unchanged.
    pub fn set_position(&mut self, doc: &Document, node: Option<NodeId>, offset: usize) -> bool {
        let Some(id) = node else {
            tracing::debug!("set_position without a node");
            return false;
        };
        let Some(target) = doc.get(id) else {
            tracing::debug!(node = %id, "set_position on a detached node");
            return false;
        };
        let text = target.text_content();
        let offset = clamp_to_char_boundary(&text, offset);
        self.current = Some(Caret { node: id, offset });
        tracing::debug!(node = %id, offset, "caret moved");
        true
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// True when there is no caret or the caret's node is still in `doc`.
    pub fn is_valid(&self, doc: &Document) -> bool {
        self.current
            .is_none_or(|caret| doc.get(caret.node).is_some())
    }

    pub fn geometry_of(&self, doc: &Document, layout: &dyn Layout, id: NodeId) -> Option<Rect> {
        doc.get(id)?;
        layout.node_rect(id)
    }
}
