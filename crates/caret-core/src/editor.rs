use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};

use crate::block_tag::{
    BlockTag, SELECTED_MARKER_CLASS, STYLE_GROUP_CLASS, selection_marker, style_panel,
};
use crate::config::{ChromeState, EditorOptions};
use crate::cursor::{Caret, CursorTracker};
use crate::error::{EditorError, NodeError};
use crate::events::EventBus;
use crate::image::{
    Base64Image, DefaultImageResolver, ImageResolver, ImageSource, ImageTask, PendingImage,
    ResolutionState, extract_inline_images, resolution_task,
};
use crate::markup::{self, ContentFormat};
use crate::node::{AttrValue, Attrs, ElementNode, Node, NodeDescriptor, NodeId, build};
use crate::schedule::{DeferredChecks, InsertionId};
use crate::tree::{Document, Selector, change_tag};
use crate::viewport::{
    Layout, NullLayout, Rect, VisibleRegion, compute_visible_region, content_margin_bottom,
    scroll_correction,
};

/// Root class present while the document has no meaningful content.
pub const EMPTY_CLASS: &str = "is-empty";
/// Class given to a block that received an inserted image.
pub const IMAGE_HOST_CLASS: &str = "child-node-is-img";
/// Class given to a block that received an inserted link.
pub const LINK_HOST_CLASS: &str = "child-node-is-a";
/// Class of the affordance appended inside every link for removing it.
pub const LINK_REMOVE_CLASS: &str = "__remove";

pub const EVENT_ERROR: &str = "error";
pub const EVENT_EMPTY: &str = "empty";

/// Cursor-aware editing engine.
///
/// Owns the document, the caret, the text-style panel and the scheduled
/// visibility checks. Every mutation goes through `&mut self` and leaves the
/// caret pointing at a node that is still in the document.
pub struct Editor<L: Layout = NullLayout> {
    doc: Document,
    cursor: CursorTracker,
    style_panel: Document,
    events: EventBus,
    checks: DeferredChecks,
    layout: L,
    resolver: Arc<dyn ImageResolver>,
    options: EditorOptions,
    chrome: ChromeState,
    next_insertion: u64,
    empty: bool,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorOptions::default())
    }
}

impl Editor {
    pub fn new(options: EditorOptions) -> Self {
        let chrome = ChromeState::from_options(&options);
        let mut doc = Document::new(vec![Node::paragraph("")]);
        if let Some(placeholder) = &options.placeholder {
            doc.attrs.insert(
                "data-placeholder".to_string(),
                AttrValue::from(placeholder.as_str()),
            );
        }
        doc.add_class(EMPTY_CLASS);

        let mut editor = Self {
            doc,
            cursor: CursorTracker::new(),
            style_panel: style_panel(),
            events: EventBus::new(),
            checks: DeferredChecks::new(),
            layout: NullLayout,
            resolver: Arc::new(DefaultImageResolver),
            options,
            chrome,
            next_insertion: 1,
            empty: true,
        };
        editor.focus_first_block();
        editor
    }
}

impl<L: Layout> Editor<L> {
    pub fn with_layout<T: Layout>(self, layout: T) -> Editor<T> {
        Editor {
            doc: self.doc,
            cursor: self.cursor,
            style_panel: self.style_panel,
            events: self.events,
            checks: self.checks,
            layout,
            resolver: self.resolver,
            options: self.options,
            chrome: self.chrome,
            next_insertion: self.next_insertion,
            empty: self.empty,
        }
    }

    pub fn with_resolver(mut self, resolver: impl ImageResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn cursor(&self) -> Option<Caret> {
        self.cursor.current()
    }

    pub fn cursor_node(&self) -> Option<NodeId> {
        self.cursor.node()
    }

    pub fn style_panel(&self) -> &Document {
        &self.style_panel
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn chrome(&self) -> &ChromeState {
        &self.chrome
    }

    pub fn chrome_mut(&mut self) -> &mut ChromeState {
        &mut self.chrome
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut L {
        &mut self.layout
    }

    pub fn on<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnMut(&[Value]) -> anyhow::Result<()> + Send + 'static,
    {
        self.events.on(name, handler);
    }

    pub fn off(&mut self, name: &str) -> bool {
        self.events.off(name)
    }

    pub fn emit(&mut self, name: &str, args: &[Value]) -> bool {
        self.events.emit(name, args)
    }

    pub fn set_position(&mut self, node: Option<NodeId>, offset: usize) -> bool {
        self.cursor.set_position(&self.doc, node, offset)
    }

    /// Appends an empty paragraph to the document and moves the caret into it.
    pub fn insert_empty_paragraph(&mut self) -> NodeId {
        let paragraph = ElementNode::new("p", Attrs::default());
        let id = paragraph.id;
        self.doc.children.push(Node::Element(paragraph));
        self.cursor.set_position(&self.doc, Some(id), 0);
        self.debug_check_cursor();
        id
    }

    /// Detaches `id` from the document. A caret inside the removed subtree
    /// moves to the nearest remaining block.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let block = self.doc.enclosing_block(id)?;
        let index = self
            .doc
            .children
            .iter()
            .position(|n| n.id() == Some(block))?;
        let removed = self.doc.remove(id)?;

        if !self.cursor.is_valid(&self.doc) {
            let fallback = if block != id {
                Some(block)
            } else {
                self.doc.children[..index]
                    .iter()
                    .rev()
                    .chain(self.doc.children[index..].iter())
                    .find_map(Node::id)
            };
            match fallback {
                Some(fallback) => {
                    self.cursor.set_position(&self.doc, Some(fallback), 0);
                }
                None => self.cursor.clear(),
            }
        }
        self.refresh_empty_marker();
        self.debug_check_cursor();
        Some(removed)
    }

    /// Handles a press on a text-style panel button.
    ///
    /// Returns `Ok(false)` when the button was already selected. Otherwise
    /// the selection marker moves to the button and the caret's block is
    /// re-tagged; a block that is no longer attached leaves the document as
    /// it was.
    pub fn apply_block_tag(&mut self, button: NodeId) -> Result<bool, EditorError> {
        let Some((node, class)) = self.panel_button(button) else {
            return Err(EditorError::UnknownButton(button));
        };
        if has_selection_marker(node) {
            tracing::debug!(button = %button, "block tag already selected");
            return Ok(false);
        }
        let class = class.to_string();

        self.style_panel.append(button, selection_marker())?;
        let stale: Vec<NodeId> = self
            .style_panel
            .siblings_of(button)
            .into_iter()
            .flat_map(|sibling| sibling.children())
            .filter(|child| child.has_class(SELECTED_MARKER_CLASS))
            .filter_map(Node::id)
            .collect();
        for marker in stale {
            self.style_panel.remove(marker);
        }

        let tag = BlockTag::from_class(&class);
        match self.retag_cursor_block(tag) {
            Ok(()) => {}
            Err(NodeError::Detached(id)) => {
                tracing::warn!(
                    node = %id,
                    tag = tag.tag_name(),
                    "block detached before re-tagging"
                );
            }
            Err(err) => return Err(err.into()),
        }
        self.debug_check_cursor();
        Ok(true)
    }

    pub fn select_block_tag(&mut self, tag: BlockTag) -> Result<bool, EditorError> {
        let Some(button) = self.style_button(tag) else {
            tracing::warn!(tag = tag.tag_name(), "no panel button for block tag");
            return Ok(false);
        };
        self.apply_block_tag(button)
    }

    pub fn style_button(&self, tag: BlockTag) -> Option<NodeId> {
        let selector = Selector::parse(&format!("li.{}", tag.hook_class()));
        self.style_panel
            .query_first(&selector, self.style_panel.id())
            .and_then(Node::id)
    }

    /// The tag whose panel button currently carries the selection marker.
    pub fn active_block_tag(&self) -> Option<BlockTag> {
        self.style_panel
            .query_all(&Selector::tag("li"), self.style_panel.id())
            .into_iter()
            .find(|button| has_selection_marker(button))
            .map(|button| {
                BlockTag::from_class(
                    button
                        .attr("class")
                        .and_then(AttrValue::as_str)
                        .unwrap_or_default(),
                )
            })
    }

    /// A button is a hook-classed child of the style group.
    fn panel_button(&self, id: NodeId) -> Option<(&Node, &str)> {
        let group = self.style_panel.parent_of(id)?;
        if !self
            .style_panel
            .get(group)
            .is_some_and(|g| g.has_class(STYLE_GROUP_CLASS))
        {
            return None;
        }
        let node = self.style_panel.get(id)?;
        let class = node.attr("class").and_then(AttrValue::as_str)?;
        BlockTag::has_hook(class).then_some((node, class))
    }

    fn retag_cursor_block(&mut self, tag: BlockTag) -> Result<(), NodeError> {
        let Some(cursor) = self.cursor.node() else {
            tracing::debug!("no caret; block tag recorded without re-tagging");
            return Ok(());
        };
        let block = self
            .doc
            .enclosing_block(cursor)
            .ok_or(NodeError::Detached(cursor))?;
        let old = self.doc.get(block).ok_or(NodeError::Detached(block))?;
        let replacement = change_tag(old, tag.tag_name());
        let new_id = replacement.id();

        self.doc.insert_after(block, replacement)?;
        self.doc.remove(block);
        self.cursor.set_position(&self.doc, new_id, 0);
        tracing::debug!(block = %block, tag = tag.tag_name(), "re-tagged block");
        Ok(())
    }

    /// Starts resolving an image. Nothing changes until the returned task's
    /// output is passed to [`Editor::complete_image`]; dropping the task
    /// abandons the insertion.
    pub fn add_image(&mut self, source: impl Into<ImageSource>) -> ImageTask {
        let insertion = InsertionId(self.next_insertion);
        self.next_insertion += 1;
        tracing::debug!(insertion = %insertion, "resolving image");
        resolution_task(self.resolver.clone(), insertion, source.into())
    }

    pub fn complete_image(&mut self, pending: PendingImage) -> Result<NodeId, EditorError> {
        self.complete_image_at(pending, Instant::now())
    }

    /// Inserts a resolved image at the caret and schedules a visibility
    /// check for `now` plus the configured delay.
    pub fn complete_image_at(
        &mut self,
        pending: PendingImage,
        now: Instant,
    ) -> Result<NodeId, EditorError> {
        let PendingImage {
            insertion, state, ..
        } = pending;
        let image = match state {
            ResolutionState::Resolved(node) => node,
            ResolutionState::Failed(err) => {
                tracing::warn!(insertion = %insertion, error = %err, "image resolution failed");
                self.events.emit(EVENT_ERROR, &[json!(err.to_string())]);
                return Err(err.into());
            }
            ResolutionState::Pending => return Err(EditorError::Unresolved(insertion)),
        };
        let Some(id) = image.id() else {
            return Err(NodeError::Validation("resolved image is a bare text node".into()).into());
        };

        self.insert_at_cursor(image, id, IMAGE_HOST_CLASS);
        self.checks
            .schedule(insertion, now + self.options.image_check_delay());
        self.refresh_empty_marker();
        self.debug_check_cursor();
        tracing::debug!(insertion = %insertion, node = %id, "inserted image");
        Ok(id)
    }

    /// Runs every visibility check due at `now`. Returns how many ran.
    pub fn run_due_checks(&mut self, now: Instant) -> usize {
        let due = self.checks.take_due(now);
        for insertion in &due {
            tracing::trace!(insertion = %insertion, "running deferred visibility check");
            self.ensure_cursor_visible();
        }
        due.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.checks.next_deadline()
    }

    pub fn pending_checks(&self) -> usize {
        self.checks.len()
    }

    /// Inserts a non-editable link at the caret. An empty `url` changes
    /// nothing.
    pub fn add_link(&mut self, url: &str, title: Option<&str>) -> Option<NodeId> {
        if url.is_empty() {
            tracing::debug!("ignoring link without url");
            return None;
        }
        let descriptor = NodeDescriptor::element("a")
            .attr("href", url)
            .attr("target", "_blank")
            .attr("contenteditable", false)
            .child(title.unwrap_or(url))
            .child(NodeDescriptor::element("i").attr("class", LINK_REMOVE_CLASS));
        let anchor = match build(&descriptor) {
            Ok(anchor) => anchor,
            Err(err) => {
                tracing::warn!(error = %err, "failed to build link");
                return None;
            }
        };
        let id = anchor.id()?;

        self.insert_at_cursor(anchor, id, LINK_HOST_CLASS);
        self.refresh_empty_marker();
        self.ensure_cursor_visible();
        self.debug_check_cursor();
        Some(id)
    }

    /// Places `node` (whose id is `id`) at the caret and moves the caret
    /// onto it.
    ///
    /// An empty caret block is filled in place; otherwise the node goes into
    /// a new paragraph after it. Without a caret the paragraph is appended.
    fn insert_at_cursor(&mut self, node: Node, id: NodeId, host_class: &str) {
        let block = self
            .cursor
            .node()
            .and_then(|caret| self.doc.enclosing_block(caret));

        let placeholder = block.filter(|block| {
            self.doc
                .get(*block)
                .is_some_and(|n| matches!(n, Node::Element(_)) && markup::is_node_empty(n))
        });
        let host = match (placeholder, block) {
            (Some(block), _) => {
                if let Some(Node::Element(el)) = self.doc.get_mut(block) {
                    el.children = vec![node];
                }
                block
            }
            (None, Some(block)) => {
                let (host, paragraph) = host_paragraph(node);
                match self.doc.children.iter().position(|n| n.id() == Some(block)) {
                    Some(index) => self.doc.children.insert(index + 1, paragraph),
                    None => {
                        tracing::warn!(node = %block, "caret block detached; appending instead");
                        self.doc.children.push(paragraph);
                    }
                }
                host
            }
            (None, None) => {
                let (host, paragraph) = host_paragraph(node);
                self.doc.children.push(paragraph);
                host
            }
        };

        if let Some(host) = self.doc.get_mut(host) {
            host.add_class(host_class);
        }
        self.cursor.set_position(&self.doc, Some(id), 0);
    }

    /// Inline images currently in the document, for upload.
    pub fn base64_images(&self) -> Vec<Base64Image> {
        extract_inline_images(&self.doc, self.doc.id())
    }

    /// Points `img#id` at `src` and drops its id, so a second call with the
    /// same id finds nothing.
    pub fn set_image_src(&mut self, id: &str, src: &str) -> bool {
        let Some(target) = self
            .doc
            .query_first(&Selector::id(id), self.doc.id())
            .filter(|n| n.tag() == Some("img"))
            .and_then(Node::id)
        else {
            return false;
        };
        let Some(attrs) = self.doc.get_mut(target).and_then(Node::attrs_mut) else {
            return false;
        };
        attrs.insert("src".to_string(), AttrValue::from(src));
        attrs.remove("id");
        true
    }

    pub fn is_empty(&self) -> bool {
        markup::is_content_empty(&self.doc)
    }

    /// Re-derives the empty marker on the root, emitting `empty` when the
    /// state flips. Returns the current state.
    pub fn refresh_empty_marker(&mut self) -> bool {
        let empty = self.is_empty();
        if empty {
            self.doc.add_class(EMPTY_CLASS);
        } else {
            self.doc.remove_class(EMPTY_CLASS);
        }
        if empty != self.empty {
            self.empty = empty;
            tracing::debug!(empty, "empty state changed");
            self.events.emit(EVENT_EMPTY, &[json!(empty)]);
        }
        empty
    }

    /// Replaces the whole document with parsed `markup`.
    pub fn set_content(&mut self, markup: &str) -> Result<(), EditorError> {
        let blocks = markup::parse(markup)?;
        self.doc.children = blocks;
        if self.doc.blocks().next().is_none() {
            self.doc.children.push(Node::paragraph(""));
        }
        self.focus_first_block();
        self.refresh_empty_marker();
        self.debug_check_cursor();
        Ok(())
    }

    pub fn get_content(&self, format: ContentFormat) -> String {
        match format {
            ContentFormat::Markup => markup::serialize(&self.doc),
            ContentFormat::PlainText => markup::to_plain_text(&self.doc),
        }
    }

    pub fn visible_region(&self) -> VisibleRegion {
        compute_visible_region(
            self.layout.window_size(),
            self.options.offset_top,
            self.chrome.effective_toolbar_height(),
            self.chrome.effective_bottom_modal_height(),
        )
    }

    pub fn cursor_geometry(&self) -> Option<Rect> {
        let node = self.cursor.node()?;
        self.cursor.geometry_of(&self.doc, &self.layout, node)
    }

    /// Scrolls just far enough for the caret node's bottom edge to sit
    /// inside the visible region. Returns the scroll applied.
    pub fn ensure_cursor_visible(&mut self) -> Option<f32> {
        let node = self.cursor.node()?;
        let rect = self.cursor.geometry_of(&self.doc, &self.layout, node)?;
        let region = self.visible_region();
        let bottom = rect.bottom - self.layout.scroll_top();
        let delta = scroll_correction(&region, bottom)?;
        self.layout.scroll_by(delta);
        tracing::debug!(node = %node, delta, "scrolled caret into view");
        Some(delta)
    }

    /// Bottom margin for the content while the chrome covers the window.
    pub fn content_margin_bottom(&self, offset: Option<f32>) -> f32 {
        content_margin_bottom(self.chrome.effective_bottom_modal_height(), offset)
    }

    fn focus_first_block(&mut self) {
        let first = self.doc.blocks().next().and_then(Node::id);
        if first.is_none() {
            self.cursor.clear();
            return;
        }
        self.cursor.set_position(&self.doc, first, 0);
    }

    fn debug_check_cursor(&self) {
        debug_assert!(
            self.cursor.is_valid(&self.doc),
            "caret points at a node outside the document"
        );
    }
}

fn host_paragraph(child: Node) -> (NodeId, Node) {
    let mut paragraph = ElementNode::new("p", Attrs::default());
    paragraph.children.push(child);
    (paragraph.id, Node::Element(paragraph))
}

fn has_selection_marker(button: &Node) -> bool {
    button
        .children()
        .iter()
        .any(|child| child.has_class(SELECTED_MARKER_CLASS))
}
