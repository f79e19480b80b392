//! Visible-region arithmetic and the host layout seam.
//!
//! The engine never measures anything itself. A host implements [`Layout`]
//! to report the window size, node rectangles and scroll position, and to
//! apply the scroll corrections computed here.

use std::collections::HashMap;

use crate::node::NodeId;

/// Extra space kept under the content when a bottom modal is open.
pub const DEFAULT_CONTENT_MARGIN_OFFSET: f32 = 13.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Rect {
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            top: y,
            bottom: y + height,
            left: x,
            right: x + width,
        }
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Area of the window not covered by chrome, in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRegion {
    pub window: Size,
    pub start_x: f32,
    pub end_x: f32,
    pub start_y: f32,
    pub end_y: f32,
}

pub fn compute_visible_region(
    window: Size,
    offset_top: i32,
    toolbar_height: f32,
    bottom_modal_height: f32,
) -> VisibleRegion {
    let offset_top = offset_top as f32;
    VisibleRegion {
        window,
        start_x: 0.0,
        end_x: window.width,
        start_y: offset_top,
        end_y: window.height - toolbar_height - bottom_modal_height - offset_top,
    }
}

/// How far to scroll so that a node whose bottom edge sits at
/// `node_bottom` (window coordinates) ends at the region's bottom edge.
/// `None` when the node already fits.
pub fn scroll_correction(region: &VisibleRegion, node_bottom: f32) -> Option<f32> {
    (node_bottom > region.end_y).then(|| node_bottom - region.end_y)
}

pub fn content_margin_bottom(position: f32, offset: Option<f32>) -> f32 {
    position + offset.unwrap_or(DEFAULT_CONTENT_MARGIN_OFFSET)
}

/// Geometry provided by whatever renders the document.
pub trait Layout {
    fn window_size(&self) -> Size;

    /// Bounding box of a node relative to the document's scroll origin.
    fn node_rect(&self, id: NodeId) -> Option<Rect>;

    fn scroll_top(&self) -> f32;

    fn scroll_by(&mut self, dy: f32);
}

/// Layout for hosts that render nothing: no geometry, so never any scrolling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLayout;

impl Layout for NullLayout {
    fn window_size(&self) -> Size {
        Size::default()
    }

    fn node_rect(&self, _id: NodeId) -> Option<Rect> {
        None
    }

    fn scroll_top(&self) -> f32 {
        0.0
    }

    fn scroll_by(&mut self, _dy: f32) {}
}

/// Map-backed layout for headless hosts and tests.
#[derive(Debug, Default, Clone)]
pub struct FixedLayout {
    window: Size,
    rects: HashMap<NodeId, Rect>,
    scroll_top: f32,
}

impl FixedLayout {
    pub fn new(window: Size) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    pub fn with_rect(mut self, id: NodeId, rect: Rect) -> Self {
        self.rects.insert(id, rect);
        self
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        self.rects.insert(id, rect);
    }

    pub fn set_window(&mut self, window: Size) {
        self.window = window;
    }
}

impl Layout for FixedLayout {
    fn window_size(&self) -> Size {
        self.window
    }

    fn node_rect(&self, id: NodeId) -> Option<Rect> {
        self.rects.get(&id).copied()
    }

    fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    fn scroll_by(&mut self, dy: f32) {
        self.scroll_top = (self.scroll_top + dy).max(0.0);
    }
}
