use std::sync::LazyLock;

use regex::Regex;

use crate::node::{AttrValue, Attrs, Node};
use crate::tree::Document;

/// Class carried by the selection marker inside the active panel button.
pub const SELECTED_MARKER_CLASS: &str = "checked";

/// Class of the element that groups the panel buttons.
pub const STYLE_GROUP_CLASS: &str = "text-style-group";

static HOOK_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+?)-hook\b").expect("Invalid hook class regex"));

/// The block formats a paragraph can be switched between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    Heading2,
    Heading4,
    Paragraph,
    Blockquote,
    UnorderedList,
}

impl BlockTag {
    pub const ALL: [BlockTag; 5] = [
        BlockTag::Heading2,
        BlockTag::Heading4,
        BlockTag::Paragraph,
        BlockTag::Blockquote,
        BlockTag::UnorderedList,
    ];

    pub fn tag_name(self) -> &'static str {
        match self {
            BlockTag::Heading2 => "h2",
            BlockTag::Heading4 => "h4",
            BlockTag::Paragraph => "p",
            BlockTag::Blockquote => "blockquote",
            BlockTag::UnorderedList => "ul",
        }
    }

    pub fn hook(self) -> &'static str {
        match self {
            BlockTag::Heading2 => "big",
            BlockTag::Heading4 => "small",
            BlockTag::Paragraph => "normal",
            BlockTag::Blockquote => "quote",
            BlockTag::UnorderedList => "unordered",
        }
    }

    pub fn hook_class(self) -> String {
        format!("{}-hook", self.hook())
    }

    pub fn label(self) -> &'static str {
        match self {
            BlockTag::Heading2 => "Heading",
            BlockTag::Heading4 => "Subheading",
            BlockTag::Paragraph => "Body",
            BlockTag::Blockquote => "Quote",
            BlockTag::UnorderedList => "List",
        }
    }

    pub fn from_hook(hook: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.hook() == hook)
    }

    /// Maps a button's class list to a tag. Unknown or missing hooks fall
    /// back to a paragraph.
    pub fn from_class(class: &str) -> Self {
        HOOK_CLASS
            .captures(class)
            .and_then(|caps| caps.get(1))
            .and_then(|hook| Self::from_hook(hook.as_str()))
            .unwrap_or(BlockTag::Paragraph)
    }

    /// True when the class list carries any `<name>-hook` token.
    pub fn has_hook(class: &str) -> bool {
        HOOK_CLASS.is_match(class)
    }

    pub fn from_tag_name(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|block| block.tag_name().eq_ignore_ascii_case(tag))
    }
}

pub fn selection_marker() -> Node {
    let mut attrs = Attrs::default();
    attrs.insert("class".to_string(), AttrValue::from(SELECTED_MARKER_CLASS));
    Node::element("i", attrs, Vec::new())
}

/// Builds the text-style panel: one `li.<hook>-hook` button per tag inside a
/// single group, with the paragraph button selected.
pub fn style_panel() -> Document {
    let buttons = BlockTag::ALL
        .into_iter()
        .map(|tag| {
            let mut attrs = Attrs::default();
            attrs.insert("class".to_string(), AttrValue::from(tag.hook_class()));
            let mut children = vec![Node::text(tag.label())];
            if tag == BlockTag::Paragraph {
                children.push(selection_marker());
            }
            Node::element("li", attrs, children)
        })
        .collect();
    let mut attrs = Attrs::default();
    attrs.insert("class".to_string(), AttrValue::from(STYLE_GROUP_CLASS));
    Document::new(vec![Node::element("ul", attrs, buttons)])
}
