//! Markup parsing and serialization, the plain-text projection, and the
//! empty-content check.
//!
//! Parsing is lenient: void tags never need closing, a block start tag
//! closes an open `p`, stray end tags are ignored, unclosed elements are
//! closed at the end of input, a `<` that cannot open a tag is text, and
//! named HTML entities are decoded.

use std::borrow::Cow;
use std::str;
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::error::MarkupError;
use crate::node::{AttrValue, Attrs, ElementNode, Node, is_block_tag, is_media_tag, is_void_tag};
use crate::tree::Document;

static TAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9:-]*$").expect("Invalid tag name regex"));

/// Open elements that stop a block start tag from closing a `p` above them.
const PARAGRAPH_SCOPE: &[&str] = &["button", "table", "td", "th", "caption", "object", "template"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentFormat {
    #[default]
    Markup,
    PlainText,
}

/// Parses markup into top-level block nodes.
///
/// Inline content found at the top level is wrapped in paragraphs;
/// whitespace between blocks is dropped.
pub fn parse(markup: &str) -> Result<Vec<Node>, MarkupError> {
    let markup = escape_stray_angles(markup);
    let mut reader = Reader::from_str(&markup);
    reader.check_end_names(false);

    let mut top: Vec<Node> = Vec::new();
    let mut open: Vec<ElementNode> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = tag_name(&e)?;
                if !TAG_NAME.is_match(&tag) {
                    push_text(&mut top, &mut open, format!("<{}>", str::from_utf8(&e)?));
                    continue;
                }
                if is_block_tag(&tag) {
                    close_open_paragraph(&mut top, &mut open);
                }
                let attrs = read_attrs(&e)?;
                if is_void_tag(&tag) {
                    push_child(&mut top, &mut open, Node::void(tag, attrs));
                } else {
                    open.push(ElementNode::new(tag, attrs));
                }
            }
            Event::Empty(e) => {
                let tag = tag_name(&e)?;
                if !TAG_NAME.is_match(&tag) {
                    push_text(&mut top, &mut open, format!("<{}/>", str::from_utf8(&e)?));
                    continue;
                }
                if is_block_tag(&tag) {
                    close_open_paragraph(&mut top, &mut open);
                }
                let attrs = read_attrs(&e)?;
                let node = if is_void_tag(&tag) {
                    Node::void(tag, attrs)
                } else {
                    Node::element(tag, attrs, Vec::new())
                };
                push_child(&mut top, &mut open, node);
            }
            Event::End(e) => {
                let tag = str::from_utf8(e.name().as_ref())?.to_ascii_lowercase();
                if !TAG_NAME.is_match(&tag) {
                    push_text(&mut top, &mut open, format!("</{}>", str::from_utf8(&e)?));
                    continue;
                }
                let Some(depth) = open.iter().rposition(|el| el.tag == tag) else {
                    tracing::trace!(%tag, "ignoring stray end tag");
                    continue;
                };
                while open.len() > depth {
                    close_innermost(&mut top, &mut open);
                }
            }
            Event::Text(e) => {
                let raw = e.into_inner();
                let decoded = html_escape::decode_html_entities(str::from_utf8(&raw)?).into_owned();
                if !decoded.is_empty() {
                    push_text(&mut top, &mut open, decoded);
                }
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let text = str::from_utf8(&raw)?.to_string();
                if !text.is_empty() {
                    push_text(&mut top, &mut open, text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    while !open.is_empty() {
        close_innermost(&mut top, &mut open);
    }

    Ok(wrap_inline_runs(top))
}

/// Escapes every `<` that cannot open a tag, end tag, comment or
/// declaration, so `a < b` parses as text.
fn escape_stray_angles(markup: &str) -> Cow<'_, str> {
    let opens_markup = |ix: usize| {
        let mut rest = markup[ix + 1..].chars();
        match rest.next() {
            Some(c) if c.is_ascii_alphabetic() => true,
            Some('!') => matches!(rest.next(), Some('-' | '[' | 'D' | 'd')),
            Some('?') => true,
            Some('/') => rest.next().is_some_and(|c| c.is_ascii_alphabetic()),
            _ => false,
        }
    };
    let mut stray = markup
        .match_indices('<')
        .map(|(ix, _)| ix)
        .filter(|&ix| !opens_markup(ix))
        .peekable();
    if stray.peek().is_none() {
        return Cow::Borrowed(markup);
    }

    let mut out = String::with_capacity(markup.len() + 8);
    let mut last = 0;
    for ix in stray {
        out.push_str(&markup[last..ix]);
        out.push_str("&lt;");
        last = ix + 1;
    }
    out.push_str(&markup[last..]);
    Cow::Owned(out)
}

fn tag_name(e: &BytesStart<'_>) -> Result<String, MarkupError> {
    Ok(str::from_utf8(e.name().as_ref())?.to_ascii_lowercase())
}

fn read_attrs(e: &BytesStart<'_>) -> Result<Attrs, MarkupError> {
    let mut attrs = Attrs::default();
    for attr in e.html_attributes().with_checks(false) {
        let attr = attr?;
        let key = str::from_utf8(attr.key.as_ref())?.to_ascii_lowercase();
        let value = html_escape::decode_html_entities(str::from_utf8(&attr.value)?).into_owned();
        attrs.insert(key, AttrValue::Str(value));
    }
    Ok(attrs)
}

fn push_child(top: &mut Vec<Node>, open: &mut [ElementNode], node: Node) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top.push(node),
    }
}

fn push_text(top: &mut Vec<Node>, open: &mut [ElementNode], text: String) {
    let siblings = match open.last_mut() {
        Some(parent) => &mut parent.children,
        None => top,
    };
    if let Some(Node::Text(prev)) = siblings.last_mut() {
        prev.text.push_str(&text);
    } else {
        siblings.push(Node::text(text));
    }
}

/// An open `p` ends where the next block begins, unless a scoping element
/// sits between them.
fn close_open_paragraph(top: &mut Vec<Node>, open: &mut Vec<ElementNode>) {
    let Some(depth) = open
        .iter()
        .rposition(|el| el.tag == "p" || PARAGRAPH_SCOPE.contains(&el.tag.as_str()))
    else {
        return;
    };
    if open[depth].tag != "p" {
        return;
    }
    while open.len() > depth {
        close_innermost(top, open);
    }
}

fn close_innermost(top: &mut Vec<Node>, open: &mut Vec<ElementNode>) {
    if let Some(el) = open.pop() {
        push_child(top, open, Node::Element(el));
    }
}

fn wrap_inline_runs(nodes: Vec<Node>) -> Vec<Node> {
    let mut blocks = Vec::new();
    let mut run: Vec<Node> = Vec::new();

    let flush = |run: &mut Vec<Node>, blocks: &mut Vec<Node>| {
        let meaningful = run.iter().any(|n| match n {
            Node::Text(t) => !t.text.trim().is_empty(),
            Node::Element(_) | Node::Void(_) => true,
        });
        if meaningful {
            blocks.push(Node::element("p", Attrs::default(), std::mem::take(run)));
        } else {
            run.clear();
        }
    };

    for node in nodes {
        if node.tag().is_some_and(is_block_tag) {
            flush(&mut run, &mut blocks);
            blocks.push(node);
        } else {
            run.push(node);
        }
    }
    flush(&mut run, &mut blocks);
    blocks
}

/// Serializes the document's children as markup.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for node in &doc.children {
        write_node(node, &mut out);
    }
    out
}

pub fn serialize_node(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&html_escape::encode_text(&t.text)),
        Node::Void(v) => write_open_tag(&v.tag, &v.attrs, out),
        Node::Element(el) => {
            write_open_tag(&el.tag, &el.attrs, out);
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn write_open_tag(tag: &str, attrs: &Attrs, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&value.to_markup()));
        out.push('"');
    }
    out.push('>');
}

/// Text of every block, one block per line. Line breaks inside a block
/// become newlines.
pub fn to_plain_text(doc: &Document) -> String {
    doc.children
        .iter()
        .map(|block| {
            let mut text = String::new();
            collect_plain(block, &mut text);
            text
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_plain(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&t.text),
        Node::Void(v) if v.tag == "br" => out.push('\n'),
        Node::Void(_) => {}
        Node::Element(el) => {
            for child in &el.children {
                collect_plain(child, out);
            }
        }
    }
}

/// True when the node holds no visible text and no media.
pub fn is_node_empty(node: &Node) -> bool {
    let mut empty = true;
    node.walk(&mut |n| match n {
        Node::Text(t) if !t.text.trim().is_empty() => empty = false,
        Node::Element(_) | Node::Void(_) if n.tag().is_some_and(is_media_tag) => empty = false,
        _ => {}
    });
    empty
}

pub fn is_content_empty(doc: &Document) -> bool {
    doc.children.iter().all(is_node_empty)
}

pub fn is_markup_empty(markup: &str) -> Result<bool, MarkupError> {
    Ok(parse(markup)?.iter().all(is_node_empty))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn doc(markup: &str) -> Document {
        Document::new(parse(markup).unwrap())
    }

    #[test]
    fn void_tags_need_no_closing() {
        let doc = doc(r#"<p>a<br>b<img src="x.png"></p>"#);
        assert_eq!(doc.children.len(), 1);
        let p = &doc.children[0];
        assert_eq!(p.children().len(), 4);
        assert_eq!(p.children()[3].tag(), Some("img"));
        assert_eq!(serialize(&doc), r#"<p>a<br>b<img src="x.png"></p>"#);
    }

    #[test]
    fn top_level_inline_runs_become_paragraphs() {
        let doc = doc("hello <b>world</b>\n<h2>title</h2>\n  ");
        assert_eq!(
            serialize(&doc),
            "<p>hello <b>world</b>\n</p><h2>title</h2>"
        );
    }

    #[test]
    fn entities_are_decoded_and_reencoded() {
        let doc = doc(r#"<p title="a &amp; b">x &lt; y&nbsp;&copy;</p>"#);
        assert_eq!(doc.children[0].text_content(), "x < y\u{a0}\u{a9}");
        assert_eq!(
            serialize(&doc),
            "<p title=\"a &amp; b\">x &lt; y\u{a0}\u{a9}</p>"
        );
    }

    #[test]
    fn stray_and_missing_end_tags_are_tolerated() {
        let doc = doc("<p>one</span></p><blockquote>two");
        assert_eq!(serialize(&doc), "<p>one</p><blockquote>two</blockquote>");
    }

    #[test]
    fn bare_angle_brackets_are_text() {
        let doc = doc("<p>a < b</p><p>1 <2 </ 3 <> <!x></p>");
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.children[0].text_content(), "a < b");
        assert_eq!(doc.children[1].text_content(), "1 <2 </ 3 <> <!x>");
        assert_eq!(serialize(&doc), "<p>a &lt; b</p><p>1 &lt;2 &lt;/ 3 &lt;&gt; &lt;!x&gt;</p>");
    }

    #[test]
    fn invalid_tag_names_are_text() {
        let doc = doc("<p>x<a=b>y</p>");
        assert_eq!(doc.children.len(), 1);
        assert_eq!(doc.children[0].children().len(), 1);
        assert_eq!(doc.children[0].text_content(), "x<a=b>y");
        assert_eq!(serialize(&doc), "<p>x&lt;a=b&gt;y</p>");
    }

    #[test]
    fn block_start_closes_open_paragraph() {
        let flat = doc("<p>a<p>b<h2>t</h2><p><b>x<div>y</div>");
        assert_eq!(serialize(&flat), "<p>a</p><p>b</p><h2>t</h2><p><b>x</b></p><div>y</div>");
        let scoped = doc("<p><button><div>z</div></button></p>");
        assert_eq!(scoped.children.len(), 1);
    }

    #[test]
    fn plain_text_joins_blocks_and_breaks() {
        let doc = doc("<h2>Title</h2><p>a<br>b</p><ul><li>c</li></ul>");
        assert_eq!(to_plain_text(&doc), "Title\na\nb\nc");
    }

    #[test]
    fn emptiness_ignores_whitespace_but_not_media() {
        assert!(is_markup_empty("").unwrap());
        assert!(is_markup_empty("<p> </p><p><br></p>").unwrap());
        assert!(!is_markup_empty("<p>x</p>").unwrap());
        assert!(!is_markup_empty(r#"<p><img src="a.png"></p>"#).unwrap());
        assert!(!is_markup_empty(r#"<video src="a.mp4"></video>"#).unwrap());
    }
}
