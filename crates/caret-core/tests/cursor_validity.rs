mod common;

use caret_core::{BlockTag, Caret, ContentFormat, Editor, LINK_HOST_CLASS, Node, Selector};

use common::cursor_is_valid;

#[test]
fn caret_stays_valid_through_mixed_operations() {
    common::init_tracing();
    let mut editor = Editor::default();
    assert!(cursor_is_valid(&editor));

    editor
        .set_content("<p>one</p><p>two</p><p>three</p>")
        .unwrap();
    assert!(cursor_is_valid(&editor));

    editor.select_block_tag(BlockTag::Heading2).unwrap();
    assert!(cursor_is_valid(&editor));

    let link = editor.add_link("https://example.com", Some("ex")).unwrap();
    assert!(cursor_is_valid(&editor));

    let pending = pollster::block_on(editor.add_image("https://example.com/a.png"));
    let image = editor.complete_image(pending).unwrap();
    assert!(cursor_is_valid(&editor));

    editor.select_block_tag(BlockTag::Blockquote).unwrap();
    assert!(cursor_is_valid(&editor));
    // re-tagging copies the image under a fresh identity
    assert!(!editor.document().contains(image));

    editor.remove_node(link);
    assert!(cursor_is_valid(&editor));

    editor.insert_empty_paragraph();
    assert!(cursor_is_valid(&editor));

    editor.select_block_tag(BlockTag::UnorderedList).unwrap();
    assert!(cursor_is_valid(&editor));

    let blocks: Vec<_> = editor.document().blocks().filter_map(Node::id).collect();
    for block in blocks {
        editor.remove_node(block);
        assert!(cursor_is_valid(&editor));
    }
    assert_eq!(editor.cursor(), None);

    editor.set_content("").unwrap();
    assert!(cursor_is_valid(&editor));
    assert!(editor.cursor().is_some());
}

#[test]
fn removing_caret_block_moves_to_previous_block() {
    let mut editor = Editor::default();
    editor.set_content("<p>a</p><p>b</p><p>c</p>").unwrap();
    let ids: Vec<_> = editor.document().blocks().filter_map(Node::id).collect();

    editor.set_position(Some(ids[1]), 1);
    editor.remove_node(ids[1]).unwrap();
    assert_eq!(editor.cursor(), Some(Caret { node: ids[0], offset: 0 }));

    editor.remove_node(ids[0]).unwrap();
    assert_eq!(editor.cursor_node(), Some(ids[2]));
}

#[test]
fn removing_caret_inside_a_block_falls_back_to_the_block() {
    let mut editor = Editor::default();
    editor
        .set_content(r#"<p>x<a href="https://x.test">y</a></p>"#)
        .unwrap();
    let doc = editor.document();
    let anchor = doc
        .query_first(&Selector::tag("a"), doc.id())
        .and_then(Node::id)
        .unwrap();
    let block = doc.children[0].id();

    assert!(editor.set_position(Some(anchor), 0));
    editor.remove_node(anchor).unwrap();
    assert_eq!(editor.cursor_node(), block);
    assert_eq!(editor.get_content(ContentFormat::Markup), "<p>x</p>");
}

#[test]
fn link_without_caret_appends_a_paragraph() {
    let mut editor = Editor::default();
    editor.set_content("<p>a</p>").unwrap();
    let only = editor.cursor_node().unwrap();
    editor.remove_node(only);
    assert_eq!(editor.cursor(), None);

    let link = editor.add_link("https://example.com", None).unwrap();
    assert_eq!(editor.cursor_node(), Some(link));
    assert_eq!(editor.document().children.len(), 1);
    let host = editor.document().parent_of(link);
    assert_eq!(host, editor.document().children[0].id());
    assert!(editor.document().get(host.unwrap()).unwrap().has_class(LINK_HOST_CLASS));
}

#[test]
fn inserted_paragraph_ids_live_in_the_tree() {
    let mut editor = Editor::default();
    editor.set_content("<p>a</p>").unwrap();

    let paragraph = editor.insert_empty_paragraph();
    assert!(editor.document().contains(paragraph));
    assert_eq!(editor.document().children[1].id(), Some(paragraph));
    assert_eq!(editor.cursor_node(), Some(paragraph));

    let link = editor.add_link("https://example.com", None).unwrap();
    assert_eq!(editor.document().parent_of(link), Some(paragraph));
    assert!(editor.document().get(paragraph).unwrap().has_class(LINK_HOST_CLASS));
}

#[test]
fn stale_positions_are_ignored() {
    let mut editor = Editor::default();
    editor.set_content("<p>abc</p>").unwrap();
    let before = editor.cursor();

    let stray = Node::paragraph("elsewhere").id();
    assert!(!editor.set_position(stray, 0));
    assert!(!editor.set_position(None, 0));
    assert_eq!(editor.cursor(), before);

    let block = editor.cursor_node();
    assert!(editor.set_position(block, 10));
    assert_eq!(editor.cursor().map(|c| c.offset), Some(3));
}
