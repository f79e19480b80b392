mod common;

use std::io::Write;
use std::time::{Duration, Instant};

use caret_core::{
    Caret, ContentFormat, Editor, EditorError, FixedLayout, IMAGE_HOST_CLASS, ImageSource, Layout,
    Node, PendingImage, Rect, ResolutionError, ResolutionState, Size,
};
use pretty_assertions::assert_eq;

#[test]
fn remote_image_fills_empty_paragraph() {
    common::init_tracing();
    let mut editor = Editor::default();
    let block = editor.cursor_node().unwrap();

    let pending = pollster::block_on(editor.add_image("https://example.com/a.png"));
    let id = editor.complete_image(pending).unwrap();

    let doc = editor.document();
    assert_eq!(doc.children.len(), 1);
    assert_eq!(doc.parent_of(id), Some(block));
    assert!(doc.get(block).unwrap().has_class(IMAGE_HOST_CLASS));
    assert_eq!(editor.cursor(), Some(Caret { node: id, offset: 0 }));
    assert!(!editor.is_empty());
    assert_eq!(editor.pending_checks(), 1);
    assert_eq!(
        editor.get_content(ContentFormat::Markup),
        r#"<p class="child-node-is-img"><img src="https://example.com/a.png"></p>"#
    );
}

#[test]
fn image_after_text_goes_into_new_paragraph() {
    let mut editor = Editor::default();
    editor.set_content("<p>first</p><p>second</p>").unwrap();

    let pending = pollster::block_on(editor.add_image("//cdn.example.com/b.jpg"));
    let id = editor.complete_image(pending).unwrap();

    let doc = editor.document();
    let texts: Vec<_> = doc.children.iter().map(Node::text_content).collect();
    assert_eq!(texts, vec!["first", "", "second"]);
    assert_eq!(doc.children[1].id(), doc.parent_of(id));
    assert!(doc.children[1].has_class(IMAGE_HOST_CLASS));
    assert!(!doc.children[0].has_class(IMAGE_HOST_CLASS));
    assert_eq!(editor.cursor_node(), Some(id));
}

#[test]
fn local_file_is_embedded_as_data_url() {
    let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    let bytes = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    file.write_all(&bytes).unwrap();

    let mut editor = Editor::default();
    let source = ImageSource::File(file.path().to_path_buf());
    let pending = pollster::block_on(editor.add_image(source));
    let id = editor.complete_image(pending).unwrap();

    let img = editor.document().get(id).unwrap();
    let src = img.attr("src").and_then(|v| v.as_str()).unwrap();
    assert!(src.starts_with("data:image/png;base64,"));
    assert_eq!(img.attr("id").and_then(|v| v.as_str()), Some("img-1"));

    let images = editor.base64_images();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, "img-1");
    assert_eq!(images[0].blob.mime, "image/png");
    assert_eq!(images[0].blob.bytes, bytes.to_vec());
}

#[test]
fn failed_resolution_leaves_tree_and_cursor_alone() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(b"not an image").unwrap();

    let mut editor = Editor::default();
    editor.set_content("<p>keep</p>").unwrap();
    let errors = common::capture(&mut editor, "error");
    let before = editor.get_content(ContentFormat::Markup);
    let cursor = editor.cursor();

    let source = ImageSource::File(file.path().to_path_buf());
    let pending = pollster::block_on(editor.add_image(source));
    let err = editor.complete_image(pending).unwrap_err();

    assert!(matches!(
        err,
        EditorError::Resolution(ResolutionError::NotAnImage { ref mime }) if mime == "text/plain"
    ));
    assert_eq!(editor.get_content(ContentFormat::Markup), before);
    assert_eq!(editor.cursor(), cursor);
    assert_eq!(editor.pending_checks(), 0);
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[test]
fn missing_file_and_bad_scheme_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = Editor::default();

    let source = ImageSource::File(dir.path().join("gone.png"));
    let pending = pollster::block_on(editor.add_image(source));
    assert!(matches!(
        editor.complete_image(pending),
        Err(EditorError::Resolution(ResolutionError::Io { .. }))
    ));

    let pending = pollster::block_on(editor.add_image("javascript:alert(1)"));
    assert!(matches!(
        editor.complete_image(pending),
        Err(EditorError::Resolution(ResolutionError::UnsupportedScheme(_)))
    ));
    assert!(editor.is_empty());
}

#[test]
fn dropping_the_task_abandons_the_insertion() {
    let mut editor = Editor::default();
    let before = editor.get_content(ContentFormat::Markup);

    let task = editor.add_image("https://example.com/a.png");
    drop(task);

    assert_eq!(editor.get_content(ContentFormat::Markup), before);
    assert_eq!(editor.pending_checks(), 0);
    assert_eq!(editor.next_deadline(), None);
}

#[test]
fn unresolved_descriptor_is_rejected() {
    let mut editor = Editor::default();
    let resolved = pollster::block_on(editor.add_image("https://example.com/a.png"));
    let pending = PendingImage::new(resolved.insertion, resolved.source);

    assert!(matches!(
        editor.complete_image(pending),
        Err(EditorError::Unresolved(id)) if id == resolved.insertion
    ));
    assert!(editor.is_empty());
}

#[test]
fn deferred_check_scrolls_after_delay() {
    let mut editor = Editor::default().with_layout(FixedLayout::new(Size::new(400.0, 600.0)));
    let start = Instant::now();

    let pending = pollster::block_on(editor.add_image("https://example.com/tall.png"));
    let id = editor.complete_image_at(pending, start).unwrap();
    editor
        .layout_mut()
        .set_rect(id, Rect::from_origin_size(0.0, 700.0, 400.0, 50.0));

    assert_eq!(editor.next_deadline(), Some(start + Duration::from_millis(300)));
    assert_eq!(editor.run_due_checks(start + Duration::from_millis(299)), 0);
    assert_eq!(editor.layout().scroll_top(), 0.0);

    assert_eq!(editor.run_due_checks(start + Duration::from_millis(300)), 1);
    assert_eq!(editor.layout().scroll_top(), 150.0);
    assert_eq!(editor.pending_checks(), 0);
}

#[test]
fn rescheduling_an_insertion_cancels_its_earlier_check() {
    let mut editor = Editor::default();
    let start = Instant::now();

    let first = pollster::block_on(editor.add_image("https://example.com/a.png"));
    let insertion = first.insertion;
    editor.complete_image_at(first, start).unwrap();

    let retry = PendingImage {
        insertion,
        source: ImageSource::from("https://example.com/a@2x.png"),
        state: ResolutionState::Resolved(Node::image("https://example.com/a@2x.png")),
    };
    editor
        .complete_image_at(retry, start + Duration::from_millis(100))
        .unwrap();

    assert_eq!(editor.pending_checks(), 1);
    assert_eq!(editor.next_deadline(), Some(start + Duration::from_millis(400)));
    assert_eq!(editor.run_due_checks(start + Duration::from_millis(300)), 0);
    assert_eq!(editor.run_due_checks(start + Duration::from_millis(400)), 1);
}
