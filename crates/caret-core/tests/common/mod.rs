#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use caret_core::{Editor, Layout};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("caret_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Records every payload emitted under `name`.
pub fn capture<L: Layout>(editor: &mut Editor<L>, name: &str) -> Arc<Mutex<Vec<Vec<Value>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    editor.on(name, move |args: &[Value]| {
        sink.lock().unwrap().push(args.to_vec());
        Ok(())
    });
    seen
}

pub fn cursor_is_valid<L: Layout>(editor: &Editor<L>) -> bool {
    editor
        .cursor()
        .is_none_or(|caret| editor.document().contains(caret.node))
}
