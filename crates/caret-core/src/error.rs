use std::path::PathBuf;

use thiserror::Error;

use crate::node::NodeId;
use crate::schedule::InsertionId;

/// Failures raised by node construction and low-level tree navigation.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid node descriptor: {0}")]
    Validation(String),

    #[error("node {0} is not attached to a parent")]
    Detached(NodeId),
}

/// Failures while turning an image source into a displayable node.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("image source is empty")]
    EmptySource,

    #[error("unsupported image source: {0}")]
    UnsupportedScheme(String),

    #[error("failed to read image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{mime} is not an image type")]
    NotAnImage { mime: String },

    #[error("invalid inline image payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("malformed markup: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("markup is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error("no toolbar button with id {0}")]
    UnknownButton(NodeId),

    #[error("image insertion {0} has not been resolved")]
    Unresolved(InsertionId),
}
