//! Image sources, their resolution into `img` nodes, and the data-URL codec
//! used for inline images.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;

use crate::error::ResolutionError;
use crate::node::{AttrValue, Node, NodeId};
use crate::schedule::InsertionId;
use crate::tree::{Document, Selector};

static DATA_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:(.+?);base64,").expect("Invalid data URL regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `http(s)://`, protocol-relative, `blob:` or `data:` URL.
    Url(String),
    File(PathBuf),
    Bytes { mime: String, bytes: Vec<u8> },
}

impl From<&str> for ImageSource {
    fn from(value: &str) -> Self {
        ImageSource::Url(value.to_string())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(value: PathBuf) -> Self {
        ImageSource::File(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// An inline image found in a document, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Image {
    pub id: String,
    pub data_url: String,
    pub blob: ImageBlob,
}

#[derive(Debug)]
pub enum ResolutionState {
    Pending,
    Resolved(Node),
    Failed(ResolutionError),
}

/// Outcome of one `add_image` call, handed back to `Editor::complete_image`.
#[derive(Debug)]
pub struct PendingImage {
    pub insertion: InsertionId,
    pub source: ImageSource,
    pub state: ResolutionState,
}

impl PendingImage {
    pub fn new(insertion: InsertionId, source: ImageSource) -> Self {
        Self {
            insertion,
            source,
            state: ResolutionState::Pending,
        }
    }
}

/// Future that resolves an image without borrowing the editor.
pub type ImageTask = Pin<Box<dyn Future<Output = PendingImage> + Send>>;

#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(
        &self,
        insertion: InsertionId,
        source: &ImageSource,
    ) -> Result<Node, ResolutionError>;
}

pub(crate) fn resolution_task(
    resolver: Arc<dyn ImageResolver>,
    insertion: InsertionId,
    source: ImageSource,
) -> ImageTask {
    Box::pin(async move {
        let mut pending = PendingImage::new(insertion, source);
        pending.state = match resolver.resolve(insertion, &pending.source).await {
            Ok(node) => ResolutionState::Resolved(node),
            Err(err) => ResolutionState::Failed(err),
        };
        pending
    })
}

/// Resolves URLs in place and embeds files and raw bytes as data URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultImageResolver;

#[async_trait]
impl ImageResolver for DefaultImageResolver {
    async fn resolve(
        &self,
        insertion: InsertionId,
        source: &ImageSource,
    ) -> Result<Node, ResolutionError> {
        match source {
            ImageSource::Url(url) => resolve_url(insertion, url),
            ImageSource::File(path) => {
                let bytes = fs::read(path).map_err(|source| ResolutionError::Io {
                    path: path.clone(),
                    source,
                })?;
                let mime = mime_guess::from_path(path)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string();
                tracing::debug!(
                    insertion = %insertion,
                    path = %path.display(),
                    %mime,
                    "read image file"
                );
                inline_image(insertion, &mime, &bytes)
            }
            ImageSource::Bytes { mime, bytes } => inline_image(insertion, mime, bytes),
        }
    }
}

fn resolve_url(insertion: InsertionId, url: &str) -> Result<Node, ResolutionError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ResolutionError::EmptySource);
    }
    if url.starts_with("data:") {
        let blob = decode_data_url_checked(url)?;
        ensure_image_mime(&blob.mime)?;
        let mut node = Node::image(url);
        set_inline_id(&mut node, insertion);
        return Ok(node);
    }
    let lower = url.to_ascii_lowercase();
    let remote = ["http://", "https://", "//", "blob:"]
        .iter()
        .any(|prefix| lower.starts_with(prefix));
    if !remote {
        return Err(ResolutionError::UnsupportedScheme(url.to_string()));
    }
    Ok(Node::image(url))
}

fn inline_image(insertion: InsertionId, mime: &str, bytes: &[u8]) -> Result<Node, ResolutionError> {
    ensure_image_mime(mime)?;
    let mut node = Node::image(encode_data_url(mime, bytes));
    set_inline_id(&mut node, insertion);
    Ok(node)
}

fn ensure_image_mime(mime: &str) -> Result<(), ResolutionError> {
    if mime.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(ResolutionError::NotAnImage {
            mime: mime.to_string(),
        })
    }
}

fn set_inline_id(node: &mut Node, insertion: InsertionId) {
    if let Some(attrs) = node.attrs_mut() {
        attrs.insert(
            "id".to_string(),
            AttrValue::Str(format!("img-{}", insertion.as_u64())),
        );
    }
}

pub fn is_inline_data_url(src: &str) -> bool {
    DATA_URL.is_match(src)
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Splits a base64 data URL into its MIME type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> Option<ImageBlob> {
    decode_data_url_checked(data_url).ok()
}

fn decode_data_url_checked(data_url: &str) -> Result<ImageBlob, ResolutionError> {
    let captures = DATA_URL
        .captures(data_url)
        .ok_or_else(|| ResolutionError::UnsupportedScheme(data_url.to_string()))?;
    let header = captures.get(0).map_or(0, |m| m.end());
    let mime = captures
        .get(1)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let bytes = BASE64.decode(data_url[header..].trim())?;
    Ok(ImageBlob { mime, bytes })
}

/// Every inline (`data:...;base64,`) image under `scope`, in document order.
///
/// Images whose payload does not decode are skipped.
pub fn extract_inline_images(doc: &Document, scope: NodeId) -> Vec<Base64Image> {
    doc.query_all(&Selector::tag("img"), scope)
        .into_iter()
        .filter_map(|img| {
            let src = img.attr("src").and_then(AttrValue::as_str)?;
            if !is_inline_data_url(src) {
                return None;
            }
            let blob = match decode_data_url_checked(src) {
                Ok(blob) => blob,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping undecodable inline image");
                    return None;
                }
            };
            let id = img
                .attr("id")
                .and_then(AttrValue::as_str)
                .unwrap_or_default()
                .to_string();
            Some(Base64Image {
                id,
                data_url: src.to_string(),
                blob,
            })
        })
        .collect()
}
