mod block_tag;
mod config;
mod cursor;
mod editor;
mod error;
mod events;
mod image;
pub mod markup;
mod node;
mod schedule;
mod tree;
mod viewport;

pub use crate::block_tag::*;
pub use crate::config::*;
pub use crate::cursor::*;
pub use crate::editor::*;
pub use crate::error::*;
pub use crate::events::*;
pub use crate::image::*;
pub use crate::markup::ContentFormat;
pub use crate::node::*;
pub use crate::schedule::*;
pub use crate::tree::*;
pub use crate::viewport::*;
