//! Mask-editing and compositing engine for background removal.
//!
//! A [`document::Document`] owns one loaded image, its cutout alpha mask and
//! an undo timeline. Tools (magic wand, keep/remove brush, crop, color key,
//! fill) mutate it synchronously; [`ops::compose`] renders it for display and
//! export. Segmentation is delegated to a [`ops::ai::Segmenter`].

pub mod canvas;
pub mod cli;
pub mod components;
pub mod document;
pub mod error;
pub mod io;
pub mod logger;
pub mod ops;
pub mod settings;

pub use document::Document;
pub use error::{EditError, EditOutcome, IoError, SegmentError};
