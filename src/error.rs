// ============================================================================
// ERRORS: engine, segmentation collaborator, and file collaborator
// ============================================================================

use std::path::PathBuf;

/// Result of a mutating document operation that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    /// A history entry was appended.
    Committed,
    /// Nothing changed (empty selection, stale async result, unchanged fill…).
    Unchanged,
}

impl EditOutcome {
    pub fn committed(self) -> bool {
        self == EditOutcome::Committed
    }
}

/// Rejections raised by the editing engine. None of these are fatal: the
/// document is left exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("document is busy waiting for segmentation")]
    Busy,
    #[error("no brush stroke in progress")]
    NoActiveStroke,
    #[error("segmentation failed: {0}")]
    Segmentation(#[from] SegmentError),
}

/// Errors reported by a [`crate::ops::ai::Segmenter`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SegmentError {
    #[error("segmentation cancelled")]
    Cancelled,
    #[error("segmenter unavailable: {0}")]
    Unavailable(String),
    #[error("segmenter returned a {got_w}x{got_h} mask for a {want_w}x{want_h} image")]
    SizeMismatch {
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Errors from loading or saving image files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image has zero width or height")]
    EmptyImage,
}
