// ============================================================================
// AI OPERATIONS: background segmentation collaborator and job plumbing
// ============================================================================
//
// The segmentation model itself is external: anything implementing
// `Segmenter` can be plugged in (an ONNX session, a remote service, a test
// double). This module only owns the settings that are forwarded to it and
// the background-job plumbing: jobs run on `rayon::spawn`, results come back
// over an mpsc channel and are applied on the interaction thread, where the
// document's generation counter rejects stale deliveries.

use image::{GrayImage, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SegmentError;

/// Segmentation model families understood by the collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SegmentModel {
    #[default]
    U2Net,
    U2NetP,
    U2NetHumanSeg,
    Silueta,
    IsNetGeneralUse,
    IsNetAnime,
}

impl SegmentModel {
    pub fn all() -> &'static [SegmentModel] {
        &[
            SegmentModel::U2Net,
            SegmentModel::U2NetP,
            SegmentModel::U2NetHumanSeg,
            SegmentModel::Silueta,
            SegmentModel::IsNetGeneralUse,
            SegmentModel::IsNetAnime,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SegmentModel::U2Net => "u2net",
            SegmentModel::U2NetP => "u2netp",
            SegmentModel::U2NetHumanSeg => "u2net_human_seg",
            SegmentModel::Silueta => "silueta",
            SegmentModel::IsNetGeneralUse => "isnet-general-use",
            SegmentModel::IsNetAnime => "isnet-anime",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.name() == name)
    }
}

/// Settings forwarded to the segmentation collaborator. They control mask
/// softness and boundary erosion when alpha matting is enabled.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentSettings {
    pub model: SegmentModel,
    /// Refine the boundary with alpha matting instead of a hard mask.
    pub alpha_matting: bool,
    /// Mask values at or above this are treated as definite foreground.
    pub fg_threshold: u8,
    /// Mask values at or below this are treated as definite background.
    pub bg_threshold: u8,
    /// Erosion applied to the definite regions before matting, in pixels.
    pub erode_size: u32,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self {
            model: SegmentModel::U2Net,
            alpha_matting: false,
            fg_threshold: 240,
            bg_threshold: 10,
            erode_size: 10,
        }
    }
}

/// External segmentation model: RGB image in, same-sized alpha mask out.
///
/// Implementations may be slow; they should poll `cancel` between expensive
/// stages and return [`SegmentError::Cancelled`] once it is set.
pub trait Segmenter: Send + Sync {
    fn segment(
        &self,
        image: &RgbaImage,
        settings: &SegmentSettings,
        cancel: &AtomicBool,
    ) -> Result<GrayImage, SegmentError>;
}

impl<F> Segmenter for F
where
    F: Fn(&RgbaImage, &SegmentSettings, &AtomicBool) -> Result<GrayImage, SegmentError> + Send + Sync,
{
    fn segment(
        &self,
        image: &RgbaImage,
        settings: &SegmentSettings,
        cancel: &AtomicBool,
    ) -> Result<GrayImage, SegmentError> {
        self(image, settings, cancel)
    }
}

/// Work order for one segmentation run, issued by
/// [`crate::document::Document::begin_segmentation`].
#[derive(Clone, Debug)]
pub struct SegmentationJob {
    pub document_id: Uuid,
    /// Document generation at issue time; results carrying an older
    /// generation are discarded on receipt.
    pub generation: u64,
    pub image: Arc<RgbaImage>,
    pub cancel: Arc<AtomicBool>,
}

impl SegmentationJob {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Result delivered from a segmentation job back to the interaction thread.
#[derive(Debug)]
pub struct SegmentationResult {
    pub document_id: Uuid,
    pub generation: u64,
    pub mask: Result<GrayImage, SegmentError>,
}

/// Run a job synchronously on the current thread.
pub fn run_segmentation(
    job: &SegmentationJob,
    segmenter: &dyn Segmenter,
    settings: &SegmentSettings,
) -> SegmentationResult {
    let mask = if job.is_cancelled() {
        Err(SegmentError::Cancelled)
    } else {
        segmenter
            .segment(&job.image, settings, &job.cancel)
            .and_then(|mask| {
                let (want_w, want_h) = job.image.dimensions();
                let (got_w, got_h) = mask.dimensions();
                if (want_w, want_h) != (got_w, got_h) {
                    Err(SegmentError::SizeMismatch { want_w, want_h, got_w, got_h })
                } else if job.is_cancelled() {
                    Err(SegmentError::Cancelled)
                } else {
                    Ok(mask)
                }
            })
    };
    SegmentationResult {
        document_id: job.document_id,
        generation: job.generation,
        mask,
    }
}

/// Spawn a job on the rayon pool. When done it sends a `SegmentationResult`
/// back via `sender`; the interaction thread polls the receiver and hands
/// the result to `Document::apply_segmentation`.
///
/// A panic inside the segmenter is caught and reported as
/// [`SegmentError::InferenceFailed`].
pub fn spawn_segmentation(
    job: SegmentationJob,
    segmenter: Arc<dyn Segmenter>,
    settings: SegmentSettings,
    sender: mpsc::Sender<SegmentationResult>,
) {
    rayon::spawn(move || {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_segmentation(&job, segmenter.as_ref(), &settings)
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                crate::log_err!("segmentation job panicked: {}", msg);
                SegmentationResult {
                    document_id: job.document_id,
                    generation: job.generation,
                    mask: Err(SegmentError::InferenceFailed(msg)),
                }
            }
        };
        // Receiver gone means the document was closed; nothing to deliver.
        let _ = sender.send(result);
    });
}
