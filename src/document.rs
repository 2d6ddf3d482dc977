use image::{Rgb, RgbaImage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::canvas::{force_opaque, opaque_alpha, AlphaMask, Mask, PixelBuffer};
use crate::components::history::{DocumentSnapshot, HistoryManager};
use crate::components::tools::{
    brush_radius_for_zoom, BrushMode, BrushStroke, CropTool, Tool, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE,
};
use crate::components::view::ViewTransform;
use crate::error::{EditError, EditOutcome, SegmentError};
use crate::ops::ai::{SegmentationJob, SegmentationResult};
use crate::ops::canvas_ops::{count_alpha_changes, crop_buffers, write_alpha, MaskTarget};
use crate::ops::color_removal::compute_color_removal;
use crate::ops::magic_wand;
use crate::{log_err, log_info, log_warn};

/// Outstanding segmentation request.
#[derive(Debug)]
struct PendingSegmentation {
    generation: u64,
    cancel: Arc<AtomicBool>,
}

/// Single open image and everything needed to edit its cutout mask.
///
/// All mutating operations run synchronously on the caller's thread. The
/// only exception is segmentation, which hands out a [`SegmentationJob`]
/// and accepts the result later through [`Document::apply_segmentation`].
pub struct Document {
    pub id: Uuid,
    /// `None` for images pasted from the clipboard.
    pub path: Option<PathBuf>,
    /// Display name (derived from path or "Untitled")
    pub name: String,
    pub is_dirty: bool,

    /// Capture as first loaded; reset returns here, even after crops.
    loaded: Arc<PixelBuffer>,
    original: Arc<PixelBuffer>,
    working_alpha: Arc<AlphaMask>,
    fill_color: Option<Rgb<u8>>,

    selection_mask: Option<Mask>,
    pending_stroke: Option<BrushStroke>,
    crop: CropTool,
    active_tool: Tool,

    pub view: ViewTransform,
    /// Last known viewport size, used to re-fit after crops.
    view_size: Option<(f32, f32)>,

    history: HistoryManager,

    /// Bumped whenever an outstanding segmentation result becomes stale.
    generation: u64,
    pending_segmentation: Option<PendingSegmentation>,
}

impl Document {
    /// New document from any RGBA buffer (decoded file, clipboard, drop).
    /// The capture is forced opaque and the mask starts fully kept.
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let (w, h) = image.dimensions();
        Self::build(force_opaque(image), opaque_alpha(w, h))
    }

    /// New document with an initial mask, e.g. a precomputed segmentation.
    pub fn with_alpha(image: &RgbaImage, alpha: AlphaMask) -> Result<Self, EditError> {
        if image.dimensions() != alpha.dimensions() {
            return Err(EditError::InvalidGeometry(format!(
                "mask is {}x{} but image is {}x{}",
                alpha.width(),
                alpha.height(),
                image.width(),
                image.height()
            )));
        }
        Ok(Self::build(force_opaque(image), alpha))
    }

    fn build(original: PixelBuffer, alpha: AlphaMask) -> Self {
        let original = Arc::new(original);
        let working_alpha = Arc::new(alpha);
        let initial = DocumentSnapshot {
            original: Arc::clone(&original),
            alpha: Arc::clone(&working_alpha),
            fill_color: None,
        };
        let (w, h) = original.dimensions();
        log_info!("document opened ({}x{})", w, h);
        Self {
            id: Uuid::new_v4(),
            path: None,
            name: "Untitled".to_string(),
            is_dirty: false,
            loaded: Arc::clone(&original),
            original,
            working_alpha,
            fill_color: None,
            selection_mask: None,
            pending_stroke: None,
            crop: CropTool::default(),
            active_tool: Tool::None,
            view: ViewTransform::default(),
            view_size: None,
            history: HistoryManager::new(initial, "Initial Load"),
            generation: 0,
            pending_segmentation: None,
        }
    }

    /// Attach the file this document was loaded from.
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        self.path = Some(path);
        self
    }

    /// Replace the history limits. Restarts the timeline at the current state.
    pub fn with_history_limits(mut self, max_steps: usize, max_memory_bytes: Option<usize>) -> Self {
        let description = self.history.current().description.clone();
        self.history =
            HistoryManager::with_limits(self.snapshot(), description, max_steps, max_memory_bytes);
        self
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn original(&self) -> &PixelBuffer {
        &self.original
    }

    pub fn working_alpha(&self) -> &AlphaMask {
        &self.working_alpha
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.original.dimensions()
    }

    pub fn fill_color(&self) -> Option<Rgb<u8>> {
        self.fill_color
    }

    pub fn selection_mask(&self) -> Option<&Mask> {
        self.selection_mask.as_ref()
    }

    pub fn pending_stroke(&self) -> Option<&BrushStroke> {
        self.pending_stroke.as_ref()
    }

    pub fn crop_tool(&self) -> &CropTool {
        &self.crop
    }

    pub fn active_tool(&self) -> Tool {
        self.active_tool
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a segmentation job is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending_segmentation.is_some()
    }

    pub fn can_undo(&self) -> bool {
        !self.is_busy() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.is_busy() && self.history.can_redo()
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            original: Arc::clone(&self.original),
            alpha: Arc::clone(&self.working_alpha),
            fill_color: self.fill_color,
        }
    }

    fn restore(&mut self, snapshot: DocumentSnapshot) {
        let resized = snapshot.dimensions() != self.dimensions();
        self.original = snapshot.original;
        self.working_alpha = snapshot.alpha;
        self.fill_color = snapshot.fill_color;
        self.selection_mask = None;
        self.pending_stroke = None;
        self.crop.cancel();
        if resized {
            self.refit_view();
        }
    }

    fn commit(&mut self, description: &str) -> EditOutcome {
        let snapshot = self.snapshot();
        self.history.commit(description, snapshot);
        self.is_dirty = true;
        log_info!(
            "commit '{}' (history {}/{}, {} KiB)",
            description,
            self.history.cursor() + 1,
            self.history.len(),
            self.history.memory_usage() / 1024
        );
        EditOutcome::Committed
    }

    fn ensure_idle(&self, action: &str) -> Result<(), EditError> {
        if self.is_busy() {
            log_warn!("'{}' rejected: segmentation in progress", action);
            return Err(EditError::Busy);
        }
        Ok(())
    }

    fn check_tolerance(tolerance: f32) -> Result<(), EditError> {
        if !(0.0..=100.0).contains(&tolerance) {
            return Err(EditError::InvalidGeometry(format!(
                "tolerance {} outside 0..=100",
                tolerance
            )));
        }
        Ok(())
    }

    // ========================================================================
    // TOOLS AND VIEW
    // ========================================================================

    /// Switch the active tool. Leaving a tool drops its transient state.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool == self.active_tool {
            return;
        }
        if self.active_tool == Tool::Crop {
            self.crop.cancel();
        }
        if self.pending_stroke.is_some() {
            self.pending_stroke = None;
        }
        if tool != Tool::MagicWand {
            self.selection_mask = None;
        }
        log_info!("tool: {}", tool.label());
        self.active_tool = tool;
    }

    /// Record the viewport size and fit the image into it.
    pub fn set_view_size(&mut self, view_w: f32, view_h: f32) {
        self.view_size = Some((view_w, view_h));
        self.refit_view();
    }

    fn refit_view(&mut self) {
        let (w, h) = self.dimensions();
        match self.view_size {
            Some((vw, vh)) => self.view.fit_to_view(vw, vh, w, h),
            None => self.view.reset_zoom(),
        }
    }

    // ========================================================================
    // MAGIC WAND
    // ========================================================================

    /// Replace the selection with the region grown from pixel `(x, y)` of the
    /// original image. Returns the number of selected pixels; a seed outside
    /// the image yields an empty selection.
    pub fn select_at(&mut self, x: u32, y: u32, tolerance: f32) -> Result<usize, EditError> {
        self.ensure_idle("Magic Wand")?;
        Self::check_tolerance(tolerance)?;
        let mask = magic_wand::select(x, y, tolerance, &self.original);
        let count = mask.count();
        self.pending_stroke = None;
        self.selection_mask = Some(mask);
        self.active_tool = Tool::MagicWand;
        Ok(count)
    }

    /// [`Self::select_at`] for a point in view space.
    pub fn select_at_view(&mut self, view_x: f32, view_y: f32, tolerance: f32) -> Result<usize, EditError> {
        let (w, h) = self.dimensions();
        match self.view.to_pixel_checked(view_x, view_y, w, h) {
            Some((x, y)) => self.select_at(x, y, tolerance),
            None => {
                self.ensure_idle("Magic Wand")?;
                Self::check_tolerance(tolerance)?;
                self.pending_stroke = None;
                self.selection_mask = Some(Mask::new(w, h));
                self.active_tool = Tool::MagicWand;
                Ok(0)
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection_mask = None;
    }

    /// Remove every selected pixel from the cutout.
    pub fn remove_selected(&mut self) -> Result<EditOutcome, EditError> {
        self.apply_selection(MaskTarget::Inside, "Wand Remove")
    }

    /// Remove every pixel outside the selection from the cutout.
    pub fn keep_selected(&mut self) -> Result<EditOutcome, EditError> {
        self.apply_selection(MaskTarget::Outside, "Wand Keep")
    }

    fn apply_selection(&mut self, target: MaskTarget, description: &str) -> Result<EditOutcome, EditError> {
        self.ensure_idle(description)?;
        let Some(mask) = self.selection_mask.take() else {
            return Ok(EditOutcome::Unchanged);
        };
        if mask.is_empty() || mask.dimensions() != self.dimensions() {
            return Ok(EditOutcome::Unchanged);
        }
        if count_alpha_changes(&self.working_alpha, &mask, target, 0) == 0 {
            return Ok(EditOutcome::Unchanged);
        }
        write_alpha(Arc::make_mut(&mut self.working_alpha), &mask, target, 0);
        Ok(self.commit(description))
    }

    // ========================================================================
    // BRUSH
    // ========================================================================

    fn check_brush_size(size: f32) -> Result<(), EditError> {
        if !(MIN_BRUSH_SIZE..=MAX_BRUSH_SIZE).contains(&size) {
            return Err(EditError::InvalidGeometry(format!(
                "brush size {} outside {}..={}",
                size, MIN_BRUSH_SIZE, MAX_BRUSH_SIZE
            )));
        }
        Ok(())
    }

    fn check_point(x: f32, y: f32) -> Result<(), EditError> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(EditError::InvalidGeometry(format!("brush point ({}, {}) is not finite", x, y)));
        }
        Ok(())
    }

    /// Pointer down: start a stroke and stamp the seed point `(x, y)` in
    /// image space. `brush_size` is the on-screen diameter in view pixels.
    /// Points off the image are clamped.
    pub fn begin_stroke(&mut self, mode: BrushMode, x: f32, y: f32, brush_size: f32) -> Result<(), EditError> {
        self.ensure_idle(mode.label())?;
        Self::check_brush_size(brush_size)?;
        Self::check_point(x, y)?;
        let (w, h) = self.dimensions();
        let mut stroke = BrushStroke::begin(mode, w, h);
        stroke.extend(x, y, brush_radius_for_zoom(brush_size, self.view.zoom));
        self.selection_mask = None;
        self.pending_stroke = Some(stroke);
        self.active_tool = match mode {
            BrushMode::Keep => Tool::BrushKeep,
            BrushMode::Remove => Tool::BrushRemove,
        };
        Ok(())
    }

    /// [`Self::begin_stroke`] for a point in view space.
    pub fn begin_stroke_view(&mut self, mode: BrushMode, view_x: f32, view_y: f32, brush_size: f32) -> Result<(), EditError> {
        let (x, y) = self.view.to_image(view_x, view_y);
        self.begin_stroke(mode, x, y, brush_size)
    }

    /// Pointer move: stamp along the segment from the previous point.
    pub fn extend_stroke(&mut self, x: f32, y: f32, brush_size: f32) -> Result<(), EditError> {
        Self::check_brush_size(brush_size)?;
        Self::check_point(x, y)?;
        let radius = brush_radius_for_zoom(brush_size, self.view.zoom);
        let stroke = self.pending_stroke.as_mut().ok_or(EditError::NoActiveStroke)?;
        stroke.extend(x, y, radius);
        Ok(())
    }

    pub fn extend_stroke_view(&mut self, view_x: f32, view_y: f32, brush_size: f32) -> Result<(), EditError> {
        let (x, y) = self.view.to_image(view_x, view_y);
        self.extend_stroke(x, y, brush_size)
    }

    /// Pointer up: merge the stroke into the working alpha as one history
    /// entry. Keep restores full opacity; Remove clears to zero.
    pub fn end_stroke(&mut self) -> Result<EditOutcome, EditError> {
        let stroke = self.pending_stroke.take().ok_or(EditError::NoActiveStroke)?;
        let mode = stroke.mode;
        log_info!("{}: {} stamps", mode.label(), stroke.stamp_count());
        let mask = stroke.into_mask();
        let value = mode.target_alpha();
        if mask.is_empty() || count_alpha_changes(&self.working_alpha, &mask, MaskTarget::Inside, value) == 0 {
            return Ok(EditOutcome::Unchanged);
        }
        write_alpha(Arc::make_mut(&mut self.working_alpha), &mask, MaskTarget::Inside, value);
        Ok(self.commit(mode.label()))
    }

    /// Abandon the stroke without touching the mask.
    pub fn cancel_stroke(&mut self) {
        self.pending_stroke = None;
    }

    // ========================================================================
    // CROP
    // ========================================================================

    pub fn begin_crop(&mut self) -> Result<(), EditError> {
        self.ensure_idle("Crop")?;
        self.pending_stroke = None;
        self.selection_mask = None;
        self.crop.begin();
        self.active_tool = Tool::Crop;
        Ok(())
    }

    /// Set the crop rectangle from two image-space corners. The rectangle is
    /// normalized and clamped to the image.
    pub fn set_crop_rect(&mut self, p1: (i64, i64), p2: (i64, i64)) -> Result<(), EditError> {
        if !self.crop.is_armed() {
            return Err(EditError::InvalidGeometry("crop mode is not active".into()));
        }
        let (w, h) = self.dimensions();
        self.crop.set_rect(p1, p2, w, h);
        Ok(())
    }

    /// [`Self::set_crop_rect`] from two view-space corners.
    pub fn set_crop_rect_view(&mut self, v1: (f32, f32), v2: (f32, f32)) -> Result<(), EditError> {
        let floor = |(x, y): (f32, f32)| (x.floor() as i64, y.floor() as i64);
        let p1 = floor(self.view.to_image(v1.0, v1.1));
        let p2 = floor(self.view.to_image(v2.0, v2.1));
        self.set_crop_rect(p1, p2)
    }

    /// Replace both buffers with the armed rectangle.
    pub fn apply_crop(&mut self) -> Result<EditOutcome, EditError> {
        self.ensure_idle("Crop")?;
        if !self.crop.is_armed() {
            return Err(EditError::InvalidGeometry("crop mode is not active".into()));
        }
        let rect = self
            .crop
            .rect()
            .ok_or_else(|| EditError::InvalidGeometry("no crop rectangle set".into()))?;
        if rect.is_empty() {
            log_warn!("crop rejected: degenerate {}x{} rectangle", rect.width, rect.height);
            return Err(EditError::InvalidGeometry(format!(
                "crop rectangle is {}x{}",
                rect.width, rect.height
            )));
        }
        let (original, alpha) = crop_buffers(&self.original, &self.working_alpha, rect)
            .ok_or_else(|| EditError::InvalidGeometry("crop rectangle outside image".into()))?;
        self.original = Arc::new(original);
        self.working_alpha = Arc::new(alpha);
        self.selection_mask = None;
        self.pending_stroke = None;
        self.crop.cancel();
        self.active_tool = Tool::None;
        self.refit_view();
        Ok(self.commit("Crop"))
    }

    pub fn cancel_crop(&mut self) {
        self.crop.cancel();
        if self.active_tool == Tool::Crop {
            self.active_tool = Tool::None;
        }
    }

    // ========================================================================
    // FILL, COLOR KEY, RESET
    // ========================================================================

    /// Composite `color` under the cutout. Non-destructive until export.
    pub fn set_fill(&mut self, color: Rgb<u8>) -> Result<EditOutcome, EditError> {
        self.ensure_idle("Fill Background")?;
        if self.fill_color == Some(color) {
            return Ok(EditOutcome::Unchanged);
        }
        self.fill_color = Some(color);
        Ok(self.commit("Fill Background"))
    }

    pub fn clear_fill(&mut self) -> Result<EditOutcome, EditError> {
        self.ensure_idle("Remove Fill")?;
        if self.fill_color.is_none() {
            return Ok(EditOutcome::Unchanged);
        }
        self.fill_color = None;
        Ok(self.commit("Remove Fill"))
    }

    /// Remove every pixel close to `color`, connected or not.
    pub fn remove_color(&mut self, color: [u8; 3], tolerance: f32) -> Result<EditOutcome, EditError> {
        self.ensure_idle("Remove Color")?;
        Self::check_tolerance(tolerance)?;
        let (mask, changes) = compute_color_removal(&self.original, &self.working_alpha, color, tolerance);
        if changes == 0 {
            return Ok(EditOutcome::Unchanged);
        }
        write_alpha(Arc::make_mut(&mut self.working_alpha), &mask, MaskTarget::Inside, 0);
        self.selection_mask = None;
        self.pending_stroke = None;
        Ok(self.commit("Remove Color"))
    }

    /// Go back to the capture as loaded: full size, fully opaque, no fill.
    pub fn reset(&mut self) -> Result<EditOutcome, EditError> {
        self.ensure_idle("Reset")?;
        self.selection_mask = None;
        self.pending_stroke = None;
        self.crop.cancel();
        let same_image = Arc::ptr_eq(&self.original, &self.loaded);
        let opaque = self.working_alpha.as_raw().iter().all(|&a| a == 255);
        if same_image && opaque && self.fill_color.is_none() {
            return Ok(EditOutcome::Unchanged);
        }
        let resized = !same_image && self.loaded.dimensions() != self.dimensions();
        let (w, h) = self.loaded.dimensions();
        self.original = Arc::clone(&self.loaded);
        if !(same_image && opaque) {
            self.working_alpha = Arc::new(opaque_alpha(w, h));
        }
        self.fill_color = None;
        if resized {
            self.refit_view();
        }
        Ok(self.commit("Reset"))
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    /// Step back one entry. Returns the description of the undone action, or
    /// `None` at the start of the timeline or while busy.
    pub fn undo(&mut self) -> Option<String> {
        if self.is_busy() {
            return None;
        }
        let (description, snapshot) = self.history.undo()?;
        self.restore(snapshot);
        self.is_dirty = true;
        log_info!("undo '{}'", description);
        Some(description)
    }

    /// Step forward one entry. Returns the description of the redone action.
    pub fn redo(&mut self) -> Option<String> {
        if self.is_busy() {
            return None;
        }
        let (description, snapshot) = self.history.redo()?;
        self.restore(snapshot);
        self.is_dirty = true;
        log_info!("redo '{}'", description);
        Some(description)
    }

    // ========================================================================
    // SEGMENTATION
    // ========================================================================

    /// Issue a segmentation job for the current original. The document is
    /// busy until the result is applied or the job is cancelled.
    pub fn begin_segmentation(&mut self) -> Result<SegmentationJob, EditError> {
        self.ensure_idle("AI Background Removal")?;
        self.generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.pending_segmentation = Some(PendingSegmentation {
            generation: self.generation,
            cancel: Arc::clone(&cancel),
        });
        self.pending_stroke = None;
        self.selection_mask = None;
        log_info!("segmentation issued (generation {})", self.generation);
        Ok(SegmentationJob {
            document_id: self.id,
            generation: self.generation,
            image: Arc::clone(&self.original),
            cancel,
        })
    }

    /// Cancel the outstanding job, if any. Its result will be discarded.
    pub fn cancel_segmentation(&mut self) {
        if let Some(pending) = self.pending_segmentation.take() {
            pending.cancel.store(true, Ordering::Relaxed);
            self.generation += 1;
            log_info!("segmentation cancelled (generation {})", pending.generation);
        }
    }

    /// Adopt a delivered segmentation result. Results for another document
    /// or an older generation are discarded as [`EditOutcome::Unchanged`].
    pub fn apply_segmentation(&mut self, result: SegmentationResult) -> Result<EditOutcome, EditError> {
        let current = self
            .pending_segmentation
            .as_ref()
            .is_some_and(|p| p.generation == result.generation);
        if result.document_id != self.id || !current {
            log_info!(
                "discarding stale segmentation result (generation {}, current {})",
                result.generation,
                self.generation
            );
            return Ok(EditOutcome::Unchanged);
        }
        self.pending_segmentation = None;

        let mask = match result.mask {
            Ok(mask) => mask,
            Err(SegmentError::Cancelled) => return Ok(EditOutcome::Unchanged),
            Err(e) => {
                log_err!("segmentation failed: {}", e);
                return Err(EditError::Segmentation(e));
            }
        };
        let (want_w, want_h) = self.dimensions();
        let (got_w, got_h) = mask.dimensions();
        if (want_w, want_h) != (got_w, got_h) {
            return Err(EditError::Segmentation(SegmentError::SizeMismatch {
                want_w,
                want_h,
                got_w,
                got_h,
            }));
        }
        if mask == *self.working_alpha {
            return Ok(EditOutcome::Unchanged);
        }
        self.working_alpha = Arc::new(mask);
        Ok(self.commit("AI Background Removal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ai::{run_segmentation, SegmentSettings};
    use crate::ops::compose::{export_buffer, render, RenderOptions};
    use image::{GrayImage, Luma, Rgba};
    use pretty_assertions::assert_eq;

    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 77, 255]))
    }

    fn alpha_at(doc: &Document, x: u32, y: u32) -> u8 {
        doc.working_alpha().get_pixel(x, y).0[0]
    }

    #[test]
    fn loaded_capture_is_forced_opaque() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 10]));
        let doc = Document::from_rgba(&img);
        assert!(doc.original().pixels().all(|p| p.0[3] == 255));
        assert!(doc.working_alpha().pixels().all(|p| p.0[0] == 255));
        assert_eq!(doc.history().len(), 1);
        assert_eq!(doc.history().current().description, "Initial Load");
    }

    #[test]
    fn with_alpha_rejects_mismatched_mask() {
        let img = RgbaImage::new(4, 4);
        assert!(matches!(
            Document::with_alpha(&img, GrayImage::new(3, 4)),
            Err(EditError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn wand_remove_clears_selected_alpha() {
        let mut img = RgbaImage::from_pixel(10, 10, BLUE);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut doc = Document::from_rgba(&img);
        assert_eq!(doc.select_at(5, 5, 0.0).unwrap(), 99);
        assert_eq!(doc.remove_selected().unwrap(), EditOutcome::Committed);
        assert!(doc.selection_mask().is_none());
        assert_eq!(alpha_at(&doc, 0, 0), 255);
        assert_eq!(alpha_at(&doc, 5, 5), 0);
        assert_eq!(doc.history().len(), 2);
    }

    #[test]
    fn wand_keep_clears_everything_else() {
        let mut img = RgbaImage::from_pixel(10, 10, BLUE);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut doc = Document::from_rgba(&img);
        assert_eq!(doc.select_at(0, 0, 0.0).unwrap(), 1);
        assert!(doc.keep_selected().unwrap().committed());
        assert_eq!(alpha_at(&doc, 0, 0), 255);
        assert_eq!(alpha_at(&doc, 1, 0), 0);
    }

    #[test]
    fn wand_click_outside_gives_empty_selection_and_noop_commit() {
        let mut doc = Document::from_rgba(&RgbaImage::from_pixel(4, 4, BLUE));
        assert_eq!(doc.select_at_view(-5.0, 2.0, 10.0).unwrap(), 0);
        assert_eq!(doc.remove_selected().unwrap(), EditOutcome::Unchanged);
        assert_eq!(doc.keep_selected().unwrap(), EditOutcome::Unchanged);
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn wand_rejects_out_of_range_tolerance() {
        let mut doc = Document::from_rgba(&RgbaImage::from_pixel(4, 4, BLUE));
        assert!(matches!(doc.select_at(1, 1, 100.5), Err(EditError::InvalidGeometry(_))));
        assert!(matches!(doc.select_at(1, 1, -1.0), Err(EditError::InvalidGeometry(_))));
        assert!(doc.selection_mask().is_none());
    }

    #[test]
    fn new_wand_click_replaces_selection() {
        let mut img = RgbaImage::from_pixel(4, 1, BLUE);
        img.put_pixel(3, 0, Rgba([255, 0, 0, 255]));
        let mut doc = Document::from_rgba(&img);
        doc.select_at(0, 0, 0.0).unwrap();
        doc.select_at(3, 0, 0.0).unwrap();
        let sel = doc.selection_mask().unwrap();
        assert_eq!(sel.count(), 1);
        assert!(sel.contains(3, 0));
    }

    #[test]
    fn remove_stroke_then_undo_restores_alpha() {
        let mut doc = Document::from_rgba(&gradient(8, 8));
        let before = doc.working_alpha().clone();
        doc.begin_stroke(BrushMode::Remove, 3.0, 3.0, 2.0).unwrap();
        assert!(doc.end_stroke().unwrap().committed());
        assert_eq!(alpha_at(&doc, 3, 3), 0);
        assert_eq!(alpha_at(&doc, 4, 3), 0);
        assert_eq!(alpha_at(&doc, 4, 4), 255);

        assert_eq!(doc.undo().as_deref(), Some("Remove Brush"));
        assert_eq!(*doc.working_alpha(), before);
    }

    #[test]
    fn keep_stroke_restores_full_opacity() {
        let img = gradient(6, 6);
        let mut doc = Document::with_alpha(&img, GrayImage::new(6, 6)).unwrap();
        doc.begin_stroke(BrushMode::Keep, 2.0, 2.0, 1.0).unwrap();
        doc.extend_stroke(4.0, 2.0, 1.0).unwrap();
        doc.end_stroke().unwrap();
        for x in 2..=4 {
            assert_eq!(alpha_at(&doc, x, 2), 255);
        }
        assert_eq!(alpha_at(&doc, 2, 3), 0);
    }

    #[test]
    fn stroke_clears_selection() {
        let mut doc = Document::from_rgba(&RgbaImage::from_pixel(4, 4, BLUE));
        doc.select_at(0, 0, 0.0).unwrap();
        doc.begin_stroke(BrushMode::Remove, 1.0, 1.0, 1.0).unwrap();
        assert!(doc.selection_mask().is_none());
        assert!(doc.pending_stroke().is_some());
        doc.select_at(0, 0, 0.0).unwrap();
        assert!(doc.pending_stroke().is_none());
    }

    #[test]
    fn stroke_errors() {
        let mut doc = Document::from_rgba(&RgbaImage::from_pixel(4, 4, BLUE));
        assert!(matches!(doc.end_stroke(), Err(EditError::NoActiveStroke)));
        assert!(matches!(doc.extend_stroke(1.0, 1.0, 4.0), Err(EditError::NoActiveStroke)));
        assert!(matches!(
            doc.begin_stroke(BrushMode::Keep, 1.0, 1.0, 0.5),
            Err(EditError::InvalidGeometry(_))
        ));
        assert!(matches!(
            doc.begin_stroke(BrushMode::Keep, 1.0, 1.0, 501.0),
            Err(EditError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn keep_stroke_on_opaque_mask_is_unchanged() {
        let mut doc = Document::from_rgba(&RgbaImage::from_pixel(4, 4, BLUE));
        doc.begin_stroke(BrushMode::Keep, 1.0, 1.0, 4.0).unwrap();
        assert_eq!(doc.end_stroke().unwrap(), EditOutcome::Unchanged);
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn disjoint_strokes_commute() {
        let img = gradient(12, 12);
        let run = |order: [(BrushMode, f32); 2]| {
            let mut doc = Document::with_alpha(&img, GrayImage::from_pixel(12, 12, Luma([128]))).unwrap();
            for (mode, x) in order {
                doc.begin_stroke(mode, x, 5.0, 4.0).unwrap();
                doc.end_stroke().unwrap();
            }
            doc.working_alpha().clone()
        };
        let a = run([(BrushMode::Keep, 2.0), (BrushMode::Remove, 9.0)]);
        let b = run([(BrushMode::Remove, 9.0), (BrushMode::Keep, 2.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_strokes_last_write_wins() {
        let mut doc = Document::from_rgba(&gradient(8, 8));
        doc.begin_stroke(BrushMode::Remove, 4.0, 4.0, 4.0).unwrap();
        doc.end_stroke().unwrap();
        doc.begin_stroke(BrushMode::Keep, 4.0, 4.0, 2.0).unwrap();
        doc.end_stroke().unwrap();
        assert_eq!(alpha_at(&doc, 4, 4), 255);
        assert_eq!(alpha_at(&doc, 4, 6), 0);
    }

    #[test]
    fn crop_and_undo_restore_exact_original() {
        let img = gradient(10, 10);
        let mut doc = Document::from_rgba(&img);
        let pre = doc.original().clone();
        doc.begin_crop().unwrap();
        doc.set_crop_rect((6, 6), (2, 2)).unwrap();
        assert!(doc.apply_crop().unwrap().committed());
        assert_eq!(doc.dimensions(), (4, 4));
        assert_eq!(doc.working_alpha().dimensions(), (4, 4));
        assert_eq!(doc.original().get_pixel(0, 0), pre.get_pixel(2, 2));
        assert!(!doc.crop_tool().is_armed());

        doc.undo().unwrap();
        assert_eq!(*doc.original(), pre);
        assert_eq!(doc.working_alpha().dimensions(), (10, 10));
    }

    #[test]
    fn degenerate_crop_is_rejected() {
        let mut doc = Document::from_rgba(&gradient(10, 10));
        assert!(matches!(doc.apply_crop(), Err(EditError::InvalidGeometry(_))));
        assert!(matches!(doc.set_crop_rect((0, 0), (2, 2)), Err(EditError::InvalidGeometry(_))));
        doc.begin_crop().unwrap();
        assert!(matches!(doc.apply_crop(), Err(EditError::InvalidGeometry(_))));
        doc.set_crop_rect((3, 1), (3, 8)).unwrap();
        assert!(matches!(doc.apply_crop(), Err(EditError::InvalidGeometry(_))));
        assert_eq!(doc.history().len(), 1);
        assert_eq!(doc.dimensions(), (10, 10));
    }

    #[test]
    fn crop_refits_known_view() {
        let mut doc = Document::from_rgba(&gradient(10, 10));
        doc.set_view_size(100.0, 100.0);
        assert_eq!(doc.view.zoom, 10.0);
        doc.begin_crop().unwrap();
        doc.set_crop_rect((0, 0), (5, 5)).unwrap();
        doc.apply_crop().unwrap();
        assert_eq!(doc.view.zoom, 20.0);
    }

    #[test]
    fn cancel_crop_leaves_document_alone() {
        let mut doc = Document::from_rgba(&gradient(10, 10));
        doc.begin_crop().unwrap();
        doc.set_crop_rect((1, 1), (4, 4)).unwrap();
        doc.cancel_crop();
        assert_eq!(doc.dimensions(), (10, 10));
        assert!(doc.crop_tool().rect().is_none());
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn fill_toggle_shares_pixel_memory() {
        let mut doc = Document::from_rgba(&gradient(4, 4));
        let before = doc.history().memory_usage();
        assert!(doc.set_fill(Rgb([1, 2, 3])).unwrap().committed());
        assert_eq!(doc.set_fill(Rgb([1, 2, 3])).unwrap(), EditOutcome::Unchanged);
        assert!(doc.clear_fill().unwrap().committed());
        assert_eq!(doc.clear_fill().unwrap(), EditOutcome::Unchanged);
        assert_eq!(doc.history().memory_usage(), before);
        assert_eq!(doc.history().len(), 3);
    }

    #[test]
    fn undo_redo_round_trips_render() {
        let mut doc = Document::from_rgba(&gradient(6, 6));
        doc.begin_stroke(BrushMode::Remove, 2.0, 2.0, 2.0).unwrap();
        doc.end_stroke().unwrap();
        doc.set_fill(Rgb([9, 9, 9])).unwrap();
        let opts = RenderOptions::default();
        let shown = render(&doc, &opts);
        assert_eq!(doc.undo().as_deref(), Some("Fill Background"));
        assert_eq!(doc.redo().as_deref(), Some("Fill Background"));
        assert_eq!(render(&doc, &opts), shown);
        assert!(doc.redo().is_none());
    }

    #[test]
    fn commit_after_undo_drops_redo() {
        let mut doc = Document::from_rgba(&gradient(6, 6));
        doc.set_fill(Rgb([1, 1, 1])).unwrap();
        doc.undo();
        assert!(doc.can_redo());
        doc.set_fill(Rgb([2, 2, 2])).unwrap();
        assert!(!doc.can_redo());
    }

    #[test]
    fn remove_color_and_reset() {
        let mut img = RgbaImage::from_pixel(5, 5, BLUE);
        img.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let mut doc = Document::from_rgba(&img);
        assert!(doc.remove_color([0, 0, 255], 5.0).unwrap().committed());
        assert_eq!(alpha_at(&doc, 0, 0), 0);
        assert_eq!(alpha_at(&doc, 2, 2), 255);
        assert_eq!(doc.remove_color([0, 0, 255], 5.0).unwrap(), EditOutcome::Unchanged);

        doc.set_fill(Rgb([0, 0, 0])).unwrap();
        assert!(doc.reset().unwrap().committed());
        assert!(doc.working_alpha().pixels().all(|p| p.0[0] == 255));
        assert_eq!(doc.fill_color(), None);
        assert_eq!(doc.reset().unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn brush_far_off_image_is_clamped() {
        let mut doc = Document::from_rgba(&gradient(8, 8));
        doc.begin_stroke(BrushMode::Remove, 1e19, 2.0, 20.0).unwrap();
        assert_eq!(doc.end_stroke().unwrap(), EditOutcome::Unchanged);

        doc.begin_stroke(BrushMode::Remove, 2.0, 2.0, 2.0).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let extended = doc.extend_stroke(1e12, 2.0, 2.0);
            let _ = tx.send((extended, doc));
        });
        let (extended, mut doc) = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("extend_stroke did not finish");
        extended.unwrap();
        assert!(doc.end_stroke().unwrap().committed());
        for x in 2..8 {
            assert_eq!(alpha_at(&doc, x, 2), 0);
        }
        assert_eq!(alpha_at(&doc, 0, 0), 255);
    }

    #[test]
    fn brush_rejects_non_finite_points() {
        let mut doc = Document::from_rgba(&gradient(4, 4));
        assert!(matches!(
            doc.begin_stroke(BrushMode::Remove, f32::NAN, f32::NAN, 1.0),
            Err(EditError::InvalidGeometry(_))
        ));
        assert!(doc.pending_stroke().is_none());
        assert!(matches!(doc.end_stroke(), Err(EditError::NoActiveStroke)));

        doc.begin_stroke(BrushMode::Remove, 3.0, 3.0, 1.0).unwrap();
        assert!(doc.extend_stroke(f32::INFINITY, 0.0, 1.0).is_err());
        doc.end_stroke().unwrap();
        assert_eq!(alpha_at(&doc, 0, 0), 255);
        assert_eq!(alpha_at(&doc, 3, 3), 0);
        assert_eq!(doc.history().len(), 2);
    }

    #[test]
    fn reset_after_crop_restores_loaded_capture() {
        let img = RgbaImage::from_fn(10, 10, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        let mut doc = Document::from_rgba(&img);
        doc.set_view_size(100.0, 100.0);
        doc.begin_crop().unwrap();
        doc.set_crop_rect((2, 2), (6, 6)).unwrap();
        doc.apply_crop().unwrap();
        doc.begin_stroke(BrushMode::Remove, 1.0, 1.0, 2.0).unwrap();
        doc.end_stroke().unwrap();
        assert_eq!(doc.dimensions(), (4, 4));

        assert!(doc.reset().unwrap().committed());
        assert_eq!(doc.dimensions(), (10, 10));
        assert_eq!(doc.working_alpha().dimensions(), (10, 10));
        assert!(doc.working_alpha().pixels().all(|p| p.0 == [255]));
        assert_eq!(doc.original().get_pixel(9, 9), img.get_pixel(9, 9));
        assert_eq!(doc.view.zoom, 10.0);
        assert_eq!(doc.history().undo_description(), Some("Reset"));

        assert_eq!(doc.undo().as_deref(), Some("Reset"));
        assert_eq!(doc.dimensions(), (4, 4));
    }

    #[test]
    fn busy_document_rejects_mutations() {
        let mut doc = Document::from_rgba(&gradient(4, 4));
        doc.set_fill(Rgb([1, 1, 1])).unwrap();
        let _job = doc.begin_segmentation().unwrap();
        assert!(doc.is_busy());
        assert!(matches!(doc.select_at(0, 0, 10.0), Err(EditError::Busy)));
        assert!(matches!(doc.begin_stroke(BrushMode::Keep, 0.0, 0.0, 5.0), Err(EditError::Busy)));
        assert!(matches!(doc.begin_crop(), Err(EditError::Busy)));
        assert!(matches!(doc.clear_fill(), Err(EditError::Busy)));
        assert!(matches!(doc.begin_segmentation(), Err(EditError::Busy)));
        assert!(doc.undo().is_none());
        doc.cancel_segmentation();
        assert!(!doc.is_busy());
        assert!(doc.undo().is_some());
    }

    fn half(image: &RgbaImage, _: &SegmentSettings, _: &AtomicBool) -> Result<GrayImage, SegmentError> {
        let (w, h) = image.dimensions();
        Ok(GrayImage::from_fn(w, h, |x, _| Luma([if x < w / 2 { 255 } else { 0 }])))
    }

    #[test]
    fn segmentation_result_is_applied_once() {
        let mut doc = Document::from_rgba(&gradient(4, 2));
        let job = doc.begin_segmentation().unwrap();
        let result = run_segmentation(&job, &half, &SegmentSettings::default());
        assert!(doc.apply_segmentation(result).unwrap().committed());
        assert!(!doc.is_busy());
        assert_eq!(alpha_at(&doc, 0, 0), 255);
        assert_eq!(alpha_at(&doc, 3, 1), 0);
        assert_eq!(doc.history().current().description, "AI Background Removal");

        let replay = run_segmentation(&job, &half, &SegmentSettings::default());
        assert_eq!(doc.apply_segmentation(replay).unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn stale_and_foreign_results_are_discarded() {
        let mut doc = Document::from_rgba(&gradient(4, 2));
        let stale = doc.begin_segmentation().unwrap();
        doc.cancel_segmentation();
        assert!(stale.is_cancelled());
        let fresh = doc.begin_segmentation().unwrap();

        let mut other = Document::from_rgba(&gradient(4, 2));
        let foreign = other.begin_segmentation().unwrap();

        let settings = SegmentSettings::default();
        let stale_result = SegmentationResult {
            document_id: stale.document_id,
            generation: stale.generation,
            mask: half(&stale.image, &settings, &stale.cancel),
        };
        assert_eq!(doc.apply_segmentation(stale_result).unwrap(), EditOutcome::Unchanged);
        let foreign_result = run_segmentation(&foreign, &half, &settings);
        assert_eq!(doc.apply_segmentation(foreign_result).unwrap(), EditOutcome::Unchanged);
        assert!(doc.is_busy());
        assert!(doc.apply_segmentation(run_segmentation(&fresh, &half, &settings)).unwrap().committed());
    }

    #[test]
    fn failed_segmentation_surfaces_error_and_frees_document() {
        let mut doc = Document::from_rgba(&gradient(4, 2));
        let job = doc.begin_segmentation().unwrap();
        let result = SegmentationResult {
            document_id: job.document_id,
            generation: job.generation,
            mask: Ok(GrayImage::new(2, 2)),
        };
        assert!(matches!(
            doc.apply_segmentation(result),
            Err(EditError::Segmentation(SegmentError::SizeMismatch { .. }))
        ));
        assert!(!doc.is_busy());
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn export_never_contains_overlays() {
        let mut doc = Document::from_rgba(&RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 255])));
        doc.begin_stroke(BrushMode::Remove, 1.0, 1.0, 2.0).unwrap();
        doc.end_stroke().unwrap();
        doc.select_at(5, 5, 0.0).unwrap();
        let out = export_buffer(&doc);
        for p in out.pixels() {
            assert_eq!(&p.0[..3], &[10, 20, 30]);
        }
        assert_eq!(out.get_pixel(1, 1).0[3], 0);
        assert_eq!(out.get_pixel(5, 5).0[3], 255);

        doc.set_fill(Rgb([255, 255, 255])).unwrap();
        let filled = export_buffer(&doc);
        assert_eq!(filled.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(filled.get_pixel(5, 5).0, [10, 20, 30, 255]);
    }

    #[test]
    fn view_space_tools_follow_zoom() {
        let mut doc = Document::from_rgba(&gradient(10, 10));
        doc.view = ViewTransform::new(2.0, 0.0, 0.0);
        // 4 view px at zoom 2 -> radius 1 image px
        doc.begin_stroke_view(BrushMode::Remove, 8.0, 8.0, 4.0).unwrap();
        doc.extend_stroke_view(8.0, 8.0, 4.0).unwrap();
        doc.end_stroke().unwrap();
        assert_eq!(alpha_at(&doc, 4, 4), 0);
        assert_eq!(alpha_at(&doc, 5, 4), 0);
        assert_eq!(alpha_at(&doc, 5, 5), 255);

        doc.begin_crop().unwrap();
        doc.set_crop_rect_view((2.0, 2.0), (10.0, 14.0)).unwrap();
        assert_eq!(
            doc.crop_tool().rect(),
            Some(crate::canvas::PixelRect { x: 1, y: 1, width: 4, height: 6 })
        );
    }

    #[test]
    fn switching_tools_drops_transient_state() {
        let mut doc = Document::from_rgba(&gradient(6, 6));
        doc.select_at(1, 1, 5.0).unwrap();
        assert_eq!(doc.active_tool(), Tool::MagicWand);
        doc.set_tool(Tool::Crop);
        assert!(doc.selection_mask().is_none());

        doc.begin_crop().unwrap();
        doc.set_crop_rect((0, 0), (2, 2)).unwrap();
        doc.set_tool(Tool::BrushKeep);
        assert!(!doc.crop_tool().is_armed());
    }

    #[test]
    fn dirty_flag_and_title() {
        let mut doc = Document::from_rgba(&gradient(4, 4)).with_path(PathBuf::from("shots/cat.png"));
        assert_eq!(doc.display_title(), "cat.png");
        doc.set_fill(Rgb([0, 0, 0])).unwrap();
        assert_eq!(doc.display_title(), "cat.png*");
        doc.mark_clean();
        assert_eq!(doc.display_title(), "cat.png");
    }
}
