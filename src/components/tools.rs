use crate::canvas::{Mask, PixelRect};

// ============================================================================
// TOOL ENUM
// ============================================================================

/// Interactive tool modes. Switching away from a tool discards its transient
/// state (wand selection, crop rectangle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    None,
    BrushKeep,
    BrushRemove,
    Crop,
    MagicWand,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::None => "None",
            Tool::BrushKeep => "Keep Brush",
            Tool::BrushRemove => "Remove Brush",
            Tool::Crop => "Crop",
            Tool::MagicWand => "Magic Wand",
        }
    }
}

// ============================================================================
// BRUSH: keep/remove stroke rasterization
// ============================================================================

/// Smallest and largest brush slider values, in view pixels (diameter).
pub const MIN_BRUSH_SIZE: f32 = 1.0;
pub const MAX_BRUSH_SIZE: f32 = 500.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrushMode {
    /// Restore pixels to full opacity.
    Keep,
    /// Make pixels fully transparent.
    Remove,
}

impl BrushMode {
    /// Alpha value written into the working mask on merge.
    pub fn target_alpha(self) -> u8 {
        match self {
            BrushMode::Keep => 255,
            BrushMode::Remove => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BrushMode::Keep => "Keep Brush",
            BrushMode::Remove => "Remove Brush",
        }
    }
}

/// Convert a brush slider diameter (view pixels) to an image-space radius at
/// the given zoom, so the on-screen brush matches the slider at any zoom.
pub fn brush_radius_for_zoom(size: f32, zoom: f32) -> f32 {
    (size / zoom / 2.0).max(0.5)
}

/// In-progress brush gesture. Accumulates the union of stamped disks until
/// the pointer is released; the working alpha is not touched until then.
#[derive(Clone, Debug)]
pub struct BrushStroke {
    pub mode: BrushMode,
    mask: Mask,
    last_point: Option<(f32, f32)>,
    stamps: usize,
}

impl BrushStroke {
    pub fn begin(mode: BrushMode, width: u32, height: u32) -> Self {
        Self {
            mode,
            mask: Mask::new(width, height),
            last_point: None,
            stamps: 0,
        }
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn into_mask(self) -> Mask {
        self.mask
    }

    /// Number of disks stamped so far (including interpolated ones).
    pub fn stamp_count(&self) -> usize {
        self.stamps
    }

    /// Add a point in image space. When the pointer jumped more than one
    /// pixel since the previous point, intermediate disks are stamped along
    /// the segment at half-radius spacing so fast strokes stay gap-free.
    ///
    /// Points are clamped to the image grown by the radius; beyond that a
    /// disk can no longer reach any pixel. Non-finite points are ignored and
    /// `false` is returned.
    pub fn extend(&mut self, x: f32, y: f32, radius: f32) -> bool {
        if !(x.is_finite() && y.is_finite() && radius.is_finite()) {
            return false;
        }
        let radius = radius.max(0.5);
        let (x, y) = self.clamp_point(x, y, radius);
        if let Some((lx, ly)) = self.last_point {
            let dx = x - lx;
            let dy = y - ly;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist > 1.0 {
                let spacing = (radius * 0.5).max(1.0);
                let steps = (dist / spacing).ceil() as usize;
                // t = 0 was stamped by the previous call
                for i in 1..steps {
                    let t = i as f32 / steps as f32;
                    self.stamp_disk(lx + dx * t, ly + dy * t, radius);
                }
            }
        }
        self.stamp_disk(x, y, radius);
        self.last_point = Some((x, y));
        true
    }

    fn clamp_point(&self, x: f32, y: f32, radius: f32) -> (f32, f32) {
        let (w, h) = self.mask.dimensions();
        (
            x.clamp(-radius, w as f32 + radius),
            y.clamp(-radius, h as f32 + radius),
        )
    }

    /// Union a filled disk `(dx² + dy²) ≤ r²` centred on the pixel under
    /// `(x, y)` into the stroke mask. Pixels outside the image are skipped.
    fn stamp_disk(&mut self, x: f32, y: f32, radius: f32) {
        self.stamps += 1;
        let cx = x.floor() as i64;
        let cy = y.floor() as i64;
        let r = radius.floor() as i64;
        let r_sq = radius * radius;
        let (w, h) = self.mask.dimensions();
        let x0 = cx.saturating_sub(r).max(0);
        let x1 = cx.saturating_add(r).min(w as i64 - 1);
        let y0 = cy.saturating_sub(r).max(0);
        let y1 = cy.saturating_add(r).min(h as i64 - 1);
        for py in y0..=y1 {
            for px in x0..=x1 {
                let ddx = (px - cx) as f32;
                let ddy = (py - cy) as f32;
                if ddx * ddx + ddy * ddy <= r_sq {
                    self.mask.set(px as u32, py as u32, true);
                }
            }
        }
    }
}

// ============================================================================
// CROP: armed state and pending rectangle
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct CropTool {
    armed: bool,
    rect: Option<PixelRect>,
}

impl CropTool {
    pub fn begin(&mut self) {
        self.armed = true;
        self.rect = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn rect(&self) -> Option<PixelRect> {
        self.rect
    }

    /// Record the rectangle spanned by two image-space corners, normalized
    /// and clamped to the image. Ignored while not armed.
    pub fn set_rect(&mut self, p1: (i64, i64), p2: (i64, i64), width: u32, height: u32) {
        if !self.armed {
            return;
        }
        self.rect = Some(PixelRect::from_corners(p1, p2, width, height));
    }

    pub fn cancel(&mut self) {
        self.armed = false;
        self.rect = None;
    }
}
