// ============================================================================
// VIEW TRANSFORM: zoom/pan mapping between view space and image pixels
// ============================================================================

pub const MIN_ZOOM: f32 = 0.01;
pub const MAX_ZOOM: f32 = 32.0;

/// Affine view mapping: `view = image * zoom + pan`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl ViewTransform {
    pub fn new(zoom: f32, pan_x: f32, pan_y: f32) -> Self {
        Self {
            zoom: clamp_zoom(zoom),
            pan_x,
            pan_y,
        }
    }

    /// View (screen) coordinates to fractional image coordinates.
    pub fn to_image(&self, view_x: f32, view_y: f32) -> (f32, f32) {
        ((view_x - self.pan_x) / self.zoom, (view_y - self.pan_y) / self.zoom)
    }

    /// Fractional image coordinates to view coordinates.
    pub fn to_view(&self, image_x: f32, image_y: f32) -> (f32, f32) {
        (image_x * self.zoom + self.pan_x, image_y * self.zoom + self.pan_y)
    }

    /// Map a view point to the pixel under it, clamped into
    /// `[0, width) × [0, height)`. Returns `None` only for an empty image.
    pub fn to_pixel(&self, view_x: f32, view_y: f32, width: u32, height: u32) -> Option<(u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let (ix, iy) = self.to_image(view_x, view_y);
        Some((floor_clamped(ix, width), floor_clamped(iy, height)))
    }

    /// Map a view point to the pixel under it, or `None` when the point lies
    /// outside the image (used by click tools that must ignore misses).
    pub fn to_pixel_checked(&self, view_x: f32, view_y: f32, width: u32, height: u32) -> Option<(u32, u32)> {
        let (ix, iy) = self.to_image(view_x, view_y);
        let (px, py) = (ix.floor(), iy.floor());
        if !px.is_finite() || !py.is_finite() || px < 0.0 || py < 0.0 {
            return None;
        }
        if px >= width as f32 || py >= height as f32 {
            return None;
        }
        Some((px as u32, py as u32))
    }

    /// Set the zoom level directly (clamped).
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = clamp_zoom(zoom);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * 1.25);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom * 0.8);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    /// Zoom by `factor` while keeping the image point under the view-space
    /// `anchor` fixed (e.g. the mouse cursor).
    pub fn zoom_around(&mut self, factor: f32, anchor_x: f32, anchor_y: f32) {
        let (ix, iy) = self.to_image(anchor_x, anchor_y);
        self.set_zoom(self.zoom * factor);
        self.pan_x = anchor_x - ix * self.zoom;
        self.pan_y = anchor_y - iy * self.zoom;
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Largest zoom at which the whole image fits the view, centered.
    pub fn fit_to_view(&mut self, view_w: f32, view_h: f32, image_w: u32, image_h: u32) {
        if image_w == 0 || image_h == 0 || view_w <= 0.0 || view_h <= 0.0 {
            self.reset_zoom();
            return;
        }
        let ratio = (view_w / image_w as f32).min(view_h / image_h as f32);
        self.zoom = clamp_zoom(ratio);
        self.pan_x = (view_w - image_w as f32 * self.zoom) / 2.0;
        self.pan_y = (view_h - image_h as f32 * self.zoom) / 2.0;
    }
}

fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

fn floor_clamped(v: f32, extent: u32) -> u32 {
    if !v.is_finite() || v < 0.0 {
        return 0;
    }
    (v.floor() as u64).min(extent as u64 - 1) as u32
}
