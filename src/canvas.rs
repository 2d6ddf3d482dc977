use image::{GrayImage, Luma, RgbaImage};

// ============================================================================
// PIXEL BUFFERS: full-resolution RGBA capture and per-pixel masks
// ============================================================================

/// Full-resolution RGBA raster. Row-major, 4 bytes per pixel.
pub type PixelBuffer = RgbaImage;

/// Cutout mask: one byte per pixel, 0 = removed, 255 = kept.
pub type AlphaMask = GrayImage;

/// Copy `src` with every alpha sample forced to 255.
///
/// The loaded photograph is treated as an RGB capture; transparency carried
/// by the file is ignored so that "Keep" always has an opaque source to
/// restore from.
pub fn force_opaque(src: &RgbaImage) -> PixelBuffer {
    let mut out = src.clone();
    for px in out.pixels_mut() {
        px.0[3] = 255;
    }
    out
}

/// Alpha mask with every pixel kept.
pub fn opaque_alpha(width: u32, height: u32) -> AlphaMask {
    GrayImage::from_pixel(width, height, Luma([255]))
}

/// Row-major index of `(x, y)` in a `width`-wide grid.
#[inline]
pub fn index_of(width: u32, x: u32, y: u32) -> usize {
    y as usize * width as usize + x as usize
}

// ============================================================================
// BOOLEAN MASK: selection and pending-stroke grids
// ============================================================================

/// Boolean per-pixel grid with the same geometry as the document buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub(crate) fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Self {
        debug_assert_eq!(bits.len(), width as usize * height as usize);
        Self { width, height, bits }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Out-of-bounds coordinates are never contained.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[index_of(self.width, x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let i = index_of(self.width, x, y);
            self.bits[i] = value;
        }
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

// ============================================================================
// PIXEL RECT: integer rectangle in image space
// ============================================================================

/// Half-open integer rectangle `[x, x+width) × [y, y+height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Rectangle spanned by two corners in any order, clamped to a
    /// `bound_w × bound_h` image.
    pub fn from_corners(p1: (i64, i64), p2: (i64, i64), bound_w: u32, bound_h: u32) -> Self {
        let clamp_x = |v: i64| v.clamp(0, bound_w as i64) as u32;
        let clamp_y = |v: i64| v.clamp(0, bound_h as i64) as u32;
        let (x0, x1) = (clamp_x(p1.0.min(p2.0)), clamp_x(p1.0.max(p2.0)));
        let (y0, y1) = (clamp_y(p1.1.min(p2.1)), clamp_y(p1.1.max(p2.1)));
        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}
