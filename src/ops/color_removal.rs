use image::RgbaImage;

use crate::canvas::{AlphaMask, Mask};
use crate::ops::canvas_ops::{count_alpha_changes, MaskTarget};
use crate::ops::magic_wand::select_global;

/// Color-key removal: every pixel of `source` whose RGB distance to `color`
/// is within the tolerance threshold (0–100, same scale as the magic wand),
/// regardless of connectivity.
///
/// Returns the mask of matched pixels together with the number of alpha
/// samples that would actually change, so the caller can skip a no-op commit.
pub fn compute_color_removal(
    source: &RgbaImage,
    alpha: &AlphaMask,
    color: [u8; 3],
    tolerance: f32,
) -> (Mask, usize) {
    let mask = select_global(color, tolerance, source);
    let changes = count_alpha_changes(alpha, &mask, MaskTarget::Inside, 0);
    (mask, changes)
}

/// Eyedropper: RGB of the pixel at `(x, y)`, if inside the image.
pub fn pick_color(source: &RgbaImage, x: u32, y: u32) -> Option<[u8; 3]> {
    if x >= source.width() || y >= source.height() {
        return None;
    }
    let p = source.get_pixel(x, y).0;
    Some([p[0], p[1], p[2]])
}
