// ============================================================================
// CANVAS-LEVEL OPERATIONS: mask writes and crop extraction
// ============================================================================

use image::imageops;
use rayon::prelude::*;

use crate::canvas::{AlphaMask, Mask, PixelBuffer, PixelRect};

/// Which pixels of a mask an alpha write targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskTarget {
    /// Pixels inside the mask.
    Inside,
    /// Pixels outside the mask.
    Outside,
}

impl MaskTarget {
    #[inline]
    fn hits(self, in_mask: bool) -> bool {
        match self {
            MaskTarget::Inside => in_mask,
            MaskTarget::Outside => !in_mask,
        }
    }
}

/// Number of alpha samples that `write_alpha` would change. Lets callers
/// skip a history entry (and a copy-on-write clone) when nothing changes.
pub fn count_alpha_changes(alpha: &AlphaMask, mask: &Mask, target: MaskTarget, value: u8) -> usize {
    if alpha.dimensions() != mask.dimensions() {
        return 0;
    }
    alpha
        .as_raw()
        .par_iter()
        .zip(mask.bits().par_iter())
        .filter(|&(&a, &m)| target.hits(m) && a != value)
        .count()
}

/// Set every targeted alpha sample to `value`.
///
/// This function does NOT push undo history itself; the document commits a
/// snapshot after calling it.
pub fn write_alpha(alpha: &mut AlphaMask, mask: &Mask, target: MaskTarget, value: u8) {
    if alpha.dimensions() != mask.dimensions() {
        return;
    }
    let bits = mask.bits();
    let raw: &mut [u8] = alpha;
    raw.par_iter_mut().zip(bits.par_iter()).for_each(|(a, &m)| {
        if target.hits(m) {
            *a = value;
        }
    });
}

/// Extract `rect` from both document buffers. Returns `None` for an empty
/// rectangle or one that does not lie inside the image.
pub fn crop_buffers(
    original: &PixelBuffer,
    alpha: &AlphaMask,
    rect: PixelRect,
) -> Option<(PixelBuffer, AlphaMask)> {
    let (w, h) = original.dimensions();
    if rect.is_empty() || rect.right() > w || rect.bottom() > h || alpha.dimensions() != (w, h) {
        return None;
    }
    let cropped = imageops::crop_imm(original, rect.x, rect.y, rect.width, rect.height).to_image();
    let cropped_alpha = imageops::crop_imm(alpha, rect.x, rect.y, rect.width, rect.height).to_image();
    Some((cropped, cropped_alpha))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn checker_mask(w: u32, h: u32) -> Mask {
        let mut m = Mask::new(w, h);
        for y in 0..h {
            for x in 0..w {
                m.set(x, y, (x + y) % 2 == 0);
            }
        }
        m
    }

    #[test]
    fn write_inside_and_outside() {
        let mask = checker_mask(4, 4);
        let mut inside = GrayImage::from_pixel(4, 4, Luma([255]));
        assert_eq!(count_alpha_changes(&inside, &mask, MaskTarget::Inside, 0), 8);
        write_alpha(&mut inside, &mask, MaskTarget::Inside, 0);
        assert_eq!(inside.get_pixel(0, 0).0, [0]);
        assert_eq!(inside.get_pixel(1, 0).0, [255]);
        assert_eq!(count_alpha_changes(&inside, &mask, MaskTarget::Inside, 0), 0);

        let mut outside = GrayImage::from_pixel(4, 4, Luma([255]));
        write_alpha(&mut outside, &mask, MaskTarget::Outside, 0);
        assert_eq!(outside.get_pixel(0, 0).0, [255]);
        assert_eq!(outside.get_pixel(1, 0).0, [0]);
    }

    #[test]
    fn crop_extracts_sub_block() {
        let mut img = RgbaImage::new(10, 10);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgba([x as u8, y as u8, 0, 255]);
        }
        let alpha = GrayImage::from_fn(10, 10, |x, y| Luma([(x * 10 + y) as u8]));
        let rect = PixelRect::from_corners((2, 2), (6, 6), 10, 10);
        let (c, a) = crop_buffers(&img, &alpha, rect).unwrap();
        assert_eq!(c.dimensions(), (4, 4));
        assert_eq!(a.dimensions(), (4, 4));
        assert_eq!(c.get_pixel(0, 0).0, [2, 2, 0, 255]);
        assert_eq!(c.get_pixel(3, 3).0, [5, 5, 0, 255]);
        assert_eq!(a.get_pixel(1, 2).0, [34]);
    }

    #[test]
    fn crop_rejects_empty_rect() {
        let img = RgbaImage::new(4, 4);
        let alpha = GrayImage::new(4, 4);
        let rect = PixelRect { x: 1, y: 1, width: 0, height: 2 };
        assert!(crop_buffers(&img, &alpha, rect).is_none());
    }
}
