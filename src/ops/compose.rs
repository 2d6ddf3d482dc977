// ============================================================================
// COMPOSITION: display render and export buffer
// ============================================================================
//
// Back to front:
//   1. fill color, or a checkerboard when no fill is set (display only)
//   2. original RGB, alpha-blended by the working alpha
//   3. magic wand selection tint (display only)
//   4. pending brush stroke tint (display only)
//
// Export emits only layer 2: true alpha without a fill, or an opaque image
// with the fill baked into RGB.

use image::{Rgb, RgbImage, RgbaImage};
use rayon::prelude::*;

use crate::canvas::Mask;
use crate::components::tools::BrushMode;
use crate::document::Document;

pub const CHECKER_LIGHT: [u8; 3] = [230, 230, 230];
pub const CHECKER_DARK: [u8; 3] = [200, 200, 200];
pub const SELECTION_TINT: ([u8; 3], u8) = ([0, 150, 255], 100);
pub const KEEP_TINT: ([u8; 3], u8) = ([0, 255, 0], 180);
pub const REMOVE_TINT: ([u8; 3], u8) = ([255, 0, 0], 180);

/// Display-only knobs for [`render`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    /// Checkerboard cell edge in image pixels.
    pub checker_size: u32,
    /// Checkerboard brightness multiplier (1.0 = default).
    pub checker_brightness: f32,
    /// Show the untouched original instead of the cutout.
    pub show_original: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            checker_size: 40,
            checker_brightness: 1.0,
            show_original: false,
        }
    }
}

/// `src` over `dst` with 8-bit coverage, rounded.
#[inline]
pub fn blend_over(dst: [u8; 3], src: [u8; 3], alpha: u8) -> [u8; 3] {
    let a = alpha as u32;
    let inv = 255 - a;
    [
        ((dst[0] as u32 * inv + src[0] as u32 * a + 127) / 255) as u8,
        ((dst[1] as u32 * inv + src[1] as u32 * a + 127) / 255) as u8,
        ((dst[2] as u32 * inv + src[2] as u32 * a + 127) / 255) as u8,
    ]
}

fn scaled(c: [u8; 3], brightness: f32) -> [u8; 3] {
    let s = |v: u8| (v as f32 * brightness).round().clamp(0.0, 255.0) as u8;
    [s(c[0]), s(c[1]), s(c[2])]
}

/// Checkerboard color at pixel `(x, y)`.
pub fn checker_color(x: u32, y: u32, opts: &RenderOptions) -> [u8; 3] {
    let cell = opts.checker_size.max(1);
    let base = if (x / cell + y / cell) % 2 == 0 {
        CHECKER_DARK
    } else {
        CHECKER_LIGHT
    };
    scaled(base, opts.checker_brightness)
}

/// Render the document for display. The result is opaque.
pub fn render(doc: &Document, opts: &RenderOptions) -> RgbaImage {
    if opts.show_original {
        return render_original(doc);
    }
    let original = doc.original();
    let alpha = doc.working_alpha();
    let (w, h) = original.dimensions();
    let fill = doc.fill_color().map(|c| c.0);
    let selection = doc.selection_mask();
    let stroke: Option<(&Mask, ([u8; 3], u8))> = doc.pending_stroke().map(|s| {
        let tint = match s.mode {
            BrushMode::Keep => KEEP_TINT,
            BrushMode::Remove => REMOVE_TINT,
        };
        (s.mask(), tint)
    });

    let src = original.as_raw();
    let a_raw = alpha.as_raw();
    let mut out = RgbaImage::new(w, h);
    let row_len = w as usize * 4;
    if row_len == 0 {
        return out;
    }
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let y = y as u32;
        for x in 0..w {
            let i = (y * w + x) as usize;
            let o = x as usize * 4;
            let bg = fill.unwrap_or_else(|| checker_color(x, y, opts));
            let fg = [src[i * 4], src[i * 4 + 1], src[i * 4 + 2]];
            let mut c = blend_over(bg, fg, a_raw[i]);
            if let Some(sel) = selection
                && sel.contains(x, y)
            {
                c = blend_over(c, SELECTION_TINT.0, SELECTION_TINT.1);
            }
            if let Some((mask, (tint, tint_a))) = stroke
                && mask.contains(x, y)
            {
                c = blend_over(c, tint, tint_a);
            }
            row[o..o + 3].copy_from_slice(&c);
            row[o + 3] = 255;
        }
    });
    out
}

/// The original capture, unmasked ("show original" toggle).
pub fn render_original(doc: &Document) -> RgbaImage {
    doc.original().clone()
}

/// Buffer to save: never contains checkerboard or tint pixels.
pub fn export_buffer(doc: &Document) -> RgbaImage {
    let original = doc.original();
    let alpha = doc.working_alpha();
    let (w, h) = original.dimensions();
    let fill = doc.fill_color().map(|c| c.0);
    let mut out = RgbaImage::new(w, h);
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(4)
        .zip(original.as_raw().par_chunks(4))
        .zip(alpha.as_raw().par_iter())
        .for_each(|((dst, src), &a)| {
            let fg = [src[0], src[1], src[2]];
            match fill {
                Some(bg) => {
                    dst[..3].copy_from_slice(&blend_over(bg, fg, a));
                    dst[3] = 255;
                }
                None => {
                    dst[..3].copy_from_slice(&fg);
                    dst[3] = a;
                }
            }
        });
    out
}

/// Flatten an RGBA buffer onto a solid background for formats without an
/// alpha channel (JPEG, BMP).
pub fn flatten(image: &RgbaImage, background: Rgb<u8>) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut out = RgbImage::new(w, h);
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(3)
        .zip(image.as_raw().par_chunks(4))
        .for_each(|(dst, src)| {
            dst.copy_from_slice(&blend_over(background.0, [src[0], src[1], src[2]], src[3]));
        });
    out
}
