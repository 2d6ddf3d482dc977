use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{index_of, Mask};

/// Largest possible Euclidean distance between two RGB colors (√(3·255²)).
pub const MAX_RGB_DISTANCE: f32 = 441.67;

/// Map a 0–100 tolerance to a Euclidean RGB distance threshold.
pub fn tolerance_threshold(tolerance: f32) -> f32 {
    tolerance.clamp(0.0, 100.0) / 100.0 * MAX_RGB_DISTANCE
}

/// Squared Euclidean distance over R, G, B. Alpha is ignored: the wand
/// samples the opaque original capture.
#[inline(always)]
pub fn rgb_dist_sq(a: [u8; 4], b: [u8; 4]) -> f32 {
    let r = a[0] as f32 - b[0] as f32;
    let g = a[1] as f32 - b[1] as f32;
    let bl = a[2] as f32 - b[2] as f32;
    r * r + g * g + bl * bl
}

#[inline(always)]
fn pix(flat: &[u8], idx: usize) -> [u8; 4] {
    let o = idx * 4;
    [flat[o], flat[o + 1], flat[o + 2], flat[o + 3]]
}

/// Contiguous magic wand selection.
///
/// 4-connected flood fill from `(seed_x, seed_y)`: a pixel joins the
/// selection when it touches a selected pixel and its RGB distance to the
/// *seed* color is within `tolerance_threshold(tolerance)`. Traversal uses an
/// explicit stack so large uniform regions cannot overflow the call stack.
/// A seed outside the image yields an empty mask.
pub fn select(seed_x: u32, seed_y: u32, tolerance: f32, source: &RgbaImage) -> Mask {
    let (w, h) = source.dimensions();
    let wu = w as usize;
    // visited doubles as the output
    let mut visited = vec![false; wu * h as usize];

    if seed_x >= w || seed_y >= h {
        return Mask::from_bits(w, h, visited);
    }

    let flat = source.as_raw();
    let thr = tolerance_threshold(tolerance);
    let thr_sq = thr * thr;
    let seed_idx = index_of(w, seed_x, seed_y);
    let seed = pix(flat, seed_idx);
    let matches = |idx: usize| rgb_dist_sq(pix(flat, idx), seed) <= thr_sq;

    let mut stack: Vec<usize> = Vec::with_capacity(4096);
    visited[seed_idx] = true;
    stack.push(seed_idx);

    while let Some(idx) = stack.pop() {
        let x = idx % wu;
        let y = idx / wu;

        // Left
        if x > 0 {
            let ni = idx - 1;
            if !visited[ni] && matches(ni) {
                visited[ni] = true;
                stack.push(ni);
            }
        }
        // Right
        if x + 1 < wu {
            let ni = idx + 1;
            if !visited[ni] && matches(ni) {
                visited[ni] = true;
                stack.push(ni);
            }
        }
        // Up
        if y > 0 {
            let ni = idx - wu;
            if !visited[ni] && matches(ni) {
                visited[ni] = true;
                stack.push(ni);
            }
        }
        // Down
        if y + 1 < h as usize {
            let ni = idx + wu;
            if !visited[ni] && matches(ni) {
                visited[ni] = true;
                stack.push(ni);
            }
        }
    }

    Mask::from_bits(w, h, visited)
}

/// Global color select: every pixel within tolerance of `color`, connected
/// or not.
pub fn select_global(color: [u8; 3], tolerance: f32, source: &RgbaImage) -> Mask {
    let (w, h) = source.dimensions();
    let thr = tolerance_threshold(tolerance);
    let thr_sq = thr * thr;
    let target = [color[0], color[1], color[2], 255];
    let bits: Vec<bool> = source
        .as_raw()
        .par_chunks_exact(4)
        .map(|p| rgb_dist_sq([p[0], p[1], p[2], p[3]], target) <= thr_sq)
        .collect();
    Mask::from_bits(w, h, bits)
}
