//! Multi-resolution, 8-transform duplicate comparator, grounded in
//! `original_source/images/dup-cmp.c` (`err`/`err_sum`/`aspect_ratio_test`/
//! `average_compare`/`blocks_compare`/`same_size_compare`/
//! `image_dup_compare`) and `duplicates.h`'s transform table.
//!
//! Thumbnails are resampled to a fixed square grid at each pyramid level,
//! which lets every one of the eight dihedral-group transforms act as a
//! plain coordinate permutation of that grid instead of needing per-case
//! `col_step`/`row_step` pointer arithmetic the way the original does over
//! raw, non-square scanlines.

use bitflags::bitflags;

use crate::signature::Image;

bitflags! {
    /// Candidate/result transform set. Matches the original's `WANT_ALL`
    /// bitmask convention: a set bit means "this transform is still a
    /// candidate" (input) or "this transform matched" (output).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Transforms: u16 {
        const IDENTITY       = 1 << 0;
        const FLIP_X         = 1 << 1;
        const FLIP_Y         = 1 << 2;
        const ROT_180        = 1 << 3;
        const TRANSPOSE      = 1 << 4;
        const ROT_CCW        = 1 << 5;
        const ROT_CW         = 1 << 6;
        const ANTI_TRANSPOSE = 1 << 7;
    }
}

impl Transforms {
    pub const NON_ROTATING: Transforms =
        Transforms::IDENTITY.union(Transforms::FLIP_X).union(Transforms::FLIP_Y).union(Transforms::ROT_180);
    pub const ROTATING: Transforms = Transforms::TRANSPOSE
        .union(Transforms::ROT_CCW)
        .union(Transforms::ROT_CW)
        .union(Transforms::ANTI_TRANSPOSE);

    /// Each of the eight symmetries of a square is its own inverse except
    /// the two quarter turns, which invert into each other.
    pub fn inverse(self) -> Transforms {
        match self {
            Transforms::ROT_CW => Transforms::ROT_CCW,
            Transforms::ROT_CCW => Transforms::ROT_CW,
            other => other,
        }
    }

    fn single_bits(self) -> impl Iterator<Item = Transforms> {
        self.iter()
    }
}

const THUMB_SIZE: usize = 16;
const MIN_LEVEL: usize = 2;
/// Fixed-point scale for `aspect_ratio_test`'s `>> 7` gate: 128 means "equal
/// ratios required"; 127 would reject exact matches outright under floor
/// division, so the default sits one above that, per `127 + ε`.
const RATIO_THRESHOLD: u32 = 128;
const AVERAGE_THRESHOLD: f64 = 400.0;
const REFINE_THRESHOLD: f64 = 900.0;
const SAME_SIZE_THRESHOLD: f64 = 1600.0;

struct GraySquare {
    n: usize,
    data: Vec<u8>,
}

impl GraySquare {
    fn get(&self, r: usize, c: usize) -> u8 {
        self.data[r * self.n + c]
    }
}

fn grayscale_pixel(img: &Image, x: u32, y: u32) -> u8 {
    let idx = (y * img.cols + x) as usize * 3;
    let sum = img.pixels[idx] as u32 + img.pixels[idx + 1] as u32 + img.pixels[idx + 2] as u32;
    (sum / 3) as u8
}

/// Box-resamples an image down to an `n x n` grayscale grid, grounded in
/// the original's successive halving of the thumbnail (here done directly
/// by area averaging instead of a chain of 2x downsamples, since only the
/// final grid sizes are ever consulted).
fn resample(img: &Image, n: usize) -> GraySquare {
    let mut data = vec![0u8; n * n];
    for r in 0..n {
        let y0 = (r * img.rows as usize) / n;
        let y1 = (((r + 1) * img.rows as usize) / n).max(y0 + 1).min(img.rows as usize);
        for c in 0..n {
            let x0 = (c * img.cols as usize) / n;
            let x1 = (((c + 1) * img.cols as usize) / n).max(x0 + 1).min(img.cols as usize);
            let mut sum = 0u64;
            let mut count = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += grayscale_pixel(img, x as u32, y as u32) as u64;
                    count += 1;
                }
            }
            data[r * n + c] = (sum / count.max(1)) as u8;
        }
    }
    GraySquare { n, data }
}

fn build_pyramid(img: &Image) -> Vec<GraySquare> {
    let mut levels = Vec::new();
    let mut n = MIN_LEVEL;
    while n <= THUMB_SIZE {
        levels.push(resample(img, n));
        n *= 2;
    }
    levels
}

/// Maps a coordinate in the *comparison* frame back to the sample location
/// in the frame the transform is applied to.
fn transform_sample(t: Transforms, n: usize, r: usize, c: usize) -> (usize, usize) {
    let last = n - 1;
    match t {
        Transforms::IDENTITY => (r, c),
        Transforms::FLIP_X => (r, last - c),
        Transforms::FLIP_Y => (last - r, c),
        Transforms::ROT_180 => (last - r, last - c),
        Transforms::TRANSPOSE => (c, r),
        Transforms::ROT_CW => (c, last - r),
        Transforms::ROT_CCW => (last - c, r),
        Transforms::ANTI_TRANSPOSE => (last - c, last - r),
        _ => unreachable!("not a single transform bit"),
    }
}

/// Squared error between `a` and `b` transformed by `t`, grounded in
/// `err_sum_transformed`.
fn mse(a: &GraySquare, b: &GraySquare, t: Transforms) -> f64 {
    debug_assert_eq!(a.n, b.n);
    let n = a.n;
    let mut acc = 0i64;
    for r in 0..n {
        for c in 0..n {
            let (r2, c2) = transform_sample(t, n, r, c);
            let d = a.get(r, c) as i64 - b.get(r2, c2) as i64;
            acc += d * d;
        }
    }
    acc as f64 / (n * n) as f64
}

/// Gate on aspect ratio before spending cycles on pixel comparison,
/// grounded in `aspect_ratio_test`: cross-multiplies instead of dividing so
/// the comparison stays exact integer arithmetic, checked symmetrically in
/// both directions. `rotating` transforms compare against the second
/// image's dimensions swapped.
fn aspect_ratio_test(w1: u32, h1: u32, w2: u32, h2: u32, rotating: bool) -> bool {
    let (c2, r2) = if rotating { (h2, w2) } else { (w2, h2) };
    let (c1, r1) = (w1, h1);
    let lhs = c1 as u64 * r2 as u64;
    let rhs = r1 as u64 * c2 as u64;
    lhs <= (rhs * RATIO_THRESHOLD as u64) >> 7 && rhs <= (lhs * RATIO_THRESHOLD as u64) >> 7
}

/// Coarsest-level screen, grounded in `average_compare`.
fn average_compare(a: &GraySquare, b: &GraySquare, candidates: Transforms) -> Transforms {
    let mut survivors = Transforms::empty();
    for t in candidates.single_bits() {
        if mse(a, b, t) <= AVERAGE_THRESHOLD {
            survivors |= t;
        }
    }
    survivors
}

/// Per-level refinement, grounded in `blocks_compare`.
fn blocks_compare(a: &GraySquare, b: &GraySquare, candidates: Transforms) -> Transforms {
    let mut survivors = Transforms::empty();
    for t in candidates.single_bits() {
        if mse(a, b, t) <= REFINE_THRESHOLD {
            survivors |= t;
        }
    }
    survivors
}

/// Full-resolution final check, grounded in `same_size_compare`.
fn same_size_compare(img1: &Image, img2: &Image, candidates: Transforms) -> Transforms {
    let full1 = resample(img1, THUMB_SIZE);
    let full2 = resample(img2, THUMB_SIZE);
    let mut survivors = Transforms::empty();
    for t in candidates.single_bits() {
        if mse(&full1, &full2, t) <= SAME_SIZE_THRESHOLD {
            survivors |= t;
        }
    }
    survivors
}

/// Compares two images under the requested set of transforms, grounded in
/// `image_dup_compare`: aspect-ratio gate, coarsest-level average test,
/// per-level pyramid refinement, full-resolution final check.
pub fn compare(img1: &Image, img2: &Image, want: Transforms) -> Transforms {
    let mut candidates = Transforms::empty();
    if want.intersects(Transforms::NON_ROTATING)
        && aspect_ratio_test(img1.cols, img1.rows, img2.cols, img2.rows, false)
    {
        candidates |= want & Transforms::NON_ROTATING;
    }
    if want.intersects(Transforms::ROTATING)
        && aspect_ratio_test(img1.cols, img1.rows, img2.cols, img2.rows, true)
    {
        candidates |= want & Transforms::ROTATING;
    }
    if candidates.is_empty() {
        return Transforms::empty();
    }

    let pyr1 = build_pyramid(img1);
    let pyr2 = build_pyramid(img2);

    candidates = average_compare(&pyr1[0], &pyr2[0], candidates);
    if candidates.is_empty() {
        return candidates;
    }

    for level in 1..pyr1.len() {
        candidates = blocks_compare(&pyr1[level], &pyr2[level], candidates);
        if candidates.is_empty() {
            return candidates;
        }
    }

    same_size_compare(img1, img2, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_image(cols: u32, rows: u32) -> Vec<u8> {
        let mut data = vec![0u8; (cols * rows * 3) as usize];
        for y in 0..rows {
            for x in 0..cols {
                let v = if (x / 4 + y / 4) % 2 == 0 { 20u8 } else { 230u8 };
                let idx = (y * cols + x) as usize * 3;
                data[idx] = v;
                data[idx + 1] = v.wrapping_add(x as u8);
                data[idx + 2] = v.wrapping_sub(y as u8);
            }
        }
        data
    }

    fn rotate_ccw(data: &[u8], cols: u32, rows: u32) -> (Vec<u8>, u32, u32) {
        let mut out = vec![0u8; data.len()];
        for y in 0..rows {
            for x in 0..cols {
                // New image has dims rows x cols; (x,y) in src maps to
                // (y, cols-1-x) in the rotated image, the inverse of the
                // ROT_CCW sampling used by transform_sample.
                let nx = y;
                let ny = cols - 1 - x;
                let src = (y * cols + x) as usize * 3;
                let dst = (ny * rows + nx) as usize * 3;
                out[dst..dst + 3].copy_from_slice(&data[src..src + 3]);
            }
        }
        (out, rows, cols)
    }

    #[test]
    fn invariant_reflexivity_includes_identity() {
        let data = checker_image(64, 48);
        let img = Image { cols: 64, rows: 48, pixels: &data };
        let result = compare(&img, &img, Transforms::all());
        assert!(result.contains(Transforms::IDENTITY));
    }

    #[test]
    fn s5_rotated_image_detected() {
        let data = checker_image(64, 48);
        let img1 = Image { cols: 64, rows: 48, pixels: &data };
        let (rotated, rcols, rrows) = rotate_ccw(&data, 64, 48);
        let img2 = Image { cols: rcols, rows: rrows, pixels: &rotated };
        let result = compare(&img1, &img2, Transforms::ROT_CCW | Transforms::ROT_CW);
        assert!(result.contains(Transforms::ROT_CCW), "expected ROT_CCW in {:?}", result);
    }

    #[test]
    fn invariant_transform_symmetry_is_inverse_under_swap() {
        let data1 = checker_image(32, 32);
        let data2 = checker_image(32, 32);
        let img1 = Image { cols: 32, rows: 32, pixels: &data1 };
        let img2 = Image { cols: 32, rows: 32, pixels: &data2 };
        let forward = compare(&img1, &img2, Transforms::all());
        let backward = compare(&img2, &img1, Transforms::all());
        for t in forward.single_bits() {
            assert!(backward.contains(t.inverse()), "missing inverse of {:?} in {:?}", t, backward);
        }
    }

    #[test]
    fn aspect_ratio_test_accepts_exact_match_and_rejects_one_percent_skew() {
        assert!(aspect_ratio_test(640, 480, 640, 480, false));
        assert!(aspect_ratio_test(640, 480, 320, 240, false));
        // ~1.6% narrower than 640x480 falls outside the ~0.8% gate.
        assert!(!aspect_ratio_test(640, 480, 630, 480, false));
    }

    #[test]
    fn aspect_ratio_gate_rejects_mismatched_non_rotating_shapes() {
        let data1 = checker_image(64, 16);
        let data2 = checker_image(16, 64);
        let img1 = Image { cols: 64, rows: 16, pixels: &data1 };
        let img2 = Image { cols: 16, rows: 64, pixels: &data2 };
        let result = compare(&img1, &img2, Transforms::IDENTITY);
        assert!(result.is_empty());
    }
}
