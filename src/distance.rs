//! Distance metrics for dense vectors.
//!
//! The index ranks by **squared** Euclidean distance: distances reported
//! by search are `||q - x||²`, not `||q - x||`.
//!
//! Helpers return `f32::INFINITY` on a dimension mismatch so a malformed
//! candidate can never be selected as a nearest neighbor. Callers that need
//! a hard error check dimensions first.

use crate::simd;

/// Squared L2 distance.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    simd::l2_distance_squared(a, b)
}

/// Index of the nearest row in `centroids` to `v` and its squared distance.
///
/// Ties go to the lowest index. Returns `None` for an empty slice.
#[inline]
pub fn nearest(v: &[f32], centroids: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, c) in centroids.iter().enumerate() {
        let d = l2_distance_squared(v, c);
        match best {
            Some((_, bd)) if bd <= d => {}
            _ => best = Some((idx, d)),
        }
    }
    best
}
