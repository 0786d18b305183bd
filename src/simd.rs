//! Vector kernels.
//!
//! Portable implementations written so LLVM can auto-vectorize them: the hot
//! loops walk `chunks_exact(4)` with independent accumulators and finish the
//! tail separately.
//!
//! ```rust
//! use shardann::simd::{l2_distance_squared, sub_into};
//!
//! let a = [1.0_f32, 0.0, 0.0];
//! let b = [0.0_f32, 1.0, 0.0];
//!
//! assert_eq!(l2_distance_squared(&a, &b), 2.0);
//!
//! let mut residual = [0.0_f32; 3];
//! sub_into(&a, &b, &mut residual);
//! assert_eq!(residual, [1.0, -1.0, 0.0]);
//! ```

/// Squared L2 distance. Preferred for ranking since it skips the `sqrt`.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = [0.0f32; 4];
    let a_chunks = a.chunks_exact(4);
    let b_chunks = b.chunks_exact(4);
    let tail: f32 = a_chunks
        .remainder()
        .iter()
        .zip(b_chunks.remainder())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    for (ca, cb) in a_chunks.zip(b_chunks) {
        for i in 0..4 {
            let d = ca[i] - cb[i];
            acc[i] += d * d;
        }
    }
    acc[0] + acc[1] + acc[2] + acc[3] + tail
}

/// Writes `a - b` into `out`.
#[inline]
pub fn sub_into(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_squared() {
        let a = [0.0_f32, 0.0];
        let b = [3.0_f32, 4.0];
        assert!((l2_distance_squared(&a, &b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_long_vectors_match_naive() {
        let a: Vec<f32> = (0..37).map(|i| (i as f32 * 0.3).sin()).collect();
        let b: Vec<f32> = (0..37).map(|i| (i as f32 * 0.7).cos()).collect();
        let naive: f32 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
        assert!((l2_distance_squared(&a, &b) - naive).abs() < 1e-4);
    }

    #[test]
    fn test_sub_into() {
        let mut out = [0.0_f32; 3];
        sub_into(&[3.0, 2.0, 1.0], &[1.0, 1.0, 1.0], &mut out);
        assert_eq!(out, [2.0, 1.0, 0.0]);
    }
}
