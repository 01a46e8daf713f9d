//! Significance filtering: keep only the strongest weights of a layer for drawing.
//!
//! A mask is computed once per loaded structure and then queried per edge on
//! every rendered frame, so membership is a bit test.

use std::cmp::Ordering;

use crate::structure::WeightMatrix;

/// Entries of one weight matrix retained for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceMask {
    rows: usize,
    cols: usize,
    bits: Vec<u64>,
    /// Retained flat indices, ascending.
    retained: Vec<u32>,
}

impl SignificanceMask {
    pub fn empty(rows: usize, cols: usize) -> Self {
        let n = rows * cols;
        Self {
            rows,
            cols,
            bits: vec![0; n.div_ceil(64)],
            retained: Vec::new(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of retained entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.retained.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    #[inline]
    pub fn contains_flat(&self, flat: usize) -> bool {
        self.bits
            .get(flat / 64)
            .is_some_and(|word| word & (1u64 << (flat % 64)) != 0)
    }

    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.contains_flat(row * self.cols + col)
    }

    /// Retained `(row, col)` pairs in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.cols;
        self.retained
            .iter()
            .map(move |&flat| (flat as usize / cols, flat as usize % cols))
    }

    fn insert(&mut self, flat: usize) {
        self.bits[flat / 64] |= 1u64 << (flat % 64);
    }
}

/// Number of entries a fraction retains out of `total` (round half away from zero).
pub fn retained_count(total: usize, retain_fraction: f32) -> usize {
    let f = if retain_fraction.is_nan() {
        0.0
    } else {
        retain_fraction.clamp(0.0, 1.0) as f64
    };
    ((total as f64) * f).round().min(total as f64) as usize
}

/// Magnitude order: larger `|w|` first, then lower index. Non-finite weights rank last.
fn rank(weights: &[f32], a: u32, b: u32) -> Ordering {
    let mag = |i: u32| {
        let w = weights[i as usize];
        if w.is_finite() {
            w.abs()
        } else {
            -1.0
        }
    };
    mag(b).total_cmp(&mag(a)).then(a.cmp(&b))
}

/// Retain the top `retain_fraction` of entries by absolute magnitude.
///
/// Ties are broken by ascending flat index so the result is deterministic.
pub fn compute_mask(weights: &WeightMatrix, retain_fraction: f32) -> SignificanceMask {
    let total = weights.len();
    let keep = retained_count(total, retain_fraction);
    let mut mask = SignificanceMask::empty(weights.rows(), weights.cols());
    if keep == 0 {
        return mask;
    }

    let data = weights.as_slice();
    let mut order: Vec<u32> = (0..total as u32).collect();
    if keep < total {
        // Partition so the first `keep` slots hold exactly the top-ranked entries.
        order.select_nth_unstable_by(keep - 1, |&a, &b| rank(data, a, b));
        order.truncate(keep);
    }
    order.sort_unstable();

    for &flat in &order {
        mask.insert(flat as usize);
    }
    mask.retained = order;
    mask
}

/// Masks for every layer, one fraction per layer.
pub fn compute_masks(matrices: &[&WeightMatrix], fractions: &[f32]) -> Vec<SignificanceMask> {
    debug_assert_eq!(matrices.len(), fractions.len());

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        matrices
            .par_iter()
            .zip(fractions.par_iter())
            .map(|(w, &f)| compute_mask(w, f))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        matrices
            .iter()
            .zip(fractions.iter())
            .map(|(w, &f)| compute_mask(w, f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;

    fn matrix(rows: usize, cols: usize, data: Vec<f32>) -> WeightMatrix {
        WeightMatrix::new(rows, cols, data).unwrap()
    }

    #[test]
    fn keeps_largest_magnitudes() {
        let w = matrix(2, 3, vec![0.1, -0.9, 0.3, 0.8, -0.05, 0.2]);
        let mask = compute_mask(&w, 0.5);
        assert_eq!(mask.len(), 3);
        let kept: Vec<_> = mask.iter().collect();
        assert_eq!(kept, vec![(0, 1), (0, 2), (1, 0)]);
        assert!(mask.contains(0, 1));
        assert!(!mask.contains(1, 1));
    }

    #[test]
    fn zero_and_one_fractions() {
        let w = matrix(3, 3, (0..9).map(|i| i as f32).collect());
        assert!(compute_mask(&w, 0.0).is_empty());
        let full = compute_mask(&w, 1.0);
        assert_eq!(full.len(), 9);
        assert!((0..3).all(|r| (0..3).all(|c| full.contains(r, c))));
    }

    #[test]
    fn ties_prefer_lower_index() {
        let w = matrix(1, 4, vec![0.5, -0.5, 0.5, 0.5]);
        let mask = compute_mask(&w, 0.5);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![(0, 0), (0, 1)]);
    }

    #[test]
    fn nan_weights_rank_last() {
        let w = matrix(1, 3, vec![f32::NAN, 0.1, 0.2]);
        let mask = compute_mask(&w, 0.67);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn size_and_content_match_sorted_reference() {
        let mut rng = Prng::new(99);
        for &(rows, cols) in &[(7usize, 5usize), (40, 3), (1, 1), (13, 17)] {
            let data: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range_f32(-1.0, 1.0)).collect();
            let w = matrix(rows, cols, data.clone());
            for &f in &[0.0f32, 0.02, 0.3, 0.5, 0.99, 1.0] {
                let mask = compute_mask(&w, f);
                let expected_len = ((rows * cols) as f64 * f as f64).round() as usize;
                assert_eq!(mask.len(), expected_len, "{}x{} f={}", rows, cols, f);

                let mut reference: Vec<usize> = (0..data.len()).collect();
                reference.sort_by(|&a, &b| {
                    data[b].abs().total_cmp(&data[a].abs()).then(a.cmp(&b))
                });
                reference.truncate(expected_len);
                for flat in reference {
                    assert!(mask.contains_flat(flat));
                }
            }
        }
    }

    #[test]
    fn out_of_range_fractions_clamp() {
        assert_eq!(retained_count(10, -1.0), 0);
        assert_eq!(retained_count(10, 3.0), 10);
        assert_eq!(retained_count(10, f32::NAN), 0);
        assert_eq!(retained_count(200 * 3, 0.3), 180);
    }

    #[test]
    fn compute_masks_pairs_fractions_with_layers() {
        let a = matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = matrix(1, 2, vec![1.0, -2.0]);
        let masks = compute_masks(&[&a, &b], &[0.25, 1.0]);
        assert_eq!(masks[0].iter().collect::<Vec<_>>(), vec![(1, 1)]);
        assert_eq!(masks[1].len(), 2);
    }
}
