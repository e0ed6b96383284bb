//! Triangular index spaces.
//!
//! Pair-indexed operator families are labelled by `(cnt2, cnt3)` with
//! `cnt2 + cnt3 < n`, a triangle of `n (n + 1) / 2` points. Parallel loops over
//! such families run over a flat index `0 .. len` and recover the pair with
//! [`Triangle::get`], so that work can be split evenly without materializing
//! the pairs.

use rayon::prelude::*;

/// The index space `{ (cnt2, cnt3) : cnt2 + cnt3 < n }`.
///
/// Points are numbered row by row in `d = cnt2 + cnt3`, and by increasing
/// `cnt3` within a row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Triangle {
    n: usize,
}

impl Triangle {
    pub fn new(n: usize) -> Self { Self { n } }

    /// Side length.
    pub fn side(&self) -> usize { self.n }

    /// Number of points.
    pub fn len(&self) -> usize { self.n * (self.n + 1) / 2 }

    /// Return `true` if the triangle has no points.
    pub fn is_empty(&self) -> bool { self.n == 0 }

    /// Flat index of `(cnt2, cnt3)`, if it lies in the triangle.
    pub fn index(&self, cnt2: usize, cnt3: usize) -> Option<usize> {
        let d = cnt2 + cnt3;
        (d < self.n).then_some(d * (d + 1) / 2 + cnt3)
    }

    /// The point with flat index `k`, if `k < len`.
    pub fn get(&self, k: usize) -> Option<(usize, usize)> {
        if k >= self.len() { return None; }
        // largest d with d (d + 1) / 2 <= k
        let mut d = (((8 * k + 1) as f64).sqrt() as usize).saturating_sub(1) / 2;
        while (d + 1) * (d + 2) / 2 <= k { d += 1; }
        while d * (d + 1) / 2 > k { d -= 1; }
        let cnt3 = k - d * (d + 1) / 2;
        Some((d - cnt3, cnt3))
    }

    /// Iterate over all points in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n).flat_map(|d| (0..=d).map(move |cnt3| (d - cnt3, cnt3)))
    }

    /// Parallel iterator over all points.
    pub fn par_iter(&self) -> impl ParallelIterator<Item = (usize, usize)> + '_ {
        (0..self.len()).into_par_iter().filter_map(move |k| self.get(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_matches_enumeration() {
        for n in 0..12 {
            let tri = Triangle::new(n);
            let pts: Vec<(usize, usize)> = tri.iter().collect();
            assert_eq!(pts.len(), tri.len());
            for (k, &(c2, c3)) in pts.iter().enumerate() {
                assert!(c2 + c3 < n);
                assert_eq!(tri.get(k), Some((c2, c3)));
                assert_eq!(tri.index(c2, c3), Some(k));
            }
            assert_eq!(tri.get(tri.len()), None);
            assert_eq!(tri.index(n, 0), None);
        }
    }

    #[test]
    fn parallel_covers_every_point_once() {
        let tri = Triangle::new(9);
        let mut pts: Vec<(usize, usize)> = tri.par_iter().collect();
        pts.sort();
        let mut expected: Vec<(usize, usize)> = tri.iter().collect();
        expected.sort();
        assert_eq!(pts, expected);
    }
}
