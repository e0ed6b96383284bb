//! Block-sparse three-index tensors for single chain sites.
//!
//! A site tensor `T[s]` carries a left bond at boundary `s`, a right bond at
//! boundary `s + 1`, and the physical index of orbital `s`. Because the
//! physical index is fixed by the left and right sectors (the occupation is
//! the particle-number difference), each block is just a matrix
//! ```text
//!   (NL, 2SL, IL)          (NR, 2SR, IR)
//!  ─────────────── T[s] ───────────────
//!                    │
//!                 n = NR - NL
//! ```
//! of shape `dim(s, left) × dim(s + 1, right)`, coupling `SL ⊗ s_loc → SR`.

use num_traits::Zero;
use rand::Rng;
use crate::{
    ComplexScalar,
    layout::{ Entry, Layout },
    linalg::{ self, View, ViewMut },
    symmetry::{ grow, Occupation, Sector, SectorIndex },
};

/// Block key of a site tensor: left and right sectors.
pub type SiteKey = (Sector, Sector);

/// One chain site's tensor.
#[derive(Clone, Debug)]
pub struct SiteTensor<A> {
    site: usize,
    layout: Layout<SiteKey>,
    data: Vec<A>,
}

impl<A: ComplexScalar> SiteTensor<A> {
    fn layout<I>(index: &I, site: usize) -> Layout<SiteKey>
    where I: SectorIndex + ?Sized
    {
        let orb = index.orbital_irrep(site);
        let mut layout = Layout::new();
        for left in index.sectors(site) {
            let dl = index.dim(site, left);
            for (_, right) in grow(left, orb) {
                layout.push((left, right), dl, index.dim(site + 1, right));
            }
        }
        layout
    }

    /// Create a zero tensor with every block allowed by `index`.
    pub fn new<I>(index: &I, site: usize) -> Self
    where I: SectorIndex + ?Sized
    {
        let layout = Self::layout(index, site);
        let data = vec![A::zero(); layout.total()];
        Self { site, layout, data }
    }

    /// Create a tensor whose elements are computed from their block key and
    /// position within the block.
    pub fn from_fn<I, F>(index: &I, site: usize, mut f: F) -> Self
    where
        I: SectorIndex + ?Sized,
        F: FnMut(SiteKey, usize, usize) -> A,
    {
        let mut new = Self::new(index, site);
        for (entry, block) in new.layout.split_mut(&mut new.data) {
            for j in 0..entry.cols {
                for i in 0..entry.rows {
                    block[j * entry.rows + i] = f(entry.key, i, j);
                }
            }
        }
        new
    }

    /// Create a tensor with real elements drawn uniformly from `[-1, 1)`.
    pub fn new_rand<I, R>(index: &I, site: usize, rng: &mut R) -> Self
    where
        I: SectorIndex + ?Sized,
        R: Rng + ?Sized,
    {
        Self::from_fn(index, site, |_, _, _| linalg::re(rng.gen_range(-1.0..1.0)))
    }

    /// Chain position.
    pub fn site(&self) -> usize { self.site }

    /// Block layout.
    pub fn entries(&self) -> &[Entry<SiteKey>] { self.layout.entries() }

    /// Look up the block between `left` (at boundary `site`) and `right` (at
    /// boundary `site + 1`).
    pub fn block(&self, left: Sector, right: Sector) -> Option<View<'_, A>> {
        self.layout.get(&(left, right))
            .map(|e| linalg::view(&self.data[e.range()], e.rows, e.cols))
    }

    /// Mutable version of [`block`][Self::block].
    pub fn block_mut(&mut self, left: Sector, right: Sector)
        -> Option<ViewMut<'_, A>>
    {
        let e = *self.layout.get(&(left, right))?;
        Some(linalg::view_mut(&mut self.data[e.range()], e.rows, e.cols))
    }

    /// Zero all elements, keeping the layout.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|x| { *x = A::zero(); });
    }

    /// Flat element buffer.
    pub fn data(&self) -> &[A] { &self.data }

    /// Sum of squared moduli of all elements.
    pub fn norm_sqr(&self) -> f64 {
        self.data.iter().map(|x| x.modulus_squared()).sum()
    }
}

/// Occupation that links a left and a right sector across one site.
pub fn occupation(left: Sector, right: Sector) -> Option<Occupation> {
    Occupation::from_n(right.n - left.n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64 as C64;
    use rand::{ rngs::StdRng, SeedableRng };
    use crate::symmetry::SectorTable;

    fn table() -> SectorTable {
        SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 8).unwrap()
    }

    #[test]
    fn blocks_follow_index() {
        let t = table();
        let a: SiteTensor<C64> = SiteTensor::new(&t, 1);
        for e in a.entries() {
            let (l, r) = e.key;
            assert_eq!(e.rows, t.dim(1, l));
            assert_eq!(e.cols, t.dim(2, r));
            assert!(occupation(l, r).is_some());
        }
        let vac = Sector::vacuum();
        let a0: SiteTensor<C64> = SiteTensor::new(&t, 0);
        assert!(a0.block(vac, Sector::new(1, 1, 0)).is_some());
        assert!(a0.block(vac, Sector::new(3, 1, 0)).is_none());
        assert!(a0.block(vac, Sector::new(2, 2, 0)).is_none());
    }

    #[test]
    fn random_fill_is_seeded() {
        let t = table();
        let mut rng = StdRng::seed_from_u64(10546);
        let a: SiteTensor<C64> = SiteTensor::new_rand(&t, 2, &mut rng);
        let mut rng = StdRng::seed_from_u64(10546);
        let b: SiteTensor<C64> = SiteTensor::new_rand(&t, 2, &mut rng);
        assert_eq!(a.data(), b.data());
        assert!(a.norm_sqr() > 0.0);
        let mut a = a;
        a.clear();
        assert_eq!(a.norm_sqr(), 0.0);
    }
}
