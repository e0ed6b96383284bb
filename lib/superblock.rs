//! Two-site wavefunctions around the active boundary.
//!
//! A superblock tensor spans sites `s` and `s + 1`. Its blocks are labelled by
//! a 9-tuple: the left bond sector at boundary `s`, the coupled local sector of
//! the two orbitals `(n1, n2, J)`, and the right bond sector at boundary
//! `s + 2`. The spins are coupled as `(SL ⊗ J) → SR`; each block is a dense
//! `dim(s, left) × dim(s + 2, right)` matrix.
//! ```text
//!   (NL, 2SL, IL)                       (NR, 2SR, IR)
//!  ─────────────────────── Ψ ───────────────────────
//!                        ┌─┴─┐
//!                        n1 n2
//!                         └J┘
//! ```

use num_traits::{ One, Zero };
use rand::Rng;
use crate::{
    ComplexScalar,
    layout::{ Entry, Layout },
    linalg::{ self, Op, View, ViewMut },
    local::{ LocalSector, TWO_SITE },
    site::{ occupation, SiteTensor },
    symmetry::{ direct_prod, Sector, SectorIndex },
    wigner::{ phase, wigner6j },
};

/// Block key of a superblock tensor: left sector, local sector, right sector.
pub type SuperKey = (Sector, LocalSector, Sector);

/// Two-site wavefunction.
#[derive(Clone, Debug)]
pub struct SuperblockTensor<A> {
    site: usize,
    layout: Layout<SuperKey>,
    data: Vec<A>,
}

impl<A: ComplexScalar> SuperblockTensor<A> {
    /// Create a zero tensor on sites `site` and `site + 1` with every block
    /// allowed by `index`.
    pub fn new<I>(index: &I, site: usize) -> Self
    where I: SectorIndex + ?Sized
    {
        let (i1, i2) = (index.orbital_irrep(site), index.orbital_irrep(site + 1));
        let mut layout = Layout::new();
        for left in index.sectors(site) {
            let dl = index.dim(site, left);
            for &loc in TWO_SITE.sectors() {
                let irrep = direct_prod(left.irrep, loc.irrep(i1, i2));
                let lo = (left.two_s - loc.two_j).abs();
                let hi = left.two_s + loc.two_j;
                for two_s in (lo..=hi).step_by(2) {
                    let right = Sector::new(left.n + loc.n(), two_s, irrep);
                    layout.push((left, loc, right), dl, index.dim(site + 2, right));
                }
            }
        }
        let data = vec![A::zero(); layout.total()];
        Self { site, layout, data }
    }

    /// Create a tensor whose elements are computed from their block key and
    /// position within the block.
    pub fn from_fn<I, F>(index: &I, site: usize, mut f: F) -> Self
    where
        I: SectorIndex + ?Sized,
        F: FnMut(SuperKey, usize, usize) -> A,
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

    /// Contract two neighboring site tensors through their shared bond,
    /// recoupling `((SL s1) SM s2) SR` into `(SL (s1 s2) J) SR`.
    ///
    /// *Panics if the site tensors are not on neighboring sites.*
    pub fn join<I>(index: &I, left: &SiteTensor<A>, right: &SiteTensor<A>) -> Self
    where I: SectorIndex + ?Sized
    {
        let site = left.site();
        if right.site() != site + 1 { panic!("inconsistent dimensions"); }
        let mut new = Self::new(index, site);
        for (entry, block) in new.layout.split_mut(&mut new.data) {
            let (sl, loc, sr) = entry.key;
            let mut out = linalg::view_mut(block, entry.rows, entry.cols);
            let s1 = if loc.n1 == 1 { 1 } else { 0 };
            let s2 = if loc.n2 == 1 { 1 } else { 0 };
            let mid = Sector::new(
                sl.n + loc.n1,
                0,
                direct_prod(
                    sl.irrep,
                    if loc.n1 == 1 { index.orbital_irrep(site) } else { 0 },
                ),
            );
            let lo = (sl.two_s - s1).abs();
            for two_sm in (lo..=sl.two_s + s1).step_by(2) {
                let sm = mid.with_spin(two_sm);
                let (Some(a), Some(b)) = (left.block(sl, sm), right.block(sm, sr))
                else { continue; };
                let six = wigner6j(sl.two_s, s1, two_sm, s2, sr.two_s, loc.two_j);
                if six == 0.0 { continue; }
                let w =
                    phase(sl.two_s + s1 + s2 + sr.two_s)
                    * (((two_sm + 1) * (loc.two_j + 1)) as f64).sqrt()
                    * six;
                linalg::gemm(linalg::re(w), Op::N, &a, Op::N, &b, A::one(), &mut out);
            }
        }
        new
    }

    /// First of the two sites.
    pub fn site(&self) -> usize { self.site }

    /// Block layout, in buffer order.
    pub fn entries(&self) -> &[Entry<SuperKey>] { self.layout.entries() }

    /// Number of blocks.
    pub fn n_blocks(&self) -> usize { self.layout.n_blocks() }

    /// Position of a block in buffer order.
    pub fn kappa(&self, key: &SuperKey) -> Option<usize> {
        self.layout.get(key)
            .and_then(|e| self.layout.entries().iter().position(|x| x.key == e.key))
    }

    pub fn block(&self, key: &SuperKey) -> Option<View<'_, A>> {
        self.layout.get(key)
            .map(|e| linalg::view(&self.data[e.range()], e.rows, e.cols))
    }

    pub fn block_mut(&mut self, key: &SuperKey) -> Option<ViewMut<'_, A>> {
        let e = *self.layout.get(key)?;
        Some(linalg::view_mut(&mut self.data[e.range()], e.rows, e.cols))
    }

    /// One mutable slice per block, for disjoint parallel writes.
    pub fn blocks_mut(&mut self) -> Vec<(&Entry<SuperKey>, &mut [A])> {
        self.layout.split_mut(&mut self.data)
    }

    /// Return `true` if `other` has the same block layout.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.site == other.site && self.layout == other.layout
    }

    /// Zero all elements.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|x| { *x = A::zero(); });
    }

    /// `self ← self + α other`.
    ///
    /// *Panics if the layouts differ.*
    pub fn axpy(&mut self, alpha: A, other: &Self) {
        if !self.same_layout(other) { panic!("inconsistent dimensions"); }
        linalg::axpy(alpha, &other.data, &mut self.data);
    }

    /// `⟨self|other⟩`.
    ///
    /// *Panics if the layouts differ.*
    pub fn inner(&self, other: &Self) -> A {
        if !self.same_layout(other) { panic!("inconsistent dimensions"); }
        self.data.iter().zip(other.data.iter())
            .fold(A::zero(), |acc, (a, b)| acc + a.conjugate() * *b)
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|x| x.modulus_squared()).sum::<f64>().sqrt()
    }

    /// Flat element buffer.
    pub fn data(&self) -> &[A] { &self.data }
}

/// Occupations of the two orbitals of a local sector, if both are valid
/// bond transitions.
pub fn local_sector(left: Sector, mid: Sector, right: Sector) -> Option<(i32, i32)> {
    let n1 = occupation(left, mid)?.n();
    let n2 = occupation(mid, right)?.n();
    Some((n1, n2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;
    use rand::{ rngs::StdRng, SeedableRng };
    use crate::{ symmetry::SectorTable, wigner::triangle };

    fn table() -> SectorTable {
        SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 4).unwrap()
    }

    #[test]
    fn blocks_respect_coupling() {
        let t = table();
        let psi: SuperblockTensor<C64> = SuperblockTensor::new(&t, 1);
        assert!(psi.n_blocks() > 0);
        for (k, e) in psi.entries().iter().enumerate() {
            let (l, loc, r) = e.key;
            assert_eq!(r.n, l.n + loc.n());
            assert!(triangle(l.two_s, loc.two_j, r.two_s));
            assert_eq!((e.rows, e.cols), (t.dim(1, l), t.dim(3, r)));
            assert_eq!(psi.kappa(&e.key), Some(k));
        }
    }

    #[test]
    fn inner_and_norm() {
        let t = table();
        let mut rng = StdRng::seed_from_u64(10546);
        let a: SuperblockTensor<C64> = SuperblockTensor::new_rand(&t, 1, &mut rng);
        let mut b = a.clone();
        b.axpy(C64::new(1.0, 0.0), &a);
        let aa = a.inner(&a);
        assert_abs_diff_eq!(aa.re, a.norm().powi(2), epsilon = 1e-10);
        assert_abs_diff_eq!(a.inner(&b).re, 2.0 * aa.re, epsilon = 1e-10);
        b.clear();
        assert_eq!(b.norm(), 0.0);
    }

    #[test]
    fn join_of_empty_orbitals_is_plain_product() {
        // both orbitals empty: no recoupling, J = 0, SM = SL = SR
        let t = table();
        let a: SiteTensor<C64> = SiteTensor::from_fn(&t, 1, |_, _, _| C64::one());
        let b: SiteTensor<C64> = SiteTensor::from_fn(&t, 2, |_, _, _| C64::new(2.0, 0.0));
        let psi = SuperblockTensor::join(&t, &a, &b);
        for e in psi.entries() {
            let (l, loc, r) = e.key;
            if loc.n1 != 0 || loc.n2 != 0 { continue; }
            let blk = psi.block(&(l, loc, r)).unwrap();
            let expected = 2.0 * t.dim(2, l) as f64;
            assert_abs_diff_eq!(blk[(0, 0)].re, expected, epsilon = 1e-12);
        }
        assert_eq!(local_sector(Sector::vacuum(), Sector::new(1, 1, 0), Sector::new(3, 1, 0)),
            Some((1, 2)));
    }
}
