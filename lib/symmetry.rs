//! Symmetry sectors and the dimension bookkeeping queried by every other
//! module.
//!
//! A [`Sector`] is a triple of particle number, doubled total spin, and an
//! irrep label of a finite abelian point group. Irreps are labelled by integers
//! `0 .. n_irreps` with `n_irreps` a power of two, so that the direct product
//! of two irreps is just their bitwise XOR.
//!
//! Boundaries are numbered `0 ..= L` for a chain of `L` sites: boundary `b`
//! sits between sites `b - 1` and `b`. Boundary `0` carries only the vacuum
//! and boundary `L` carries only the target sector.

use std::fmt;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymmetryError {
    /// Returned when the number of irreps is not 1, 2, 4, or 8.
    #[error("error in sector table creation: unsupported group order {0}")]
    GroupOrder(usize),

    /// Returned when an orbital or target irrep is outside the group.
    #[error("error in sector table creation: irrep {0} out of range")]
    IrrepRange(usize),

    /// Returned when the target sector cannot be reached from the vacuum.
    #[error("error in sector table creation: target sector is unreachable")]
    Unreachable,
}
use SymmetryError::*;
pub type SymmetryResult<T> = Result<T, SymmetryError>;

/// Direct product of two abelian irreps.
pub fn direct_prod(a: usize, b: usize) -> usize { a ^ b }

/// A symmetry sector: particle number, doubled spin, irrep.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sector {
    pub n: i32,
    pub two_s: i32,
    pub irrep: usize,
}

impl Sector {
    pub fn new(n: i32, two_s: i32, irrep: usize) -> Self {
        Self { n, two_s, irrep }
    }

    /// The empty sector.
    pub fn vacuum() -> Self { Self { n: 0, two_s: 0, irrep: 0 } }

    /// Shift particle number and irrep, keeping the spin.
    pub fn shifted(&self, dn: i32, irrep: usize) -> Self {
        Self {
            n: self.n + dn,
            two_s: self.two_s,
            irrep: direct_prod(self.irrep, irrep),
        }
    }

    /// Replace the spin.
    pub fn with_spin(&self, two_s: i32) -> Self {
        Self { two_s, ..*self }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(N={}, 2S={}, I={})", self.n, self.two_s, self.irrep)
    }
}

/// One local state of a spatial orbital.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Occupation {
    Empty,
    Single,
    Double,
}

impl Occupation {
    /// All three occupations in order of increasing particle number.
    pub const ALL: [Occupation; 3] = [Self::Empty, Self::Single, Self::Double];

    pub fn n(self) -> i32 {
        match self {
            Self::Empty => 0,
            Self::Single => 1,
            Self::Double => 2,
        }
    }

    pub fn two_s(self) -> i32 {
        match self {
            Self::Single => 1,
            _ => 0,
        }
    }

    pub fn from_n(n: i32) -> Option<Self> {
        match n {
            0 => Some(Self::Empty),
            1 => Some(Self::Single),
            2 => Some(Self::Double),
            _ => None,
        }
    }

    /// Irrep carried by this occupation of an orbital of irrep `orb`.
    pub fn irrep(self, orb: usize) -> usize {
        if self == Self::Single { orb } else { 0 }
    }
}

/// Enumerate the sectors reachable from `left` by adding one orbital of irrep
/// `orb`, together with the occupation used.
pub fn grow(left: Sector, orb: usize) -> impl Iterator<Item = (Occupation, Sector)> {
    Occupation::ALL.into_iter()
        .flat_map(move |occ| {
            let base = left.shifted(occ.n(), occ.irrep(orb));
            let spins: Vec<i32> =
                if occ == Occupation::Single {
                    vec![left.two_s + 1, left.two_s - 1]
                } else {
                    vec![left.two_s]
                };
            spins.into_iter()
                .filter(|two_s| *two_s >= 0)
                .map(move |two_s| (occ, base.with_spin(two_s)))
        })
}

/// Dimension queries for the virtual bonds of a chain.
///
/// This is the only view of the bookkeeping that the engine needs: a block
/// exists wherever the dimension is nonzero.
pub trait SectorIndex: Sync {
    /// Number of sites in the chain.
    fn n_sites(&self) -> usize;

    /// Number of irreps in the point group.
    fn n_irreps(&self) -> usize;

    /// Irrep of the orbital at `site`.
    fn orbital_irrep(&self, site: usize) -> usize;

    /// Target sector of the full chain.
    fn target(&self) -> Sector;

    /// Dimension of sector `(n, two_s, irrep)` at `boundary`. Zero means the
    /// sector is absent.
    fn dimension(&self, boundary: usize, n: i32, two_s: i32, irrep: usize)
        -> usize;

    /// All sectors with nonzero dimension at `boundary`, in a fixed order.
    fn sectors(&self, boundary: usize) -> Vec<Sector>;

    /// Dimension of a [`Sector`].
    fn dim(&self, boundary: usize, sector: Sector) -> usize {
        self.dimension(boundary, sector.n, sector.two_s, sector.irrep)
    }

    /// Largest sector dimension at `boundary`.
    fn max_dim(&self, boundary: usize) -> usize {
        self.sectors(boundary).into_iter()
            .map(|s| self.dim(boundary, s))
            .max()
            .unwrap_or(0)
    }
}

/// In-memory [`SectorIndex`] built from explicit entries or from a full
/// configuration-interaction count truncated to a maximum virtual dimension.
#[derive(Clone, Debug)]
pub struct SectorTable {
    orb_irreps: Vec<usize>,
    n_irreps: usize,
    target: Sector,
    dims: Vec<FxHashMap<Sector, usize>>,
}

impl SectorTable {
    fn check_irreps(orb_irreps: &[usize], n_irreps: usize, target: Sector)
        -> SymmetryResult<()>
    {
        if !matches!(n_irreps, 1 | 2 | 4 | 8) { return Err(GroupOrder(n_irreps)); }
        if let Some(bad) =
            orb_irreps.iter().chain(std::iter::once(&target.irrep))
            .find(|i| **i >= n_irreps)
        {
            return Err(IrrepRange(*bad));
        }
        Ok(())
    }

    /// Count sectors reachable from the vacuum and compatible with the target,
    /// with each dimension the minimum of the left count, the right count, and
    /// `max_dim`.
    pub fn fci(
        orb_irreps: Vec<usize>,
        n_irreps: usize,
        target: Sector,
        max_dim: usize,
    ) -> SymmetryResult<Self> {
        Self::check_irreps(&orb_irreps, n_irreps, target)?;
        let l = orb_irreps.len();

        let mut left: Vec<FxHashMap<Sector, usize>> = Vec::with_capacity(l + 1);
        let mut vac = FxHashMap::default();
        vac.insert(Sector::vacuum(), 1);
        left.push(vac);
        for (site, &orb) in orb_irreps.iter().enumerate() {
            let mut next: FxHashMap<Sector, usize> = FxHashMap::default();
            for (&sec, &cnt) in left[site].iter() {
                for (_, new) in grow(sec, orb) {
                    *next.entry(new).or_insert(0) += cnt;
                }
            }
            left.push(next);
        }

        // right counts: number of ways to reach the target from each sector
        let mut right: Vec<FxHashMap<Sector, usize>> =
            vec![FxHashMap::default(); l + 1];
        right[l].insert(target, 1);
        for site in (0..l).rev() {
            let orb = orb_irreps[site];
            let mut here: FxHashMap<Sector, usize> = FxHashMap::default();
            for &sec in left[site].keys() {
                let cnt: usize =
                    grow(sec, orb)
                    .filter_map(|(_, new)| right[site + 1].get(&new))
                    .sum();
                if cnt > 0 { here.insert(sec, cnt); }
            }
            right[site] = here;
        }

        let dims: Vec<FxHashMap<Sector, usize>> =
            (0..=l)
            .map(|b| {
                left[b].iter()
                    .filter_map(|(sec, &nl)| {
                        right[b].get(sec)
                            .map(|&nr| (*sec, nl.min(nr).min(max_dim)))
                    })
                    .filter(|(_, d)| *d > 0)
                    .collect()
            })
            .collect();
        if dims[l].get(&target).copied().unwrap_or(0) == 0 {
            return Err(Unreachable);
        }
        Ok(Self { orb_irreps, n_irreps, target, dims })
    }

    /// Build a table from explicit `(boundary, sector, dimension)` entries.
    pub fn from_entries<I>(
        orb_irreps: Vec<usize>,
        n_irreps: usize,
        target: Sector,
        entries: I,
    ) -> SymmetryResult<Self>
    where I: IntoIterator<Item = (usize, Sector, usize)>
    {
        Self::check_irreps(&orb_irreps, n_irreps, target)?;
        let mut dims = vec![FxHashMap::default(); orb_irreps.len() + 1];
        for (b, sec, d) in entries.into_iter() {
            if d > 0 && b < dims.len() { dims[b].insert(sec, d); }
        }
        Ok(Self { orb_irreps, n_irreps, target, dims })
    }

    /// Overwrite the dimension of one sector.
    pub fn set_dim(&mut self, boundary: usize, sector: Sector, dim: usize) {
        if dim == 0 {
            self.dims[boundary].remove(&sector);
        } else {
            self.dims[boundary].insert(sector, dim);
        }
    }
}

impl SectorIndex for SectorTable {
    fn n_sites(&self) -> usize { self.orb_irreps.len() }

    fn n_irreps(&self) -> usize { self.n_irreps }

    fn orbital_irrep(&self, site: usize) -> usize { self.orb_irreps[site] }

    fn target(&self) -> Sector { self.target }

    fn dimension(&self, boundary: usize, n: i32, two_s: i32, irrep: usize)
        -> usize
    {
        if two_s < 0 { return 0; }
        self.dims.get(boundary)
            .and_then(|m| m.get(&Sector::new(n, two_s, irrep)))
            .copied()
            .unwrap_or(0)
    }

    fn sectors(&self, boundary: usize) -> Vec<Sector> {
        let mut secs: Vec<Sector> =
            self.dims.get(boundary)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        secs.sort();
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(max_dim: usize) -> SectorTable {
        SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), max_dim)
            .unwrap()
    }

    #[test]
    fn termini_hold_single_sectors() {
        let t = table(10);
        assert_eq!(t.sectors(0), vec![Sector::vacuum()]);
        assert_eq!(t.sectors(4), vec![Sector::new(4, 0, 0)]);
        assert_eq!(t.dim(0, Sector::vacuum()), 1);
    }

    #[test]
    fn middle_boundary_is_symmetric_for_half_filling() {
        let t = table(100);
        // (d, e), (e, d), and the open-shell singlet
        let s = Sector::new(2, 0, 0);
        assert_eq!(t.dim(2, s), 3);
        assert!(t.dim(2, s) > 0);
        assert_eq!(t.dim(2, Sector::new(2, 2, 0)), 1);
        assert_eq!(t.dim(2, Sector::new(5, 1, 0)), 0);
    }

    #[test]
    fn cap_truncates_dimensions() {
        let t = table(1);
        for b in 0..=4 {
            for s in t.sectors(b) {
                assert_eq!(t.dim(b, s), 1);
            }
        }
    }

    #[test]
    fn unreachable_target_is_an_error() {
        let res = SectorTable::fci(vec![0; 2], 1, Sector::new(5, 1, 0), 4);
        assert!(matches!(res, Err(SymmetryError::Unreachable)));
        let res = SectorTable::fci(vec![0; 2], 3, Sector::new(2, 0, 0), 4);
        assert!(matches!(res, Err(SymmetryError::GroupOrder(3))));
    }

    #[test]
    fn irreps_multiply_by_xor() {
        assert_eq!(direct_prod(3, 1), 2);
        assert_eq!(direct_prod(5, 5), 0);
        let t =
            SectorTable::fci(vec![1, 2], 4, Sector::new(2, 0, 3), 4).unwrap();
        // one electron in each orbital
        assert_eq!(t.dim(1, Sector::new(1, 1, 1)), 1);
        assert_eq!(t.dim(1, Sector::new(0, 0, 0)), 0);
    }
}
