//! Exact algebra of one or two spatial orbitals.
//!
//! The local Fock space of `n_orb` orbitals (four states per orbital) is small
//! enough to build every site-local operator as an explicit matrix. Operators
//! are organized as spherical tensors under spin rotations: the creator
//! `c†_u` is a rank-½ tensor with components `c†_{u↑}, c†_{u↓}`, and the
//! annihilator is used in its tensorial form `ã_{u,q} = (-1)^(½ - q) a_{u,-q}`.
//! Products of tensors are coupled with Clebsch-Gordan coefficients.
//!
//! The quantities actually consumed elsewhere are *reduced* matrix elements
//! between spin-coupled local states, defined by the Wigner-Eckart theorem in
//! Clebsch-Gordan form
//! ```text
//! ⟨α J M| T^k_q |β J' M'⟩ = ⟨J' M' k q | J M⟩ ⟨α J‖T^k‖β J'⟩
//! ```
//! so that scalar operators have reduced elements equal to their ordinary
//! matrix elements. They are tabulated once per operator kind in a
//! [`LocalOp`].
//!
//! Two-orbital tables (for the superblock sites) and one-orbital tables (for
//! renormalizing a single site into a boundary) are built lazily on first use.

use nalgebra as na;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use crate::{
    symmetry::Occupation,
    wigner::clebsch_gordan,
};

/// Creation or annihilation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ladder {
    Create,
    Annihilate,
}

impl Ladder {
    /// Particle-number change.
    pub fn dn(self) -> i32 {
        match self {
            Self::Create => 1,
            Self::Annihilate => -1,
        }
    }

    /// The other ladder operator.
    pub fn flip(self) -> Self {
        match self {
            Self::Create => Self::Annihilate,
            Self::Annihilate => Self::Create,
        }
    }
}

/// A single ladder operator on local orbital `1` (the first) or `2`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Leg(pub Ladder, pub u8);

/// Kinds of site-local operators for which reduced tables are kept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocalKind {
    /// The identity.
    Identity,
    /// `n_↑ n_↓` on one orbital.
    Doubles(u8),
    /// One ladder operator, rank ½.
    Single(Leg),
    /// Two ladder operators coupled to rank `two_k / 2`.
    Pair(Leg, Leg, i32),
    /// Two ladder operators coupled to `two_k / 2`, then a third coupled to ½.
    Triple(Leg, Leg, i32, Leg),
    /// The scalar `½ Σ_στ a†_iσ a†_jτ a_lτ a_kσ`.
    Interaction([u8; 4]),
}

/// Spin-coupled local sector: occupations of (up to) two orbitals and their
/// coupled doubled spin. For a single orbital `n2 == 0`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalSector {
    pub n1: i32,
    pub n2: i32,
    pub two_j: i32,
}

impl LocalSector {
    pub fn new(n1: i32, n2: i32, two_j: i32) -> Self { Self { n1, n2, two_j } }

    pub fn n(&self) -> i32 { self.n1 + self.n2 }

    /// Irrep carried by the local state, given the orbital irreps.
    pub fn irrep(&self, irrep1: usize, irrep2: usize) -> usize {
        let i1 = if self.n1 == 1 { irrep1 } else { 0 };
        let i2 = if self.n2 == 1 { irrep2 } else { 0 };
        i1 ^ i2
    }
}

/// Reduced matrix elements of one local operator between coupled sectors.
#[derive(Clone, Debug)]
pub struct LocalOp {
    two_k: i32,
    dn: i32,
    elems: Vec<(LocalSector, LocalSector, f64)>,
}

impl LocalOp {
    /// Doubled tensor rank.
    pub fn two_k(&self) -> i32 { self.two_k }

    /// Particle-number change.
    pub fn dn(&self) -> i32 { self.dn }

    /// Nonzero reduced elements `(bra, ket, ⟨bra‖T‖ket⟩)`.
    pub fn elems(&self) -> &[(LocalSector, LocalSector, f64)] { &self.elems }

    /// Nonzero reduced elements with a given bra sector.
    pub fn from_bra(&self, bra: LocalSector)
        -> impl Iterator<Item = (LocalSector, f64)> + '_
    {
        self.elems.iter()
            .filter(move |(b, _, _)| *b == bra)
            .map(|(_, k, x)| (*k, *x))
    }

    /// Nonzero reduced elements with a given ket sector.
    pub fn to_ket(&self, ket: LocalSector)
        -> impl Iterator<Item = (LocalSector, f64)> + '_
    {
        self.elems.iter()
            .filter(move |(_, k, _)| *k == ket)
            .map(|(b, _, x)| (*b, *x))
    }

    /// Single reduced element, zero if absent.
    pub fn get(&self, bra: LocalSector, ket: LocalSector) -> f64 {
        self.elems.iter()
            .find(|(b, k, _)| *b == bra && *k == ket)
            .map(|(_, _, x)| *x)
            .unwrap_or(0.0)
    }
}

// spherical tensor: components ordered by q = -k, ..., k
#[derive(Clone, Debug)]
struct Sph {
    two_k: i32,
    comps: Vec<na::DMatrix<f64>>,
}

impl Sph {
    fn comp(&self, two_q: i32) -> Option<&na::DMatrix<f64>> {
        if two_q.abs() > self.two_k { return None; }
        self.comps.get(((two_q + self.two_k) / 2) as usize)
    }

    fn couple(&self, rhs: &Sph, two_k: i32) -> Sph {
        let dim = self.comps[0].nrows();
        let comps: Vec<na::DMatrix<f64>> =
            (0..=two_k).map(|i| -2 * i + two_k).rev()
            .map(|two_q| {
                let mut acc = na::DMatrix::<f64>::zeros(dim, dim);
                for two_qa in (-self.two_k..=self.two_k).step_by(2) {
                    let two_qb = two_q - two_qa;
                    if two_qb.abs() > rhs.two_k { continue; }
                    let cg = clebsch_gordan(
                        self.two_k, two_qa, rhs.two_k, two_qb, two_k, two_q);
                    if cg == 0.0 { continue; }
                    if let (Some(a), Some(b)) =
                        (self.comp(two_qa), rhs.comp(two_qb))
                    {
                        acc += (a * b) * cg;
                    }
                }
                acc
            })
            .collect();
        Sph { two_k, comps }
    }
}

/// Explicit Fock-space model of `n_orb` spatial orbitals.
#[derive(Clone, Debug)]
pub struct LocalAlgebra {
    n_orb: usize,
    dim: usize,
    sectors: Vec<LocalSector>,
    // coupled basis vectors for (sector, 2M)
    states: FxHashMap<(LocalSector, i32), na::DVector<f64>>,
    tables: FxHashMap<LocalKind, LocalOp>,
}

impl LocalAlgebra {
    fn new(n_orb: usize) -> Self {
        let dim = 1 << (2 * n_orb);
        let sectors: Vec<LocalSector> =
            if n_orb == 1 {
                Occupation::ALL.iter()
                    .map(|o| LocalSector::new(o.n(), 0, o.two_s()))
                    .collect()
            } else {
                let mut secs = Vec::new();
                for o1 in Occupation::ALL {
                    for o2 in Occupation::ALL {
                        let (s1, s2) = (o1.two_s(), o2.two_s());
                        for two_j in ((s1 - s2).abs()..=s1 + s2).step_by(2) {
                            secs.push(LocalSector::new(o1.n(), o2.n(), two_j));
                        }
                    }
                }
                secs
            };
        let mut alg =
            Self {
                n_orb,
                dim,
                sectors,
                states: FxHashMap::default(),
                tables: FxHashMap::default(),
            };
        alg.build_states();
        alg.build_tables();
        alg
    }

    /// Number of orbitals modelled.
    pub fn n_orb(&self) -> usize { self.n_orb }

    /// All coupled local sectors.
    pub fn sectors(&self) -> &[LocalSector] { &self.sectors }

    /// Reduced table for an operator kind.
    ///
    /// *Panics if the kind refers to an orbital outside the model.*
    pub fn table(&self, kind: LocalKind) -> &LocalOp {
        match self.tables.get(&kind) {
            Some(op) => op,
            None => panic!("no local table for {kind:?}"),
        }
    }

    // creation matrix for mode 2u + σ under Jordan-Wigner ordering
    fn creator(&self, mode: usize) -> na::DMatrix<f64> {
        let mut m = na::DMatrix::<f64>::zeros(self.dim, self.dim);
        for state in 0..self.dim {
            if state & (1 << mode) != 0 { continue; }
            let below = (state & ((1 << mode) - 1)).count_ones();
            let sign = if below % 2 == 0 { 1.0 } else { -1.0 };
            m[(state | (1 << mode), state)] = sign;
        }
        m
    }

    fn creation_tensor(&self, u: usize) -> Sph {
        Sph {
            two_k: 1,
            comps: vec![self.creator(2 * u + 1), self.creator(2 * u)],
        }
    }

    fn annihilation_tensor(&self, u: usize) -> Sph {
        // ã_{+½} = a_↓, ã_{-½} = -a_↑
        Sph {
            two_k: 1,
            comps: vec![
                -self.creator(2 * u).transpose(),
                self.creator(2 * u + 1).transpose(),
            ],
        }
    }

    fn leg(&self, leg: Leg) -> Sph {
        let u = (leg.1 - 1) as usize;
        match leg.0 {
            Ladder::Create => self.creation_tensor(u),
            Ladder::Annihilate => self.annihilation_tensor(u),
        }
    }

    // orbital-u creation string for occupation with projection 2m
    fn orbital_string(&self, u: usize, n: i32, two_m: i32) -> na::DMatrix<f64> {
        match (n, two_m) {
            (1, 1) => self.creator(2 * u),
            (1, -1) => self.creator(2 * u + 1),
            (2, _) => self.creator(2 * u) * self.creator(2 * u + 1),
            _ => na::DMatrix::identity(self.dim, self.dim),
        }
    }

    fn build_states(&mut self) {
        let mut vac = na::DVector::<f64>::zeros(self.dim);
        vac[0] = 1.0;
        let mut states = FxHashMap::default();
        for &sec in self.sectors.iter() {
            let s1 = if sec.n1 == 1 { 1 } else { 0 };
            let s2 = if sec.n2 == 1 { 1 } else { 0 };
            for two_m in (-sec.two_j..=sec.two_j).step_by(2) {
                let mut v = na::DVector::<f64>::zeros(self.dim);
                for two_m1 in (-s1..=s1).step_by(2) {
                    let two_m2 = two_m - two_m1;
                    if two_m2.abs() > s2 { continue; }
                    let cg = clebsch_gordan(s1, two_m1, s2, two_m2, sec.two_j, two_m);
                    if cg == 0.0 { continue; }
                    let mut prod = self.orbital_string(0, sec.n1, two_m1);
                    if self.n_orb > 1 {
                        prod *= self.orbital_string(1, sec.n2, two_m2);
                    }
                    v += (prod * &vac) * cg;
                }
                states.insert((sec, two_m), v);
            }
        }
        self.states = states;
    }

    fn reduce(&self, t: &Sph) -> Vec<(LocalSector, LocalSector, f64)> {
        let mut out = Vec::new();
        for &bra in self.sectors.iter() {
            for &ket in self.sectors.iter() {
                if let Some(x) = self.reduced_element(t, bra, ket) {
                    if x.abs() > 1e-12 { out.push((bra, ket, x)); }
                }
            }
        }
        out
    }

    fn reduced_element(&self, t: &Sph, bra: LocalSector, ket: LocalSector)
        -> Option<f64>
    {
        let two_mb = bra.two_j;
        let vb = self.states.get(&(bra, two_mb))?;
        for two_q in (-t.two_k..=t.two_k).step_by(2) {
            let two_mk = two_mb - two_q;
            if two_mk.abs() > ket.two_j { continue; }
            let w = clebsch_gordan(ket.two_j, two_mk, t.two_k, two_q, bra.two_j, two_mb);
            if w.abs() < 1e-12 { continue; }
            let vk = self.states.get(&(ket, two_mk))?;
            let op = t.comp(two_q)?;
            let me = vb.dot(&(op * vk));
            return Some(me / w);
        }
        None
    }

    fn legs(&self) -> Vec<Leg> {
        let mut legs = Vec::new();
        for u in 1..=self.n_orb as u8 {
            legs.push(Leg(Ladder::Create, u));
            legs.push(Leg(Ladder::Annihilate, u));
        }
        legs
    }

    fn insert(&mut self, kind: LocalKind, t: &Sph, dn: i32) {
        let elems = self.reduce(t);
        self.tables.insert(kind, LocalOp { two_k: t.two_k, dn, elems });
    }

    fn build_tables(&mut self) {
        let identity =
            Sph { two_k: 0, comps: vec![na::DMatrix::identity(self.dim, self.dim)] };
        self.insert(LocalKind::Identity, &identity, 0);

        for u in 1..=self.n_orb as u8 {
            let up = self.creator(2 * (u as usize - 1));
            let dn = self.creator(2 * (u as usize - 1) + 1);
            let n_up = &up * up.transpose();
            let n_dn = &dn * dn.transpose();
            let doubles = Sph { two_k: 0, comps: vec![n_up * n_dn] };
            self.insert(LocalKind::Doubles(u), &doubles, 0);
        }

        let legs = self.legs();
        for &a in legs.iter() {
            let ta = self.leg(a);
            self.insert(LocalKind::Single(a), &ta, a.0.dn());
            for &b in legs.iter() {
                let tb = self.leg(b);
                for two_k in [0, 2] {
                    let tab = ta.couple(&tb, two_k);
                    self.insert(LocalKind::Pair(a, b, two_k), &tab, a.0.dn() + b.0.dn());
                    for &c in legs.iter() {
                        let tc = self.leg(c);
                        let tabc = tab.couple(&tc, 1);
                        self.insert(
                            LocalKind::Triple(a, b, two_k, c),
                            &tabc,
                            a.0.dn() + b.0.dn() + c.0.dn(),
                        );
                    }
                }
            }
        }

        // ½ Σ_στ a†_iσ a†_jτ a_lτ a_kσ for every orbital pattern
        let orbs: Vec<u8> = (1..=self.n_orb as u8).collect();
        for &i in orbs.iter() {
        for &j in orbs.iter() {
        for &k in orbs.iter() {
        for &l in orbs.iter() {
            let mut m = na::DMatrix::<f64>::zeros(self.dim, self.dim);
            for s in 0..2 {
                for t in 0..2 {
                    let ci = self.creator(2 * (i as usize - 1) + s);
                    let cj = self.creator(2 * (j as usize - 1) + t);
                    let al = self.creator(2 * (l as usize - 1) + t).transpose();
                    let ak = self.creator(2 * (k as usize - 1) + s).transpose();
                    m += ci * cj * al * ak;
                }
            }
            let op = Sph { two_k: 0, comps: vec![m * 0.5] };
            self.insert(LocalKind::Interaction([i, j, k, l]), &op, 0);
        }}}}
    }
}

/// Algebra of a single orbital, used when a site is absorbed into a boundary.
pub static ONE_SITE: Lazy<LocalAlgebra> = Lazy::new(|| LocalAlgebra::new(1));

/// Algebra of the two superblock orbitals.
pub static TWO_SITE: Lazy<LocalAlgebra> = Lazy::new(|| LocalAlgebra::new(2));

/// The one-orbital sector for an occupation.
pub fn one_site_sector(occ: Occupation) -> LocalSector {
    LocalSector::new(occ.n(), 0, occ.two_s())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn s(n1: i32, n2: i32, two_j: i32) -> LocalSector {
        LocalSector::new(n1, n2, two_j)
    }

    #[test]
    fn sector_counts() {
        assert_eq!(ONE_SITE.sectors().len(), 3);
        // 3 × 3 occupation pairs, with the open-shell pair split in two
        assert_eq!(TWO_SITE.sectors().len(), 10);
    }

    #[test]
    fn identity_is_one_on_every_sector() {
        let id = TWO_SITE.table(LocalKind::Identity);
        for &sec in TWO_SITE.sectors() {
            assert_abs_diff_eq!(id.get(sec, sec), 1.0, epsilon = 1e-12);
        }
        assert_eq!(id.elems().len(), TWO_SITE.sectors().len());
    }

    #[test]
    fn doubles_count_only_double_occupation() {
        let d1 = TWO_SITE.table(LocalKind::Doubles(1));
        assert_abs_diff_eq!(d1.get(s(2, 1, 1), s(2, 1, 1)), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d1.get(s(1, 2, 1), s(1, 2, 1)), 0.0, epsilon = 1e-12);
        let d2 = TWO_SITE.table(LocalKind::Doubles(2));
        assert_abs_diff_eq!(d2.get(s(0, 2, 0), s(0, 2, 0)), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn creator_reduced_elements() {
        let c = ONE_SITE.table(LocalKind::Single(Leg(Ladder::Create, 1)));
        assert_eq!(c.two_k(), 1);
        assert_eq!(c.dn(), 1);
        // ⟨½ ½| c†_↑ |0⟩ = 1 = ⟨0 0 ½ ½|½ ½⟩ ⟨s‖c†‖e⟩
        assert_abs_diff_eq!(c.get(s(1, 0, 1), s(0, 0, 0)), 1.0, epsilon = 1e-12);
        assert!(c.get(s(2, 0, 0), s(1, 0, 1)).abs() > 0.5);
        assert_eq!(c.get(s(0, 0, 0), s(1, 0, 1)), 0.0);
    }

    #[test]
    fn number_operator_from_coupled_pair() {
        // [c† ã]^0 = -(n_↑ + n_↓) / √2
        let f0 = ONE_SITE.table(LocalKind::Pair(
            Leg(Ladder::Create, 1), Leg(Ladder::Annihilate, 1), 0));
        let single = f0.get(s(1, 0, 1), s(1, 0, 1));
        let double = f0.get(s(2, 0, 0), s(2, 0, 0));
        assert_abs_diff_eq!(double, 2.0 * single, epsilon = 1e-12);
        assert_abs_diff_eq!(
            double, -(2.0_f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn on_site_interaction_counts_doubles() {
        let v = TWO_SITE.table(LocalKind::Interaction([1, 1, 1, 1]));
        assert_abs_diff_eq!(v.get(s(2, 0, 0), s(2, 0, 0)), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.get(s(1, 1, 0), s(1, 1, 0)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn exchange_splits_singlet_and_triplet() {
        // ½ Σ a†_1 a†_2 a_1 a_2 acts as -(½ + 2 S1·S2) on the open-shell pair
        let k = TWO_SITE.table(LocalKind::Interaction([1, 2, 2, 1]));
        let singlet = k.get(s(1, 1, 0), s(1, 1, 0));
        let triplet = k.get(s(1, 1, 2), s(1, 1, 2));
        assert!((singlet - triplet).abs() > 0.5);
    }
}
