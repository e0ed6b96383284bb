//! Renormalization of boundary operators by one site.
//!
//! Every family is built by the same kernel, which absorbs the site next to a
//! boundary into an operator. The new operator at boundary `b` is the coupled
//! product of a *previous* operator `P` (rank `kP`, on the old covered region
//! at the previous boundary) and a *local* operator `W` (rank `kW`, on the
//! absorbed site), coupled to the new rank `k`:
//! ```text
//!   moving right                          moving left
//!  ┌─────┐  Tup^H                         Tup  ┌─────┐
//!  │     ├────────── ┐                ┌ ───────┤     │
//!  │  P  │       W   │ out      out   │    W   │  P  │
//!  │     ├────────── ┘                └ ───────┤     │
//!  └─────┘  Tdown                        Tdown^H└─────┘
//! ```
//! For every pair of outer sectors `(up, down)` of the new operator, the
//! kernel enumerates the local occupations allowed by `W` and the inner
//! sectors they imply, and adds
//! ```text
//! out += α w ⟨s_up‖W‖s_down⟩ (±1) Tup^H · P · Tdown      (moving right)
//! out += α w ⟨s_up‖W‖s_down⟩ (±1) Tup · P · Tdown^H      (moving left)
//! ```
//! where `w` is the 9j recoupling weight of the product and the sign is the
//! fermion parity picked up when the odd factor is moved into place: the local
//! operator past the inner bond moving right, the previous operator past the
//! absorbed site moving left.
//!
//! Moving right, the outer spin is the coupling of inner and local spins, and
//! `w` is the usual reduced-element weight of a tensor product,
//! `√((2S_bd+1)(2k+1)(2S_iu+1)(2s_u+1)) {S_iu S_id kP; s_u s_d kW; S_bu S_bd k}`.
//! Moving left, it is the inner spin that couples outer and local spins, and
//! the weight swaps the roles of the outer and inner bonds,
//! `√((2S_id+1)(2kP+1)(2S_bu+1)(2s_u+1)) {S_bu S_bd k; s_u s_d kW; S_iu S_id kP}`.
//! Either way a scalar renormalizes with unit weight.
//!
//! Operators covering the right of a boundary are stored as the complex
//! conjugates of their reduced elements, so that a leftward update has the
//! same `Tup · P · Tdown^H` form as the overlap.
//!
//! With no previous operator the kernel only contributes at a chain terminus,
//! where the previous operator is the identity on the single terminal sector.
//!
//! All entry points that *create* an operator zero it first; [`update`]
//! and [`add_local`] only accumulate.
//!
//! [`update`]: UpdateEngine::update
//! [`add_local`]: UpdateEngine::add_local

use num_traits::{ One, Zero };
use crate::{
    ComplexScalar,
    linalg::{ self, Op, Scratch },
    local::{ Ladder, Leg, LocalKind, LocalOp, ONE_SITE },
    operator::{ BoundaryOperator, Direction, Family, Frame },
    site::SiteTensor,
    symmetry::{ Occupation, Sector, SectorIndex },
    wigner::wigner9j,
};

fn mult(two_j: i32) -> f64 { (two_j + 1) as f64 }

/// Inner sectors on the far side of the absorbed site, given an outer sector
/// and the site's occupation.
pub fn inner_sectors(
    outer: Sector,
    occ: Occupation,
    orb_irrep: usize,
    direction: Direction,
) -> impl Iterator<Item = Sector> {
    let dn =
        match direction {
            Direction::MovingRight => -occ.n(),
            Direction::MovingLeft => occ.n(),
        };
    let base = outer.shifted(dn, occ.irrep(orb_irrep));
    let spins: Vec<i32> =
        if occ == Occupation::Single {
            vec![outer.two_s - 1, outer.two_s + 1]
        } else {
            vec![outer.two_s]
        };
    spins.into_iter()
        .filter(|two_s| *two_s >= 0)
        .map(move |two_s| base.with_spin(two_s))
}

/// Spins of one up/down pair of recoupled states.
#[derive(Copy, Clone, Debug)]
pub struct Spins {
    /// Outer (new boundary) spins.
    pub outer: (i32, i32),
    /// Inner (previous boundary) spins.
    pub inner: (i32, i32),
    /// Local (absorbed site) spins.
    pub local: (i32, i32),
}

/// Recoupling weight of the product of a previous operator of rank `two_kp`
/// and a local operator of rank `two_kw` into rank `two_k`.
pub fn recoupling(
    direction: Direction,
    s: Spins,
    two_kp: i32,
    two_kw: i32,
    two_k: i32,
) -> f64 {
    let (bu, bd) = s.outer;
    let (iu, id) = s.inner;
    let (lu, ld) = s.local;
    match direction {
        Direction::MovingRight => {
            let nine = wigner9j(iu, id, two_kp, lu, ld, two_kw, bu, bd, two_k);
            if nine == 0.0 { return 0.0; }
            (mult(bd) * mult(two_k) * mult(iu) * mult(lu)).sqrt() * nine
        },
        Direction::MovingLeft => {
            let nine = wigner9j(bu, bd, two_k, lu, ld, two_kw, iu, id, two_kp);
            if nine == 0.0 { return 0.0; }
            (mult(id) * mult(two_kp) * mult(bu) * mult(lu)).sqrt() * nine
        },
    }
}

/// Builds and extends boundary operators from site tensors.
///
/// The engine holds no state beyond the sector bookkeeping; all storage is
/// owned by the caller and only mutated through the `out` arguments.
#[derive(Copy, Clone, Debug)]
pub struct UpdateEngine<'a, I: ?Sized> {
    index: &'a I,
}

impl<'a, I> UpdateEngine<'a, I>
where I: SectorIndex + ?Sized
{
    pub fn new(index: &'a I) -> Self { Self { index } }

    /// Sector bookkeeping.
    pub fn index(&self) -> &'a I { self.index }

    fn frame<A: ComplexScalar>(&self, out: &BoundaryOperator<A>) -> Frame {
        let sig = out.signature();
        Frame::new(sig.boundary, sig.direction, self.index.n_sites())
    }

    /// The kernel: `out += α · renormalize(prev ⊗ local)`.
    #[allow(clippy::too_many_arguments)]
    fn accumulate<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        prev: Option<&BoundaryOperator<A>>,
        local: &LocalOp,
        alpha: f64,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        if alpha == 0.0 { return; }
        let frame = self.frame(out);
        let Some(inner_b) = frame.previous() else { return; };
        let site = frame.new_site();
        if up.site() != site || down.site() != site {
            panic!("inconsistent dimensions");
        }
        let dir = frame.direction;
        let orb = self.index.orbital_irrep(site);
        let two_k = out.signature().two_j;
        let (two_kp, odd_prev) =
            prev.map(|p| (p.signature().two_j, p.signature().is_odd()))
            .unwrap_or((0, false));
        let at_terminus = inner_b == frame.terminus();
        let two_kw = local.two_k();
        let odd_local = local.dn() % 2 != 0;

        for (entry, block) in out.blocks_mut() {
            let (bu, bd) = entry.key;
            let mut out_view = linalg::view_mut(block, entry.rows, entry.cols);
            for &(loc_u, loc_d, w_loc) in local.elems() {
                let (Some(occ_u), Some(occ_d)) =
                    (Occupation::from_n(loc_u.n1), Occupation::from_n(loc_d.n1))
                else { continue; };
                let single_d = occ_d == Occupation::Single;
                for iu in inner_sectors(bu, occ_u, orb, dir) {
                    let (t_up, t_up_op) =
                        match dir {
                            Direction::MovingRight => (up.block(iu, bu), Op::C),
                            Direction::MovingLeft => (up.block(bu, iu), Op::N),
                        };
                    let Some(t_up) = t_up else { continue; };
                    for id in inner_sectors(bd, occ_d, orb, dir) {
                        let (t_dn, t_dn_op) =
                            match dir {
                                Direction::MovingRight => (down.block(id, bd), Op::N),
                                Direction::MovingLeft => (down.block(bd, id), Op::C),
                            };
                        let Some(t_dn) = t_dn else { continue; };
                        let spins = Spins {
                            outer: (bu.two_s, bd.two_s),
                            inner: (iu.two_s, id.two_s),
                            local: (loc_u.two_j, loc_d.two_j),
                        };
                        let w = recoupling(dir, spins, two_kp, two_kw, two_k);
                        if w == 0.0 { continue; }
                        let flip =
                            match dir {
                                Direction::MovingRight => odd_local && id.n % 2 != 0,
                                Direction::MovingLeft => odd_prev && single_d,
                            };
                        let sign = if flip { -1.0 } else { 1.0 };
                        let coef: A = linalg::re(alpha * w * w_loc * sign);
                        match prev {
                            Some(p) => {
                                let Some(p_blk) = p.block(iu, id) else { continue; };
                                // tmp = P · op(Tdown)
                                let (rows, cols) = (p_blk.nrows(), entry.cols);
                                let buf = scratch.one(rows * cols);
                                let mut tmp = linalg::view_mut(buf, rows, cols);
                                linalg::gemm(
                                    A::one(), Op::N, &p_blk, t_dn_op, &t_dn,
                                    A::zero(), &mut tmp,
                                );
                                let tmp = linalg::view(buf, rows, cols);
                                linalg::gemm(
                                    coef, t_up_op, &t_up, Op::N, &tmp,
                                    A::one(), &mut out_view,
                                );
                            },
                            None => {
                                if !at_terminus || iu != id { continue; }
                                linalg::gemm(
                                    coef, t_up_op, &t_up, t_dn_op, &t_dn,
                                    A::one(), &mut out_view,
                                );
                            },
                        }
                    }
                }
            }
        }
    }

    /// Zero `out`.
    pub fn clear<A: ComplexScalar>(&self, out: &mut BoundaryOperator<A>) {
        out.clear();
    }

    /// Accumulate the renormalization of `prev`, an operator of the same
    /// family one boundary back, into `out`. `None` contributes nothing.
    pub fn update<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        prev: Option<&BoundaryOperator<A>>,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        let Some(prev) = prev else { return; };
        let id = ONE_SITE.table(LocalKind::Identity);
        self.accumulate(out, Some(prev), id, 1.0, up, down, scratch);
    }

    /// Zero `out`, then fill it from the renormalization of `prev`. With no
    /// previous operator, `out` is built from the chain terminus.
    pub fn create<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        prev: Option<&BoundaryOperator<A>>,
        scratch: &mut Scratch<A>,
    ) {
        out.clear();
        let id = ONE_SITE.table(LocalKind::Identity);
        self.accumulate(out, prev, id, 1.0, up, down, scratch);
    }

    /// Accumulate `α · renormalize(prev ⊗ W)` for a local operator kind `W`
    /// on the absorbed site. `prev` should be the previous overlap when `W`
    /// carries the whole operator.
    #[allow(clippy::too_many_arguments)]
    pub fn add_local<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        prev: Option<&BoundaryOperator<A>>,
        kind: LocalKind,
        alpha: f64,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        self.accumulate(out, prev, ONE_SITE.table(kind), alpha, up, down, scratch);
    }

    /// Zero `out`, then [`add_local`][Self::add_local].
    #[allow(clippy::too_many_arguments)]
    pub fn create_local<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        prev: Option<&BoundaryOperator<A>>,
        kind: LocalKind,
        alpha: f64,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        out.clear();
        self.add_local(out, prev, kind, alpha, up, down, scratch);
    }

    /// Create a rank-½ operator (`L` or its adjoint) on the absorbed site from
    /// the previous overlap.
    pub fn create_rank1<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        overlap: Option<&BoundaryOperator<A>>,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        let ladder =
            if out.signature().adjoint { Ladder::Create } else { Ladder::Annihilate };
        let kind = LocalKind::Single(Leg(ladder, 1));
        self.create_local(out, overlap, kind, 1.0, up, down, scratch);
    }

    /// Create a pair operator on two distinct sites, the farther one carried
    /// by the previous rank-½ operator `rank1` and the nearer one being the
    /// absorbed site.
    ///
    /// `rank1` must be the `L` variant named by [`pair_far_near`].
    pub fn make_pair<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        rank1: &BoundaryOperator<A>,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        let sig = out.signature();
        let (_, near) = pair_far_near(sig.family, sig.adjoint, sig.direction);
        let kind = LocalKind::Single(Leg(near, 1));
        self.create_local(out, Some(rank1), kind, 1.0, up, down, scratch);
    }

    /// Create a pair operator with both legs on the absorbed site.
    pub fn make_onsite_pair<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        overlap: Option<&BoundaryOperator<A>>,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        let sig = out.signature();
        let (lo, hi) = pair_legs(sig.family, sig.adjoint);
        let kind = LocalKind::Pair(Leg(lo, 1), Leg(hi, 1), sig.two_j);
        self.create_local(out, overlap, kind, 1.0, up, down, scratch);
    }

    /// Fill `out` with the overlap between the bra and ket bases.
    pub fn overlap<A: ComplexScalar>(
        &self,
        out: &mut BoundaryOperator<A>,
        prev: Option<&BoundaryOperator<A>>,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
        scratch: &mut Scratch<A>,
    ) {
        self.create(out, up, down, prev, scratch);
    }
}

/// Ladder operators of a pair family on its lower and higher site:
/// `S = [ã ã]`, `F = [c† ã]`, and the adjoints `S' = [c† c†]`, `F' = [ã c†]`.
pub fn pair_legs(family: Family, adjoint: bool) -> (Ladder, Ladder) {
    use Ladder::*;
    let (lo, hi) =
        match family {
            Family::F0 | Family::F1 => (Create, Annihilate),
            _ => (Annihilate, Annihilate),
        };
    if adjoint { (lo.flip(), hi.flip()) } else { (lo, hi) }
}

/// Ladder operators of a pair family on the site farther from the boundary
/// and on the nearer one.
pub fn pair_far_near(family: Family, adjoint: bool, direction: Direction)
    -> (Ladder, Ladder)
{
    let (lo, hi) = pair_legs(family, adjoint);
    match direction {
        Direction::MovingRight => (lo, hi),
        Direction::MovingLeft => (hi, lo),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;
    use rand::{ rngs::StdRng, SeedableRng };
    use crate::{
        operator::Signature,
        store::{ layout_keys, signature },
        symmetry::SectorTable,
    };

    fn table() -> SectorTable {
        SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 1).unwrap()
    }

    fn new_op(t: &SectorTable, family: Family, adjoint: bool, b: usize, dir: Direction)
        -> BoundaryOperator<C64>
    {
        BoundaryOperator::new(t, Signature::new(family, adjoint, 0, b, dir))
    }

    #[test]
    fn scalar_recoupling_has_unit_weight() {
        for dir in [Direction::MovingRight, Direction::MovingLeft] {
            for (outer, inner) in [(1, 0), (0, 1), (2, 1), (1, 2)] {
                let s = Spins {
                    outer: (outer, outer),
                    inner: (inner, inner),
                    local: (1, 1),
                };
                assert_abs_diff_eq!(
                    recoupling(dir, s, 0, 0, 0), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn pair_legs_mirror_by_direction() {
        use Ladder::*;
        assert_eq!(pair_legs(Family::F1, false), (Create, Annihilate));
        assert_eq!(pair_legs(Family::F0, true), (Annihilate, Create));
        assert_eq!(pair_legs(Family::S1, true), (Create, Create));
        assert_eq!(
            pair_far_near(Family::F0, false, Direction::MovingRight),
            (Create, Annihilate),
        );
        assert_eq!(
            pair_far_near(Family::F0, false, Direction::MovingLeft),
            (Annihilate, Create),
        );
    }

    #[test]
    fn overlap_of_unit_sites_is_identity() {
        let t = table();
        let eng = UpdateEngine::new(&t);
        let mut scratch = Scratch::new(4);
        for (b, site, dir) in [
            (1, 0, Direction::MovingRight),
            (3, 3, Direction::MovingLeft),
        ] {
            let ones: SiteTensor<C64> =
                SiteTensor::from_fn(&t, site, |_, _, _| C64::one());
            let mut o = new_op(&t, Family::O, false, b, dir);
            eng.overlap(&mut o, None, &ones, &ones, &mut scratch);
            assert_eq!(o.n_blocks(), 3);
            for e in o.offset_table() {
                assert_eq!(e.key.0, e.key.1);
                let blk = o.block(e.key.0, e.key.1).unwrap();
                assert_abs_diff_eq!(blk[(0, 0)].re, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn rank1_creation_at_terminus() {
        let t = table();
        let eng = UpdateEngine::new(&t);
        let mut scratch = Scratch::new(4);
        let ones: SiteTensor<C64> = SiteTensor::from_fn(&t, 0, |_, _, _| C64::one());
        let mut l = new_op(&t, Family::L, false, 1, Direction::MovingRight);
        eng.create_rank1(&mut l, None, &ones, &ones, &mut scratch);
        let vac = Sector::vacuum();
        let s = Sector::new(1, 1, 0);
        let d = Sector::new(2, 0, 0);
        // ⟨e‖ã‖s⟩ = -√2 and ⟨s‖ã‖d⟩ = -1
        let x = l.block(vac, s).unwrap()[(0, 0)];
        assert_abs_diff_eq!(x.norm(), 2.0_f64.sqrt(), epsilon = 1e-12);
        let x = l.block(s, d).unwrap()[(0, 0)];
        assert_abs_diff_eq!(x.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rank1_operators_conserve_quantum_numbers() {
        let t = SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 3).unwrap();
        let eng = UpdateEngine::new(&t);
        let mut scratch = Scratch::new(16);
        let mut rng = StdRng::seed_from_u64(10546);
        let s0: SiteTensor<C64> = SiteTensor::new_rand(&t, 0, &mut rng);
        let s1: SiteTensor<C64> = SiteTensor::new_rand(&t, 1, &mut rng);
        let mut o1 = new_op(&t, Family::O, false, 1, Direction::MovingRight);
        eng.overlap(&mut o1, None, &s0, &s0, &mut scratch);
        for adjoint in [false, true] {
            let mut l = new_op(&t, Family::L, adjoint, 2, Direction::MovingRight);
            eng.create_rank1(&mut l, Some(&o1), &s1, &s1, &mut scratch);
            let dn = if adjoint { 1 } else { -1 };
            assert!(l.max_abs() > 0.0);
            for e in l.offset_table() {
                let (up, down) = e.key;
                let blk = l.block(up, down).unwrap();
                if blk.iter().all(|x| x.is_zero()) { continue; }
                // labels count particles to the left: creation lowers the bra
                assert_eq!(up.n - down.n, dn);
                assert_eq!(up.irrep, down.irrep);
                assert_eq!((up.two_s - down.two_s).abs(), 1);
            }
        }
    }

    #[test]
    fn create_then_null_update_is_create() {
        let t = table();
        let eng = UpdateEngine::new(&t);
        let mut scratch = Scratch::new(4);
        let mut rng = StdRng::seed_from_u64(10546);
        for dir in [Direction::MovingRight, Direction::MovingLeft] {
            let (b, site) =
                match dir {
                    Direction::MovingRight => (1, 0),
                    Direction::MovingLeft => (3, 3),
                };
            let up: SiteTensor<C64> = SiteTensor::new_rand(&t, site, &mut rng);
            let down: SiteTensor<C64> = SiteTensor::new_rand(&t, site, &mut rng);
            for key in layout_keys(Frame::new(b, dir, 4)) {
                let mut op = BoundaryOperator::new(&t, signature(&t, &key));
                match key.family {
                    Family::L => eng.create_rank1(&mut op, None, &up, &down, &mut scratch),
                    Family::S0 | Family::F0 | Family::F1 if key.cnt2 == 0 =>
                        eng.make_onsite_pair(&mut op, None, &up, &down, &mut scratch),
                    _ => eng.create(&mut op, &up, &down, None, &mut scratch),
                }
                let before = op.data().to_vec();
                eng.update(&mut op, None, &up, &down, &mut scratch);
                assert_eq!(op.data(), &before[..], "{key}");
            }
        }
    }
}
