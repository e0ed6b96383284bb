//! Rebuilding the operator set at a boundary as the sweep moves.
//!
//! An [`Environment`] owns the [`OperatorStore`] of a chain together with the
//! Hamiltonian coefficients and the worker pool. Each call to
//! [`update_moving_right`][Environment::update_moving_right] or
//! [`update_moving_left`][Environment::update_moving_left] absorbs one site
//! into the operators of the previous boundary and fills every operator of the
//! new one, in six stages:
//! 1. `L`: the new site's annihilator, then every older one renormalized
//! 2. `S`/`F`: pairs with both sites covered
//! 3. `A`/`B`/`C`/`D`: complementary sums for pairs of uncovered sites,
//!    extended by the pairs that end on the new site
//! 4. `Q`: three-leg sums for single uncovered sites
//! 5. `X`: the Hamiltonian restricted to the covered region
//! 6. `O`: the bra-ket overlap
//!
//! Later stages read the results of earlier ones at the same boundary, so the
//! stages run in order; the operators within one stage are built in parallel.
//! Under a non-trivial [`Ownership`] strategy each worker builds only its own
//! operators and the strategy exchanges them at the end of every stage.

use log::debug;
use rayon::{ prelude::*, ThreadPool };
use thiserror::Error;
use crate::{
    ComplexScalar,
    config::{ EngineConfig, PoolError },
    integrals::Integrals,
    linalg::{ self, Scratch },
    local::{ Ladder, Leg, LocalKind },
    operator::{ BoundaryOperator, Direction, Family, Frame },
    ownership::{ Local, Ownership, OwnershipError, WorkUnit },
    site::SiteTensor,
    store::{ Allocation, BoundarySet, OperatorKey, OperatorStore, StoreError },
    symmetry::SectorIndex,
    update::{ pair_far_near, UpdateEngine },
    wigner::SQRT_3,
};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("error in sweep: {0}")]
    Store(#[from] StoreError),

    #[error("error in sweep: {0}")]
    Ownership(#[from] OwnershipError),

    #[error("error in sweep: {0}")]
    Pool(#[from] PoolError),

    /// Returned when the Hamiltonian and the sector bookkeeping disagree on
    /// the chain length.
    #[error("error in sweep: {0} orbitals for a chain of {1} sites")]
    SizeMismatch(usize, usize),

    /// Returned when no site can be absorbed to reach a boundary.
    #[error("error in sweep: boundary {0} cannot be reached {1}")]
    NoSite(usize, Direction),

    /// Returned when site tensors for the wrong site are supplied.
    #[error("error in sweep: got site tensors for site {0}, expected site {1}")]
    WrongSite(usize, usize),

    /// Returned when a boundary is not allocated for the requested direction.
    #[error("error in sweep: boundary {0} is not allocated {1}")]
    NotReady(usize, Direction),
}
use SweepError::*;
pub type SweepResult<T> = Result<T, SweepError>;

/// Stages of a boundary update, in build order.
const STAGES: [&[Family]; 6] = [
    &[Family::L],
    &[Family::S0, Family::S1, Family::F0, Family::F1],
    &[Family::A, Family::B, Family::C, Family::D],
    &[Family::Q],
    &[Family::X],
    &[Family::O],
];

/// Boundary operators of a whole chain plus everything needed to rebuild
/// them.
pub struct Environment<'a, I, H, A, W = Local>
where
    I: ?Sized,
    H: ?Sized,
{
    index: &'a I,
    ham: &'a H,
    config: EngineConfig,
    pool: ThreadPool,
    ownership: W,
    store: OperatorStore<A>,
}

impl<'a, I, H, A, W> Environment<'a, I, H, A, W>
where
    I: SectorIndex + ?Sized,
    H: Integrals + ?Sized,
    A: ComplexScalar,
    W: Ownership<A>,
{
    /// Create an environment with no boundary allocated.
    pub fn new(index: &'a I, ham: &'a H, config: EngineConfig, ownership: W)
        -> SweepResult<Self>
    {
        let n_sites = index.n_sites();
        if ham.n_orbitals() != n_sites {
            return Err(SizeMismatch(ham.n_orbitals(), n_sites));
        }
        let pool = config.build_pool()?;
        let store = OperatorStore::new(n_sites);
        Ok(Self { index, ham, config, pool, ownership, store })
    }

    pub fn index(&self) -> &'a I { self.index }

    pub fn integrals(&self) -> &'a H { self.ham }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn pool(&self) -> &ThreadPool { &self.pool }

    pub fn store(&self) -> &OperatorStore<A> { &self.store }

    /// Number of chain sites.
    pub fn n_sites(&self) -> usize { self.store.n_sites() }

    /// Lifecycle tag of a boundary.
    pub fn allocation(&self, boundary: usize) -> Allocation {
        self.store.allocation(boundary)
    }

    /// Allocate zeroed operators at `boundary` for `direction`.
    pub fn allocate(&mut self, boundary: usize, direction: Direction)
        -> SweepResult<()>
    {
        Ok(self.store.allocate(self.index, boundary, direction)?)
    }

    /// Release the operators at `boundary`.
    pub fn delete(&mut self, boundary: usize) -> SweepResult<()> {
        Ok(self.store.delete(boundary)?)
    }

    /// The operator set at `boundary`, if it was built for `direction`.
    pub fn set(&self, boundary: usize, direction: Direction)
        -> Option<&BoundarySet<A>>
    {
        self.store.set(boundary)
            .filter(|set| set.frame().direction == direction)
    }

    /// Rebuild the (already allocated) rightward set at `boundary`, absorbing
    /// site `boundary - 1` from the rightward set at `boundary - 1`.
    pub fn update_moving_right(
        &mut self,
        boundary: usize,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
    ) -> SweepResult<()>
    {
        self.build(boundary, Direction::MovingRight, up, down)
    }

    /// Rebuild the (already allocated) leftward set at `boundary`, absorbing
    /// site `boundary` from the leftward set at `boundary + 1`.
    pub fn update_moving_left(
        &mut self,
        boundary: usize,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
    ) -> SweepResult<()>
    {
        self.build(boundary, Direction::MovingLeft, up, down)
    }

    /// Like [`update_moving_right`][Self::update_moving_right], but first
    /// bring the boundary into the rightward state: a leftward set is
    /// released, and an unallocated boundary is allocated.
    pub fn update_moving_right_safe(
        &mut self,
        boundary: usize,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
    ) -> SweepResult<()>
    {
        self.prepare(boundary, Direction::MovingRight)?;
        self.build(boundary, Direction::MovingRight, up, down)
    }

    /// Like [`update_moving_left`][Self::update_moving_left], but first bring
    /// the boundary into the leftward state.
    pub fn update_moving_left_safe(
        &mut self,
        boundary: usize,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
    ) -> SweepResult<()>
    {
        self.prepare(boundary, Direction::MovingLeft)?;
        self.build(boundary, Direction::MovingLeft, up, down)
    }

    fn prepare(&mut self, boundary: usize, direction: Direction)
        -> SweepResult<()>
    {
        let want: Allocation = direction.into();
        let have = self.store.allocation(boundary);
        if have == want { return Ok(()); }
        if have != Allocation::Unallocated {
            debug!(boundary; "releasing operators of the opposite direction");
            self.store.delete(boundary)?;
        }
        self.store.allocate(self.index, boundary, direction)?;
        Ok(())
    }

    fn build(
        &mut self,
        boundary: usize,
        direction: Direction,
        up: &SiteTensor<A>,
        down: &SiteTensor<A>,
    ) -> SweepResult<()>
    {
        let frame = Frame::new(boundary, direction, self.store.n_sites());
        if boundary > frame.n_sites || frame.n_covered() == 0 {
            return Err(NoSite(boundary, direction));
        }
        let prev_b = frame.previous().ok_or(NoSite(boundary, direction))?;
        let site = frame.new_site();
        if up.site() != site { return Err(WrongSite(up.site(), site)); }
        if down.site() != site { return Err(WrongSite(down.site(), site)); }
        if self.store.allocation(boundary) != direction.into() {
            return Err(NotReady(boundary, direction));
        }
        if prev_b != frame.terminus()
            && self.store.allocation(prev_b) != direction.into()
        {
            return Err(NotReady(prev_b, direction));
        }

        let counts0 = linalg::stats::snapshot();
        let scratch_len = {
            let d = self.index.max_dim(boundary).max(self.index.max_dim(prev_b));
            d * d
        };
        let index = self.index;
        let ham = self.ham;
        let ownership = &self.ownership;
        let (prev, cur) = self.store.pair_mut(prev_b, boundary)?;
        let prev = prev.filter(|p| p.frame().direction == direction);
        let builder = Builder {
            engine: UpdateEngine::new(index),
            ham,
            frame,
            prev,
            up,
            down,
        };
        self.pool.install(|| -> SweepResult<()> {
            for stage in STAGES.iter() {
                builder.run_stage(stage, cur, ownership, scratch_len)?;
            }
            Ok(())
        })?;
        let counts = linalg::stats::snapshot() - counts0;
        let dir = direction.to_string();
        debug!(
            boundary,
            direction = dir.as_str(),
            operators = cur.len(),
            gemm = counts.gemm,
            axpy = counts.axpy;
            "built boundary operators"
        );
        Ok(())
    }
}

/// Read-only context for building the operators of one boundary.
struct Builder<'b, I: ?Sized, H: ?Sized, A> {
    engine: UpdateEngine<'b, I>,
    ham: &'b H,
    frame: Frame,
    prev: Option<&'b BoundarySet<A>>,
    up: &'b SiteTensor<A>,
    down: &'b SiteTensor<A>,
}

impl<I, H, A> Builder<'_, I, H, A>
where
    I: SectorIndex + ?Sized,
    H: Integrals + ?Sized,
    A: ComplexScalar,
{
    fn run_stage<W>(
        &self,
        families: &[Family],
        cur: &mut BoundarySet<A>,
        ownership: &W,
        scratch_len: usize,
    ) -> SweepResult<()>
    where W: Ownership<A>
    {
        let units: Vec<WorkUnit> =
            cur.keys().iter().enumerate()
            .filter(|(_, key)| families.contains(&key.family))
            .map(|(ordinal, key)| WorkUnit { key: *key, ordinal })
            .collect();
        let mine: Vec<OperatorKey> =
            units.iter()
            .filter(|u| ownership.owns(u))
            .map(|u| u.key)
            .collect();
        let mut ops = cur.check_out(&mine);
        {
            let cur: &BoundarySet<A> = cur;
            ops.par_iter_mut()
                .for_each_init(
                    || Scratch::new(scratch_len),
                    |scratch, (key, op)| self.build_one(key, op, cur, scratch),
                );
        }
        cur.check_in(ops);
        ownership.synchronize(cur, &units)?;
        Ok(())
    }

    fn prev_op(&self, family: Family, cnt2: usize, cnt3: usize, adjoint: bool)
        -> Option<&BoundaryOperator<A>>
    {
        self.prev.and_then(|p| p.find(family, cnt2, cnt3, adjoint))
    }

    fn g(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.ham.mx_element(i, j, k, l)
    }

    fn build_one(
        &self,
        key: &OperatorKey,
        op: &mut BoundaryOperator<A>,
        cur: &BoundarySet<A>,
        scratch: &mut Scratch<A>,
    ) {
        let (eng, up, down) = (&self.engine, self.up, self.down);
        let overlap = self.prev_op(Family::O, 0, 0, false);
        let (cnt2, adj) = (key.cnt2, key.adjoint);
        match key.family {
            Family::L if cnt2 == 0 =>
                eng.create_rank1(op, overlap, up, down, scratch),
            Family::L => {
                op.clear();
                let prev = self.prev_op(Family::L, cnt2 - 1, 0, adj);
                eng.update(op, prev, up, down, scratch);
            },
            Family::S0 | Family::S1 | Family::F0 | Family::F1 =>
                self.build_pair(key, op, scratch),
            Family::A | Family::B | Family::C | Family::D =>
                self.build_complementary(key, op, cur, scratch),
            Family::Q => self.build_q(key, op, scratch),
            Family::X => self.build_x(op, scratch),
            Family::O => eng.overlap(op, overlap, up, down, scratch),
        }
    }

    fn build_pair(
        &self,
        key: &OperatorKey,
        op: &mut BoundaryOperator<A>,
        scratch: &mut Scratch<A>,
    ) {
        let (eng, up, down) = (&self.engine, self.up, self.down);
        let (family, cnt2, cnt3, adj) = (key.family, key.cnt2, key.cnt3, key.adjoint);
        if cnt3 > 0 {
            op.clear();
            let prev = self.prev_op(family, cnt2, cnt3 - 1, adj);
            eng.update(op, prev, up, down, scratch);
        } else if cnt2 > 0 {
            let (far, _) = pair_far_near(family, adj, self.frame.direction);
            match self.prev_op(Family::L, cnt2 - 1, 0, far == Ladder::Create) {
                Some(rank1) => eng.make_pair(op, rank1, up, down, scratch),
                None => op.clear(),
            }
        } else {
            let overlap = self.prev_op(Family::O, 0, 0, false);
            eng.make_onsite_pair(op, overlap, up, down, scratch);
        }
    }

    // outside pair of a complementary key, lower site first
    fn outside(&self, cnt2: usize, cnt3: usize) -> (usize, usize) {
        let f = self.frame;
        match f.direction {
            Direction::MovingRight => (f.uncovered(cnt3), f.uncovered(cnt3 + cnt2)),
            Direction::MovingLeft => (f.uncovered(cnt3 + cnt2), f.uncovered(cnt3)),
        }
    }

    fn build_complementary(
        &self,
        key: &OperatorKey,
        op: &mut BoundaryOperator<A>,
        cur: &BoundarySet<A>,
        scratch: &mut Scratch<A>,
    ) {
        let (eng, up, down) = (&self.engine, self.up, self.down);
        let (family, cnt2, cnt3, adj) = (key.family, key.cnt2, key.cnt3, key.adjoint);
        op.clear();
        let prev = self.prev_op(family, cnt2, cnt3 + 1, adj);
        eng.update(op, prev, up, down, scratch);

        let f = self.frame;
        let (lo, hi) = self.outside(cnt2, cnt3);
        let y = f.covered(0);
        let g = |i, j, k, l| self.g(i, j, k, l);
        for num in 0..f.n_covered() {
            let x = f.covered(num);
            let (xl, xh) = (x.min(y), x.max(y));
            // (pair family, adjoint pair, coefficient)
            let mut parts: Vec<(Family, bool, f64)> = Vec::with_capacity(2);
            match family {
                Family::A => {
                    let c =
                        if xl < xh {
                            -(g(lo, hi, xh, xl) + g(lo, hi, xl, xh))
                        } else {
                            -g(lo, hi, x, x)
                        };
                    let half = if lo == hi { 0.5 } else { 1.0 };
                    parts.push((Family::S0, adj, half * c));
                },
                Family::B => {
                    if xl == xh { continue; }
                    let c = SQRT_3 * (g(lo, hi, xh, xl) - g(lo, hi, xl, xh));
                    parts.push((Family::S1, adj, c));
                },
                _ => {
                    let (pair, rank1) =
                        if family == Family::C { (Family::F0, false) } else { (Family::F1, true) };
                    let (t1, t2) = if adj { (hi, lo) } else { (lo, hi) };
                    let coef = |u, v| {
                        if rank1 {
                            let s = if adj { -SQRT_3 } else { SQRT_3 };
                            s * g(t1, u, v, t2)
                        } else {
                            2.0 * g(t1, u, t2, v) - g(t1, u, v, t2)
                        }
                    };
                    parts.push((pair, false, coef(xl, xh)));
                    if xl < xh {
                        let s = if rank1 { -1.0 } else { 1.0 };
                        parts.push((pair, true, s * coef(xh, xl)));
                    }
                },
            }
            for (pair, pair_adj, c) in parts {
                if c == 0.0 { continue; }
                let Some(p) = cur.find(pair, num, 0, pair_adj) else { continue; };
                if p.signature().irrep != op.signature().irrep { continue; }
                op.axpy(linalg::re(c), p);
            }
        }
    }

    fn build_q(
        &self,
        key: &OperatorKey,
        op: &mut BoundaryOperator<A>,
        scratch: &mut Scratch<A>,
    ) {
        use Ladder::*;
        let (eng, up, down) = (&self.engine, self.up, self.down);
        let (k, adj) = (key.cnt2, key.adjoint);
        op.clear();
        eng.update(op, self.prev_op(Family::Q, k + 1, 0, adj), up, down, scratch);

        let f = self.frame;
        let t = f.uncovered(k);
        let x = f.covered(0);
        let g = |i, j, m, l| self.g(i, j, m, l);
        let overlap = self.prev_op(Family::O, 0, 0, false);
        let (c, a) = (Leg(Create, 1), Leg(Annihilate, 1));
        // +1 moving right, -1 moving left
        let dir =
            match f.direction {
                Direction::MovingRight => 1.0,
                Direction::MovingLeft => -1.0,
            };

        // all three legs on the new site
        let gt = g(t, x, x, x);
        if adj {
            eng.add_local(op, overlap, LocalKind::Triple(c, c, 0, a), -gt, up, down, scratch);
        } else {
            eng.add_local(op, overlap, LocalKind::Triple(c, a, 0, a), 0.5 * gt, up, down, scratch);
            eng.add_local(
                op, overlap, LocalKind::Triple(c, a, 2, a), -0.5 * SQRT_3 * gt,
                up, down, scratch,
            );
        }

        // one leg on an older site z
        if let Some(pf) = f.previous_frame() {
            for l in 0..pf.n_covered() {
                let z = pf.covered(l);
                let hop = 2.0 * g(t, x, z, x) - g(t, x, x, z);
                let swap = g(t, x, x, z);
                // z annihilated
                if let Some(prev) = self.prev_op(Family::L, l, 0, false) {
                    if adj {
                        let kind = LocalKind::Pair(c, c, 0);
                        eng.add_local(op, Some(prev), kind, -swap, up, down, scratch);
                    } else {
                        let kind = LocalKind::Pair(c, a, 0);
                        eng.add_local(op, Some(prev), kind, hop, up, down, scratch);
                        let kind = LocalKind::Pair(c, a, 2);
                        let coef = -dir * SQRT_3 * swap;
                        eng.add_local(op, Some(prev), kind, coef, up, down, scratch);
                    }
                }
                // z created
                if let Some(prev) = self.prev_op(Family::L, l, 0, true) {
                    if adj {
                        let kind = LocalKind::Pair(c, a, 0);
                        eng.add_local(op, Some(prev), kind, hop, up, down, scratch);
                        let kind = LocalKind::Pair(c, a, 2);
                        let coef = dir * SQRT_3 * swap;
                        eng.add_local(op, Some(prev), kind, coef, up, down, scratch);
                    } else {
                        let kind = LocalKind::Pair(a, a, 0);
                        eng.add_local(op, Some(prev), kind, -swap, up, down, scratch);
                    }
                }
            }
        }

        // two legs on older sites, summed in the complementary operators of
        // the pair (new site, t)
        let (cr, an) = if adj { (Annihilate, Create) } else { (Create, Annihilate) };
        let mixed_adj =
            match f.direction {
                Direction::MovingRight => !adj,
                Direction::MovingLeft => adj,
            };
        for (family, ladder, pair_adj) in [
            (Family::A, cr, adj),
            (Family::B, cr, adj),
            (Family::C, an, mixed_adj),
            (Family::D, an, mixed_adj),
        ] {
            let Some(prev) = self.prev_op(family, k + 1, 0, pair_adj) else { continue; };
            let kind = LocalKind::Single(Leg(ladder, 1));
            eng.add_local(op, Some(prev), kind, 1.0, up, down, scratch);
        }
    }

    fn build_x(&self, op: &mut BoundaryOperator<A>, scratch: &mut Scratch<A>) {
        use Ladder::*;
        let (eng, up, down) = (&self.engine, self.up, self.down);
        op.clear();
        eng.update(op, self.prev_op(Family::X, 0, 0, false), up, down, scratch);

        let x = self.frame.covered(0);
        let overlap = self.prev_op(Family::O, 0, 0, false);
        let onsite = self.g(x, x, x, x);
        eng.add_local(op, overlap, LocalKind::Doubles(1), onsite, up, down, scratch);
        let (c, a) = (Leg(Create, 1), Leg(Annihilate, 1));

        // Q of the new site closed by one ladder operator on it
        for (adj, leg) in [(false, c), (true, a)] {
            let Some(q) = self.prev_op(Family::Q, 0, 0, adj) else { continue; };
            eng.add_local(op, Some(q), LocalKind::Single(leg), 1.0, up, down, scratch);
        }

        // complementary operators of the pair (new site, new site)
        let closures = [
            (Family::A, false, LocalKind::Pair(c, c, 0)),
            (Family::A, true, LocalKind::Pair(a, a, 0)),
            (Family::C, false, LocalKind::Pair(c, a, 0)),
            (Family::D, false, LocalKind::Pair(c, a, 2)),
        ];
        for (family, adj, kind) in closures {
            let Some(prev) = self.prev_op(family, 0, 0, adj) else { continue; };
            eng.add_local(op, Some(prev), kind, 1.0, up, down, scratch);
        }

        // one leg on an older site, three on the new one
        if let Some(pf) = self.frame.previous_frame() {
            for l in 0..pf.n_covered() {
                let z = pf.covered(l);
                let gz = self.g(x, x, x, z);
                if gz == 0.0 { continue; }
                if let Some(prev) = self.prev_op(Family::L, l, 0, false) {
                    let kind = LocalKind::Triple(c, c, 0, a);
                    eng.add_local(op, Some(prev), kind, -gz, up, down, scratch);
                }
                if let Some(prev) = self.prev_op(Family::L, l, 0, true) {
                    let kind = LocalKind::Triple(c, a, 0, a);
                    eng.add_local(op, Some(prev), kind, 0.5 * gz, up, down, scratch);
                    let kind = LocalKind::Triple(c, a, 2, a);
                    let coef = -0.5 * SQRT_3 * gz;
                    eng.add_local(op, Some(prev), kind, coef, up, down, scratch);
                }
            }
        }
    }
}
