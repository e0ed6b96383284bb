//! Action of the Hamiltonian on a two-site superblock.
//!
//! For a superblock on sites `s` and `s + 1`, the left boundary operators
//! (boundary `s`, built moving right) and the right boundary operators
//! (boundary `s + 2`, built moving left) are combined with site-local
//! operators on the two superblock orbitals, one [`Term`] at a time.
//!
//! The bra and ket bases of a bond may differ, so a term with no operator on
//! one side still has to carry its ket index over to the bra basis through
//! that side's overlap `O`. Terms are therefore collected into four
//! intermediates according to which sides they act on, and combined at the
//! end:
//! ```text
//! H|Ψ⟩ = UU + UD · O_Rᴴ + O_L · DU + O_L · DD · O_Rᴴ
//! ```
//! Right-set operators are stored as complex conjugates of their reduced
//! elements, so every right factor, the overlap included, enters conjugate
//! transposed. At a chain edge there is no operator set on that side and the
//! overlap is the identity.
//!
//! Output blocks are independent and are processed in parallel, each worker
//! keeping its own intermediates.

use log::{ debug, trace };
use num_traits::{ One, Zero };
use rayon::{ prelude::*, ThreadPool };
use thiserror::Error;
use crate::{
    ComplexScalar,
    diagrams::{ self, Geometry, Intermediate, OpRef, Term },
    integrals::Integrals,
    layout::Entry,
    linalg::{ self, Op, Scratch },
    local::{ LocalOp, TWO_SITE },
    operator::{ BoundaryOperator, Direction, Family, Frame },
    ownership::Ownership,
    store::{ BoundarySet, OperatorKey },
    superblock::{ SuperKey, SuperblockTensor },
    symmetry::{ Sector, SectorIndex },
    sweep::Environment,
    wigner::wigner9j,
};

#[derive(Debug, Error)]
pub enum HeffError {
    /// Returned when a superblock would extend past the end of the chain.
    #[error("error in effective Hamiltonian: superblock at site {0} does not fit in a chain of {1} sites")]
    SiteRange(usize, usize),

    /// Returned when the operators of a neighboring boundary have not been
    /// built in the required direction.
    #[error("error in effective Hamiltonian: no operators at boundary {0} {1}")]
    MissingSet(usize, Direction),

    /// Returned when an operator named by a term is not in its set.
    #[error("error in effective Hamiltonian: missing operator {0}")]
    MissingOperator(OperatorKey),

    /// Returned when a superblock tensor does not match the superblock.
    #[error("error in effective Hamiltonian: superblock tensor layout does not match site {0}")]
    LayoutMismatch(usize),
}
use HeffError::*;
pub type HeffResult<T> = Result<T, HeffError>;

/// The Hamiltonian restricted to one superblock position.
///
/// Holds borrows of the boundary operators on either side; rebuilding those
/// operators requires dropping this first.
pub struct EffectiveHamiltonian<'a, I: ?Sized, A> {
    index: &'a I,
    pool: &'a ThreadPool,
    geom: Geometry,
    left: Option<&'a BoundarySet<A>>,
    right: Option<&'a BoundarySet<A>>,
    terms: Vec<Term>,
    log_blocks: bool,
}

// a term with every lookup done
struct Resolved<'t, A> {
    slot: usize,
    left: Option<&'t BoundaryOperator<A>>,
    local: &'t LocalOp,
    right: Option<&'t BoundaryOperator<A>>,
    coef: f64,
}

fn slot(class: Intermediate) -> usize {
    match class {
        Intermediate::UU => 0,
        Intermediate::UD => 1,
        Intermediate::DU => 2,
        Intermediate::DD => 3,
    }
}

// per-worker buffers
struct Work<A> {
    inter: [Vec<A>; 4],
    tmp: Scratch<A>,
}

impl<A: ComplexScalar> Work<A> {
    fn new(len: usize) -> Self {
        Self {
            inter: [vec![], vec![], vec![], vec![]],
            tmp: Scratch::new(len),
        }
    }

    fn reset(&mut self, len: usize) {
        for buf in self.inter.iter_mut() {
            buf.clear();
            buf.resize(len, A::zero());
        }
    }
}

impl<'a, I, A> EffectiveHamiltonian<'a, I, A>
where
    I: SectorIndex + ?Sized,
    A: ComplexScalar,
{
    /// Set up the effective Hamiltonian for the superblock on sites `site`
    /// and `site + 1`.
    ///
    /// Requires the rightward set at boundary `site` (unless `site == 0`) and
    /// the leftward set at boundary `site + 2` (unless it is the right end of
    /// the chain).
    pub fn new<H, W>(env: &'a Environment<'a, I, H, A, W>, site: usize)
        -> HeffResult<Self>
    where
        H: Integrals + ?Sized,
        W: Ownership<A>,
    {
        let n_sites = env.n_sites();
        if site + 1 >= n_sites { return Err(SiteRange(site, n_sites)); }
        let geom = Geometry::new(site, n_sites);
        let left =
            if geom.at_left_edge() {
                None
            } else {
                let b = geom.left().boundary;
                Some(env.set(b, Direction::MovingRight)
                    .ok_or(MissingSet(b, Direction::MovingRight))?)
            };
        let right =
            if geom.at_right_edge() {
                None
            } else {
                let b = geom.right().boundary;
                Some(env.set(b, Direction::MovingLeft)
                    .ok_or(MissingSet(b, Direction::MovingLeft))?)
            };
        let terms = diagrams::terms(env.integrals(), geom, env.config().energy_offset());
        debug!(site, n_terms = terms.len(); "set up effective Hamiltonian");
        Ok(Self {
            index: env.index(),
            pool: env.pool(),
            geom,
            left,
            right,
            terms,
            log_blocks: env.config().logs_blocks(),
        })
    }

    /// First superblock site.
    pub fn site(&self) -> usize { self.geom.site }

    /// All terms, with their coefficients.
    pub fn terms(&self) -> &[Term] { &self.terms }

    /// A zero superblock tensor with the layout this operator acts on.
    pub fn new_vector(&self) -> SuperblockTensor<A> {
        SuperblockTensor::new(self.index, self.geom.site)
    }

    fn lookup(set: Option<&'a BoundarySet<A>>, frame: Frame, op: OpRef)
        -> HeffResult<&'a BoundaryOperator<A>>
    {
        let key = OperatorKey::new(frame, op.family, op.cnt2, op.cnt3, op.adjoint);
        set.and_then(|s| s.get(&key)).ok_or(MissingOperator(key))
    }

    fn resolve(&self) -> HeffResult<Vec<Resolved<'a, A>>> {
        let (lf, rf) = (self.geom.left(), self.geom.right());
        self.terms.iter()
            .map(|t| -> HeffResult<Resolved<'a, A>> {
                let left = t.left.map(|op| Self::lookup(self.left, lf, op)).transpose()?;
                let right = t.right.map(|op| Self::lookup(self.right, rf, op)).transpose()?;
                Ok(Resolved {
                    slot: slot(t.intermediate()),
                    left,
                    local: TWO_SITE.table(t.local),
                    right,
                    coef: t.coef,
                })
            })
            .collect()
    }

    fn overlap(set: Option<&'a BoundarySet<A>>, frame: Frame)
        -> Option<&'a BoundaryOperator<A>>
    {
        set.and_then(|s| s.get(&OperatorKey::scalar(frame, Family::O)))
    }

    /// `output ← output + H input`.
    ///
    /// *Panics if `output` does not have the layout of `input`.*
    pub fn apply(&self, input: &SuperblockTensor<A>, output: &mut SuperblockTensor<A>)
        -> HeffResult<()>
    {
        if input.site() != self.geom.site {
            return Err(LayoutMismatch(self.geom.site));
        }
        if !input.same_layout(output) { panic!("inconsistent dimensions"); }
        let resolved = self.resolve()?;
        let o_left = Self::overlap(self.left, self.geom.left());
        let o_right = Self::overlap(self.right, self.geom.right());
        let scratch_len = {
            let d = self.index.max_dim(self.geom.site)
                .max(self.index.max_dim(self.geom.site + 2));
            d * d
        };

        let counts0 = linalg::stats::snapshot();
        let mut blocks = output.blocks_mut();
        self.pool.install(|| {
            blocks.par_iter_mut()
                .for_each_init(
                    || Work::new(scratch_len),
                    |work, (entry, block)| {
                        self.block(entry, block, input, &resolved, o_left, o_right, work);
                    },
                );
        });
        let counts = linalg::stats::snapshot() - counts0;
        debug!(
            site = self.geom.site,
            blocks = blocks.len(),
            gemm = counts.gemm,
            axpy = counts.axpy;
            "applied effective Hamiltonian"
        );
        Ok(())
    }

    /// `⟨Ψ|H|Ψ⟩`.
    pub fn expectation(&self, psi: &SuperblockTensor<A>) -> HeffResult<A> {
        let mut h_psi = self.new_vector();
        self.apply(psi, &mut h_psi)?;
        Ok(psi.inner(&h_psi))
    }

    #[allow(clippy::too_many_arguments)]
    fn block(
        &self,
        entry: &Entry<SuperKey>,
        block: &mut [A],
        input: &SuperblockTensor<A>,
        terms: &[Resolved<'_, A>],
        o_left: Option<&BoundaryOperator<A>>,
        o_right: Option<&BoundaryOperator<A>>,
        work: &mut Work<A>,
    ) {
        let (lu, ju, ru) = entry.key;
        let (rows, cols) = (entry.rows, entry.cols);
        let len = rows * cols;
        work.reset(len);

        for term in terms.iter() {
            let two_kl = term.left.map(|op| op.signature().two_j).unwrap_or(0);
            let two_kr = term.right.map(|op| op.signature().two_j).unwrap_or(0);
            let two_kw = term.local.two_k();
            let odd_local = term.local.dn() % 2 != 0;
            let odd_right = term.right.map(|op| op.signature().is_odd()).unwrap_or(false);
            let lds: Vec<Sector> =
                match term.left {
                    Some(op) => op.signature().down_sectors(lu).collect(),
                    None => vec![lu],
                };
            let rds: Vec<Sector> =
                match term.right {
                    Some(op) => op.signature().down_sectors(ru).collect(),
                    None => vec![ru],
                };
            for (jd, w_loc) in term.local.from_bra(ju) {
                for &ld in lds.iter() {
                    let pl =
                        match term.left {
                            Some(op) => match op.block(lu, ld) {
                                Some(b) => Some(b),
                                None => continue,
                            },
                            None => None,
                        };
                    for &rd in rds.iter() {
                        let Some(psi) = input.block(&(ld, jd, rd)) else { continue; };
                        let pr =
                            match term.right {
                                Some(op) => match op.block(ru, rd) {
                                    Some(b) => Some(b),
                                    None => continue,
                                },
                                None => None,
                            };
                        let w =
                            ((((rd.two_s + 1) * (two_kr + 1)
                                * (lu.two_s + 1) * (ju.two_j + 1)) as f64).sqrt())
                            * wigner9j(
                                lu.two_s, ld.two_s, two_kl,
                                ju.two_j, jd.two_j, two_kw,
                                ru.two_s, rd.two_s, two_kr,
                            );
                        if w == 0.0 { continue; }
                        let mut n_cross = 0;
                        if odd_local { n_cross += ld.n; }
                        if odd_right { n_cross += ld.n + jd.n(); }
                        let sign = if n_cross % 2 == 0 { 1.0 } else { -1.0 };
                        let alpha: A = linalg::re(term.coef * w * w_loc * sign);
                        let acc_buf = &mut work.inter[term.slot][.. len];
                        match (pl, pr) {
                            (Some(pl), Some(pr)) => {
                                let dr = psi.ncols();
                                let buf = work.tmp.one(rows * dr);
                                let mut tmp = linalg::view_mut(buf, rows, dr);
                                linalg::gemm(
                                    A::one(), Op::N, &pl, Op::N, &psi,
                                    A::zero(), &mut tmp,
                                );
                                let tmp = linalg::view(buf, rows, dr);
                                let mut acc = linalg::view_mut(acc_buf, rows, cols);
                                linalg::gemm(alpha, Op::N, &tmp, Op::C, &pr, A::one(), &mut acc);
                            },
                            (Some(pl), None) => {
                                let mut acc = linalg::view_mut(acc_buf, rows, cols);
                                linalg::gemm(alpha, Op::N, &pl, Op::N, &psi, A::one(), &mut acc);
                            },
                            (None, Some(pr)) => {
                                let mut acc = linalg::view_mut(acc_buf, rows, cols);
                                linalg::gemm(alpha, Op::N, &psi, Op::C, &pr, A::one(), &mut acc);
                            },
                            (None, None) => {
                                let mut acc = linalg::view_mut(acc_buf, rows, cols);
                                acc.zip_apply(&psi, |a, b| { *a += alpha * b; });
                            },
                        }
                    }
                }
            }
        }

        let ol = o_left.and_then(|o| o.block(lu, lu));
        let or = o_right.and_then(|o| o.block(ru, ru));
        let mut out = linalg::view_mut(block, rows, cols);
        let one = A::one();
        let [uu, ud, du, dd] =
            [0, 1, 2, 3].map(|k| linalg::view(&work.inter[k], rows, cols));

        out += uu;
        match &or {
            Some(or) => linalg::gemm(one, Op::N, &ud, Op::C, or, one, &mut out),
            None => if o_right.is_none() { out += ud; },
        }
        match &ol {
            Some(ol) => linalg::gemm(one, Op::N, ol, Op::N, &du, one, &mut out),
            None => if o_left.is_none() { out += du; },
        }
        match (&ol, &or) {
            (Some(ol), Some(or)) => {
                let buf = work.tmp.one(len);
                let mut tmp = linalg::view_mut(buf, rows, cols);
                linalg::gemm(one, Op::N, ol, Op::N, &dd, A::zero(), &mut tmp);
                let tmp = linalg::view(buf, rows, cols);
                linalg::gemm(one, Op::N, &tmp, Op::C, or, one, &mut out);
            },
            (Some(ol), None) if o_right.is_none() =>
                linalg::gemm(one, Op::N, ol, Op::N, &dd, one, &mut out),
            (None, Some(or)) if o_left.is_none() =>
                linalg::gemm(one, Op::N, &dd, Op::C, or, one, &mut out),
            (None, None) if o_left.is_none() && o_right.is_none() => { out += dd; },
            // an overlap block is missing: the sector has no ket partner
            _ => { },
        }
        if self.log_blocks {
            let (left, right) = (lu.to_string(), ru.to_string());
            trace!(
                left = left.as_str(),
                n1 = ju.n1,
                n2 = ju.n2,
                two_j = ju.two_j,
                right = right.as_str(),
                rows,
                cols;
                "effective Hamiltonian block"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64 as C64;
    use rand::{ rngs::StdRng, SeedableRng };
    use crate::{
        config::EngineConfig,
        integrals::IntegralTable,
        ownership::Local,
        symmetry::SectorTable,
    };

    #[test]
    fn two_site_chain_is_exact() {
        // no boundary operators: H is the local Hamiltonian of two orbitals
        let t = SectorTable::fci(vec![0; 2], 1, Sector::new(2, 0, 0), 4).unwrap();
        let mut ham = IntegralTable::new(2, 2).unwrap();
        ham.set_two_body(0, 0, 0, 0, 2.0).unwrap();
        ham.set_two_body(1, 1, 1, 1, 3.0).unwrap();
        ham.set_econst(0.5);
        let config = EngineConfig::new().threads(2);
        let env: Environment<SectorTable, IntegralTable, C64> =
            Environment::new(&t, &ham, config, Local).unwrap();
        let heff = EffectiveHamiltonian::new(&env, 0).unwrap();
        assert!(heff.terms().iter().all(|t| t.left.is_none() && t.right.is_none()));

        let mut rng = StdRng::seed_from_u64(10546);
        let psi = SuperblockTensor::new_rand(&t, 0, &mut rng);
        let mut h_psi = heff.new_vector();
        heff.apply(&psi, &mut h_psi).unwrap();
        for e in psi.entries() {
            let (_, loc, _) = e.key;
            let mut diag = 0.5;
            if loc.n1 == 2 { diag += 2.0; }
            if loc.n2 == 2 { diag += 3.0; }
            let a = psi.block(&e.key).unwrap();
            let b = h_psi.block(&e.key).unwrap();
            for (x, y) in a.iter().zip(b.iter()) {
                assert_abs_diff_eq!(y.re, diag * x.re, epsilon = 1e-10);
                assert_abs_diff_eq!(y.im, 0.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn hermitian_on_two_sites() {
        let t = SectorTable::fci(vec![0; 2], 1, Sector::new(2, 0, 0), 4).unwrap();
        let mut ham = IntegralTable::new(2, 2).unwrap();
        ham.set_one_body(0, 1, -1.0).unwrap();
        ham.set_one_body(0, 0, 0.3).unwrap();
        ham.set_two_body(0, 0, 0, 0, 4.0).unwrap();
        ham.set_two_body(1, 1, 1, 1, 4.0).unwrap();
        ham.set_two_body(0, 1, 0, 1, 0.7).unwrap();
        let env: Environment<SectorTable, IntegralTable, C64> =
            Environment::new(&t, &ham, EngineConfig::new().threads(1), Local).unwrap();
        let heff = EffectiveHamiltonian::new(&env, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let a = SuperblockTensor::new_rand(&t, 0, &mut rng);
        let b = SuperblockTensor::new_rand(&t, 0, &mut rng);
        let mut ha = heff.new_vector();
        let mut hb = heff.new_vector();
        heff.apply(&a, &mut ha).unwrap();
        heff.apply(&b, &mut hb).unwrap();
        let x = b.inner(&ha);
        let y = hb.inner(&a);
        assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-10);
        assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-10);
    }

    #[test]
    fn apply_accumulates_into_output() {
        let t = SectorTable::fci(vec![0; 2], 1, Sector::new(2, 0, 0), 4).unwrap();
        let mut ham = IntegralTable::new(2, 2).unwrap();
        ham.set_one_body(0, 1, -1.0).unwrap();
        ham.set_two_body(0, 0, 0, 0, 2.5).unwrap();
        ham.set_econst(0.25);
        let env: Environment<SectorTable, IntegralTable, C64> =
            Environment::new(&t, &ham, EngineConfig::new().threads(2), Local).unwrap();
        let heff = EffectiveHamiltonian::new(&env, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(771);
        let psi = SuperblockTensor::new_rand(&t, 0, &mut rng);
        let start = SuperblockTensor::new_rand(&t, 0, &mut rng);

        let mut h_psi = heff.new_vector();
        heff.apply(&psi, &mut h_psi).unwrap();
        let mut out = start.clone();
        heff.apply(&psi, &mut out).unwrap();
        let mut expected = start.clone();
        expected.axpy(C64::new(1.0, 0.0), &h_psi);
        for e in out.entries() {
            let got = out.block(&e.key).unwrap();
            let want = expected.block(&e.key).unwrap();
            for (x, y) in got.iter().zip(want.iter()) {
                assert_abs_diff_eq!(x.re, y.re, epsilon = 1e-10);
                assert_abs_diff_eq!(x.im, y.im, epsilon = 1e-10);
            }
        }

        // the expectation value does not depend on what the caller holds
        let e = heff.expectation(&psi).unwrap();
        assert_abs_diff_eq!(e.re, psi.inner(&h_psi).re, epsilon = 1e-10);
    }

    #[test]
    fn missing_neighbors_are_errors() {
        let t = SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 2).unwrap();
        let ham = IntegralTable::new(4, 4).unwrap();
        let env: Environment<SectorTable, IntegralTable, C64> =
            Environment::new(&t, &ham, EngineConfig::new().threads(1), Local).unwrap();
        assert!(matches!(EffectiveHamiltonian::new(&env, 3), Err(SiteRange(3, 4))));
        assert!(matches!(
            EffectiveHamiltonian::new(&env, 1),
            Err(MissingSet(1, Direction::MovingRight)),
        ));
        assert!(matches!(
            EffectiveHamiltonian::new(&env, 0),
            Err(MissingSet(2, Direction::MovingLeft)),
        ));
    }
}
