//! The term list of the effective Hamiltonian.
//!
//! Every contribution to `H |Ψ⟩` on a superblock is a product of at most three
//! factors: an operator from the left set, a site-local operator on the two
//! superblock orbitals, and an operator from the right set, weighted by a
//! coefficient built from the Hamiltonian elements. [`terms`] lists them all
//! for one superblock position as plain data; the evaluation in
//! [`heff`][crate::heff] never needs to know which diagram it is working on.
//!
//! Terms are named after the diagram they implement, grouped by how many
//! legs fall in each region:
//!
//! | legs (left, local, right) | diagrams |
//! |---|---|
//! | (0, 4, 0) | 0A, 1C, 1D, 2d, 3E, 3H |
//! | (4, 0, 0), (0, 0, 4) | 1A, 1B |
//! | (2, 2, 0), (0, 2, 2) | 2b1-2b3, 2c1-2c3; 2e1-2e3, 2f1-2f3 |
//! | (3, 1, 0), (0, 1, 3) | 3A, 3B; 3K, 3L |
//! | (1, 3, 0), (0, 3, 1) | 3D, 3I, 4D, 4I; 3F, 3G, 4G, 4J |
//! | (2, 0, 2) | 2a1, 2a2, 2a3 |
//! | (3, 0, 1), (1, 0, 3) | 3C, 3J |
//! | (2, 1, 1), (1, 1, 2) | 4B, 4C; 4K, 4L |
//! | (1, 2, 1) | 4E, 4H, 5A-5F |
//!
//! Orbital `1` of the local factor is site `s`, orbital `2` is site `s + 1`.
//! Local legs are listed in site order, creators first within a site, and
//! the three factors of a term are coupled left to right:
//! `[[L ⊗ W]^kR ⊗ R]^0`.

use itertools::iproduct;
use crate::{
    integrals::Integrals,
    local::{ Ladder::{ self, * }, Leg, LocalKind },
    operator::{ Direction, Family, Frame },
    triangle::Triangle,
    wigner::SQRT_3,
};

/// An operator of a boundary set, named by family and position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpRef {
    pub family: Family,
    pub cnt2: usize,
    pub cnt3: usize,
    pub adjoint: bool,
}

impl OpRef {
    pub fn new(family: Family, cnt2: usize, cnt3: usize, adjoint: bool) -> Self {
        Self { family, cnt2, cnt3, adjoint }
    }

    fn single(family: Family, k: usize, adjoint: bool) -> Self {
        Self::new(family, k, 0, adjoint)
    }
}

/// Which of the four intermediates a term accumulates into.
///
/// The first letter refers to the left bond, the second to the right bond:
/// `U` if an operator acts there (the term's row or column lives in the bra
/// space), `D` if not (it lives in the ket space and must still be carried
/// over by the overlap).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Intermediate {
    UU,
    UD,
    DU,
    DD,
}

/// One contribution to the effective Hamiltonian.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Term {
    pub name: &'static str,
    pub left: Option<OpRef>,
    pub local: LocalKind,
    pub right: Option<OpRef>,
    pub coef: f64,
}

impl Term {
    pub fn intermediate(&self) -> Intermediate {
        match (self.left.is_some(), self.right.is_some()) {
            (true, true) => Intermediate::UU,
            (true, false) => Intermediate::UD,
            (false, true) => Intermediate::DU,
            (false, false) => Intermediate::DD,
        }
    }
}

/// Position of a superblock on the chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// First superblock site.
    pub site: usize,
    pub n_sites: usize,
}

impl Geometry {
    pub fn new(site: usize, n_sites: usize) -> Self { Self { site, n_sites } }

    /// Frame of the left operator set, at boundary `site`.
    pub fn left(&self) -> Frame {
        Frame::new(self.site, Direction::MovingRight, self.n_sites)
    }

    /// Frame of the right operator set, at boundary `site + 2`.
    pub fn right(&self) -> Frame {
        Frame::new(self.site + 2, Direction::MovingLeft, self.n_sites)
    }

    /// `true` if no sites lie left of the superblock.
    pub fn at_left_edge(&self) -> bool { self.site == 0 }

    /// `true` if no sites lie right of the superblock.
    pub fn at_right_edge(&self) -> bool { self.site + 2 >= self.n_sites }
}

fn leg(ladder: Ladder, orb: u8) -> Leg { Leg(ladder, orb) }

fn single(ladder: Ladder, orb: u8) -> LocalKind { LocalKind::Single(leg(ladder, orb)) }

fn pair(a: Ladder, oa: u8, b: Ladder, ob: u8, two_k: i32) -> LocalKind {
    LocalKind::Pair(leg(a, oa), leg(b, ob), two_k)
}

fn triple(a: Leg, b: Leg, two_k: i32, c: Leg) -> LocalKind {
    LocalKind::Triple(a, b, two_k, c)
}

// Three local legs and one leg on an outside site `o`, which lies on either
// side of the superblock: (outside leg created, legs on orbital 1, local
// kind, coefficient).
fn three_leg<G>(g: &G, o: usize, p: usize, q: usize) -> [(bool, usize, LocalKind, f64); 20]
where G: Fn(usize, usize, usize, usize) -> f64
{
    let (cp, ap) = (leg(Create, 1), leg(Annihilate, 1));
    let (cq, aq) = (leg(Create, 2), leg(Annihilate, 2));
    let h = 0.5 * SQRT_3;
    [
        (false, 3, triple(cp, cp, 0, ap), -g(o, p, p, p)),
        (false, 2, triple(cp, cp, 0, aq), -g(o, p, p, q)),
        (false, 2, triple(cp, ap, 0, cq), 2.0 * g(o, p, q, p) - g(o, p, p, q)),
        (false, 2, triple(cp, ap, 2, cq), SQRT_3 * g(o, p, p, q)),
        (false, 1, triple(cp, cq, 0, aq), -g(o, p, q, q) - g(o, q, p, q)),
        (false, 1, triple(cp, cq, 2, aq), SQRT_3 * (g(o, q, p, q) - g(o, p, q, q))),
        (false, 1, triple(ap, cq, 0, cq), 0.5 * g(o, p, q, q)),
        (false, 1, triple(ap, cq, 2, cq), -h * g(o, p, q, q)),
        (false, 0, triple(cq, cq, 0, aq), -g(o, q, q, q)),
        (true, 3, triple(cp, ap, 0, ap), 0.5 * g(o, p, p, p)),
        (true, 3, triple(cp, ap, 2, ap), -h * g(o, p, p, p)),
        (true, 2, triple(cp, ap, 0, aq), 2.0 * g(o, p, q, p) - g(o, p, p, q)),
        (true, 2, triple(cp, ap, 2, aq), -SQRT_3 * g(o, p, p, q)),
        (true, 2, triple(ap, ap, 0, cq), -g(o, p, p, q)),
        (true, 1, triple(cp, aq, 0, aq), 0.5 * g(o, p, q, q)),
        (true, 1, triple(cp, aq, 2, aq), -h * g(o, p, q, q)),
        (true, 1, triple(ap, cq, 0, aq), 2.0 * g(o, p, q, q) - g(o, q, p, q)),
        (true, 1, triple(ap, cq, 2, aq), SQRT_3 * g(o, q, p, q)),
        (true, 0, triple(cq, aq, 0, aq), 0.5 * g(o, q, q, q)),
        (true, 0, triple(cq, aq, 2, aq), -h * g(o, q, q, q)),
    ]
}

// Two local legs between a left site `z` and a right site `r`: (left leg
// created, right leg created, name, local kind, coefficient).
fn crossing<G>(g: &G, z: usize, p: usize, q: usize, r: usize)
    -> [(bool, bool, &'static str, LocalKind, f64); 24]
where G: Fn(usize, usize, usize, usize) -> f64
{
    let (cp, ap) = (leg(Create, 1), leg(Annihilate, 1));
    let (cq, aq) = (leg(Create, 2), leg(Annihilate, 2));
    let pr = |a: Leg, b: Leg, two_k: i32| LocalKind::Pair(a, b, two_k);
    let hop = |u, v| 2.0 * g(z, u, r, v);
    let pair0 = -g(z, p, q, r) - g(z, q, p, r);
    let pair1 = SQRT_3 * (g(z, q, p, r) - g(z, p, q, r));
    [
        (false, false, "4E", pr(cp, cp, 0), -g(z, p, p, r)),
        (false, false, "5A", pr(cp, cq, 0), pair0),
        (false, false, "5B", pr(cp, cq, 2), pair1),
        (false, false, "4H", pr(cq, cq, 0), -g(z, q, q, r)),
        (false, true, "4E", pr(cp, ap, 0), hop(p, p) - g(z, p, p, r)),
        (false, true, "4E", pr(cp, ap, 2), SQRT_3 * g(z, p, p, r)),
        (false, true, "5E", pr(cp, aq, 0), hop(p, q) - g(z, q, p, r)),
        (false, true, "5E", pr(cp, aq, 2), SQRT_3 * g(z, q, p, r)),
        (false, true, "5F", pr(ap, cq, 0), hop(p, q) - g(z, p, q, r)),
        (false, true, "5F", pr(ap, cq, 2), -SQRT_3 * g(z, p, q, r)),
        (false, true, "4H", pr(cq, aq, 0), hop(q, q) - g(z, q, q, r)),
        (false, true, "4H", pr(cq, aq, 2), SQRT_3 * g(z, q, q, r)),
        (true, false, "4E", pr(cp, ap, 0), hop(p, p) - g(z, p, p, r)),
        (true, false, "4E", pr(cp, ap, 2), -SQRT_3 * g(z, p, p, r)),
        (true, false, "5E", pr(cp, aq, 0), hop(p, q) - g(z, p, q, r)),
        (true, false, "5E", pr(cp, aq, 2), -SQRT_3 * g(z, p, q, r)),
        (true, false, "5F", pr(ap, cq, 0), hop(p, q) - g(z, q, p, r)),
        (true, false, "5F", pr(ap, cq, 2), SQRT_3 * g(z, q, p, r)),
        (true, false, "4H", pr(cq, aq, 0), hop(q, q) - g(z, q, q, r)),
        (true, false, "4H", pr(cq, aq, 2), -SQRT_3 * g(z, q, q, r)),
        (true, true, "4E", pr(ap, ap, 0), -g(z, p, p, r)),
        (true, true, "5C", pr(ap, aq, 0), pair0),
        (true, true, "5D", pr(ap, aq, 2), pair1),
        (true, true, "4H", pr(aq, aq, 0), -g(z, q, q, r)),
    ]
}

struct Collector {
    terms: Vec<Term>,
}

impl Collector {
    fn push(
        &mut self,
        name: &'static str,
        left: Option<OpRef>,
        local: LocalKind,
        right: Option<OpRef>,
        coef: f64,
    ) {
        if coef != 0.0 { self.terms.push(Term { name, left, local, right, coef }); }
    }
}

/// All terms of the effective Hamiltonian for the superblock at `geom`, with
/// their coefficients evaluated. Terms with zero coefficient are dropped;
/// `offset` is added to the constant term.
pub fn terms<H>(ham: &H, geom: Geometry, offset: f64) -> Vec<Term>
where H: Integrals + ?Sized
{
    let g = |i: usize, j: usize, k: usize, l: usize| ham.mx_element(i, j, k, l);
    let lf = geom.left();
    let rf = geom.right();
    let (p, q) = (geom.site, geom.site + 1);
    let orb_site = [p, q];
    let nl = if geom.at_left_edge() { 0 } else { lf.n_covered() };
    let nr = if geom.at_right_edge() { 0 } else { rf.n_covered() };
    let has_left = nl > 0;
    let has_right = nr > 0;
    let mut c = Collector { terms: Vec::new() };
    let l = |family, cnt2, cnt3, adj| Some(OpRef::new(family, cnt2, cnt3, adj));

    // (0, 4, 0)
    c.push("0A", None, LocalKind::Identity, None, ham.econst() + offset);
    for (a, b, cc, d) in iproduct!(0..2_u8, 0..2_u8, 0..2_u8, 0..2_u8) {
        let n_first = [a, b, cc, d].iter().filter(|x| **x == 0).count();
        let name =
            match n_first {
                4 => "1C",
                0 => "1D",
                3 => "3E",
                1 => "3H",
                _ => "2d",
            };
        let coef = g(
            orb_site[a as usize],
            orb_site[b as usize],
            orb_site[cc as usize],
            orb_site[d as usize],
        );
        c.push(name, None, LocalKind::Interaction([a + 1, b + 1, cc + 1, d + 1]), None, coef);
    }

    // (4, 0, 0), (0, 0, 4)
    if has_left { c.push("1A", l(Family::X, 0, 0, false), LocalKind::Identity, None, 1.0); }
    if has_right { c.push("1B", None, LocalKind::Identity, l(Family::X, 0, 0, false), 1.0); }

    // (2, 2, 0): complementary operators of the left set; [0][0] is (p, p),
    // [0][1] is (q, q), [1][0] is (p, q)
    if has_left {
        let keys = [(0, 0, 1, 1, ["2b1", "2c1"]), (0, 1, 2, 2, ["2b2", "2c2"]), (1, 0, 1, 2, ["2b3", "2c3"])];
        for (cnt2, cnt3, o1, o2, [nb, nc]) in keys {
            c.push(nb, l(Family::A, cnt2, cnt3, false), pair(Create, o1, Create, o2, 0), None, 1.0);
            c.push(nb, l(Family::A, cnt2, cnt3, true), pair(Annihilate, o1, Annihilate, o2, 0), None, 1.0);
            c.push(nc, l(Family::C, cnt2, cnt3, false), pair(Create, o1, Annihilate, o2, 0), None, 1.0);
            c.push(nc, l(Family::D, cnt2, cnt3, false), pair(Create, o1, Annihilate, o2, 2), None, 1.0);
            if o1 != o2 {
                c.push(nb, l(Family::B, cnt2, cnt3, false), pair(Create, o1, Create, o2, 2), None, 1.0);
                c.push(nb, l(Family::B, cnt2, cnt3, true), pair(Annihilate, o1, Annihilate, o2, 2), None, 1.0);
                c.push(nc, l(Family::C, cnt2, cnt3, true), pair(Annihilate, o1, Create, o2, 0), None, 1.0);
                c.push(nc, l(Family::D, cnt2, cnt3, true), pair(Annihilate, o1, Create, o2, 2), None, 1.0);
            }
        }
    }

    // (0, 2, 2): right set; [0][0] is (q, q), [0][1] is (p, p), [1][0] is (p, q)
    if has_right {
        let keys = [(0, 0, 2, 2, ["2e1", "2f1"]), (0, 1, 1, 1, ["2e2", "2f2"]), (1, 0, 1, 2, ["2e3", "2f3"])];
        for (cnt2, cnt3, o1, o2, [ne, nf]) in keys {
            c.push(ne, None, pair(Create, o1, Create, o2, 0), l(Family::A, cnt2, cnt3, false), 1.0);
            c.push(ne, None, pair(Annihilate, o1, Annihilate, o2, 0), l(Family::A, cnt2, cnt3, true), 1.0);
            c.push(nf, None, pair(Create, o1, Annihilate, o2, 0), l(Family::C, cnt2, cnt3, false), 1.0);
            c.push(nf, None, pair(Create, o1, Annihilate, o2, 2), l(Family::D, cnt2, cnt3, false), 1.0);
            if o1 != o2 {
                c.push(ne, None, pair(Create, o1, Create, o2, 2), l(Family::B, cnt2, cnt3, false), 1.0);
                c.push(ne, None, pair(Annihilate, o1, Annihilate, o2, 2), l(Family::B, cnt2, cnt3, true), 1.0);
                c.push(nf, None, pair(Annihilate, o1, Create, o2, 0), l(Family::C, cnt2, cnt3, true), 1.0);
                c.push(nf, None, pair(Annihilate, o1, Create, o2, 2), l(Family::D, cnt2, cnt3, true), 1.0);
            }
        }
    }

    // (3, 1, 0), (0, 1, 3)
    if has_left {
        for (k, orb, name) in [(0, 1, "3A"), (1, 2, "3B")] {
            c.push(name, Some(OpRef::single(Family::Q, k, false)), single(Create, orb), None, 1.0);
            c.push(name, Some(OpRef::single(Family::Q, k, true)), single(Annihilate, orb), None, 1.0);
        }
    }
    if has_right {
        for (k, orb, name) in [(0, 2, "3K"), (1, 1, "3L")] {
            c.push(name, None, single(Create, orb), Some(OpRef::single(Family::Q, k, false)), 1.0);
            c.push(name, None, single(Annihilate, orb), Some(OpRef::single(Family::Q, k, true)), 1.0);
        }
    }

    // (1, 3, 0): one leg on a left site z
    for k in 0..nl {
        let z = lf.covered(k);
        for (created, on_p, local, coef) in three_leg(&g, z, p, q) {
            let name = ["3I", "4I", "4D", "3D"][on_p];
            c.push(name, Some(OpRef::single(Family::L, k, created)), local, None, coef);
        }
    }

    // (0, 3, 1): one leg on a right site r
    for k in 0..nr {
        let r = rf.covered(k);
        for (created, on_p, local, coef) in three_leg(&g, r, p, q) {
            let name = ["3F", "4G", "4J", "3G"][on_p];
            c.push(name, None, local, Some(OpRef::single(Family::L, k, created)), coef);
        }
    }

    if has_left && has_right {
        // (2, 0, 2): left complementary operators of right pairs
        for (cnt2, cnt3) in Triangle::new(nr).iter() {
            let id = LocalKind::Identity;
            let lc = cnt3 + 2;
            c.push("2a1", l(Family::A, cnt2, lc, false), id, l(Family::S0, cnt2, cnt3, true), 1.0);
            c.push("2a1", l(Family::A, cnt2, lc, true), id, l(Family::S0, cnt2, cnt3, false), 1.0);
            c.push("2a3", l(Family::C, cnt2, lc, false), id, l(Family::F0, cnt2, cnt3, false), 1.0);
            c.push("2a3", l(Family::D, cnt2, lc, false), id, l(Family::F1, cnt2, cnt3, false), 1.0);
            if cnt2 > 0 {
                c.push("2a2", l(Family::B, cnt2, lc, false), id, l(Family::S1, cnt2, cnt3, true), 1.0);
                c.push("2a2", l(Family::B, cnt2, lc, true), id, l(Family::S1, cnt2, cnt3, false), 1.0);
                c.push("2a3", l(Family::C, cnt2, lc, true), id, l(Family::F0, cnt2, cnt3, true), 1.0);
                c.push("2a3", l(Family::D, cnt2, lc, true), id, l(Family::F1, cnt2, cnt3, true), 1.0);
            }
        }

        // (3, 0, 1) and (1, 0, 3)
        for k in 0..nr {
            c.push("3C", Some(OpRef::single(Family::Q, k + 2, false)), LocalKind::Identity,
                Some(OpRef::single(Family::L, k, true)), 1.0);
            c.push("3C", Some(OpRef::single(Family::Q, k + 2, true)), LocalKind::Identity,
                Some(OpRef::single(Family::L, k, false)), 1.0);
        }
        for k in 0..nl {
            c.push("3J", Some(OpRef::single(Family::L, k, false)), LocalKind::Identity,
                Some(OpRef::single(Family::Q, k + 2, true)), 1.0);
            c.push("3J", Some(OpRef::single(Family::L, k, true)), LocalKind::Identity,
                Some(OpRef::single(Family::Q, k + 2, false)), 1.0);
        }

        // (2, 1, 1): left complementary operators of (p, r) and (q, r)
        for k in 0..nr {
            let rk = Some(OpRef::single(Family::L, k, false));
            let rt = Some(OpRef::single(Family::L, k, true));
            for (cnt2, cnt3, orb) in [(k + 2, 0, 1), (k + 1, 1, 2)] {
                for family in [Family::A, Family::B] {
                    c.push("4B", l(family, cnt2, cnt3, false), single(Create, orb), rt, 1.0);
                    c.push("4B", l(family, cnt2, cnt3, true), single(Annihilate, orb), rk, 1.0);
                }
                for family in [Family::C, Family::D] {
                    c.push("4C", l(family, cnt2, cnt3, false), single(Create, orb), rk, 1.0);
                    c.push("4C", l(family, cnt2, cnt3, true), single(Annihilate, orb), rt, 1.0);
                }
            }
        }

        // (1, 1, 2): right complementary operators of (z, q) and (z, p)
        for k in 0..nl {
            let lk = Some(OpRef::single(Family::L, k, false));
            let lt = Some(OpRef::single(Family::L, k, true));
            for (cnt2, cnt3, orb) in [(k + 2, 0, 2), (k + 1, 1, 1)] {
                for family in [Family::A, Family::B] {
                    c.push("4K", lt, single(Create, orb), l(family, cnt2, cnt3, false), 1.0);
                    c.push("4K", lk, single(Annihilate, orb), l(family, cnt2, cnt3, true), 1.0);
                }
                for family in [Family::C, Family::D] {
                    c.push("4L", lt, single(Annihilate, orb), l(family, cnt2, cnt3, false), 1.0);
                    c.push("4L", lk, single(Create, orb), l(family, cnt2, cnt3, true), 1.0);
                }
            }
        }

        // (1, 2, 1): one leg on each side
        for (kl, kr) in iproduct!(0..nl, 0..nr) {
            let (z, r) = (lf.covered(kl), rf.covered(kr));
            for (zc, rc, name, local, coef) in crossing(&g, z, p, q, r) {
                let left = Some(OpRef::single(Family::L, kl, zc));
                let right = Some(OpRef::single(Family::L, kr, rc));
                c.push(name, left, local, right, coef);
            }
        }
    }
    c.terms
}
