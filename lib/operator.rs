//! Block-sparse renormalized operators living on one boundary.
//!
//! A [`BoundaryOperator`] represents an operator acting on all sites on one
//! side of a boundary, expressed in the reduced (spin-stripped) basis of the
//! virtual bond there. Its blocks are keyed by an *up* (bra) sector and a
//! *down* (ket) sector at the same boundary, both labelled the way bond
//! sectors always are: by the quantum numbers of the sites to the left.
//!
//! Which blocks exist is fixed entirely by the operator's [`Signature`] and
//! the [`SectorIndex`]: a block is present iff both sector dimensions are
//! nonzero, the particle numbers and irreps differ by the signature's shifts,
//! and the spins satisfy the triangle rule with the operator's rank.

use std::fmt;
use num_traits::Zero;
use crate::{
    ComplexScalar,
    layout::{ Entry, Layout },
    linalg::{ self, View, ViewMut },
    symmetry::{ direct_prod, Sector, SectorIndex },
    wigner,
};

/// Direction of the sweep that builds an operator set.
///
/// Operators built while moving right cover the sites left of their boundary;
/// operators built while moving left cover the sites right of it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    MovingRight,
    MovingLeft,
}

impl Direction {
    /// The other direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::MovingRight => Self::MovingLeft,
            Self::MovingLeft => Self::MovingRight,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MovingRight => write!(f, "moving-right"),
            Self::MovingLeft => write!(f, "moving-left"),
        }
    }
}

/// Boundary-relative coordinates for one sweep direction.
///
/// The *covered* region is the side of the boundary summarized by operators
/// built in this direction; the *uncovered* region is the other side. Sites
/// in either region are counted outward from the boundary, so that one
/// algorithm serves both directions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub boundary: usize,
    pub direction: Direction,
    pub n_sites: usize,
}

impl Frame {
    pub fn new(boundary: usize, direction: Direction, n_sites: usize) -> Self {
        Self { boundary, direction, n_sites }
    }

    /// Number of covered sites.
    pub fn n_covered(&self) -> usize {
        match self.direction {
            Direction::MovingRight => self.boundary,
            Direction::MovingLeft => self.n_sites - self.boundary,
        }
    }

    /// Number of uncovered sites.
    pub fn n_uncovered(&self) -> usize { self.n_sites - self.n_covered() }

    /// Covered site `k` steps from the boundary.
    pub fn covered(&self, k: usize) -> usize {
        match self.direction {
            Direction::MovingRight => self.boundary - 1 - k,
            Direction::MovingLeft => self.boundary + k,
        }
    }

    /// Uncovered site `k` steps from the boundary.
    pub fn uncovered(&self, k: usize) -> usize {
        match self.direction {
            Direction::MovingRight => self.boundary + k,
            Direction::MovingLeft => self.boundary - 1 - k,
        }
    }

    /// Steps from the boundary to an uncovered site, if it is uncovered.
    pub fn uncovered_offset(&self, site: usize) -> Option<usize> {
        match self.direction {
            Direction::MovingRight =>
                site.checked_sub(self.boundary).filter(|_| site < self.n_sites),
            Direction::MovingLeft =>
                (site < self.boundary).then(|| self.boundary - 1 - site),
        }
    }

    /// Steps from the boundary to a covered site, if it is covered.
    pub fn covered_offset(&self, site: usize) -> Option<usize> {
        match self.direction {
            Direction::MovingRight =>
                (site < self.boundary).then(|| self.boundary - 1 - site),
            Direction::MovingLeft =>
                site.checked_sub(self.boundary).filter(|_| site < self.n_sites),
        }
    }

    /// The boundary one step back along the sweep, whose operators are
    /// extended to build this one's.
    pub fn previous(&self) -> Option<usize> {
        match self.direction {
            Direction::MovingRight => self.boundary.checked_sub(1),
            Direction::MovingLeft =>
                (self.boundary < self.n_sites).then(|| self.boundary + 1),
        }
    }

    /// Frame of the previous boundary.
    pub fn previous_frame(&self) -> Option<Frame> {
        self.previous().map(|b| Frame { boundary: b, ..*self })
    }

    /// The site absorbed when stepping from the previous boundary to this
    /// one.
    pub fn new_site(&self) -> usize { self.covered(0) }

    /// The boundary at the far end of the covered region, which carries only
    /// the vacuum (moving right) or the target sector (moving left).
    pub fn terminus(&self) -> usize {
        match self.direction {
            Direction::MovingRight => 0,
            Direction::MovingLeft => self.n_sites,
        }
    }
}

/// Operator families.
///
/// Within a covered region, with `x` the site farther from the boundary, and
/// `lo`, `hi` the lower and higher site of a pair:
/// - `L`: `ã_x` (rank ½)
/// - `S0`, `S1`: `[ã_lo ã_hi]^k` for `k = 0, 1`
/// - `F0`, `F1`: `[c†_lo ã_hi]^k`
/// - `A`, `B`: integral-weighted sums of `S0`, `S1` for a pair of uncovered
///   sites
/// - `C`, `D`: integral-weighted sums of `F0`, `F1` and their adjoints for a
///   pair of uncovered sites
/// - `Q`: integral-weighted three-leg sum for one uncovered site (rank ½)
/// - `X`: every Hamiltonian term supported inside the region
/// - `O`: overlap between the bra and ket bases
///
/// Each family except `X` and `O` also exists as an adjoint variant, with
/// every leg replaced by its adjoint and the site order kept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    L,
    S0,
    S1,
    F0,
    F1,
    A,
    B,
    C,
    D,
    Q,
    X,
    O,
}

impl Family {
    /// Every family, in build order.
    pub const ALL: [Family; 12] = [
        Self::L,
        Self::S0, Self::S1, Self::F0, Self::F1,
        Self::A, Self::B, Self::C, Self::D,
        Self::Q,
        Self::X,
        Self::O,
    ];

    /// Doubled spin rank.
    pub fn two_j(self) -> i32 {
        match self {
            Self::L | Self::Q => 1,
            Self::S1 | Self::F1 | Self::B | Self::D => 2,
            _ => 0,
        }
    }

    /// Number of particles created inside the covered region.
    pub fn n_elec(self, adjoint: bool) -> i32 {
        let dn =
            match self {
                Self::L | Self::Q => -1,
                Self::S0 | Self::S1 | Self::A | Self::B => -2,
                _ => 0,
            };
        if adjoint { -dn } else { dn }
    }

    /// Return `true` if the family has a distinct adjoint variant.
    pub fn has_adjoint(self) -> bool { !matches!(self, Self::X | Self::O) }

    /// Return `true` for the complementary families `A`, `B`, `C`, `D`.
    pub fn is_complementary(self) -> bool {
        matches!(self, Self::A | Self::B | Self::C | Self::D)
    }

    /// Return `true` for the same-region pair families.
    pub fn is_pair(self) -> bool {
        matches!(self, Self::S0 | Self::S1 | Self::F0 | Self::F1)
    }
}

/// Quantum-number signature of a [`BoundaryOperator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub family: Family,
    /// Doubled spin rank.
    pub two_j: i32,
    /// Particles created inside the covered region.
    pub n_elec: i32,
    /// Irrep carried by the operator.
    pub irrep: usize,
    pub boundary: usize,
    pub direction: Direction,
    pub adjoint: bool,
}

impl Signature {
    pub fn new(
        family: Family,
        adjoint: bool,
        irrep: usize,
        boundary: usize,
        direction: Direction,
    ) -> Self {
        Self {
            family,
            two_j: family.two_j(),
            n_elec: family.n_elec(adjoint),
            irrep,
            boundary,
            direction,
            adjoint,
        }
    }

    /// Particle-number difference `N_down - N_up` between the bond labels of
    /// a block.
    ///
    /// Bond labels count the particles left of the boundary, so an operator
    /// creating particles on the left lowers the bra label relative to the
    /// ket, and one creating particles on the right raises it.
    pub fn shift(&self) -> i32 {
        match self.direction {
            Direction::MovingRight => -self.n_elec,
            Direction::MovingLeft => self.n_elec,
        }
    }

    /// Return `true` if the operator has odd fermion parity.
    pub fn is_odd(&self) -> bool { self.n_elec % 2 != 0 }

    /// Down sectors that may pair with `up`, ignoring dimensions.
    pub fn down_sectors(&self, up: Sector) -> impl Iterator<Item = Sector> {
        let n = up.n + self.shift();
        let irrep = direct_prod(up.irrep, self.irrep);
        let lo = (up.two_s - self.two_j).abs();
        let hi = up.two_s + self.two_j;
        (lo..=hi).step_by(2)
            .map(move |two_s| Sector::new(n, two_s, irrep))
    }

    /// Return `true` if the selection rules allow a block between `up` and
    /// `down`.
    pub fn allows(&self, up: Sector, down: Sector) -> bool {
        down.n - up.n == self.shift()
            && direct_prod(up.irrep, self.irrep) == down.irrep
            && wigner::triangle(up.two_s, down.two_s, self.two_j)
    }
}

/// Block key of a boundary operator: up and down sectors.
pub type OpKey = (Sector, Sector);

/// Block-sparse operator on one boundary.
#[derive(Clone, Debug)]
pub struct BoundaryOperator<A> {
    sig: Signature,
    layout: Layout<OpKey>,
    data: Vec<A>,
}

impl<A: ComplexScalar> BoundaryOperator<A> {
    /// Create a zero operator with every block allowed by `sig` and `index`.
    pub fn new<I>(index: &I, sig: Signature) -> Self
    where I: SectorIndex + ?Sized
    {
        let b = sig.boundary;
        let mut layout = Layout::new();
        for up in index.sectors(b) {
            let du = index.dim(b, up);
            for down in sig.down_sectors(up) {
                layout.push((up, down), du, index.dim(b, down));
            }
        }
        let data = vec![A::zero(); layout.total()];
        Self { sig, layout, data }
    }

    /// Quantum-number signature.
    pub fn signature(&self) -> &Signature { &self.sig }

    /// Offset table: one entry per stored block, in buffer order.
    pub fn offset_table(&self) -> &[Entry<OpKey>] { self.layout.entries() }

    /// Number of stored blocks.
    pub fn n_blocks(&self) -> usize { self.layout.n_blocks() }

    /// Look up the `(up, down)` block. Absent blocks are implicitly zero.
    pub fn block(&self, up: Sector, down: Sector) -> Option<View<'_, A>> {
        self.layout.get(&(up, down))
            .map(|e| linalg::view(&self.data[e.range()], e.rows, e.cols))
    }

    /// Mutable version of [`block`][Self::block].
    pub fn block_mut(&mut self, up: Sector, down: Sector)
        -> Option<ViewMut<'_, A>>
    {
        let e = *self.layout.get(&(up, down))?;
        Some(linalg::view_mut(&mut self.data[e.range()], e.rows, e.cols))
    }

    /// All stored blocks with a given up sector.
    pub fn row(&self, up: Sector)
        -> impl Iterator<Item = (Sector, View<'_, A>)> + '_
    {
        self.sig.down_sectors(up)
            .filter_map(move |down| self.block(up, down).map(|b| (down, b)))
    }

    /// One mutable slice per stored block, for disjoint parallel writes.
    pub fn blocks_mut(&mut self) -> Vec<(&Entry<OpKey>, &mut [A])> {
        self.layout.split_mut(&mut self.data)
    }

    /// Zero all blocks.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|x| { *x = A::zero(); });
    }

    /// `self ← self + α other`.
    ///
    /// *Panics if the two operators have different block layouts.*
    pub fn axpy(&mut self, alpha: A, other: &Self) {
        if self.layout != other.layout { panic!("inconsistent dimensions"); }
        linalg::axpy(alpha, &other.data, &mut self.data);
    }

    /// `self ← α self`.
    pub fn scale(&mut self, alpha: A) { linalg::scal(alpha, &mut self.data); }

    /// Flat element buffer.
    pub fn data(&self) -> &[A] { &self.data }

    /// Mutable flat element buffer.
    pub fn data_mut(&mut self) -> &mut [A] { &mut self.data }

    /// Largest absolute element, zero for an empty operator.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().map(|x| x.modulus()).fold(0.0, f64::max)
    }
}
