//! Storage of all boundary operators of a chain.
//!
//! Operators are named by an [`OperatorKey`] and kept, per boundary, in a
//! [`BoundarySet`]: an [`Arena`] of operators plus a map from keys to arena
//! IDs. The [`OperatorStore`] owns one optional set per boundary together with
//! its [`Allocation`] tag, which records which sweep direction (if any) the
//! set was built for. A set never mixes directions: reversing direction at a
//! boundary means deleting its set and allocating a new one.

use std::fmt;
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    ComplexScalar,
    arena::Arena,
    layout::Entry,
    operator::{ BoundaryOperator, Direction, Family, Frame, OpKey, Signature },
    symmetry::{ direct_prod, SectorIndex },
    triangle::Triangle,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Returned when a boundary index is outside `0 ..= L`.
    #[error("error in operator store: boundary {0} out of range for {1} sites")]
    BoundaryRange(usize, usize),

    /// Returned when an operation needs a set that has not been allocated.
    #[error("error in operator store: boundary {0} is not allocated")]
    NotAllocated(usize),

    /// Returned when allocating over an existing set.
    #[error("error in operator store: boundary {0} is already allocated {1}")]
    AlreadyAllocated(usize, Direction),
}
use StoreError::*;
pub type StoreResult<T> = Result<T, StoreError>;

/// Name of one operator instance.
///
/// `cnt2` and `cnt3` locate the sites the operator refers to relative to its
/// boundary (see [`Frame`]):
/// - `L`, `Q`: `cnt2` steps into the covered (`L`) or uncovered (`Q`) region
/// - pair families: sites `covered(cnt3 + cnt2)` and `covered(cnt3)`
/// - complementary families: sites `uncovered(cnt3)` and
///   `uncovered(cnt3 + cnt2)`
/// - `X`, `O`: both zero
///
/// With both sites of a pair equal (`cnt2 == 0`) there are no adjoint `F0`,
/// `F1`, `C` or `D` keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorKey {
    pub boundary: usize,
    pub direction: Direction,
    pub family: Family,
    pub cnt2: usize,
    pub cnt3: usize,
    pub adjoint: bool,
}

impl OperatorKey {
    pub fn new(
        frame: Frame,
        family: Family,
        cnt2: usize,
        cnt3: usize,
        adjoint: bool,
    ) -> Self {
        Self {
            boundary: frame.boundary,
            direction: frame.direction,
            family,
            cnt2,
            cnt3,
            adjoint: adjoint && family.has_adjoint(),
        }
    }

    /// Key of a single-index family (`L`, `Q`).
    pub fn single(frame: Frame, family: Family, k: usize, adjoint: bool) -> Self {
        Self::new(frame, family, k, 0, adjoint)
    }

    /// Key of a scalar family (`X`, `O`).
    pub fn scalar(frame: Frame, family: Family) -> Self {
        Self::new(frame, family, 0, 0, false)
    }

    /// The same key with the adjoint flag flipped.
    pub fn adjoint(self) -> Self {
        Self { adjoint: !self.adjoint && self.family.has_adjoint(), ..self }
    }
}

impl fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}[{}][{}]@{} ({})",
            self.family,
            if self.adjoint { "T" } else { "" },
            self.cnt2,
            self.cnt3,
            self.boundary,
            self.direction,
        )
    }
}

/// Three-state lifecycle tag of a boundary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Allocation {
    #[default]
    Unallocated,
    Rightward,
    Leftward,
}

impl From<Direction> for Allocation {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::MovingRight => Self::Rightward,
            Direction::MovingLeft => Self::Leftward,
        }
    }
}

/// Enumerate every operator key of the set at a boundary, in build order.
///
/// This is the single source of truth for which operators a boundary holds.
pub fn layout_keys(frame: Frame) -> Vec<OperatorKey> {
    let nc = frame.n_covered();
    let nu = frame.n_uncovered();
    let mut keys = Vec::new();
    if nc == 0 { return keys; }
    let both = [false, true];
    for k in 0..nc {
        for adj in both { keys.push(OperatorKey::single(frame, Family::L, k, adj)); }
    }
    for (cnt2, cnt3) in Triangle::new(nc).iter() {
        for family in [Family::S0, Family::S1, Family::F0, Family::F1] {
            if family == Family::S1 && cnt2 == 0 { continue; }
            for adj in both {
                if adj && cnt2 == 0 && matches!(family, Family::F0 | Family::F1) {
                    continue;
                }
                keys.push(OperatorKey::new(frame, family, cnt2, cnt3, adj));
            }
        }
    }
    for (cnt2, cnt3) in Triangle::new(nu).iter() {
        for family in [Family::A, Family::B, Family::C, Family::D] {
            if family == Family::B && cnt2 == 0 { continue; }
            for adj in both {
                if adj && cnt2 == 0 && matches!(family, Family::C | Family::D) {
                    continue;
                }
                keys.push(OperatorKey::new(frame, family, cnt2, cnt3, adj));
            }
        }
    }
    for k in 0..nu {
        for adj in both { keys.push(OperatorKey::single(frame, Family::Q, k, adj)); }
    }
    keys.push(OperatorKey::scalar(frame, Family::X));
    keys.push(OperatorKey::scalar(frame, Family::O));
    keys
}

/// Quantum-number signature of the operator named by `key`.
pub fn signature<I>(index: &I, key: &OperatorKey) -> Signature
where I: SectorIndex + ?Sized
{
    let frame = Frame::new(key.boundary, key.direction, index.n_sites());
    let irr = |site: usize| index.orbital_irrep(site);
    let irrep =
        match key.family {
            Family::L => irr(frame.covered(key.cnt2)),
            Family::Q => irr(frame.uncovered(key.cnt2)),
            Family::S0 | Family::S1 | Family::F0 | Family::F1 =>
                direct_prod(
                    irr(frame.covered(key.cnt3 + key.cnt2)),
                    irr(frame.covered(key.cnt3)),
                ),
            Family::A | Family::B | Family::C | Family::D =>
                direct_prod(
                    irr(frame.uncovered(key.cnt3)),
                    irr(frame.uncovered(key.cnt3 + key.cnt2)),
                ),
            Family::X | Family::O => 0,
        };
    Signature::new(key.family, key.adjoint, irrep, key.boundary, key.direction)
}

/// All operators on one boundary, built for one direction.
#[derive(Clone, Debug)]
pub struct BoundarySet<A> {
    frame: Frame,
    ops: Arena<BoundaryOperator<A>>,
    ids: FxHashMap<OperatorKey, usize>,
    order: Vec<OperatorKey>,
}

impl<A: ComplexScalar> BoundarySet<A> {
    /// Allocate zeroed storage for every operator of the set.
    pub fn new<I>(index: &I, frame: Frame) -> Self
    where I: SectorIndex + ?Sized
    {
        let order = layout_keys(frame);
        let mut ops = Arena::new();
        let mut ids = FxHashMap::default();
        for key in order.iter() {
            let op = BoundaryOperator::new(index, signature(index, key));
            ids.insert(*key, ops.insert(op));
        }
        Self { frame, ops, ids, order }
    }

    /// Coordinates of the set.
    pub fn frame(&self) -> Frame { self.frame }

    /// Number of operators, not counting checked-out ones.
    pub fn len(&self) -> usize { self.ops.len() }

    /// Return `true` if the set holds no operators.
    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    /// All keys, in build order.
    pub fn keys(&self) -> &[OperatorKey] { &self.order }

    /// Keys of one family and variant, in build order.
    pub fn keys_of(&self, family: Family, adjoint: bool) -> Vec<OperatorKey> {
        self.order.iter()
            .filter(|k| k.family == family && k.adjoint == adjoint)
            .copied()
            .collect()
    }

    /// Look up an operator by key.
    pub fn get(&self, key: &OperatorKey) -> Option<&BoundaryOperator<A>> {
        self.ids.get(key).and_then(|id| self.ops.get(*id))
    }

    /// Look up an operator by family and position.
    pub fn find(&self, family: Family, cnt2: usize, cnt3: usize, adjoint: bool)
        -> Option<&BoundaryOperator<A>>
    {
        self.get(&OperatorKey::new(self.frame, family, cnt2, cnt3, adjoint))
    }

    /// Mutable lookup by key.
    pub fn get_mut(&mut self, key: &OperatorKey)
        -> Option<&mut BoundaryOperator<A>>
    {
        let id = *self.ids.get(key)?;
        self.ops.get_mut(id)
    }

    /// Check out all operators named by `keys`, so they can be written while
    /// the rest of the set is read. Return them with
    /// [`check_in`][Self::check_in].
    pub fn check_out(&mut self, keys: &[OperatorKey])
        -> Vec<(OperatorKey, BoundaryOperator<A>)>
    {
        keys.iter()
            .filter_map(|key| {
                let id = *self.ids.get(key)?;
                self.ops.take(id).map(|op| (*key, op))
            })
            .collect()
    }

    /// Return checked-out operators to their slots.
    pub fn check_in(&mut self, ops: Vec<(OperatorKey, BoundaryOperator<A>)>) {
        for (key, op) in ops.into_iter() {
            if let Some(&id) = self.ids.get(&key) { self.ops.put(id, op); }
        }
    }

    /// Offset tables of every operator, in build order.
    pub fn offset_tables(&self) -> Vec<(OperatorKey, Vec<Entry<OpKey>>)> {
        self.order.iter()
            .filter_map(|key| {
                self.get(key).map(|op| (*key, op.offset_table().to_vec()))
            })
            .collect()
    }

    /// Zero every operator.
    pub fn clear(&mut self) {
        for id in self.ids.values() {
            if let Some(op) = self.ops.get_mut(*id) { op.clear(); }
        }
    }
}

/// Operator sets of a whole chain, one per boundary.
#[derive(Clone, Debug)]
pub struct OperatorStore<A> {
    n_sites: usize,
    sets: Vec<Option<BoundarySet<A>>>,
    tags: Vec<Allocation>,
}

impl<A: ComplexScalar> OperatorStore<A> {
    /// Create an empty store for a chain of `n_sites` sites.
    pub fn new(n_sites: usize) -> Self {
        Self {
            n_sites,
            sets: (0..=n_sites).map(|_| None).collect(),
            tags: vec![Allocation::Unallocated; n_sites + 1],
        }
    }

    fn check(&self, boundary: usize) -> StoreResult<()> {
        if boundary > self.n_sites {
            Err(BoundaryRange(boundary, self.n_sites))
        } else {
            Ok(())
        }
    }

    /// Number of sites.
    pub fn n_sites(&self) -> usize { self.n_sites }

    /// Lifecycle tag of a boundary.
    pub fn allocation(&self, boundary: usize) -> Allocation {
        self.tags.get(boundary).copied().unwrap_or_default()
    }

    /// Allocate zeroed operators at `boundary` for `direction`.
    pub fn allocate<I>(&mut self, index: &I, boundary: usize, direction: Direction)
        -> StoreResult<()>
    where I: SectorIndex + ?Sized
    {
        self.check(boundary)?;
        match self.tags[boundary] {
            Allocation::Unallocated => { },
            Allocation::Rightward =>
                return Err(AlreadyAllocated(boundary, Direction::MovingRight)),
            Allocation::Leftward =>
                return Err(AlreadyAllocated(boundary, Direction::MovingLeft)),
        }
        let frame = Frame::new(boundary, direction, self.n_sites);
        self.sets[boundary] = Some(BoundarySet::new(index, frame));
        self.tags[boundary] = direction.into();
        Ok(())
    }

    /// Release all operators at `boundary`. Deleting an unallocated boundary
    /// is a no-op.
    pub fn delete(&mut self, boundary: usize) -> StoreResult<()> {
        self.check(boundary)?;
        self.sets[boundary] = None;
        self.tags[boundary] = Allocation::Unallocated;
        Ok(())
    }

    /// The set at `boundary`, if allocated.
    pub fn set(&self, boundary: usize) -> Option<&BoundarySet<A>> {
        self.sets.get(boundary).and_then(|s| s.as_ref())
    }

    /// Mutable version of [`set`][Self::set].
    pub fn set_mut(&mut self, boundary: usize) -> Option<&mut BoundarySet<A>> {
        self.sets.get_mut(boundary).and_then(|s| s.as_mut())
    }

    /// Look up an operator by its full key.
    pub fn get(&self, key: &OperatorKey) -> Option<&BoundaryOperator<A>> {
        self.set(key.boundary)
            .filter(|s| s.frame().direction == key.direction)
            .and_then(|s| s.get(key))
    }

    /// Borrow the set at `prev` immutably and the set at `cur` mutably.
    ///
    /// *Panics if `prev == cur`.*
    pub fn pair_mut(&mut self, prev: usize, cur: usize)
        -> StoreResult<(Option<&BoundarySet<A>>, &mut BoundarySet<A>)>
    {
        self.check(prev)?;
        self.check(cur)?;
        if prev == cur { panic!("pair_mut: boundaries must differ"); }
        let (p, c) =
            if prev < cur {
                let (lo, hi) = self.sets.split_at_mut(cur);
                (lo[prev].as_ref(), hi[0].as_mut())
            } else {
                let (lo, hi) = self.sets.split_at_mut(prev);
                (hi[0].as_ref(), lo[cur].as_mut())
            };
        let c = c.ok_or(NotAllocated(cur))?;
        Ok((p, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64 as C64;
    use crate::symmetry::{ Sector, SectorTable };

    fn table() -> SectorTable {
        SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 4).unwrap()
    }

    #[test]
    fn layout_counts() {
        let frame = Frame::new(2, Direction::MovingRight, 5);
        let keys = layout_keys(frame);
        let count = |f: Family| keys.iter().filter(|k| k.family == f).count();
        assert_eq!(count(Family::L), 4);
        // covered triangle of side 2: 3 points, 1 with cnt2 > 0
        assert_eq!(count(Family::S0), 6);
        assert_eq!(count(Family::S1), 2);
        assert_eq!(count(Family::F0), 4);
        // uncovered triangle of side 3: 6 points, 3 with cnt2 > 0
        assert_eq!(count(Family::A), 12);
        assert_eq!(count(Family::B), 6);
        assert_eq!(count(Family::C), 9);
        assert!(!keys.iter().any(|k| k.family == Family::D && k.adjoint && k.cnt2 == 0));
        assert_eq!(count(Family::Q), 6);
        assert_eq!(count(Family::X), 1);
        assert_eq!(count(Family::O), 1);
        assert!(layout_keys(Frame::new(0, Direction::MovingRight, 5)).is_empty());
        assert!(layout_keys(Frame::new(5, Direction::MovingLeft, 5)).is_empty());
    }

    #[test]
    fn lifecycle_tags() {
        let t = table();
        let mut store: OperatorStore<C64> = OperatorStore::new(4);
        assert_eq!(store.allocation(2), Allocation::Unallocated);
        store.allocate(&t, 2, Direction::MovingRight).unwrap();
        assert_eq!(store.allocation(2), Allocation::Rightward);
        assert!(matches!(
            store.allocate(&t, 2, Direction::MovingLeft),
            Err(StoreError::AlreadyAllocated(2, Direction::MovingRight))
        ));
        store.delete(2).unwrap();
        assert!(store.set(2).is_none());
        store.allocate(&t, 2, Direction::MovingLeft).unwrap();
        assert_eq!(store.allocation(2), Allocation::Leftward);
        assert!(matches!(store.delete(7), Err(StoreError::BoundaryRange(7, 4))));
    }

    #[test]
    fn reallocation_reproduces_offsets() {
        let t = table();
        let mut store: OperatorStore<C64> = OperatorStore::new(4);
        for dir in [Direction::MovingRight, Direction::MovingLeft] {
            store.allocate(&t, 2, dir).unwrap();
            let before = store.set(2).unwrap().offset_tables();
            store.delete(2).unwrap();
            store.allocate(&t, 2, dir).unwrap();
            let after = store.set(2).unwrap().offset_tables();
            assert!(!before.is_empty());
            assert_eq!(before, after);
            store.delete(2).unwrap();
        }
    }

    #[test]
    fn checkout_and_pair_borrow() {
        let t = table();
        let mut store: OperatorStore<C64> = OperatorStore::new(4);
        store.allocate(&t, 1, Direction::MovingRight).unwrap();
        store.allocate(&t, 2, Direction::MovingRight).unwrap();
        let (prev, cur) = store.pair_mut(1, 2).unwrap();
        assert!(prev.is_some());
        let n = cur.len();
        let keys = cur.keys_of(Family::L, false);
        let out = cur.check_out(&keys);
        assert_eq!(out.len(), 2);
        assert_eq!(cur.len(), n - 2);
        cur.check_in(out);
        assert_eq!(cur.len(), n);
        assert!(matches!(store.pair_mut(2, 3), Err(StoreError::NotAllocated(3))));
    }
}
