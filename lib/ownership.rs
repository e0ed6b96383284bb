//! Partitioning of boundary-update work between cooperating workers.
//!
//! Every operator built during a boundary update is an independent
//! [`WorkUnit`]. Before building one, the sweep asks its [`Ownership`]
//! strategy whether this worker owns it; after each stage of the update, the
//! strategy is given the chance to [`synchronize`][Ownership::synchronize]
//! the stage's results so that every worker ends up with the complete set.
//!
//! - [`Local`] owns everything and never communicates; this is the ordinary
//!   single-process setting.
//! - [`Striped`] hands out units round-robin by ordinal. It has no way to
//!   obtain the units it does not own, so as a build strategy it only
//!   succeeds with a single stripe; its predicate is what [`Mesh`] uses.
//! - [`Mesh`] is a group of in-process workers connected by channels. Each
//!   worker builds its stripe and broadcasts it to all others.

use std::sync::Mutex;
use crossbeam::channel;
use thiserror::Error;
use crate::{
    ComplexScalar,
    store::{ BoundarySet, OperatorKey },
};

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("failed to broadcast operator: worker {0} hung up")]
    SendFailed(usize),

    #[error("failed to receive operator: receiver error: {0}")]
    Disconnected(channel::RecvError),

    #[error("received operator {0} with no slot in the current set")]
    UnknownKey(OperatorKey),

    #[error("received operator {0} with {1} elements, expected {2}")]
    SizeMismatch(OperatorKey, usize, usize),

    /// Returned when a strategy without communication is asked to complete a
    /// set holding operators built by another rank.
    #[error("operator {0} is owned by rank {1} and cannot be obtained")]
    NotOwned(OperatorKey, usize),
}
use OwnershipError::*;
pub type OwnershipResult<T> = Result<T, OwnershipError>;

/// One independently computable operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub key: OperatorKey,
    /// Position of the unit in its boundary's build order.
    pub ordinal: usize,
}

/// Strategy deciding which worker computes which operators.
pub trait Ownership<A>: Sync {
    /// Return `true` if this worker should compute `unit`.
    fn owns(&self, unit: &WorkUnit) -> bool;

    /// Make the results of `units` available in `set` on every worker.
    fn synchronize(&self, set: &mut BoundarySet<A>, units: &[WorkUnit])
        -> OwnershipResult<()>;
}

/// Single-worker strategy: owns everything.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Local;

impl<A> Ownership<A> for Local {
    fn owns(&self, _unit: &WorkUnit) -> bool { true }

    fn synchronize(&self, _set: &mut BoundarySet<A>, _units: &[WorkUnit])
        -> OwnershipResult<()>
    {
        Ok(())
    }
}

/// Round-robin predicate without communication.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Striped {
    pub rank: usize,
    pub size: usize,
}

impl Striped {
    pub fn new(rank: usize, size: usize) -> Self { Self { rank, size: size.max(1) } }

    /// Rank owning a unit.
    pub fn owner(&self, unit: &WorkUnit) -> usize { unit.ordinal % self.size }
}

impl<A> Ownership<A> for Striped {
    fn owns(&self, unit: &WorkUnit) -> bool { self.owner(unit) == self.rank }

    fn synchronize(&self, _set: &mut BoundarySet<A>, units: &[WorkUnit])
        -> OwnershipResult<()>
    {
        match units.iter().find(|u| self.owner(u) != self.rank) {
            Some(u) => Err(NotOwned(u.key, self.owner(u))),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
struct Packet<A> {
    key: OperatorKey,
    data: Vec<A>,
}

/// One member of a group of workers that split every boundary update in
/// stripes and exchange results over channels.
///
/// All members must run the same sequence of boundary updates. Packets that
/// arrive ahead of the stage that expects them are held back until then.
#[derive(Debug)]
pub struct Mesh<A> {
    stripe: Striped,
    peers: Vec<channel::Sender<Packet<A>>>,
    inbox: channel::Receiver<Packet<A>>,
    backlog: Mutex<Vec<Packet<A>>>,
}

impl<A: ComplexScalar + Send> Mesh<A> {
    /// Create `size` connected members, in rank order.
    pub fn group(size: usize) -> Vec<Self> {
        let size = size.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| channel::unbounded()).unzip();
        receivers.into_iter().enumerate()
            .map(|(rank, inbox)| Self {
                stripe: Striped::new(rank, size),
                peers: senders.clone(),
                inbox,
                backlog: Mutex::new(Vec::new()),
            })
            .collect()
    }

    pub fn rank(&self) -> usize { self.stripe.rank }

    pub fn size(&self) -> usize { self.stripe.size }

    fn store(set: &mut BoundarySet<A>, packet: Packet<A>) -> OwnershipResult<()> {
        let op = set.get_mut(&packet.key).ok_or(UnknownKey(packet.key))?;
        let dest = op.data_mut();
        if dest.len() != packet.data.len() {
            return Err(SizeMismatch(packet.key, packet.data.len(), dest.len()));
        }
        dest.copy_from_slice(&packet.data);
        Ok(())
    }
}

impl<A: ComplexScalar + Send> Ownership<A> for Mesh<A> {
    fn owns(&self, unit: &WorkUnit) -> bool {
        <Striped as Ownership<A>>::owns(&self.stripe, unit)
    }

    fn synchronize(&self, set: &mut BoundarySet<A>, units: &[WorkUnit])
        -> OwnershipResult<()>
    {
        for unit in units.iter().filter(|u| self.owns(u)) {
            let Some(op) = set.get(&unit.key) else { continue; };
            for (rank, peer) in self.peers.iter().enumerate() {
                if rank == self.rank() { continue; }
                let packet = Packet { key: unit.key, data: op.data().to_vec() };
                peer.send(packet).map_err(|_| SendFailed(rank))?;
            }
        }

        let mut expected: Vec<OperatorKey> =
            units.iter()
            .filter(|u| !self.owns(u) && set.get(&u.key).is_some())
            .map(|u| u.key)
            .collect();
        let mut backlog =
            match self.backlog.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        let held = std::mem::take(&mut *backlog);
        for packet in held.into_iter() {
            if let Some(k) = expected.iter().position(|key| *key == packet.key) {
                expected.swap_remove(k);
                Self::store(set, packet)?;
            } else {
                backlog.push(packet);
            }
        }
        while !expected.is_empty() {
            let packet = self.inbox.recv().map_err(Disconnected)?;
            if let Some(k) = expected.iter().position(|key| *key == packet.key) {
                expected.swap_remove(k);
                Self::store(set, packet)?;
            } else {
                backlog.push(packet);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use num_complex::Complex64 as C64;
    use crate::{
        operator::{ Direction, Frame },
        symmetry::{ Sector, SectorTable },
    };

    fn units(set: &BoundarySet<C64>) -> Vec<WorkUnit> {
        set.keys().iter().enumerate()
            .map(|(ordinal, key)| WorkUnit { key: *key, ordinal })
            .collect()
    }

    #[test]
    fn stripes_partition_units() {
        let t = SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 2).unwrap();
        let set: BoundarySet<C64> =
            BoundarySet::new(&t, Frame::new(2, Direction::MovingRight, 4));
        let units = units(&set);
        let stripes: Vec<Striped> = (0..3).map(|r| Striped::new(r, 3)).collect();
        for u in units.iter() {
            let n_owners =
                stripes.iter()
                .filter(|s| <Striped as Ownership<C64>>::owns(s, u))
                .count();
            assert_eq!(n_owners, 1);
            assert!(<Local as Ownership<C64>>::owns(&Local, u));
        }
    }

    #[test]
    fn striped_cannot_complete_a_shared_set() {
        let t = SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 2).unwrap();
        let mut set: BoundarySet<C64> =
            BoundarySet::new(&t, Frame::new(2, Direction::MovingRight, 4));
        let units = units(&set);
        let res = <Striped as Ownership<C64>>::synchronize(&Striped::new(1, 3), &mut set, &units);
        assert!(matches!(res, Err(NotOwned(key, 0)) if key == units[0].key));
        let res = <Striped as Ownership<C64>>::synchronize(&Striped::new(0, 1), &mut set, &units);
        assert!(res.is_ok());
    }

    #[test]
    fn mesh_broadcasts_owned_operators() {
        let t = SectorTable::fci(vec![0; 4], 1, Sector::new(4, 0, 0), 2).unwrap();
        let frame = Frame::new(2, Direction::MovingRight, 4);
        let group: Vec<Mesh<C64>> = Mesh::group(3);
        let handles: Vec<_> =
            group.into_iter()
            .map(|mesh| {
                let t = t.clone();
                thread::spawn(move || {
                    let mut set: BoundarySet<C64> = BoundarySet::new(&t, frame);
                    let units = units(&set);
                    for u in units.iter().filter(|u| mesh.owns(u)) {
                        let val = C64::new(u.ordinal as f64 + 1.0, 0.0);
                        let op = set.get_mut(&u.key).unwrap();
                        op.data_mut().iter_mut().for_each(|x| { *x = val; });
                    }
                    mesh.synchronize(&mut set, &units).unwrap();
                    set
                })
            })
            .collect();
        for h in handles.into_iter() {
            let set = h.join().unwrap();
            for u in units(&set).iter() {
                let op = set.get(&u.key).unwrap();
                let val = C64::new(u.ordinal as f64 + 1.0, 0.0);
                assert!(op.data().iter().all(|x| *x == val), "{}", u.key);
            }
        }
    }
}
