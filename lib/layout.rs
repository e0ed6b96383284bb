//! Offset tables for block-sparse storage.
//!
//! All block-sparse objects in this crate (site tensors, boundary operators,
//! superblock tensors) keep their dense blocks back to back in one flat buffer.
//! A [`Layout`] records, for each block key, where its block starts and what
//! shape it has. Offsets are assigned in insertion order, so building two
//! layouts from the same key sequence always gives identical offsets.

use std::hash::Hash;
use rustc_hash::FxHashMap;

/// Location and shape of one dense block inside a flat buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry<K> {
    pub key: K,
    pub offset: usize,
    pub rows: usize,
    pub cols: usize,
}

impl<K> Entry<K> {
    /// Number of elements in the block.
    pub fn len(&self) -> usize { self.rows * self.cols }

    /// Return `true` if the block holds no elements.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Element range of the block inside its buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset .. self.offset + self.len()
    }
}

/// Map from block keys to [`Entry`]s.
#[derive(Clone, Debug)]
pub struct Layout<K> {
    entries: Vec<Entry<K>>,
    index: FxHashMap<K, usize>,
    total: usize,
}

impl<K> Default for Layout<K> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: FxHashMap::default(), total: 0 }
    }
}

impl<K> PartialEq for Layout<K>
where K: PartialEq
{
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total && self.entries == other.entries
    }
}

impl<K> Layout<K>
where K: Copy + Eq + Hash
{
    /// Create a new, empty layout.
    pub fn new() -> Self { Self::default() }

    /// Append a `rows × cols` block under `key` and return its offset.
    ///
    /// Empty blocks and repeated keys are ignored; the latter return the offset
    /// of the existing block.
    pub fn push(&mut self, key: K, rows: usize, cols: usize) -> Option<usize> {
        if rows == 0 || cols == 0 { return None; }
        if let Some(&k) = self.index.get(&key) {
            return Some(self.entries[k].offset);
        }
        let offset = self.total;
        self.index.insert(key, self.entries.len());
        self.entries.push(Entry { key, offset, rows, cols });
        self.total += rows * cols;
        Some(offset)
    }

    /// Look up a block.
    pub fn get(&self, key: &K) -> Option<&Entry<K>> {
        self.index.get(key).map(|k| &self.entries[*k])
    }

    /// Return `true` if a block exists under `key`.
    pub fn contains(&self, key: &K) -> bool { self.index.contains_key(key) }

    /// All blocks, in offset order.
    pub fn entries(&self) -> &[Entry<K>] { &self.entries }

    /// Number of blocks.
    pub fn n_blocks(&self) -> usize { self.entries.len() }

    /// Total number of elements across all blocks.
    pub fn total(&self) -> usize { self.total }

    /// Split a buffer laid out by `self` into one mutable slice per block.
    ///
    /// *Panics if `data` is shorter than [`total`][Self::total].*
    pub fn split_mut<'a, A>(&'a self, data: &'a mut [A])
        -> Vec<(&'a Entry<K>, &'a mut [A])>
    {
        if data.len() < self.total { panic!("inconsistent dimensions"); }
        let mut rest = data;
        let mut out = Vec::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(entry.len());
            out.push((entry, head));
            rest = tail;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_insertion_order() {
        let mut lay: Layout<(u8, u8)> = Layout::new();
        assert_eq!(lay.push((0, 0), 2, 3), Some(0));
        assert_eq!(lay.push((1, 0), 0, 3), None);
        assert_eq!(lay.push((1, 1), 1, 4), Some(6));
        assert_eq!(lay.push((0, 0), 2, 3), Some(0));
        assert_eq!(lay.total(), 10);
        assert_eq!(lay.n_blocks(), 2);
        assert!(!lay.contains(&(1, 0)));
        assert_eq!(lay.get(&(1, 1)).map(|e| e.range()), Some(6..10));
    }

    #[test]
    fn split_gives_disjoint_blocks() {
        let mut lay: Layout<usize> = Layout::new();
        lay.push(7, 1, 2);
        lay.push(3, 2, 2);
        let mut data = vec![0_i32; lay.total()];
        for (entry, block) in lay.split_mut(&mut data) {
            block.iter_mut().for_each(|x| { *x = entry.key as i32; });
        }
        assert_eq!(data, vec![7, 7, 3, 3, 3, 3]);
    }
}
