//! Provides [`Arena`], a slot store with stable integer IDs and *O*(1)
//! insertion and removal.

/// An unordered collection of values addressed by stable integer IDs.
///
/// Each `Arena` is backed by a vector of optional slots, so lookups are plain
/// indexing with no hashing. Values are assigned IDs on insertion; removed IDs
/// are recycled, most recently freed first. An ID stays valid (and keeps
/// pointing to the same value) until that value is removed.
///
/// Besides removal, a value can be *checked out* with [`take`][Self::take]:
/// its slot is emptied but its ID stays reserved until the value is returned
/// with [`put`][Self::put]. This allows a caller to hold a value by ownership
/// while reading the rest of the arena.
///
/// # Example
/// ```
/// use renorm_ops::arena::Arena;
///
/// let mut values: Arena<char> = Arena::new();
/// let id_a = values.insert('a');
/// let id_b = values.insert('b');
/// assert_eq!((id_a, id_b), (0, 1));
/// assert_eq!(values.remove(0), Some('a'));
/// assert_eq!(values.insert('c'), 0);
///
/// let b = values.take(1).unwrap();
/// assert_eq!(values.get(1), None);
/// assert_eq!(values.insert('d'), 2);
/// values.put(1, b);
/// assert_eq!(values.get(1), Some(&'b'));
/// ```
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<Option<T>>,
    free: Vec<usize>,
    count: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Arena<T> {
    /// Create a new, empty `Arena`.
    pub fn new() -> Self {
        Self { data: Vec::new(), free: Vec::new(), count: 0 }
    }

    /// Return the number of stored values, not counting checked-out ones.
    pub fn len(&self) -> usize { self.count }

    /// Return `true` if `self` holds no values.
    pub fn is_empty(&self) -> bool { self.count == 0 }

    /// Return the ID that will be assigned to the next inserted value.
    pub fn next_id(&self) -> usize {
        self.free.last().copied().unwrap_or(self.data.len())
    }

    /// Insert a new value and return its ID.
    pub fn insert(&mut self, val: T) -> usize {
        self.count += 1;
        if let Some(id) = self.free.pop() {
            self.data[id] = Some(val);
            id
        } else {
            self.data.push(Some(val));
            self.data.len() - 1
        }
    }

    /// Remove and return the value at `id`, if it exists, freeing the ID.
    pub fn remove(&mut self, id: usize) -> Option<T> {
        let mb_val = self.data.get_mut(id).and_then(|mb_item| mb_item.take());
        if mb_val.is_some() {
            self.free.push(id);
            self.count -= 1;
        }
        mb_val
    }

    /// Check out the value at `id`, keeping the ID reserved.
    pub fn take(&mut self, id: usize) -> Option<T> {
        let mb_val = self.data.get_mut(id).and_then(|mb_item| mb_item.take());
        if mb_val.is_some() { self.count -= 1; }
        mb_val
    }

    /// Return a checked-out value to its reserved slot.
    ///
    /// *Panics if `id` was never assigned or its slot is occupied.*
    pub fn put(&mut self, id: usize, val: T) {
        match self.data.get_mut(id) {
            Some(slot) if slot.is_none() && !self.free.contains(&id) => {
                *slot = Some(val);
                self.count += 1;
            },
            _ => { panic!("slot {id} is not checked out"); },
        }
    }

    /// Drop all values and forget all IDs.
    pub fn clear(&mut self) {
        self.data.clear();
        self.free.clear();
        self.count = 0;
    }

    /// Return a reference to the value at `id`, if it exists.
    pub fn get(&self, id: usize) -> Option<&T> {
        self.data.get(id).and_then(|mb_item| mb_item.as_ref())
    }

    /// Return a mutable reference to the value at `id`, if it exists.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.data.get_mut(id).and_then(|mb_item| mb_item.as_mut())
    }

    /// Return `true` if `self` holds a value at `id`.
    pub fn contains_id(&self, id: usize) -> bool {
        self.data.get(id).is_some_and(|mb_item| mb_item.is_some())
    }

    /// Iterate over all stored values with their IDs, in ID order.
    pub fn iter_id(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.data.iter().enumerate()
            .filter_map(|(id, mb_item)| mb_item.as_ref().map(|x| (id, x)))
    }

    /// Iterate over all stored values, in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.data.iter().filter_map(|mb_item| mb_item.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_ids() {
        let mut ar: Arena<u32> = Arena::new();
        for k in 0..5 { assert_eq!(ar.insert(k), k as usize); }
        assert_eq!(ar.remove(1), Some(1));
        assert_eq!(ar.remove(3), Some(3));
        assert_eq!(ar.remove(3), None);
        assert_eq!(ar.len(), 3);
        assert_eq!(ar.next_id(), 3);
        assert_eq!(ar.insert(30), 3);
        assert_eq!(ar.insert(10), 1);
        assert_eq!(ar.insert(50), 5);
        let items: Vec<(usize, u32)> = ar.iter_id().map(|(i, x)| (i, *x)).collect();
        assert_eq!(items, vec![(0, 0), (1, 10), (2, 2), (3, 30), (4, 4), (5, 50)]);
    }

    #[test]
    fn checkout_keeps_id_reserved() {
        let mut ar: Arena<&str> = Arena::new();
        let a = ar.insert("a");
        let b = ar.insert("b");
        let val = ar.take(a).unwrap();
        assert_eq!(ar.len(), 1);
        assert!(!ar.contains_id(a));
        assert_eq!(ar.insert("c"), 2);
        ar.put(a, val);
        assert_eq!(ar.get(a), Some(&"a"));
        assert_eq!(ar.get(b), Some(&"b"));
    }

    #[test]
    #[should_panic]
    fn put_into_free_slot_panics() {
        let mut ar: Arena<u8> = Arena::new();
        let a = ar.insert(0);
        ar.remove(a);
        ar.put(a, 1);
    }
}
