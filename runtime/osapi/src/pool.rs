//! Object Pool - Fixed-capacity arena of pre-sized elements
//!
//! # Purpose
//! Every dynamic structure in the OS API (timeout entries, threads, IPC
//! clients, processes) lives in a pool created up front. A pool never grows:
//! when all of its elements are handed out, `allocate` fails.
//!
//! # Architecture
//! Elements are stored contiguously and never move. Two index lists share
//! one link array and partition the slots into *free* and *allocated*, so
//! `allocated + free == capacity` holds after every operation:
//!
//! ```text
//! elements: [ e0 ][ e1 ][ e2 ][ e3 ]
//! free:      e2 -> e3
//! allocated: e0 -> e1
//! ```
//!
//! Allocation takes the head of the free list, freeing appends to its tail.
//! An optional initializer runs at creation and on every allocate/free
//! transition so handed-out and returned elements are always clean.
//!
//! Handles carry a generation that changes every time their slot is freed,
//! so a stale handle is detected instead of aliasing a reallocated element.

use crate::list::{IndexList, Link};
use crate::{OsapiError, Result};
use core::fmt;

/// Element initializer, run at creation and on allocate/free
pub type InitFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Equality used by value lookups
pub type EqFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Handle to an allocated pool element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: usize,
    generation: u32,
}

impl Handle {
    /// Slot index of the element
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Outcome of visiting an element during `Pool::sweep`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// Leave the element allocated
    Keep,
    /// Return the element to the free list
    Release,
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotMeta {
    generation: u32,
    allocated: bool,
}

/// Fixed-capacity object pool
pub struct Pool<T> {
    elements: Box<[T]>,
    meta: Box<[SlotMeta]>,
    links: Box<[Link]>,
    free: IndexList,
    allocated: IndexList,
    init: Option<InitFn<T>>,
    equals: Option<EqFn<T>>,
}

impl<T: Default> Pool<T> {
    /// Create a pool of `capacity` default elements
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        Self::from_fn(capacity, |_| T::default())
    }
}

impl<T> Pool<T> {
    /// Create a pool whose element `i` is built by `make(i)`
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn from_fn(capacity: usize, make: impl FnMut(usize) -> T) -> Self {
        assert!(capacity > 0, "pool capacity must be non-zero");

        let elements: Box<[T]> = (0..capacity).map(make).collect();
        let mut links = vec![Link::default(); capacity].into_boxed_slice();
        let mut free = IndexList::new();
        for index in 0..capacity {
            free.push_back(&mut links, index);
        }

        Self {
            elements,
            meta: vec![SlotMeta::default(); capacity].into_boxed_slice(),
            links,
            free,
            allocated: IndexList::new(),
            init: None,
            equals: None,
        }
    }

    /// Install an initializer and run it over every free element
    pub fn with_init(mut self, init: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        for index in self.free.iter(&self.links) {
            init(&mut self.elements[index]);
        }
        self.init = Some(Box::new(init));
        self
    }

    /// Install the equality used by `find` and `free_value`
    pub fn with_equality(mut self, equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.equals = Some(Box::new(equals));
        self
    }

    /// Total number of elements
    #[inline]
    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    /// Size in bytes of one element
    #[inline]
    pub fn element_size(&self) -> usize {
        core::mem::size_of::<T>()
    }

    /// Number of currently allocated elements
    #[inline]
    pub fn size(&self) -> usize {
        self.allocated.len()
    }

    /// Number of currently free elements
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Whether every element is allocated
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    /// Take an element from the free list
    ///
    /// # Errors
    /// Returns `Exhausted` if every element is allocated
    pub fn allocate(&mut self) -> Result<Handle> {
        let index = self
            .free
            .pop_front(&mut self.links)
            .ok_or(OsapiError::Exhausted {
                capacity: self.capacity(),
            })?;

        if let Some(init) = &self.init {
            init(&mut self.elements[index]);
        }

        self.meta[index].allocated = true;
        self.allocated.push_back(&mut self.links, index);

        debug_assert_eq!(self.size() + self.free_count(), self.capacity());
        Ok(self.handle_at(index))
    }

    /// Return an element to the free list
    ///
    /// # Errors
    /// Returns `NotFound` if `handle` does not refer to an allocated element
    pub fn free(&mut self, handle: Handle) -> Result<()> {
        if !self.is_live(handle) {
            return Err(OsapiError::NotFound);
        }
        self.release(handle.index);
        Ok(())
    }

    /// Whether `handle` refers to a currently allocated element
    pub fn is_live(&self, handle: Handle) -> bool {
        self.meta
            .get(handle.index)
            .is_some_and(|meta| meta.allocated && meta.generation == handle.generation)
    }

    /// Access an allocated element, or `None` for a stale handle
    pub fn try_get(&self, handle: Handle) -> Option<&T> {
        self.is_live(handle).then(|| &self.elements[handle.index])
    }

    /// Access an allocated element
    ///
    /// # Panics
    /// Panics if `handle` was freed
    pub fn get(&self, handle: Handle) -> &T {
        match self.try_get(handle) {
            Some(element) => element,
            None => panic!("use of freed pool handle {:?}", handle),
        }
    }

    /// Mutably access an allocated element
    ///
    /// # Panics
    /// Panics if `handle` was freed
    pub fn get_mut(&mut self, handle: Handle) -> &mut T {
        if !self.is_live(handle) {
            panic!("use of freed pool handle {:?}", handle);
        }
        &mut self.elements[handle.index]
    }

    /// Iterate allocated elements in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.allocated
            .iter(&self.links)
            .map(move |index| (self.handle_at(index), &self.elements[index]))
    }

    /// First allocated element matching `predicate` (linear scan)
    pub fn find_by(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<Handle> {
        self.iter()
            .find(|(_, element)| predicate(element))
            .map(|(handle, _)| handle)
    }

    /// Visit every allocated element, releasing those `visit` asks to
    ///
    /// Elements are visited in allocation order; releasing the current
    /// element does not disturb the traversal.
    ///
    /// # Returns
    /// Number of elements released
    pub fn sweep(&mut self, mut visit: impl FnMut(Handle, &mut T) -> Sweep) -> usize {
        let mut released = 0;
        let mut cursor = self.allocated.front();

        while let Some(index) = cursor {
            cursor = IndexList::next(&self.links, index);
            let handle = self.handle_at(index);
            if visit(handle, &mut self.elements[index]) == Sweep::Release {
                self.release(index);
                released += 1;
            }
        }

        released
    }

    fn handle_at(&self, index: usize) -> Handle {
        Handle {
            index,
            generation: self.meta[index].generation,
        }
    }

    fn release(&mut self, index: usize) {
        self.allocated.unlink(&mut self.links, index);

        let meta = &mut self.meta[index];
        meta.allocated = false;
        meta.generation = meta.generation.wrapping_add(1);

        if let Some(init) = &self.init {
            init(&mut self.elements[index]);
        }

        self.free.push_back(&mut self.links, index);
        debug_assert_eq!(self.size() + self.free_count(), self.capacity());
    }
}

impl<T: PartialEq> Pool<T> {
    /// First allocated element equal to `probe`
    ///
    /// Uses the equality installed with `with_equality`, or `==` otherwise.
    pub fn find(&self, probe: &T) -> Option<Handle> {
        match &self.equals {
            Some(equals) => self.find_by(|element| equals(element, probe)),
            None => self.find_by(|element| element == probe),
        }
    }

    /// Free the first allocated element equal to `probe`
    ///
    /// # Errors
    /// Returns `NotFound` if no allocated element matches
    pub fn free_value(&mut self, probe: &T) -> Result<()> {
        let handle = self.find(probe).ok_or(OsapiError::NotFound)?;
        self.free(handle)
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("allocated", &self.size())
            .field("free", &self.free_count())
            .field("element_size", &self.element_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Entry {
        key: u32,
        payload: u32,
    }

    fn assert_invariant<T>(pool: &Pool<T>) {
        assert_eq!(pool.size() + pool.free_count(), pool.capacity());
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let mut pool: Pool<Entry> = Pool::new(3);
        let handles: Vec<_> = (0..3).map(|_| pool.allocate().unwrap()).collect();

        assert_eq!(pool.size(), 3);
        assert!(pool.is_exhausted());
        assert_eq!(pool.allocate(), Err(OsapiError::Exhausted { capacity: 3 }));

        let distinct: HashSet<usize> = handles.iter().map(Handle::index).collect();
        assert_eq!(distinct.len(), 3);
        assert_invariant(&pool);
    }

    #[test]
    fn test_free_returns_slot() {
        let mut pool: Pool<Entry> = Pool::new(2);
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();

        pool.free(a).unwrap();
        assert_eq!(pool.size(), 1);
        assert_invariant(&pool);

        let c = pool.allocate().unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
    }

    #[test]
    fn test_double_free_is_not_found() {
        let mut pool: Pool<Entry> = Pool::new(2);
        let a = pool.allocate().unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.free(a), Err(OsapiError::NotFound));
        assert_invariant(&pool);
    }

    #[test]
    #[should_panic(expected = "use of freed pool handle")]
    fn test_stale_handle_panics() {
        let mut pool: Pool<Entry> = Pool::new(1);
        let a = pool.allocate().unwrap();
        pool.free(a).unwrap();
        let _ = pool.allocate().unwrap();
        let _ = pool.get(a);
    }

    #[test]
    fn test_init_runs_on_every_transition() {
        let mut pool: Pool<Entry> = Pool::from_fn(2, |i| Entry {
            key: 99,
            payload: i as u32,
        })
        .with_init(|entry| *entry = Entry::default());

        assert!(pool.elements.iter().all(|e| *e == Entry::default()));

        let a = pool.allocate().unwrap();
        pool.get_mut(a).payload = 7;
        pool.free(a).unwrap();
        assert_eq!(pool.elements[a.index()], Entry::default());

        let b = pool.allocate().unwrap();
        assert_eq!(*pool.get(b), Entry::default());
    }

    #[test]
    fn test_find_uses_equality_first_match() {
        let mut pool: Pool<Entry> =
            Pool::new(4).with_equality(|a: &Entry, b: &Entry| a.key == b.key);

        let a = pool.allocate().unwrap();
        pool.get_mut(a).key = 5;
        pool.get_mut(a).payload = 1;
        let b = pool.allocate().unwrap();
        pool.get_mut(b).key = 5;
        pool.get_mut(b).payload = 2;

        let probe = Entry { key: 5, payload: 0 };
        assert_eq!(pool.find(&probe), Some(a));

        pool.free_value(&probe).unwrap();
        assert_eq!(pool.find(&probe), Some(b));
        pool.free_value(&probe).unwrap();
        assert_eq!(pool.free_value(&probe), Err(OsapiError::NotFound));
    }

    #[test]
    fn test_find_ignores_free_elements() {
        let pool: Pool<Entry> = Pool::new(2);
        assert_eq!(pool.find(&Entry::default()), None);
    }

    #[test]
    fn test_sweep_releases_selected() {
        let mut pool: Pool<Entry> = Pool::new(4);
        for key in 0..4 {
            let h = pool.allocate().unwrap();
            pool.get_mut(h).key = key;
        }

        let released = pool.sweep(|_, entry| {
            if entry.key % 2 == 0 {
                Sweep::Release
            } else {
                entry.payload += 1;
                Sweep::Keep
            }
        });

        assert_eq!(released, 2);
        let kept: Vec<_> = pool.iter().map(|(_, e)| (e.key, e.payload)).collect();
        assert_eq!(kept, vec![(1, 1), (3, 1)]);
        assert_invariant(&pool);
    }

    #[test]
    fn test_invariant_over_mixed_sequence() {
        let mut pool: Pool<u64> = Pool::new(5);
        let mut live = Vec::new();

        for step in 0..50u64 {
            if step % 3 == 2 && !live.is_empty() {
                let handle = live.remove((step as usize) % live.len());
                pool.free(handle).unwrap();
            } else if let Ok(handle) = pool.allocate() {
                *pool.get_mut(handle) = step;
                live.push(handle);
            }
            assert_invariant(&pool);
            assert_eq!(pool.size(), live.len());
        }
    }

    #[test]
    fn test_element_size() {
        let pool: Pool<u64> = Pool::new(1);
        assert_eq!(pool.element_size(), 8);
    }

    #[test]
    #[should_panic(expected = "pool capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _pool: Pool<u8> = Pool::new(0);
    }
}
