// ============================================
// File: crates/teavpn2-server/src/services/slots.rs
// ============================================
//! # Client Slot Allocator
//!
//! ## Creation Reason
//! Recycles indices into the fixed client array in O(1). A bounded LIFO
//! stack starts full of every index; `pop` hands a slot to an accepted
//! connection, `push` returns it on disconnect.
//!
//! ## Invariants
//! - `sp <= max_sp` always
//! - `sp == max_sp` ⇔ no free slot (pool exhausted from the caller's view)
//! - `sp == 0` ⇔ every slot is free
//! - LIFO order: the most recently released slot is reused first
//!
//! ## ⚠️ Important Note for Next Developer
//! - Popping an exhausted stack is a normal condition (the accept path
//!   rejects the connection); pushing a full one is a caller bug and
//!   panics
//!
//! ## Last Modified
//! v0.1.0 - Initial allocator implementation

use parking_lot::Mutex;
use tracing::trace;

// ============================================
// SlotStack
// ============================================

/// Bounded LIFO stack of free client-slot indices.
///
/// The reactor owns all slot state, but the stack keeps its own lock so
/// the multi-reactor configuration can share it without touching anything
/// else.
pub struct SlotStack {
    inner: Mutex<StackInner>,
}

struct StackInner {
    arr: Box<[u16]>,
    sp: u16,
    max_sp: u16,
}

impl SlotStack {
    /// Creates a stack holding every index in `0..capacity`, ordered so
    /// the first `pop` yields slot 0.
    #[must_use]
    pub fn new_full(capacity: u16) -> Self {
        let mut inner = StackInner {
            arr: vec![0u16; usize::from(capacity)].into_boxed_slice(),
            sp: capacity,
            max_sp: capacity,
        };
        let mut idx = capacity;
        while idx > 0 {
            idx -= 1;
            inner.push(idx);
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Returns a free slot index, or `None` when the pool is exhausted.
    #[must_use]
    pub fn pop(&self) -> Option<u16> {
        let idx = self.inner.lock().pop();
        if let Some(idx) = idx {
            trace!(slot = idx, "Slot taken");
        }
        idx
    }

    /// Returns a slot index to the pool.
    ///
    /// # Panics
    /// Panics if every index is already free; a double push means a slot
    /// was recycled twice.
    pub fn push(&self, idx: u16) {
        self.inner.lock().push(idx);
        trace!(slot = idx, "Slot released");
    }

    /// Returns how many indices are currently free.
    #[must_use]
    pub fn free_count(&self) -> usize {
        let inner = self.inner.lock();
        usize::from(inner.max_sp - inner.sp)
    }

    /// Returns the total slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::from(self.inner.lock().max_sp)
    }
}

impl StackInner {
    fn push(&mut self, idx: u16) {
        assert!(self.sp > 0, "pushing into a full free stack (double release of slot {idx}?)");
        self.sp -= 1;
        self.arr[usize::from(self.sp)] = idx;
    }

    fn pop(&mut self) -> Option<u16> {
        debug_assert!(self.sp <= self.max_sp);
        if self.sp == self.max_sp {
            return None;
        }
        let idx = self.arr[usize::from(self.sp)];
        self.sp += 1;
        Some(idx)
    }
}

impl std::fmt::Debug for SlotStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SlotStack")
            .field("free", &(inner.max_sp - inner.sp))
            .field("capacity", &inner.max_sp)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_full_and_ordered() {
        let stack = SlotStack::new_full(4);
        assert_eq!(stack.free_count(), 4);
        assert_eq!(stack.capacity(), 4);

        // First pop is slot 0, then 1, 2, 3.
        assert_eq!(stack.pop(), Some(0));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.free_count(), 0);
    }

    #[test]
    fn test_pop_exhausted_returns_none() {
        let stack = SlotStack::new_full(1);
        assert_eq!(stack.pop(), Some(0));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_lifo_reuse() {
        let stack = SlotStack::new_full(3);
        let a = stack.pop().unwrap();
        let b = stack.pop().unwrap();

        stack.push(a);
        // The slot released last comes back first.
        assert_eq!(stack.pop(), Some(a));
        stack.push(b);
        stack.push(a);
        assert_eq!(stack.pop(), Some(a));
        assert_eq!(stack.pop(), Some(b));
    }

    #[test]
    fn test_conservation() {
        let stack = SlotStack::new_full(8);
        let mut taken = Vec::new();

        for _ in 0..5 {
            taken.push(stack.pop().unwrap());
        }
        assert_eq!(stack.free_count() + taken.len(), 8);

        for idx in taken.drain(..) {
            stack.push(idx);
        }
        assert_eq!(stack.free_count(), 8);
    }

    #[test]
    #[should_panic(expected = "full free stack")]
    fn test_double_release_panics() {
        let stack = SlotStack::new_full(2);
        stack.push(0);
    }

    #[test]
    fn test_zero_capacity() {
        let stack = SlotStack::new_full(0);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.free_count(), 0);
    }
}
