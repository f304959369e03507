//! Single-producer single-consumer bounded ring.
//!
//! The runtime uses this for each reactor's active-poller ring: the owning
//! reactor is both the producer and the consumer, rotating the ring once per
//! loop iteration (dequeue head, invoke, re-enqueue at tail). Keeping the
//! ring SPSC means the rotation never takes a lock and never contends with
//! other cores; structural changes arrive as events instead.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::CachePadded;

/// A lock-free single-producer single-consumer bounded ring.
///
/// Capacity is rounded up to the next power of two; a ring of capacity `n`
/// holds at most `n - 1` items (one slot stays open to distinguish full from
/// empty).
///
/// # Safety contract
///
/// Exactly one thread may push and exactly one thread may pop at any instant.
/// The runtime upholds this by construction: only the reactor that owns the
/// ring ever touches it.
pub struct SpscRing<T> {
    /// Ring buffer storage
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Head index (consumer reads from here)
    head: CachePadded<AtomicUsize>,
    /// Tail index (producer writes here)
    tail: CachePadded<AtomicUsize>,
    /// Capacity mask for fast modulo (capacity - 1)
    capacity_mask: usize,
}

// SAFETY: SpscRing can be sent between threads as long as T is Send
#[allow(unsafe_code)]
unsafe impl<T: Send> Send for SpscRing<T> {}

// SAFETY: SpscRing can be shared between threads (one producer, one consumer)
// as long as T is Send. The atomic head/tail ensure correct synchronization.
#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Creates a new ring with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        let capacity = capacity.next_power_of_two();
        let buffer: Vec<UnsafeCell<MaybeUninit<T>>> =
            (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();

        Self {
            buffer: buffer.into_boxed_slice(),
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            capacity_mask: capacity - 1,
        }
    }

    /// Returns the capacity of the ring.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity_mask + 1
    }

    /// Returns the current number of items in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.capacity_mask
    }

    /// Returns true if the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head == tail
    }

    /// Pushes an item onto the tail of the ring.
    ///
    /// # Errors
    ///
    /// Returns the item back if the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next_tail = self.next_index(tail);

        if next_tail == self.head.load(Ordering::Acquire) {
            return Err(item);
        }

        // SAFETY: We have exclusive write access to this slot: we are the
        // only producer, the consumer only reads published slots, and this
        // slot is not published until the tail store below.
        #[allow(unsafe_code)]
        unsafe {
            (*self.buffer[tail].get()).write(item);
        }

        self.tail.store(next_tail, Ordering::Release);
        Ok(())
    }

    /// Pops an item from the head of the ring, or `None` when empty.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: We have exclusive read access to this slot: we are the
        // only consumer and the producer published it (head != tail).
        #[allow(unsafe_code)]
        let item = unsafe { (*self.buffer[head].get()).assume_init_read() };

        self.head.store(self.next_index(head), Ordering::Release);
        Some(item)
    }

    #[inline]
    const fn next_index(&self, index: usize) -> usize {
        (index + 1) & self.capacity_mask
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for SpscRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpscRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_new_rounds_to_power_of_two() {
        let ring: SpscRing<u32> = SpscRing::new(100);
        assert_eq!(ring.capacity(), 128);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_push_pop_fifo() {
        let ring: SpscRing<u32> = SpscRing::new(16);
        for i in 0..10 {
            ring.push(i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_ring_rejects_push() {
        let ring: SpscRing<u32> = SpscRing::new(4);
        // Capacity 4 holds 3 items.
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        ring.push(3).unwrap();
        assert_eq!(ring.push(4), Err(4));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_rotation_preserves_order() {
        // The reactor's usage pattern: dequeue head, re-enqueue at tail.
        let ring: SpscRing<u32> = SpscRing::new(8);
        for i in 0..5 {
            ring.push(i).unwrap();
        }
        for _ in 0..5 {
            let item = ring.pop().unwrap();
            ring.push(item).unwrap();
        }
        for i in 0..5 {
            assert_eq!(ring.pop(), Some(i));
        }
    }

    #[test]
    fn test_wrap_around() {
        let ring: SpscRing<u32> = SpscRing::new(4);
        for round in 0..10 {
            for i in 0..3 {
                ring.push(round * 10 + i).unwrap();
            }
            for i in 0..3 {
                assert_eq!(ring.pop(), Some(round * 10 + i));
            }
        }
    }

    #[derive(Debug)]
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_drains_remaining() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let ring: SpscRing<DropCounter> = SpscRing::new(8);
            for _ in 0..5 {
                ring.push(DropCounter(Arc::clone(&drops))).unwrap();
            }
            ring.pop();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }
}
