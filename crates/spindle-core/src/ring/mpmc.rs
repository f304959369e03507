//! Multi-producer multi-consumer bounded ring.
//!
//! Each slot carries its own sequence counter, so producers on different
//! cores claim slots with a single compare-and-swap and never spin on a
//! shared lock. The runtime uses this ring in two places:
//!
//! - per-core event queues, where any core enqueues and only the owning
//!   reactor dequeues (FIFO per producer; no cross-producer order), and
//! - the event pool free list, where acquire and release race freely.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::CachePadded;

struct Slot<T> {
    /// Publication counter: `pos` when the slot is free for the producer
    /// claiming position `pos`, `pos + 1` once the value is readable.
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A lock-free multi-producer multi-consumer bounded ring.
///
/// Capacity is rounded up to the next power of two; unlike [`SpscRing`],
/// a ring of capacity `n` holds `n` items.
///
/// Enqueue order from a single producer is preserved. No ordering is
/// promised across producers.
///
/// [`SpscRing`]: super::SpscRing
pub struct MpmcRing<T> {
    buffer: Box<[Slot<T>]>,
    /// Capacity mask for fast modulo (capacity - 1)
    capacity_mask: usize,
    /// Next position a producer will claim
    enqueue_pos: CachePadded<AtomicUsize>,
    /// Next position a consumer will claim
    dequeue_pos: CachePadded<AtomicUsize>,
}

// SAFETY: MpmcRing can be sent between threads as long as T is Send
#[allow(unsafe_code)]
unsafe impl<T: Send> Send for MpmcRing<T> {}

// SAFETY: MpmcRing can be shared between threads as long as T is Send. Slot
// ownership is handed off through the per-slot sequence counters; a thread
// only touches a slot's value while the sequence says the slot is its turn.
#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for MpmcRing<T> {}

impl<T> MpmcRing<T> {
    /// Creates a new ring with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        let capacity = capacity.next_power_of_two();
        let buffer: Vec<Slot<T>> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            buffer: buffer.into_boxed_slice(),
            capacity_mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the capacity of the ring.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity_mask + 1
    }

    /// Returns a non-blocking snapshot of current occupancy.
    ///
    /// Concurrent pushes and pops may make the snapshot stale by the time it
    /// is returned; the reactor uses it only to bound a drain batch.
    #[must_use]
    pub fn len(&self) -> usize {
        let tail = self.enqueue_pos.load(Ordering::Acquire);
        let head = self.dequeue_pos.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    /// Returns true if the snapshot occupancy is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes an item onto the tail of the ring.
    ///
    /// Safe to call from any thread.
    ///
    /// # Errors
    ///
    /// Returns the item back if the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.capacity_mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let dif = seq.wrapping_sub(pos) as isize;

            if dif == 0 {
                // Slot is free for this position; claim it.
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: The CAS above granted us exclusive write
                        // access to this slot for position `pos`; consumers
                        // wait for the sequence store below.
                        #[allow(unsafe_code)]
                        unsafe {
                            (*slot.value.get()).write(item);
                        }
                        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if dif < 0 {
                // Slot still holds an unconsumed value from a full lap ago.
                return Err(item);
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Pops an item from the head of the ring, or `None` when empty.
    ///
    /// Safe to call from any thread, though the runtime's event queues only
    /// ever dequeue from the owning reactor.
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.capacity_mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let dif = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            if dif == 0 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: The CAS above granted us exclusive read
                        // access to this slot; the producer published the
                        // value before storing `pos + 1` into the sequence.
                        #[allow(unsafe_code)]
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence
                            .store(pos.wrapping_add(self.capacity_mask + 1), Ordering::Release);
                        return Some(item);
                    }
                    Err(current) => pos = current,
                }
            } else if dif < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for MpmcRing<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for MpmcRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpmcRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
