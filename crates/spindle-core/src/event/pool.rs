//! Fixed-capacity event record pool, shared process-wide.
//!
//! All records are allocated once at init; acquire and release move `u32`
//! slot indices through an MPMC free ring. Exhaustion means the operator
//! undersized the pool for the offered load and is treated as a fatal
//! invariant violation, mirroring how queue-full is handled elsewhere in
//! the runtime.

use std::cell::UnsafeCell;

use crate::ring::MpmcRing;

use super::{EventHandle, EventRecord};

struct EventSlot(UnsafeCell<Option<EventRecord>>);

// SAFETY: A slot's contents are only touched by the thread that currently
// owns its index: either a producer that popped the index from the free
// ring, or the reactor that dequeued the handle from an event queue. The
// rings' acquire/release handoffs order those accesses.
#[allow(unsafe_code)]
unsafe impl Sync for EventSlot {}

/// Process-wide pool of event records.
pub(crate) struct EventPool {
    slots: Box<[EventSlot]>,
    free: MpmcRing<u32>,
}

impl EventPool {
    /// Preallocates `capacity` records, all initially free.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not fit in the `u32` handle space.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(
            u32::try_from(capacity).is_ok(),
            "pool capacity must fit in u32 handles"
        );
        let slots: Vec<EventSlot> = (0..capacity)
            .map(|_| EventSlot(UnsafeCell::new(None)))
            .collect();
        let free = MpmcRing::new(capacity);
        for index in 0..capacity {
            // Cannot fail: the ring holds at least `capacity` items.
            #[allow(clippy::cast_possible_truncation)]
            let _ = free.push(index as u32);
        }
        Self {
            slots: slots.into_boxed_slice(),
            free,
        }
    }

    /// Number of records in the pool.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of records currently free.
    pub(crate) fn available(&self) -> usize {
        self.free.len()
    }

    /// Takes a free record, fills it, and returns its handle.
    ///
    /// Aborts the process when the pool is exhausted.
    pub(crate) fn acquire(&self, record: EventRecord) -> EventHandle {
        let Some(index) = self.free.pop() else {
            crate::fatal(format_args!(
                "event pool exhausted ({} records in flight)",
                self.capacity()
            ));
        };
        let slot = &self.slots[index as usize];
        // SAFETY: Popping `index` from the free ring grants exclusive access
        // to this slot until the index is pushed back.
        #[allow(unsafe_code)]
        unsafe {
            let vacant = (*slot.0.get()).replace(record);
            debug_assert!(vacant.is_none(), "acquired an occupied event slot");
        }
        EventHandle(index)
    }

    /// Moves the record out of its slot so the executor can run it.
    ///
    /// The slot index stays owned by the caller until [`release`] returns it
    /// to the free ring, which happens after the event function has run.
    ///
    /// [`release`]: Self::release
    pub(crate) fn take(&self, handle: EventHandle) -> EventRecord {
        let slot = &self.slots[handle.0 as usize];
        // SAFETY: The caller owns this index: it dequeued the handle from an
        // event queue (or never enqueued it), so no other thread touches the
        // slot.
        #[allow(unsafe_code)]
        let record = unsafe { (*slot.0.get()).take() };
        record.unwrap_or_else(|| {
            crate::fatal(format_args!(
                "event slot {} taken while vacant (double release?)",
                handle.0
            ));
        })
    }

    /// Reads the target core of a filled record without moving it.
    pub(crate) fn target_core(&self, handle: EventHandle) -> u32 {
        let slot = &self.slots[handle.0 as usize];
        // SAFETY: The caller owns this index (see `take`); shared reads from
        // the owner are fine while the record sits in the slot.
        #[allow(unsafe_code)]
        unsafe {
            match &*slot.0.get() {
                Some(record) => record.target_core,
                None => crate::fatal(format_args!("event slot {} read while vacant", handle.0)),
            }
        }
    }

    /// Returns a slot index to the free ring.
    pub(crate) fn release(&self, handle: EventHandle) {
        // SAFETY: The caller owns this index and already emptied the slot
        // via `take`.
        #[allow(unsafe_code)]
        {
            let slot = &self.slots[handle.0 as usize];
            debug_assert!(
                unsafe { (*slot.0.get()).is_none() },
                "released an occupied event slot"
            );
        }
        if self.free.push(handle.0).is_err() {
            crate::fatal(format_args!(
                "event pool free ring rejected slot {}",
                handle.0
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventArg, EventKind};
    use crate::runtime::Runtime;

    fn noop(_rt: &Runtime, _a1: &EventArg, _a2: &EventArg) {}

    fn record(core: u32) -> EventRecord {
        EventRecord {
            target_core: core,
            kind: EventKind::Call {
                func: noop,
                arg1: EventArg::none(),
                arg2: EventArg::none(),
            },
            next: None,
        }
    }

    #[test]
    fn test_acquire_take_release_cycle() {
        let pool = EventPool::new(8);
        assert_eq!(pool.available(), 8);

        let handle = pool.acquire(record(3));
        assert_eq!(pool.available(), 7);
        assert_eq!(pool.target_core(handle), 3);

        let rec = pool.take(handle);
        assert_eq!(rec.target_core, 3);
        pool.release(handle);
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn test_all_records_usable() {
        let pool = EventPool::new(4);
        let handles: Vec<_> = (0..4).map(|i| pool.acquire(record(i))).collect();
        assert_eq!(pool.available(), 0);
        for handle in handles {
            pool.take(handle);
            pool.release(handle);
        }
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_indices_recycle() {
        let pool = EventPool::new(2);
        for core in 0..100 {
            let handle = pool.acquire(record(core));
            pool.take(handle);
            pool.release(handle);
        }
        assert_eq!(pool.available(), 2);
    }
}
