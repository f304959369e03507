//! # Ring Primitives
//!
//! Bounded lock-free rings used on the reactor hot path.
//!
//! Two flavors cover every queue in the runtime:
//!
//! - [`SpscRing`]: single-producer single-consumer. Backs each reactor's
//!   active-poller ring, where the owning reactor is both producer and
//!   consumer.
//! - [`MpmcRing`]: multi-producer multi-consumer. Backs the per-core event
//!   queues (any core enqueues, only the owning reactor dequeues) and the
//!   event pool free list.
//!
//! Both round capacity up to a power of two and use acquire/release atomics;
//! neither allocates after construction.

mod mpmc;
mod spsc;

pub use mpmc::MpmcRing;
pub use spsc::SpscRing;

/// A wrapper that pads a value to a cache line boundary to prevent false
/// sharing between producer-side and consumer-side indices.
#[repr(C, align(64))]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    /// Creates a new cache-padded value.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> std::ops::DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}
