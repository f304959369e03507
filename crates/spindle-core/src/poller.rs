//! # Pollers
//!
//! Long-lived functions re-invoked in round-robin by their owning reactor on
//! every loop iteration.
//!
//! A poller is created by the caller, shared as `Arc<Poller>`, and handed to
//! [`Runtime::poller_register`](crate::Runtime::poller_register) with its
//! initial core. From then on it is conceptually owned by that core's active
//! ring: every structural operation (register, unregister, migrate) is
//! posted as an event and executed inside the owning core's loop, which is
//! what lets the active ring stay single-producer single-consumer with no
//! locks. Completion of any of the three operations is observable only
//! through its optional completion event.

use std::sync::atomic::{AtomicU32, Ordering};

/// Owning-core value before the first registration completes.
pub(crate) const CORE_UNASSIGNED: u32 = u32::MAX;

/// A long-lived unit of work serviced round-robin by one reactor.
///
/// The work closure runs on the owning core only and must not block; a
/// blocking poller stalls every event and poller on that core.
pub struct Poller {
    work: Box<dyn Fn() + Send + Sync>,
    /// Owning core. Stored only by code running on the owning core; read
    /// from anywhere (unregister targets it from arbitrary cores).
    core: AtomicU32,
}

impl Poller {
    /// Creates a poller from its work function.
    ///
    /// The poller has no owning core until a registration completes.
    pub fn new(work: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            work: Box::new(work),
            core: AtomicU32::new(CORE_UNASSIGNED),
        }
    }

    /// The core whose active ring currently holds this poller, or `None`
    /// before the first registration completes.
    ///
    /// During a migration the value flips to the new core only when the
    /// re-registration executes there; it never points at two cores.
    #[must_use]
    pub fn owning_core(&self) -> Option<u32> {
        match self.core.load(Ordering::Relaxed) {
            CORE_UNASSIGNED => None,
            core => Some(core),
        }
    }

    pub(crate) fn raw_core(&self) -> u32 {
        self.core.load(Ordering::Relaxed)
    }

    pub(crate) fn set_core(&self, core: u32) {
        self.core.store(core, Ordering::Relaxed);
    }

    pub(crate) fn poll(&self) {
        (self.work)();
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("owning_core", &self.owning_core())
            .finish_non_exhaustive()
    }
}
