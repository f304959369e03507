//! # Events
//!
//! One-shot closures targeted at a specific core, drawn from a fixed,
//! preallocated pool.
//!
//! A producer on any core fills an event record (target core, function, two
//! opaque arguments, optional continuation), obtains an [`EventHandle`] from
//! the pool, and enqueues the handle on the target core's event queue.
//! Ownership transfers to the target reactor at that point; the reactor
//! invokes the function, dispatches the continuation, and returns the record
//! to the pool. No party allocates on this path; the pool is sized up front
//! and an exhausted pool is an operator sizing error, not a recoverable
//! condition.
//!
//! The structural poller operations (add, remove, migrate) travel through
//! the same queues as ordinary events, but as dedicated [`EventKind`]
//! variants so the reactor can run them without an indirect call.

mod pool;

pub(crate) use pool::EventPool;

use std::any::Any;
use std::sync::Arc;

use crate::poller::Poller;
use crate::runtime::Runtime;

/// Function invoked when a user event executes on its target core.
///
/// The function runs on the event's target core, inside that core's reactor
/// loop, and must not block. It receives the runtime (for follow-up
/// dispatches) and the two opaque arguments captured at allocation.
pub type EventFn = fn(&Runtime, &EventArg, &EventArg);

/// A type-erased, shareable event argument.
///
/// Wraps `Arc<dyn Any + Send + Sync>`; cloning bumps a refcount and never
/// allocates, which keeps cross-core dispatch allocation-free once the
/// argument exists.
#[derive(Clone)]
pub struct EventArg(Option<Arc<dyn Any + Send + Sync>>);

impl EventArg {
    /// Wraps a value in a fresh shared argument.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Wraps an existing shared value without copying it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(Some(value))
    }

    /// The empty argument.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Returns true if this is the empty argument.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Borrows the argument as `T`, or `None` if empty or of another type.
    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|arg| (**arg).downcast_ref::<T>())
    }
}

impl std::fmt::Debug for EventArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_some() {
            f.write_str("EventArg(..)")
        } else {
            f.write_str("EventArg(None)")
        }
    }
}

/// Handle to a pooled event record.
///
/// Obtained from [`Runtime::event_allocate`](crate::Runtime::event_allocate)
/// and consumed by [`Runtime::event_call`](crate::Runtime::event_call) or by
/// wiring it into another event's continuation slot. The holder owns the
/// record; enqueueing transfers ownership to the target reactor, after which
/// the handle must not be used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(pub(crate) u32);

/// What an event does when it executes.
pub(crate) enum EventKind {
    /// User event: an indirect call with two opaque arguments.
    Call {
        func: EventFn,
        arg1: EventArg,
        arg2: EventArg,
    },
    /// Append a poller to the executing core's active ring.
    AddPoller { poller: Arc<Poller> },
    /// Sweep a poller out of the executing core's active ring.
    RemovePoller { poller: Arc<Poller> },
    /// Re-register a poller on whichever core executes this event; the
    /// record's continuation becomes the registration's completion.
    MigratePoller { poller: Arc<Poller> },
}

/// A filled event record, stored in a pool slot while in flight.
pub(crate) struct EventRecord {
    pub(crate) target_core: u32,
    pub(crate) kind: EventKind,
    pub(crate) next: Option<EventHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_arg_downcast() {
        let arg = EventArg::new(AtomicU64::new(7));
        assert_eq!(
            arg.downcast_ref::<AtomicU64>()
                .unwrap()
                .load(std::sync::atomic::Ordering::Relaxed),
            7
        );
        assert!(arg.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn test_arg_none() {
        let arg = EventArg::none();
        assert!(arg.is_none());
        assert!(arg.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn test_arg_clone_shares_value() {
        let arg = EventArg::new(AtomicU64::new(0));
        let clone = arg.clone();
        arg.downcast_ref::<AtomicU64>()
            .unwrap()
            .store(11, std::sync::atomic::Ordering::Relaxed);
        assert_eq!(
            clone
                .downcast_ref::<AtomicU64>()
                .unwrap()
                .load(std::sync::atomic::Ordering::Relaxed),
            11
        );
    }
}
