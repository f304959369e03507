//! # Reactor
//!
//! The per-core run loop and its owned queues.
//!
//! Each enabled core runs one reactor, pinned to that core, interleaving
//! three kinds of work with no preemption:
//!
//! 1. **Events**: drain the core's event queue, bounded by an occupancy
//!    snapshot taken at the top of the iteration so re-enqueueing events
//!    cannot livelock the loop.
//! 2. **Timers**: one call into the external timer driver.
//! 3. **Pollers**: advance exactly one poller: dequeue the head of the
//!    active ring, invoke it, re-enqueue it at the tail.
//!
//! The active-poller ring is touched only from the owning core; every
//! structural change to it arrives as an event executed by this loop, which
//! is what keeps the ring lock-free without atomics beyond its own indices.
//! The loop exits when the runtime state leaves `Running`. There is no sleep;
//! an idle iteration yields the CPU without reordering around the lifecycle
//! check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::event::EventHandle;
use crate::poller::Poller;
use crate::ring::{MpmcRing, SpscRing};
use crate::runtime::{ReactorState, Runtime};

/// Per-core reactor state: the event queue, the active-poller ring, and
/// execution counters.
pub(crate) struct Reactor {
    pub(crate) core: u32,
    /// Cross-core event queue: any thread enqueues, only this reactor
    /// dequeues.
    pub(crate) events: MpmcRing<EventHandle>,
    /// Active pollers, rotated once per iteration. Owning reactor only.
    pub(crate) active_pollers: SpscRing<Arc<Poller>>,
    pub(crate) events_executed: AtomicU64,
    pub(crate) pollers_polled: AtomicU64,
}

impl Reactor {
    pub(crate) fn new(core: u32, config: &RuntimeConfig) -> Self {
        Self {
            core,
            events: MpmcRing::new(config.event_queue_depth),
            active_pollers: SpscRing::new(config.poller_ring_depth),
            events_executed: AtomicU64::new(0),
            pollers_polled: AtomicU64::new(0),
        }
    }

    /// Appends a poller at the tail of the active ring. On-core only.
    pub(crate) fn add_poller(&self, poller: Arc<Poller>) {
        poller.set_core(self.core);
        if self.active_pollers.push(poller).is_err() {
            crate::fatal(format_args!(
                "active-poller ring for core {} is full",
                self.core
            ));
        }
    }

    /// Sweeps a poller out of the active ring, preserving the relative
    /// order of the survivors. On-core only.
    ///
    /// The rotation count is fixed at entry so the removal does not make
    /// the loop visit a survivor twice.
    pub(crate) fn remove_poller(&self, poller: &Arc<Poller>) {
        let count = self.active_pollers.len();
        for _ in 0..count {
            let Some(current) = self.active_pollers.pop() else {
                break;
            };
            if Arc::ptr_eq(&current, poller) {
                continue;
            }
            if self.active_pollers.push(current).is_err() {
                crate::fatal(format_args!(
                    "poller could not be re-enqueued on core {}",
                    self.core
                ));
            }
        }
    }

    /// Rotates through the ring to test membership, restoring its order.
    #[cfg(test)]
    pub(crate) fn contains_poller(&self, poller: &Arc<Poller>) -> bool {
        let count = self.active_pollers.len();
        let mut found = false;
        for _ in 0..count {
            let current = self.active_pollers.pop().expect("ring shrank during probe");
            if Arc::ptr_eq(&current, poller) {
                found = true;
            }
            self.active_pollers
                .push(current)
                .unwrap_or_else(|_| panic!("ring rejected probe re-enqueue"));
        }
        found
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("core", &self.core)
            .field("events_pending", &self.events.len())
            .field("active_pollers", &self.active_pollers.len())
            .finish()
    }
}

/// Aborts the process if the reactor body unwinds. Events and pollers run
/// user code; a cooperative runtime cannot outlive a faulted core.
struct SharedFateGuard {
    core: u32,
}

impl Drop for SharedFateGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("reactor {} panicked, aborting process", self.core);
            std::process::abort();
        }
    }
}

/// One loop iteration: drain events, service timers, advance one poller.
///
/// Returns whether the iteration found any work, which the caller uses to
/// decide on an idle yield. Deterministic: tests drive this directly.
pub(crate) fn run_iteration(rt: &Runtime, core: u32) -> bool {
    let executed = rt.run_queued_events(core);

    rt.timer_driver().manage_expired();

    let reactor = rt.reactor(core);
    let polled = match reactor.active_pollers.pop() {
        Some(poller) => {
            poller.poll();
            reactor.pollers_polled.fetch_add(1, Ordering::Relaxed);
            if reactor.active_pollers.push(poller).is_err() {
                crate::fatal(format_args!(
                    "poller could not be re-enqueued on core {core}"
                ));
            }
            true
        }
        None => false,
    };

    executed > 0 || polled
}

/// The reactor thread body: names the thread, then loops until the runtime
/// leaves `Running`.
pub(crate) fn run(rt: &Runtime, core: u32) {
    let _shared_fate = SharedFateGuard { core };

    rt.platform().set_current_thread_name(&format!("reactor {core}"));
    tracing::info!("reactor {core}: entering run loop");

    loop {
        let had_work = run_iteration(rt, core);
        if rt.state() != ReactorState::Running {
            break;
        }
        if !had_work {
            std::thread::yield_now();
        }
    }

    tracing::info!("reactor {core}: exiting run loop");
}
