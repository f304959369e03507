//! # Runtime
//!
//! The process-wide reactor runtime: the sparse reactor table, the global
//! event pool, the lifecycle state machine, and the public dispatch and
//! poller-protocol surface.
//!
//! ## Lifecycle
//!
//! ```text
//! Invalid ──init──▶ Initialized ──start──▶ Running ──stop──▶ Exiting ──▶ Shutdown
//! ```
//!
//! Construction corresponds to `init`: parsing and filtering the core mask,
//! building one reactor per set bit, and preallocating the event pool.
//! [`Runtime::start`] pins the calling thread to the master core, launches
//! one pinned thread per remaining enabled core, runs the master reactor
//! inline, and blocks until every reactor has observed the exit request.
//! The state word is a relaxed atomic; loops tolerate reads that are stale
//! by one iteration.
//!
//! ## Ownership rules
//!
//! Dispatch is allowed from any thread. Each core's event queue has exactly
//! one consumer (its reactor), and each core's active-poller ring is touched
//! only from its own reactor: the poller protocol funnels every structural
//! mutation through events executed on the owning core.

mod mask;

pub use mask::{parse_core_mask, MaskParseError};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::RuntimeConfig;
use crate::event::{EventArg, EventFn, EventHandle, EventKind, EventPool, EventRecord};
use crate::platform::{NoopTimers, OsPlatform, Platform, TimerDriver};
use crate::poller::Poller;
use crate::reactor::{self, Reactor};
use crate::MAX_CORES;

/// Lifecycle states, in order. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReactorState {
    /// No runtime exists yet.
    Invalid = 0,
    /// Reactors and the event pool are constructed.
    Initialized = 1,
    /// Reactor loops are executing.
    Running = 2,
    /// Stop requested; loops exit at their next lifecycle check.
    Exiting = 3,
    /// All reactor loops have exited.
    Shutdown = 4,
}

impl ReactorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Exiting,
            4 => Self::Shutdown,
            _ => Self::Invalid,
        }
    }
}

/// Errors reported by runtime construction and lifecycle operations.
///
/// These are the recoverable configuration errors of the runtime; capacity
/// violations on the dispatch path abort the process instead (the queues are
/// sized for worst-case load, and silent failure would corrupt ordering).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The core mask did not parse.
    #[error(transparent)]
    Mask(#[from] MaskParseError),

    /// The master core's bit is absent from the mask after filtering.
    #[error("master core {master} must be set in core mask {mask:#x}")]
    MasterCoreMissing {
        /// The platform's master core.
        master: u32,
        /// The mask as parsed, before filtering.
        mask: u64,
    },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("invalid runtime state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        /// State the operation requires.
        expected: ReactorState,
        /// State the runtime was in.
        actual: ReactorState,
    },

    /// A reactor thread could not be spawned.
    #[error("failed to spawn reactor thread for core {core}: {source}")]
    Spawn {
        /// The core whose reactor failed to launch.
        core: u32,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Counters and occupancy for one reactor.
#[derive(Debug, Clone)]
pub struct CoreStats {
    /// Logical core of the reactor.
    pub core: u32,
    /// Events executed since init.
    pub events_executed: u64,
    /// Poller invocations since init.
    pub pollers_polled: u64,
    /// Events currently queued (snapshot).
    pub events_pending: usize,
    /// Pollers currently in the active ring (snapshot).
    pub active_pollers: usize,
}

/// Point-in-time statistics for every enabled core.
#[derive(Debug, Clone)]
pub struct RuntimeStats {
    /// One entry per enabled core, in core order.
    pub cores: Vec<CoreStats>,
    /// Free records remaining in the event pool (snapshot).
    pub events_free: usize,
}

/// The per-core cooperative reactor runtime.
///
/// One value per process; see the [module docs](self) for the lifecycle and
/// ownership rules. All dispatch methods take `&self` and are callable from
/// any thread.
pub struct Runtime {
    reactors: Box<[Option<Reactor>]>,
    mask: u64,
    core_count: u32,
    state: AtomicU8,
    pool: Option<EventPool>,
    platform: Box<dyn Platform>,
    timers: Box<dyn TimerDriver>,
}

impl Runtime {
    /// Constructs a runtime from a hex core mask, the OS platform, and no
    /// timer facility.
    ///
    /// # Errors
    ///
    /// Returns an error if the mask does not parse or the master core's bit
    /// is missing after offline cores are filtered out.
    pub fn init(mask: &str) -> Result<Self, RuntimeError> {
        let config = RuntimeConfig::builder().core_mask(mask).build()?;
        Self::init_with(config, Box::new(OsPlatform::new()), Box::new(NoopTimers))
    }

    /// Constructs a runtime from explicit configuration, platform, and timer
    /// driver.
    ///
    /// Mask bits for cores the platform reports as disabled are cleared
    /// silently. An absent mask selects every enabled platform core.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration, an unparseable mask, or a
    /// missing master-core bit.
    pub fn init_with(
        config: RuntimeConfig,
        platform: Box<dyn Platform>,
        timers: Box<dyn TimerDriver>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let requested = match &config.core_mask {
            Some(mask) => parse_core_mask(mask)?,
            None => {
                let mut mask = 0u64;
                for core in 0..MAX_CORES {
                    if platform.is_core_enabled(core) {
                        mask |= 1 << core;
                    }
                }
                mask
            }
        };

        let mut mask = 0u64;
        for core in 0..MAX_CORES {
            if requested & (1 << core) != 0 && platform.is_core_enabled(core) {
                mask |= 1 << core;
            }
        }

        let master = platform.master_core();
        if master >= MAX_CORES || mask & (1 << master) == 0 {
            return Err(RuntimeError::MasterCoreMissing {
                master,
                mask: requested,
            });
        }

        let mut reactors: Vec<Option<Reactor>> = (0..MAX_CORES).map(|_| None).collect();
        let mut core_count = 0;
        for core in 0..MAX_CORES {
            if mask & (1 << core) != 0 {
                reactors[core as usize] = Some(Reactor::new(core, &config));
                core_count += 1;
            }
        }

        let pool = EventPool::new(config.event_pool_capacity);

        tracing::info!(
            "occupied core mask is {mask:#x} ({core_count} cores, {} event records)",
            pool.capacity()
        );

        Ok(Self {
            reactors: reactors.into_boxed_slice(),
            mask,
            core_count,
            state: AtomicU8::new(ReactorState::Initialized as u8),
            pool: Some(pool),
            platform,
            timers,
        })
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ReactorState {
        ReactorState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// The number of cores running reactors.
    #[must_use]
    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    /// The effective core mask, after offline cores were filtered.
    #[must_use]
    pub fn core_mask(&self) -> u64 {
        self.mask
    }

    /// Runs the reactors until [`stop`](Self::stop) is observed.
    ///
    /// Pins the calling thread to the master core and runs that reactor
    /// inline; every other enabled core gets a pinned thread named
    /// `"reactor <core>"`. Returns once all reactors have exited and the
    /// state has reached `Shutdown`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is not freshly initialized or a
    /// reactor thread fails to spawn (in which case the already-launched
    /// reactors are stopped before returning).
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.transition(ReactorState::Initialized, ReactorState::Running)?;

        let master = self.platform.master_core();
        tracing::info!(
            "starting reactors on mask {:#x}, master core {master}",
            self.mask
        );

        let mut spawn_error = None;
        thread::scope(|scope| {
            for core in self.enabled_cores() {
                if core == master {
                    continue;
                }
                let spawned = thread::Builder::new()
                    .name(format!("reactor {core}"))
                    .spawn_scoped(scope, move || {
                        self.platform.pin_current_thread(core);
                        reactor::run(self, core);
                    });
                if let Err(source) = spawned {
                    spawn_error = Some(RuntimeError::Spawn { core, source });
                    break;
                }
            }

            if spawn_error.is_some() {
                // Already-launched reactors observe the exit at their next
                // lifecycle check; the scope joins them.
                self.state
                    .store(ReactorState::Exiting as u8, Ordering::Relaxed);
                return;
            }

            self.platform.pin_current_thread(master);
            reactor::run(self, master);
        });

        self.state
            .store(ReactorState::Shutdown as u8, Ordering::Relaxed);
        tracing::info!("all reactors exited");

        match spawn_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Requests shutdown. Callable from any thread, including from inside
    /// events and pollers; a no-op unless the runtime is running.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                ReactorState::Running as u8,
                ReactorState::Exiting as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            tracing::info!("reactor stop requested");
        }
    }

    /// Releases the reactors and the event pool.
    ///
    /// # Errors
    ///
    /// Returns an error unless the runtime has reached `Shutdown` (or was
    /// initialized and never started).
    pub fn fini(&mut self) -> Result<(), RuntimeError> {
        let actual = self.state();
        if actual != ReactorState::Shutdown && actual != ReactorState::Initialized {
            return Err(RuntimeError::InvalidState {
                expected: ReactorState::Shutdown,
                actual,
            });
        }
        for slot in self.reactors.iter_mut() {
            *slot = None;
        }
        self.pool = None;
        self.state
            .store(ReactorState::Shutdown as u8, Ordering::Relaxed);
        tracing::info!("reactors finalized");
        Ok(())
    }

    /// Statistics snapshot across all enabled cores.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        let cores = self
            .enabled_cores()
            .map(|core| {
                let reactor = self.reactor(core);
                CoreStats {
                    core,
                    events_executed: reactor.events_executed.load(Ordering::Relaxed),
                    pollers_polled: reactor.pollers_polled.load(Ordering::Relaxed),
                    events_pending: reactor.events.len(),
                    active_pollers: reactor.active_pollers.len(),
                }
            })
            .collect();
        RuntimeStats {
            cores,
            events_free: self.pool().available(),
        }
    }

    // ---- event dispatch ---------------------------------------------------

    /// Fills an event record from the pool: target core, function, two
    /// opaque arguments, and an optional continuation dispatched after the
    /// function returns.
    ///
    /// The caller owns the handle until it is passed to
    /// [`event_call`](Self::event_call) or wired into another event's
    /// continuation slot. Aborts the process if the pool is exhausted.
    pub fn event_allocate(
        &self,
        core: u32,
        func: EventFn,
        arg1: EventArg,
        arg2: EventArg,
        next: Option<EventHandle>,
    ) -> EventHandle {
        self.pool().acquire(EventRecord {
            target_core: core,
            kind: EventKind::Call { func, arg1, arg2 },
            next,
        })
    }

    /// Enqueues an event on its target core's queue, transferring ownership
    /// to that reactor.
    ///
    /// Events from one producer to one core execute in dispatch order; no
    /// order is promised across producers. Aborts the process if the target
    /// core has no reactor or its queue is full.
    pub fn event_call(&self, event: EventHandle) {
        let core = self.pool().target_core(event);
        let reactor = self.reactor(core);
        if reactor.events.push(event).is_err() {
            crate::fatal(format_args!("event queue for core {core} is full"));
        }
    }

    /// Runs every event currently queued for `core`, on the calling thread.
    ///
    /// The count is snapshotted at entry, so events enqueued while draining
    /// (including by the events being run) wait for the next call. Must only
    /// be called from the thread acting as `core`'s reactor, which is the reactor
    /// loop itself once the runtime is running.
    pub fn event_queue_run_all(&self, core: u32) {
        self.run_queued_events(core);
    }

    pub(crate) fn run_queued_events(&self, core: u32) -> usize {
        let reactor = self.reactor(core);
        let count = reactor.events.len();
        let mut executed = 0;
        for _ in 0..count {
            let Some(handle) = reactor.events.pop() else {
                break;
            };
            self.execute_event(core, handle);
            executed += 1;
        }
        executed
    }

    fn execute_event(&self, core: u32, handle: EventHandle) {
        let record = self.pool().take(handle);
        debug_assert_eq!(record.target_core, core, "event executed off its target core");

        let reactor = self.reactor(core);
        reactor.events_executed.fetch_add(1, Ordering::Relaxed);

        match record.kind {
            EventKind::Call { func, arg1, arg2 } => {
                func(self, &arg1, &arg2);
                if let Some(next) = record.next {
                    self.event_call(next);
                }
            }
            EventKind::AddPoller { poller } => {
                reactor.add_poller(poller);
                if let Some(next) = record.next {
                    self.event_call(next);
                }
            }
            EventKind::RemovePoller { poller } => {
                reactor.remove_poller(&poller);
                if let Some(next) = record.next {
                    self.event_call(next);
                }
            }
            EventKind::MigratePoller { poller } => {
                // Re-register on whichever core is executing this event;
                // the continuation becomes the registration's completion.
                self.poller_register(&poller, core, record.next);
            }
        }

        self.pool().release(handle);
    }

    // ---- poller protocol --------------------------------------------------

    /// Registers a poller on `core`'s active ring.
    ///
    /// Returns immediately; the insertion happens inside `core`'s reactor
    /// loop, which then dispatches `complete` if one was supplied. The
    /// poller's owning core is set at insertion time.
    pub fn poller_register(
        &self,
        poller: &Arc<Poller>,
        core: u32,
        complete: Option<EventHandle>,
    ) {
        let event = self.pool().acquire(EventRecord {
            target_core: core,
            kind: EventKind::AddPoller {
                poller: Arc::clone(poller),
            },
            next: complete,
        });
        self.event_call(event);
    }

    /// Removes a poller from its owning core's active ring, preserving the
    /// relative order of the remaining pollers.
    ///
    /// Returns immediately; the removal happens inside the owning core's
    /// reactor loop. The poller may be destroyed only after `complete`
    /// fires.
    pub fn poller_unregister(&self, poller: &Arc<Poller>, complete: Option<EventHandle>) {
        let core = poller.raw_core();
        let event = self.pool().acquire(EventRecord {
            target_core: core,
            kind: EventKind::RemovePoller {
                poller: Arc::clone(poller),
            },
            next: complete,
        });
        self.event_call(event);
    }

    /// Moves a poller to `new_core`, removing it from its current core
    /// first.
    ///
    /// The removal completes on the old core before the re-registration
    /// runs on the new core, so the poller is never present on two rings at
    /// once; its owning core flips only when the re-registration executes.
    /// `complete` fires after the poller is in place on `new_core`. Aborts
    /// the process if `new_core` is not in the core mask.
    pub fn poller_migrate(
        &self,
        poller: &Arc<Poller>,
        new_core: u32,
        complete: Option<EventHandle>,
    ) {
        if new_core >= MAX_CORES || self.mask & (1 << new_core) == 0 {
            crate::fatal(format_args!(
                "cannot migrate poller to core {new_core}: not in core mask {:#x}",
                self.mask
            ));
        }
        let hop = self.pool().acquire(EventRecord {
            target_core: new_core,
            kind: EventKind::MigratePoller {
                poller: Arc::clone(poller),
            },
            next: complete,
        });
        self.poller_unregister(poller, Some(hop));
    }

    // ---- internals --------------------------------------------------------

    fn transition(&self, from: ReactorState, to: ReactorState) -> Result<(), RuntimeError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::Relaxed, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|actual| RuntimeError::InvalidState {
                expected: from,
                actual: ReactorState::from_u8(actual),
            })
    }

    fn enabled_cores(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_CORES).filter(|core| self.mask & (1 << core) != 0)
    }

    pub(crate) fn reactor(&self, core: u32) -> &Reactor {
        self.reactors
            .get(core as usize)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| {
                crate::fatal(format_args!("no reactor constructed for core {core}"))
            })
    }

    fn pool(&self) -> &EventPool {
        self.pool
            .as_ref()
            .unwrap_or_else(|| crate::fatal(format_args!("event pool used after fini")))
    }

    pub(crate) fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub(crate) fn timer_driver(&self) -> &dyn TimerDriver {
        self.timers.as_ref()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state())
            .field("mask", &format_args!("{:#x}", self.mask))
            .field("core_count", &self.core_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_runtime, StaticPlatform};
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    fn append(_rt: &Runtime, arg1: &EventArg, arg2: &EventArg) {
        let buffer = arg1.downcast_ref::<Mutex<String>>().unwrap();
        let ch = arg2.downcast_ref::<char>().unwrap();
        buffer.lock().unwrap().push(*ch);
    }

    #[test]
    fn test_init_filters_offline_cores_silently() {
        // Cores {0, 1, 2} enabled, master 1, mask requests {1, 2, 3}.
        let rt = test_runtime("0xe", 0x7, 1);
        assert_eq!(rt.core_mask(), 0x6);
        assert_eq!(rt.core_count(), 2);
        assert_eq!(rt.state(), ReactorState::Initialized);
    }

    #[test]
    fn test_init_requires_master_bit() {
        let config = RuntimeConfig::builder().core_mask("0x4").build().unwrap();
        let err = Runtime::init_with(
            config,
            Box::new(StaticPlatform::new(0x7, 1)),
            Box::new(NoopTimers),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::MasterCoreMissing { master: 1, mask: 0x4 }
        ));
    }

    #[test]
    fn test_init_rejects_bad_mask() {
        let config = RuntimeConfig::builder().core_mask("0x6g").build().unwrap();
        let err = Runtime::init_with(
            config,
            Box::new(StaticPlatform::new(0x7, 0)),
            Box::new(NoopTimers),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Mask(_)));
    }

    #[test]
    fn test_default_mask_selects_all_enabled_cores() {
        let config = RuntimeConfig::builder()
            .event_pool_capacity(64)
            .event_queue_depth(16)
            .poller_ring_depth(4)
            .build()
            .unwrap();
        let rt = Runtime::init_with(
            config,
            Box::new(StaticPlatform::new(0x2b, 0)),
            Box::new(NoopTimers),
        )
        .unwrap();
        assert_eq!(rt.core_mask(), 0x2b);
        assert_eq!(rt.core_count(), 4);
    }

    #[test]
    fn test_single_producer_order_preserved() {
        let rt = test_runtime("0x3", 0x3, 0);
        let buffer = EventArg::new(Mutex::new(String::new()));

        for ch in ['a', 'b', 'c'] {
            let event =
                rt.event_allocate(1, append, buffer.clone(), EventArg::new(ch), None);
            rt.event_call(event);
        }
        rt.event_queue_run_all(1);

        assert_eq!(
            *buffer.downcast_ref::<Mutex<String>>().unwrap().lock().unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_continuation_runs_after_current_event() {
        let rt = test_runtime("0x7", 0x7, 0);
        let buffer = EventArg::new(Mutex::new(String::new()));

        let second = rt.event_allocate(2, append, buffer.clone(), EventArg::new('2'), None);
        let first =
            rt.event_allocate(0, append, buffer.clone(), EventArg::new('1'), Some(second));
        rt.event_call(first);

        rt.event_queue_run_all(0);
        // The continuation targets core 2 and has not run yet.
        assert_eq!(
            *buffer.downcast_ref::<Mutex<String>>().unwrap().lock().unwrap(),
            "1"
        );
        rt.event_queue_run_all(2);
        assert_eq!(
            *buffer.downcast_ref::<Mutex<String>>().unwrap().lock().unwrap(),
            "12"
        );
    }

    #[test]
    fn test_event_records_recycle() {
        let rt = test_runtime("0x1", 0x1, 0);
        let free_before = rt.stats().events_free;

        fn noop(_rt: &Runtime, _a1: &EventArg, _a2: &EventArg) {}

        for _ in 0..3 * free_before {
            let event = rt.event_allocate(0, noop, EventArg::none(), EventArg::none(), None);
            rt.event_call(event);
            rt.event_queue_run_all(0);
        }
        assert_eq!(rt.stats().events_free, free_before);
    }

    #[test]
    fn test_stats_count_executed_events() {
        let rt = test_runtime("0x1", 0x1, 0);

        fn bump(_rt: &Runtime, arg1: &EventArg, _a2: &EventArg) {
            arg1.downcast_ref::<AtomicU64>()
                .unwrap()
                .fetch_add(1, Ordering::Relaxed);
        }

        let counter = EventArg::new(AtomicU64::new(0));
        for _ in 0..5 {
            let event = rt.event_allocate(0, bump, counter.clone(), EventArg::none(), None);
            rt.event_call(event);
        }
        rt.event_queue_run_all(0);

        let stats = rt.stats();
        assert_eq!(stats.cores.len(), 1);
        assert_eq!(stats.cores[0].events_executed, 5);
        assert_eq!(
            counter.downcast_ref::<AtomicU64>().unwrap().load(Ordering::Relaxed),
            5
        );
    }

    #[test]
    fn test_stop_before_start_is_a_no_op() {
        let rt = test_runtime("0x1", 0x1, 0);
        rt.stop();
        assert_eq!(rt.state(), ReactorState::Initialized);
    }

    #[test]
    fn test_fini_requires_shutdown_or_fresh_init() {
        let mut rt = test_runtime("0x1", 0x1, 0);
        assert!(rt.fini().is_ok());
        assert_eq!(rt.state(), ReactorState::Shutdown);

        // A second fini is fine: the state is Shutdown.
        assert!(rt.fini().is_ok());
    }

    #[test]
    fn test_start_refuses_wrong_state() {
        let mut rt = test_runtime("0x1", 0x1, 0);
        rt.fini().unwrap();
        let err = rt.start().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InvalidState {
                expected: ReactorState::Initialized,
                ..
            }
        ));
    }
}
