//! # Spindle Core
//!
//! A per-core cooperative reactor runtime for user-space storage and
//! networking stacks.
//!
//! Each CPU core selected by a startup mask runs one pinned reactor thread
//! that interleaves three kinds of work with no preemption and no blocking:
//!
//! - **Events**: short one-shot closures targeted at a specific core,
//!   drawn from a fixed preallocated pool and delivered through bounded
//!   per-core queues. Dispatch is allowed from any core.
//! - **Pollers**: long-lived functions re-invoked in strict round-robin,
//!   one per loop iteration.
//! - **Timers**: an external facility serviced once per iteration.
//!
//! ## Design Principles
//!
//! 1. **No allocation on the dispatch path** - event records come from a
//!    pool sized at init.
//! 2. **No locks on the hot path** - each core's event queue has a single
//!    consumer, and each core's active-poller ring is touched only by its
//!    own reactor; structural poller changes travel as events executed on
//!    the owning core.
//! 3. **Shared fate** - capacity violations and faults in user code
//!    terminate the process; a cooperative runtime cannot limp along with a
//!    dead core.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spindle_core::{Runtime, Poller, EventArg};
//! use std::sync::Arc;
//!
//! let runtime = Runtime::init("0x3")?;
//! let ticker = Arc::new(Poller::new(|| { /* non-blocking work */ }));
//! runtime.poller_register(&ticker, 1, None);
//!
//! // Blocks until another thread (or an event) calls runtime.stop().
//! runtime.start()?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Unsafe is confined to the ring and pool internals.
#![allow(unsafe_code)]

pub mod config;
pub mod event;
pub mod platform;
mod poller;
mod reactor;
pub mod ring;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use event::{EventArg, EventFn, EventHandle};
pub use platform::{NoopTimers, OsPlatform, Platform, TimerDriver};
pub use poller::Poller;
pub use runtime::{
    parse_core_mask, CoreStats, MaskParseError, ReactorState, Runtime, RuntimeError,
    RuntimeStats,
};

/// Width of the core mask: logical cores are numbered `0..64`.
pub const MAX_CORES: u32 = 64;

/// Result type for spindle-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for spindle-core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Runtime lifecycle and configuration errors.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Core mask parse errors.
    #[error("core mask error: {0}")]
    Mask(#[from] MaskParseError),
}

/// Reports a fatal invariant violation and aborts the process.
///
/// Used for the conditions the runtime refuses to recover from: an exhausted
/// event pool, a full event queue, a broken poller ring. These queues are
/// sized for worst-case load, and continuing past a capacity violation would
/// corrupt delivery ordering.
pub(crate) fn fatal(args: std::fmt::Arguments<'_>) -> ! {
    tracing::error!("{args}");
    std::process::abort();
}
