//! Shared helpers for unit tests: a deterministic platform and a
//! small-capacity runtime constructor.

use crate::config::RuntimeConfig;
use crate::platform::{NoopTimers, Platform};
use crate::runtime::Runtime;

/// Platform with a fixed enabled-core set and master core, and no thread
/// side effects. Keeps mask filtering independent of the build host.
pub(crate) struct StaticPlatform {
    enabled: u64,
    master: u32,
}

impl StaticPlatform {
    pub(crate) fn new(enabled: u64, master: u32) -> Self {
        Self { enabled, master }
    }
}

impl Platform for StaticPlatform {
    fn master_core(&self) -> u32 {
        self.master
    }

    fn is_core_enabled(&self, core: u32) -> bool {
        core < crate::MAX_CORES && self.enabled & (1 << core) != 0
    }

    fn pin_current_thread(&self, _core: u32) {}

    fn set_current_thread_name(&self, _name: &str) {}
}

/// Builds a runtime with small queues, a [`StaticPlatform`], and no timers.
pub(crate) fn test_runtime(mask: &str, enabled: u64, master: u32) -> Runtime {
    let config = RuntimeConfig::builder()
        .core_mask(mask)
        .event_pool_capacity(1024)
        .event_queue_depth(256)
        .poller_ring_depth(16)
        .build()
        .expect("test config is valid");
    Runtime::init_with(
        config,
        Box::new(StaticPlatform::new(enabled, master)),
        Box::new(NoopTimers),
    )
    .expect("test runtime init")
}
