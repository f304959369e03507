//! Runtime configuration.

use crate::runtime::RuntimeError;

/// Default number of preallocated event records shared by all cores.
pub const DEFAULT_EVENT_POOL_CAPACITY: usize = 262_144;

/// Default per-core event queue depth.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 65_536;

/// Default per-core active-poller ring depth.
///
/// The ring holds one item fewer than its depth; the default leaves room for
/// 4,095 pollers per core.
pub const DEFAULT_POLLER_RING_DEPTH: usize = 4_096;

/// Configuration for [`Runtime`](crate::Runtime) construction.
///
/// The queues are the backpressure knobs of the whole runtime: a full event
/// queue or exhausted pool aborts the process, so the depths here are sized
/// for worst-case offered load, not steady state.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Hex core mask selecting reactor cores (`"0x"` prefix optional).
    /// `None` selects every enabled platform core.
    pub core_mask: Option<String>,
    /// Number of preallocated event records.
    pub event_pool_capacity: usize,
    /// Per-core event queue depth.
    pub event_queue_depth: usize,
    /// Per-core active-poller ring depth.
    pub poller_ring_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            core_mask: None,
            event_pool_capacity: DEFAULT_EVENT_POOL_CAPACITY,
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
            poller_ring_depth: DEFAULT_POLLER_RING_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any capacity is zero or the poller ring is too
    /// shallow to hold a single poller.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.event_pool_capacity == 0 {
            return Err(RuntimeError::InvalidConfig(
                "event_pool_capacity must be > 0".to_string(),
            ));
        }
        if self.event_queue_depth == 0 {
            return Err(RuntimeError::InvalidConfig(
                "event_queue_depth must be > 0".to_string(),
            ));
        }
        if self.poller_ring_depth < 2 {
            return Err(RuntimeError::InvalidConfig(
                "poller_ring_depth must be >= 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    core_mask: Option<String>,
    event_pool_capacity: Option<usize>,
    event_queue_depth: Option<usize>,
    poller_ring_depth: Option<usize>,
}

impl RuntimeConfigBuilder {
    /// Sets the hex core mask.
    #[must_use]
    pub fn core_mask(mut self, mask: impl Into<String>) -> Self {
        self.core_mask = Some(mask.into());
        self
    }

    /// Sets the event pool capacity.
    #[must_use]
    pub fn event_pool_capacity(mut self, capacity: usize) -> Self {
        self.event_pool_capacity = Some(capacity);
        self
    }

    /// Sets the per-core event queue depth.
    #[must_use]
    pub fn event_queue_depth(mut self, depth: usize) -> Self {
        self.event_queue_depth = Some(depth);
        self
    }

    /// Sets the per-core active-poller ring depth.
    #[must_use]
    pub fn poller_ring_depth(mut self, depth: usize) -> Self {
        self.poller_ring_depth = Some(depth);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<RuntimeConfig, RuntimeError> {
        let config = RuntimeConfig {
            core_mask: self.core_mask,
            event_pool_capacity: self.event_pool_capacity.unwrap_or(DEFAULT_EVENT_POOL_CAPACITY),
            event_queue_depth: self.event_queue_depth.unwrap_or(DEFAULT_EVENT_QUEUE_DEPTH),
            poller_ring_depth: self.poller_ring_depth.unwrap_or(DEFAULT_POLLER_RING_DEPTH),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.event_pool_capacity, DEFAULT_EVENT_POOL_CAPACITY);
        assert_eq!(config.event_queue_depth, DEFAULT_EVENT_QUEUE_DEPTH);
        assert_eq!(config.poller_ring_depth, DEFAULT_POLLER_RING_DEPTH);
        assert!(config.core_mask.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::builder()
            .core_mask("0x3")
            .event_pool_capacity(1024)
            .event_queue_depth(256)
            .poller_ring_depth(16)
            .build()
            .unwrap();
        assert_eq!(config.core_mask.as_deref(), Some("0x3"));
        assert_eq!(config.event_pool_capacity, 1024);
        assert_eq!(config.event_queue_depth, 256);
        assert_eq!(config.poller_ring_depth, 16);
    }

    #[test]
    fn test_zero_capacities_rejected() {
        assert!(RuntimeConfig::builder().event_pool_capacity(0).build().is_err());
        assert!(RuntimeConfig::builder().event_queue_depth(0).build().is_err());
        assert!(RuntimeConfig::builder().poller_ring_depth(1).build().is_err());
    }
}
