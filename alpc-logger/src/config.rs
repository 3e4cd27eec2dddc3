//! Capture engine configuration
//!
//! Defaults: a 64 MB kernel session named `ALPCLogger`, an event buffer
//! trimmed by 100 once it passes 10,000 entries, and no bound on unmatched
//! sends.

use crate::domain::ConfigError;

/// Default session name for a dedicated ALPC session
pub const DEFAULT_SESSION_NAME: &str = "ALPCLogger";

/// Name of the single system-wide kernel logger session
///
/// Older kernels only allow kernel providers on this session.
pub const KERNEL_LOGGER_NAME: &str = "NT Kernel Logger";

/// Event buffer high-water mark
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Number of oldest events dropped once the high-water mark is passed
pub const DEFAULT_EVICTION_BATCH: usize = 100;

/// Settings handed to the trace source when the session is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub name: String,
    /// Per-session kernel buffer size in MB
    pub buffer_size_mb: u32,
    /// Stop the kernel session when the engine releases it
    pub stop_on_dispose: bool,
}

impl SessionSettings {
    /// Settings that attach to the system-wide kernel logger
    #[must_use]
    pub fn kernel_logger() -> Self {
        Self { name: KERNEL_LOGGER_NAME.to_string(), ..Self::default() }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { name: DEFAULT_SESSION_NAME.to_string(), buffer_size_mb: 64, stop_on_dispose: true }
    }
}

/// Capture engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub session: SessionSettings,
    /// Event buffer high-water mark
    pub event_capacity: usize,
    /// Events evicted at once when the high-water mark is passed
    pub eviction_batch: usize,
    /// Bound on unmatched sends (`None` = unbounded)
    ///
    /// When set, the oldest unmatched send is dropped to make room.
    pub max_pending_sends: Option<usize>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            eviction_batch: DEFAULT_EVICTION_BATCH,
            max_pending_sends: None,
        }
    }
}

impl CaptureConfig {
    /// Check the buffer and table bounds
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first invalid bound
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.eviction_batch == 0 || self.eviction_batch > self.event_capacity {
            return Err(ConfigError::InvalidEvictionBatch {
                batch: self.eviction_batch,
                capacity: self.event_capacity,
            });
        }
        if self.max_pending_sends == Some(0) {
            return Err(ConfigError::ZeroPendingBound);
        }
        Ok(())
    }
}
