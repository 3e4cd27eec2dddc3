//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a thread ID where a
//! message id is expected, and make function signatures more expressive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Thread ID
///
/// Stack walks are paired with events by thread, so this is also the key of
/// the thread-pending-stack map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// ALPC message id (correlation id)
///
/// Assigned by the kernel to a send/receive round trip and recycled once the
/// round trip completes. Unique only among in-flight messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MSG:{}", self.0)
    }
}

/// Wall-clock timestamp in nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (u64)
    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero
    #[must_use]
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}s", self.0 / 1_000_000_000, (self.0 % 1_000_000_000) / 1_000)
    }
}

/// Duration in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub u64);

impl Duration {
    /// Convert to milliseconds (f64)
    #[allow(clippy::cast_precision_loss)]
    pub fn as_millis(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Convert to microseconds (u64)
    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.as_millis();
        if ms >= 1.0 {
            write!(f, "{ms:.2}ms")
        } else {
            write!(f, "{}us", self.as_micros())
        }
    }
}

/// Capture engine lifecycle state
///
/// ```text
/// Created ──start──▶ Started ──run──▶ Running ⇄ Paused
///    └──────────────────┴───────dispose───────┴──────▶ Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureState {
    /// No trace session yet
    Created = 0,
    /// Session open, records arrive but ALPC records are ignored
    Started = 1,
    /// ALPC records are recorded and correlated
    Running = 2,
    /// ALPC records are ignored; pending sends are kept
    Paused = 3,
    /// Session released; nothing is processed any more
    Disposed = 4,
}

impl CaptureState {
    /// Decode the value stored in the engine's state cell
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CaptureState::Created,
            1 => CaptureState::Started,
            2 => CaptureState::Running,
            3 => CaptureState::Paused,
            _ => CaptureState::Disposed,
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Created => "Created",
            CaptureState::Started => "Started",
            CaptureState::Running => "Running",
            CaptureState::Paused => "Paused",
            CaptureState::Disposed => "Disposed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_state_round_trip() {
        for state in [
            CaptureState::Created,
            CaptureState::Started,
            CaptureState::Running,
            CaptureState::Paused,
            CaptureState::Disposed,
        ] {
            assert_eq!(CaptureState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
        assert_eq!(Tid(88).to_string(), "TID:88");
        assert_eq!(MessageId(7).to_string(), "MSG:7");
    }

    #[test]
    fn test_timestamp_display() {
        assert_eq!(Timestamp(1_500_000_000).to_string(), "1.500000s");
        assert_eq!(Timestamp(42_000).to_string(), "0.000042s");
    }

    #[test]
    fn test_timestamp_since_saturates() {
        assert_eq!(Timestamp(30).since(Timestamp(10)), Duration(20));
        assert_eq!(Timestamp(10).since(Timestamp(30)), Duration(0));
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(Duration(5_000_000).to_string(), "5.00ms");
        assert_eq!(Duration(250_000).to_string(), "250us");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&MessageId(9)).unwrap();
        assert_eq!(json, "9");
        let tid: Tid = serde_json::from_str("17").unwrap();
        assert_eq!(tid, Tid(17));
    }
}
