//! # Raw Trace Records (Kernel Session ↔ Userspace)
//!
//! Defines the raw record layouts delivered by a kernel trace session for the
//! ALPC (Advanced Local Procedure Call) provider and the stack-walk provider.
//! All types use `#[repr(C)]` so a trace-source implementation can copy them
//! straight out of a session buffer.
//!
//! ## Record Kinds
//!
//! - [`AlpcRecord`] - One ALPC operation (send, receive, wait, unwait),
//!   discriminated by [`AlpcRecord::opcode`]
//! - [`StackWalkRecord`] - Call stack captured for the thread that emitted
//!   the immediately preceding ALPC record
//!
//! Userspace never interprets these layouts directly beyond normalization:
//! the engine turns them into typed events as soon as they arrive.

#![no_std]

// ============================================================================
// Opcode Constants
// ============================================================================

/// **Stack Walk**: call stack captured for the previous event on a thread
///
/// Emitted by: the stack-walk provider, right after the event it belongs to
/// (the pairing is per thread, not per event id).
pub const STACK_WALK: u32 = 32;

/// **ALPC Send**: a message was sent on a port
///
/// Carries: message id (correlation id)
/// Paired with: `ALPC_RECEIVE_MESSAGE` with the same message id
pub const ALPC_SEND_MESSAGE: u32 = 33;

/// **ALPC Receive**: a message was received on a port
///
/// Carries: message id (correlation id)
pub const ALPC_RECEIVE_MESSAGE: u32 = 34;

/// **ALPC Wait For Reply**: the sender blocks waiting for the reply
///
/// Carries: message id. Never participates in correlation.
pub const ALPC_WAIT_FOR_REPLY: u32 = 35;

/// **ALPC Wait For New Message**: a server thread waits on its port
///
/// Emitted by the provider but not part of the timeline model.
pub const ALPC_WAIT_FOR_NEW_MESSAGE: u32 = 36;

/// **ALPC Unwait**: a waiting thread was released
///
/// Carries no message id.
pub const ALPC_UNWAIT: u32 = 37;

/// Maximum number of frames a stack-walk record can carry
///
/// Kernel stack walks are truncated at 192 frames.
pub const MAX_STACK_DEPTH: usize = 192;

/// Length of the fixed image-name field (NUL padded)
pub const IMAGE_NAME_LEN: usize = 16;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One ALPC operation as delivered by the kernel session
///
/// **Memory Layout**: `#[repr(C)]`, 40 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlpcRecord {
    /// Process ID of the process that performed the operation
    pub process_id: u32,

    /// Thread ID of the thread that performed the operation
    ///
    /// Used to pair a later [`StackWalkRecord`] with this record.
    pub thread_id: u32,

    /// Wall-clock timestamp in nanoseconds since the Unix epoch
    pub timestamp_ns: u64,

    /// Operation kind (see constants: `ALPC_SEND_MESSAGE`, `ALPC_UNWAIT`, ...)
    pub opcode: u32,

    /// Message id assigned by the kernel to the round trip
    ///
    /// **Value**:
    /// - Send/Receive/WaitForReply: the correlation id
    /// - Unwait: always 0 (not meaningful)
    ///
    /// Ids are recycled once a round trip completes, so they are unique only
    /// among in-flight messages.
    pub message_id: u32,

    /// Image file name of the process, NUL padded (may be truncated)
    pub image_name: [u8; IMAGE_NAME_LEN],
}

impl AlpcRecord {
    /// Build a record, truncating `image_name` to the fixed field width
    #[must_use]
    pub fn new(
        opcode: u32,
        process_id: u32,
        image_name: &str,
        thread_id: u32,
        timestamp_ns: u64,
        message_id: u32,
    ) -> Self {
        let mut name = [0u8; IMAGE_NAME_LEN];
        let bytes = image_name.as_bytes();
        let copy_len = bytes.len().min(IMAGE_NAME_LEN);
        name[..copy_len].copy_from_slice(&bytes[..copy_len]);

        Self { process_id, thread_id, timestamp_ns, opcode, message_id, image_name: name }
    }

    /// Image name up to the first NUL
    ///
    /// Returns the longest valid UTF-8 prefix if truncation split a character.
    #[must_use]
    pub fn image_name(&self) -> &str {
        let end = self.image_name.iter().position(|&b| b == 0).unwrap_or(IMAGE_NAME_LEN);
        let raw = &self.image_name[..end];
        match core::str::from_utf8(raw) {
            Ok(name) => name,
            Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

/// Call stack captured for the previous event on a thread
///
/// **Memory Layout**: `#[repr(C)]`, frames stored innermost first
#[repr(C)]
#[derive(Clone, Debug)]
pub struct StackWalkRecord {
    /// Timestamp of the event this stack belongs to (nanoseconds)
    pub event_timestamp_ns: u64,

    /// Thread whose stack was walked
    pub thread_id: u32,

    /// Number of valid entries in `frames`
    ///
    /// May exceed [`MAX_STACK_DEPTH`] in malformed input; readers clamp.
    pub frame_count: u32,

    /// Instruction pointers, index 0 = innermost frame
    pub frames: [u64; MAX_STACK_DEPTH],
}

impl StackWalkRecord {
    /// Build a record from a frame slice (extra frames are dropped)
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(thread_id: u32, event_timestamp_ns: u64, frames: &[u64]) -> Self {
        let mut buf = [0u64; MAX_STACK_DEPTH];
        let copy_len = frames.len().min(MAX_STACK_DEPTH);
        buf[..copy_len].copy_from_slice(&frames[..copy_len]);

        Self { event_timestamp_ns, thread_id, frame_count: copy_len as u32, frames: buf }
    }

    /// Number of frames that can actually be read
    #[must_use]
    pub fn valid_frames(&self) -> usize {
        (self.frame_count as usize).min(MAX_STACK_DEPTH)
    }

    /// Frame accessor: instruction pointer at `index` (0 = innermost)
    ///
    /// Returns 0 for indices past the valid frames.
    #[must_use]
    pub fn instruction_pointer(&self, index: usize) -> u64 {
        if index < self.valid_frames() {
            self.frames[index]
        } else {
            0
        }
    }
}
