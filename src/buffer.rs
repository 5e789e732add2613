//! Buffer descriptors exchanged with the caller.

use bitflags::bitflags;

use crate::StreamKind;

bitflags! {
    /// Flags stamped on a buffer descriptor by the completion path.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// The transfer for this buffer ended with an error.
        const ERROR = 0x0040;
    }
}

/// Buffering policy of a stream's queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufMode {
    /// New transfers are refused while no free or queued slot exists.
    #[default]
    Fifo,
    /// The oldest completed slot is recycled when the consumer is not
    /// draining.
    Ring,
}

/// A caller-provided frame buffer.
///
/// The memory behind `userptr` is borrowed from the caller between
/// `queue` and `dequeue` and must stay alive for that whole interval.
/// `bytes_used` and `flags` are filled in by the completion path;
/// `index` is opaque to the core and comes back untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Buffer {
    pub index: u32,
    pub stream: StreamKind,
    /// Start of the caller's memory, as the pipeline will be programmed.
    pub userptr: u64,
    /// Capacity of the caller's memory in bytes.
    pub length: u32,
    /// Bytes actually written by the last transfer.
    pub bytes_used: u32,
    pub flags: BufferFlags,
}

impl Buffer {
    pub fn new(stream: StreamKind, index: u32, userptr: u64, length: u32) -> Self {
        Buffer {
            index,
            stream,
            userptr,
            length,
            bytes_used: 0,
            flags: BufferFlags::empty(),
        }
    }
}
