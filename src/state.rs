//! Per-stream state and the dequeue rendezvous.

use crate::buffer::Buffer;
use crate::framebuf::FrameQueue;

/// `remaining_captures` value meaning "no bound": continuous video, or
/// a still stream on which no take-picture was started.
pub const REMAINING_INFINITE: i32 = -1;

/// Where a stream stands with respect to the DMA engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// No capture trigger received.
    StreamOff,
    /// Triggered, but the DMA engine is not working for this stream
    /// (no buffer available, or the engine is lent to the sibling).
    StreamOn,
    /// The DMA engine is filling one of this stream's buffers.
    Dma,
}

/// Why a blocked dequeue was woken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitCause {
    /// A transfer completed; the rendezvous carries its slot.
    DmaDone,
    /// The wait was cancelled.
    DqCancel,
    /// The still stream finished; video should re-run the arbiter and
    /// wait again.
    StillStop,
}

/// Single-slot handoff between the completion path and a blocked
/// dequeue.
///
/// `posted` gives the wake binary semantics: a cancel and a completion
/// racing each other collapse into one wake, and the cause written last
/// decides the outcome.
#[derive(Debug)]
pub(crate) struct WaitDma {
    pub waiting: bool,
    pub posted: bool,
    pub done: Option<Buffer>,
    pub cause: WaitCause,
}

impl WaitDma {
    fn new() -> Self {
        WaitDma {
            waiting: false,
            posted: false,
            done: None,
            cause: WaitCause::DmaDone,
        }
    }

    /// Arms the rendezvous before the caller starts waiting.
    pub fn begin(&mut self) {
        self.waiting = true;
        self.posted = false;
        self.done = None;
    }
}

/// Everything one stream owns: its state variable, capture budget,
/// buffer queue and rendezvous.
#[derive(Debug)]
pub(crate) struct StreamInner {
    pub state: StreamState,
    pub remaining: i32,
    pub queue: FrameQueue,
    pub wait: WaitDma,
}

impl StreamInner {
    pub fn new() -> Self {
        StreamInner {
            state: StreamState::StreamOff,
            remaining: REMAINING_INFINITE,
            queue: FrameQueue::new(),
            wait: WaitDma::new(),
        }
    }

    /// Back to the first-open state; drops all configured slots.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
