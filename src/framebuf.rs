//! Per-stream frame buffer queue.
//!
//! Every configured slot is in exactly one of four places: the free
//! pool, the queued list (FIFO, waiting for the pipeline), the single
//! in-flight slot the pipeline is writing to, or the done list (FIFO,
//! waiting for the consumer). The two buffering modes only differ on
//! the completion side: when the consumer is not draining, ring mode
//! drops the oldest completed frame to keep room, fifo mode keeps
//! everything and lets the transfers stop instead.

use std::collections::VecDeque;

use thiserror::Error as ThisError;

use crate::buffer::{BufMode, Buffer, BufferFlags};
use crate::Error;

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// A slot is currently under DMA; the queue cannot be resized.
    #[error("a slot is under DMA")]
    Busy,
    /// No free slot is left.
    #[error("no free slot available")]
    OutOfMemory,
}

impl From<QueueError> for Error {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Busy => Error::NotPermitted,
            QueueError::OutOfMemory => Error::OutOfMemory,
        }
    }
}

/// Slot accounting for one stream.
///
/// `free + queued + dma + done == capacity`, except between
/// [`FrameQueue::pop_done`] and the matching [`FrameQueue::release`]
/// while the consumer copies the descriptor out.
#[derive(Debug, Default)]
pub struct FrameQueue {
    mode: BufMode,
    capacity: usize,
    free: usize,
    queued: VecDeque<Buffer>,
    dma: Option<Buffer>,
    done: VecDeque<Buffer>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> BufMode {
        self.mode
    }

    /// Selects ring vs fifo behavior. Existing slots are not moved.
    pub fn set_mode(&mut self, mode: BufMode) {
        self.mode = mode;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_free(&self) -> usize {
        self.free
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    pub fn num_done(&self) -> usize {
        self.done.len()
    }

    pub fn has_dma(&self) -> bool {
        self.dma.is_some()
    }

    /// Resizes the queue to `n` slots.
    ///
    /// Fails while a slot is in flight. Queued then done slots are kept
    /// up to `n`, anything beyond is dropped, and the free pool is
    /// rebuilt from what remains.
    pub fn realloc(&mut self, n: usize) -> Result<(), QueueError> {
        if self.dma.is_some() {
            return Err(QueueError::Busy);
        }

        if self.queued.len() > n {
            self.queued.truncate(n);
        }
        let room = n - self.queued.len();
        if self.done.len() > room {
            self.done.truncate(room);
        }

        self.capacity = n;
        self.free = n - self.queued.len() - self.done.len();

        Ok(())
    }

    /// Takes a free slot and appends `buf` at the tail of the queued
    /// list.
    pub fn enqueue(&mut self, buf: Buffer) -> Result<(), QueueError> {
        if self.free == 0 {
            return Err(QueueError::OutOfMemory);
        }
        self.free -= 1;
        self.queued.push_back(buf);
        Ok(())
    }

    /// Moves the head queued slot in flight and returns a copy of its
    /// descriptor for programming the pipeline. `None` when nothing is
    /// queued or a slot is already in flight.
    pub fn pop_for_dma(&mut self) -> Option<Buffer> {
        if self.dma.is_some() {
            return None;
        }
        let next = self.queued.pop_front()?;
        self.dma = Some(next);
        Some(next)
    }

    /// Completes the in-flight slot: stamps the transfer result and
    /// moves it to the tail of the done list. Returns false when no slot
    /// was in flight.
    ///
    /// In ring mode, a completion that would saturate the queue with
    /// done slots evicts the oldest one first: its frame is dropped
    /// silently and the slot goes back to the free pool. In fifo mode
    /// nothing is ever evicted.
    pub fn dma_done(&mut self, bytes_used: u32, error: bool) -> bool {
        let Some(mut buf) = self.dma.take() else {
            return false;
        };
        buf.bytes_used = bytes_used;
        buf.flags = if error {
            BufferFlags::ERROR
        } else {
            BufferFlags::empty()
        };
        if self.mode == BufMode::Ring
            && self.done.len() + 1 == self.capacity
            && self.done.pop_front().is_some()
        {
            self.free += 1;
        }
        self.done.push_back(buf);
        true
    }

    /// Returns the in-flight slot to the head of the queued list, so a
    /// later restart programs the same buffer first. Used when an
    /// ongoing transfer is cancelled.
    pub fn abort_dma(&mut self) -> bool {
        match self.dma.take() {
            Some(buf) => {
                self.queued.push_front(buf);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the head of the done list. The slot must be
    /// given back with [`release`](Self::release) once the descriptor
    /// has been copied out.
    pub fn pop_done(&mut self) -> Option<Buffer> {
        self.done.pop_front()
    }

    /// Returns a slot taken with [`pop_done`](Self::pop_done) to the
    /// free pool.
    pub fn release(&mut self) {
        debug_assert!(
            self.free + self.queued.len() + usize::from(self.dma.is_some()) + self.done.len()
                < self.capacity
        );
        self.free += 1;
    }

    /// Drops every slot and resets the queue to an unconfigured state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
