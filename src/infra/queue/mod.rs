//! Bounded frame FIFOs crossing the interrupt/poll boundary.
//!
//! Each CAN channel owns two of these: a receive queue filled by the
//! driver interrupt and drained by the poll loop, and a transmit queue
//! filled by the poll loop and drained by the transmit-complete
//! interrupt. The backing store is a `heapless` single-producer
//! single-consumer ring with atomic head/tail indices, the only state
//! shared between the two execution contexts.
use crate::error::QueueError;
use heapless::spsc::Queue;

//==================================================================================Constants

/// Number of slots in each per-channel frame FIFO. The SPSC ring keeps
/// one slot free to distinguish full from empty, so the usable capacity
/// is one less.
pub const FRAME_QUEUE_DEPTH: usize = 16;

//==================================================================================Raw frame

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Frame representation exchanged with the CAN driver: the undecoded
/// 29-bit identifier plus the payload. Decoding into a
/// [`CanFrame`](crate::protocol::transport::can_frame::CanFrame)
/// happens on the poll side, never in the interrupt.
pub struct RawFrame {
    /// Raw 29-bit identifier, right-aligned in a `u32`.
    pub id: u32,
    /// Payload buffer; unused trailing bytes are don't-care.
    pub data: [u8; 8],
    /// Number of valid payload bytes (0 to 8).
    pub len: u8,
}

//==================================================================================Frame queue

/// Bounded FIFO of raw frames.
///
/// Frames are delivered strictly in arrival order. The queue never
/// blocks: a full queue rejects the frame and the caller decides
/// (interrupt side drops and counts, poll side reports
/// `CannotTransmit`).
pub struct FrameQueue {
    inner: Queue<RawFrame, FRAME_QUEUE_DEPTH>,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            inner: Queue::new(),
        }
    }

    /// Append a frame at the tail.
    pub fn push(&mut self, frame: RawFrame) -> Result<(), QueueError> {
        self.inner.enqueue(frame).map_err(|_| QueueError::Full)
    }

    /// Remove and return the frame at the head, oldest first.
    pub fn pop(&mut self) -> Option<RawFrame> {
        self.inner.dequeue()
    }

    /// Number of frames currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks whether the queue holds no frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Usable capacity (one less than [`FRAME_QUEUE_DEPTH`]).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
