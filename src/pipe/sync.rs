//! Sync Adapter contract: the jitter buffer a [`super::PipeStage`] pushes
//! a running child's TS output into before handing packets downstream.
//! The buffer's internal pacing is a black box to this crate — it only
//! needs to know the buffer's capacity (to size its read ration) and how
//! to push into / drain / reset it.

use crate::packet::TsPacket;

pub trait SyncBuffer: Send {
    /// Maximum number of TS packets the buffer will hold.
    fn max_size(&self) -> usize;

    /// Pushes packets read from the child into the buffer. Returns
    /// `false` if the buffer rejected them (the caller resets and
    /// resynchronizes on the next child read).
    fn push(&mut self, packets: &[TsPacket]) -> bool;

    /// Drops all buffered data.
    fn reset(&mut self);

    /// Drains whatever the buffer judges ready to emit right now. Called
    /// on an external tick.
    fn tick(&mut self) -> Vec<TsPacket>;
}

/// A bounded FIFO with no internal pacing — `tick` drains everything
/// buffered. Used as the default adapter and by this crate's own tests;
/// callers that need real PCR-paced smoothing provide their own
/// [`SyncBuffer`].
pub struct FifoSyncBuffer {
    max_size: usize,
    queue: std::collections::VecDeque<TsPacket>,
}

impl FifoSyncBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            queue: std::collections::VecDeque::with_capacity(max_size.min(4096)),
        }
    }
}

impl SyncBuffer for FifoSyncBuffer {
    fn max_size(&self) -> usize {
        self.max_size
    }

    fn push(&mut self, packets: &[TsPacket]) -> bool {
        if self.queue.len() + packets.len() > self.max_size {
            return false;
        }
        self.queue.extend(packets.iter().copied());
        true
    }

    fn reset(&mut self) {
        self.queue.clear();
    }

    fn tick(&mut self) -> Vec<TsPacket> {
        self.queue.drain(..).collect()
    }
}
