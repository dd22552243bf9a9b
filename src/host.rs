//! The Demux Host Interface: the external contract a
//! [`crate::channel::Channel`] uses to ask its embedder for PID
//! join/leave bookkeeping and to hand off outgoing TS packets, mirroring
//! the upstream-module interface (`stream_ts_join_pid` /
//! `stream_ts_leave_pid` / `module_stream_send`) of the module this crate
//! is modeled on.

use crate::packet::TsPacket;

/// Implemented by whatever owns the input stream a [`crate::channel::Channel`]
/// is demultiplexing from.
pub trait DemuxHost {
    /// Requests that PID `pid` be joined (subscribed) on the upstream
    /// source. Idempotent: joining an already-joined PID is a no-op.
    fn join_pid(&mut self, pid: u16);

    /// Requests that PID `pid` be released once no longer needed.
    fn leave_pid(&mut self, pid: u16);

    /// Returns whether `pid` is currently joined.
    fn check_pid(&self, pid: u16) -> bool;

    /// Emits one outgoing TS packet downstream.
    fn send(&mut self, packet: &TsPacket);
}

/// A simple in-memory [`DemuxHost`] used by tests: tracks joined PIDs in
/// a set and appends every sent packet to a `Vec`.
#[cfg(test)]
pub struct TestHost {
    pub joined: std::collections::HashSet<u16>,
    pub sent: Vec<TsPacket>,
}

#[cfg(test)]
impl TestHost {
    pub fn new() -> Self {
        Self {
            joined: std::collections::HashSet::new(),
            sent: Vec::new(),
        }
    }
}

#[cfg(test)]
impl DemuxHost for TestHost {
    fn join_pid(&mut self, pid: u16) {
        self.joined.insert(pid);
    }

    fn leave_pid(&mut self, pid: u16) {
        self.joined.remove(&pid);
    }

    fn check_pid(&self, pid: u16) -> bool {
        self.joined.contains(&pid)
    }

    fn send(&mut self, packet: &TsPacket) {
        self.sent.push(*packet);
    }
}
