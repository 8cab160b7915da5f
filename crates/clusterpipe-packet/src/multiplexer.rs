use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Result;
use crate::packet::Packet;

/// Cluster-wide identifier of one logical pipe's packet stream.
///
/// Every node runs the same pipe-creation code in the same order, so the
/// n-th pipe opened on any node receives the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(u32);

impl PipeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out pipe ids in creation order, starting at 1.
#[derive(Debug)]
pub struct PipeIdAllocator {
    next: AtomicU32,
}

impl PipeIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Next identifier.
    pub fn allocate(&self) -> PipeId {
        PipeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PipeIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Reliable, per-pipe ordered delivery of packets from the master node to
/// every slave node.
///
/// The n-th packet the master sends on a pipe id is the n-th packet each
/// slave receives on that id. Packets of different pipes may interleave.
pub trait Multiplexer: Send + Sync {
    /// Whether the local node is the master.
    fn is_master(&self) -> bool;

    /// Payload capacity of every packet on this channel.
    fn packet_capacity(&self) -> usize;

    /// Allocate the next pipe id.
    fn open_pipe(&self) -> PipeId;

    /// Allocate an empty packet.
    fn new_packet(&self) -> Packet {
        Packet::with_capacity(self.packet_capacity())
    }

    /// Broadcast `packet` on `pipe_id`. Master only.
    fn send_packet(&self, pipe_id: PipeId, packet: Packet) -> Result<()>;

    /// Block until the next packet for `pipe_id` arrives. Slave only.
    fn receive_packet(&self, pipe_id: PipeId) -> Result<Packet>;

    /// Release a packet's storage.
    fn delete_packet(&self, packet: Packet) {
        drop(packet);
    }
}
