use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::{MuxError, Result};
use crate::multiplexer::{Multiplexer, PipeId, PipeIdAllocator};
use crate::packet::{Packet, MIN_PACKET_CAPACITY};
use crate::queue::PacketQueues;

/// A master node and a fixed set of slave nodes inside one process.
///
/// Every node handle implements [`Multiplexer`]. The master's broadcasts are
/// copied into one queue per slave, so each slave observes the full packet
/// stream independently.
#[derive(Debug, Clone)]
pub struct InMemoryCluster {
    master: Arc<InMemoryNode>,
    slaves: Vec<Arc<InMemoryNode>>,
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    slave_queues: Vec<PacketQueues>,
    sent: Mutex<HashMap<PipeId, u64>>,
}

#[derive(Debug, Clone, Copy)]
enum NodeRole {
    Master,
    Slave(usize),
}

/// One node's view of an [`InMemoryCluster`].
#[derive(Debug)]
pub struct InMemoryNode {
    shared: Arc<Shared>,
    role: NodeRole,
    ids: PipeIdAllocator,
    released: AtomicU64,
}

impl InMemoryCluster {
    /// Create a cluster with `num_slaves` slaves. Capacities below
    /// [`MIN_PACKET_CAPACITY`] are raised to it.
    pub fn new(num_slaves: usize, packet_capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            capacity: packet_capacity.max(MIN_PACKET_CAPACITY),
            slave_queues: (0..num_slaves).map(|_| PacketQueues::default()).collect(),
            sent: Mutex::new(HashMap::new()),
        });
        let node = |role| {
            Arc::new(InMemoryNode {
                shared: Arc::clone(&shared),
                role,
                ids: PipeIdAllocator::new(),
                released: AtomicU64::new(0),
            })
        };
        let master = node(NodeRole::Master);
        let slaves = (0..num_slaves).map(|i| node(NodeRole::Slave(i))).collect();
        Self {
            master,
            slaves,
            shared,
        }
    }

    /// The master node handle.
    pub fn master(&self) -> Arc<InMemoryNode> {
        Arc::clone(&self.master)
    }

    /// The handle of slave `index`.
    pub fn slave(&self, index: usize) -> Option<Arc<InMemoryNode>> {
        self.slaves.get(index).cloned()
    }

    /// All slave handles, in index order.
    pub fn slaves(&self) -> &[Arc<InMemoryNode>] {
        &self.slaves
    }

    pub fn num_slaves(&self) -> usize {
        self.slaves.len()
    }

    /// Number of packets the master has broadcast on `pipe_id`.
    pub fn sent_packets(&self, pipe_id: PipeId) -> u64 {
        self.shared.sent_count(pipe_id)
    }

    /// Packets queued for slave `index` on `pipe_id` and not yet received.
    pub fn pending_packets(&self, index: usize, pipe_id: PipeId) -> usize {
        self.shared
            .slave_queues
            .get(index)
            .map_or(0, |queues| queues.pending(pipe_id))
    }

    /// Close every slave queue. Blocked receivers fail with [`MuxError::Closed`]
    /// once their queued packets are drained.
    pub fn close(&self) {
        for queues in &self.shared.slave_queues {
            queues.close(None);
        }
    }
}

impl Shared {
    fn sent_count(&self, pipe_id: PipeId) -> u64 {
        let sent = self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.get(&pipe_id).copied().unwrap_or(0)
    }
}

impl InMemoryNode {
    /// Number of packets released through [`Multiplexer::delete_packet`] on
    /// this node.
    pub fn released_packets(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    fn role_name(&self) -> &'static str {
        match self.role {
            NodeRole::Master => "master",
            NodeRole::Slave(_) => "slave",
        }
    }
}

impl Multiplexer for InMemoryNode {
    fn is_master(&self) -> bool {
        matches!(self.role, NodeRole::Master)
    }

    fn packet_capacity(&self) -> usize {
        self.shared.capacity
    }

    fn open_pipe(&self) -> PipeId {
        self.ids.allocate()
    }

    fn send_packet(&self, pipe_id: PipeId, packet: Packet) -> Result<()> {
        if !self.is_master() {
            return Err(MuxError::WrongRole {
                operation: "send_packet",
                role: self.role_name(),
            });
        }

        trace!(%pipe_id, len = packet.len(), "broadcasting packet");
        for queues in &self.shared.slave_queues {
            queues.push(pipe_id, packet.duplicate())?;
        }
        let mut sent = self
            .shared
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *sent.entry(pipe_id).or_insert(0) += 1;
        Ok(())
    }

    fn receive_packet(&self, pipe_id: PipeId) -> Result<Packet> {
        let NodeRole::Slave(index) = self.role else {
            return Err(MuxError::WrongRole {
                operation: "receive_packet",
                role: self.role_name(),
            });
        };
        let packet = self.shared.slave_queues[index].pop(pipe_id)?;
        trace!(%pipe_id, slave = index, len = packet.len(), "received packet");
        Ok(packet)
    }

    fn delete_packet(&self, packet: Packet) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(packet);
    }
}
