use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{MuxError, Result};
use crate::multiplexer::PipeId;
use crate::packet::Packet;

/// Per-pipe FIFO queues of inbound packets for one slave node.
#[derive(Debug, Default)]
pub(crate) struct PacketQueues {
    state: Mutex<QueueState>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct QueueState {
    queues: HashMap<PipeId, VecDeque<Packet>>,
    closed: Option<Option<String>>,
}

impl PacketQueues {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn push(&self, pipe_id: PipeId, packet: Packet) -> Result<()> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(closed_error(reason));
        }
        state.queues.entry(pipe_id).or_default().push_back(packet);
        drop(state);
        self.ready.notify_all();
        Ok(())
    }

    /// Pop the next packet for `pipe_id`, blocking until one arrives.
    ///
    /// Packets queued before the queues were closed are still delivered.
    pub(crate) fn pop(&self, pipe_id: PipeId) -> Result<Packet> {
        let mut state = self.lock();
        loop {
            if let Some(packet) = state.queues.get_mut(&pipe_id).and_then(VecDeque::pop_front) {
                return Ok(packet);
            }
            if let Some(reason) = &state.closed {
                return Err(closed_error(reason));
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Stop accepting packets and wake all blocked receivers.
    pub(crate) fn close(&self, reason: Option<String>) {
        let mut state = self.lock();
        if state.closed.is_none() {
            state.closed = Some(reason);
        }
        drop(state);
        self.ready.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    pub(crate) fn pending(&self, pipe_id: PipeId) -> usize {
        self.lock().queues.get(&pipe_id).map_or(0, VecDeque::len)
    }
}

fn closed_error(reason: &Option<String>) -> MuxError {
    match reason {
        Some(reason) => MuxError::Failed(reason.clone()),
        None => MuxError::Closed,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn packet(byte: u8) -> Packet {
        Packet::from_payload(&[byte], 8).unwrap()
    }

    #[test]
    fn pops_in_push_order_per_pipe() {
        let queues = PacketQueues::default();
        let a = PipeId::new(1);
        let b = PipeId::new(2);
        queues.push(a, packet(1)).unwrap();
        queues.push(b, packet(9)).unwrap();
        queues.push(a, packet(2)).unwrap();

        assert_eq!(queues.pending(a), 2);
        assert_eq!(queues.pop(a).unwrap().payload(), &[1]);
        assert_eq!(queues.pop(b).unwrap().payload(), &[9]);
        assert_eq!(queues.pop(a).unwrap().payload(), &[2]);
        assert_eq!(queues.pending(a), 0);
    }

    #[test]
    fn pop_blocks_until_push() {
        let queues = Arc::new(PacketQueues::default());
        let pipe = PipeId::new(4);

        let consumer = {
            let queues = Arc::clone(&queues);
            std::thread::spawn(move || queues.pop(pipe).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        queues.push(pipe, packet(7)).unwrap();

        assert_eq!(consumer.join().unwrap().payload(), &[7]);
    }

    #[test]
    fn close_drains_then_fails() {
        let queues = PacketQueues::default();
        let pipe = PipeId::new(1);
        queues.push(pipe, packet(1)).unwrap();
        queues.close(Some("source went away".to_string()));

        assert!(queues.pop(pipe).is_ok());
        assert!(matches!(queues.pop(pipe), Err(MuxError::Failed(_))));
        assert!(matches!(queues.push(pipe, packet(2)), Err(MuxError::Failed(_))));
    }

    #[test]
    fn close_wakes_blocked_receiver() {
        let queues = Arc::new(PacketQueues::default());
        let consumer = {
            let queues = Arc::clone(&queues);
            std::thread::spawn(move || queues.pop(PipeId::new(3)))
        };
        std::thread::sleep(Duration::from_millis(20));
        queues.close(None);

        assert!(matches!(consumer.join().unwrap(), Err(MuxError::Closed)));
    }
}
