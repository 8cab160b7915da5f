use std::fmt;
use std::sync::Arc;

use clusterpipe_packet::{Multiplexer, Packet, PipeId};

use crate::error::{protocol_error, PipeResult};

/// Port value broadcast when the master could not determine a port.
pub(crate) const UNKNOWN_PORT: i32 = -1;

/// One pipe's view of the multiplexer: typed send and receive of the
/// outcome encodings shared by both roles.
///
/// Every `send_*` on the master has exactly one `receive_*` counterpart on
/// the slave, and each call moves exactly one packet.
pub(crate) struct ReplicationChannel {
    mux: Arc<dyn Multiplexer>,
    pipe_id: PipeId,
}

impl ReplicationChannel {
    pub(crate) fn new(mux: Arc<dyn Multiplexer>, pipe_id: PipeId) -> Self {
        Self { mux, pipe_id }
    }

    pub(crate) fn pipe_id(&self) -> PipeId {
        self.pipe_id
    }

    pub(crate) fn packet_capacity(&self) -> usize {
        self.mux.packet_capacity()
    }

    fn send(&self, fill: impl FnOnce(&mut Packet) -> PipeResult<()>) -> PipeResult<()> {
        let mut packet = self.mux.new_packet();
        fill(&mut packet)?;
        self.mux.send_packet(self.pipe_id, packet)?;
        Ok(())
    }

    pub(crate) fn send_i32(&self, value: i32) -> PipeResult<()> {
        self.send(|packet| Ok(packet.writer().write_i32(value)?))
    }

    pub(crate) fn send_i32_pair(&self, first: i32, second: i32) -> PipeResult<()> {
        self.send(|packet| {
            let mut writer = packet.writer();
            writer.write_i32(first)?;
            writer.write_i32(second)?;
            Ok(())
        })
    }

    pub(crate) fn send_bytes(&self, bytes: &[u8]) -> PipeResult<()> {
        self.send(|packet| Ok(packet.writer().write_bytes(bytes)?))
    }

    /// Broadcast a port, `None` as [`UNKNOWN_PORT`].
    pub(crate) fn send_port(&self, port: Option<u16>) -> PipeResult<()> {
        self.send_i32(port.map_or(UNKNOWN_PORT, i32::from))
    }

    /// Broadcast a string, `None` as the empty string. The caller must pass
    /// a value that fits one packet (see [`fit_to_packet`]).
    pub(crate) fn send_text(&self, text: Option<&str>) -> PipeResult<()> {
        self.send(|packet| Ok(packet.writer().write_string(text.unwrap_or_default())?))
    }

    /// Block for the next packet of this pipe.
    pub(crate) fn receive(&self) -> PipeResult<Packet> {
        Ok(self.mux.receive_packet(self.pipe_id)?)
    }

    fn receive_with<T>(&self, decode: impl FnOnce(&Packet) -> PipeResult<T>) -> PipeResult<T> {
        let packet = self.receive()?;
        let value = decode(&packet);
        self.release(packet);
        value
    }

    pub(crate) fn receive_i32(&self) -> PipeResult<i32> {
        self.receive_with(|packet| Ok(packet.reader().read_i32()?))
    }

    pub(crate) fn receive_i32_pair(&self) -> PipeResult<(i32, i32)> {
        self.receive_with(|packet| {
            let mut reader = packet.reader();
            Ok((reader.read_i32()?, reader.read_i32()?))
        })
    }

    pub(crate) fn receive_port(&self) -> PipeResult<Option<u16>> {
        let value = self.receive_i32()?;
        if value == UNKNOWN_PORT {
            return Ok(None);
        }
        u16::try_from(value)
            .map(Some)
            .map_err(|_| protocol_error(self.pipe_id, format!("port {value} out of range")))
    }

    pub(crate) fn receive_text(&self) -> PipeResult<Option<String>> {
        let text = self.receive_with(|packet| Ok(packet.reader().read_string()?))?;
        Ok(Some(text).filter(|text| !text.is_empty()))
    }

    /// Hand a packet back to the multiplexer.
    pub(crate) fn release(&self, packet: Packet) {
        self.mux.delete_packet(packet);
    }
}

impl fmt::Debug for ReplicationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationChannel")
            .field("pipe_id", &self.pipe_id)
            .field("master", &self.mux.is_master())
            .finish()
    }
}

/// Truncate `text` on a character boundary so that it fits one packet
/// together with its length prefix.
pub(crate) fn fit_to_packet(mut text: String, capacity: usize) -> String {
    let max = capacity.saturating_sub(4);
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use clusterpipe_packet::InMemoryCluster;

    use super::*;

    fn pair(capacity: usize) -> (ReplicationChannel, ReplicationChannel) {
        let cluster = InMemoryCluster::new(1, capacity);
        let master = cluster.master();
        let slave = cluster.slave(0).unwrap();
        let pipe_id = master.open_pipe();
        (
            ReplicationChannel::new(master, pipe_id),
            ReplicationChannel::new(slave, pipe_id),
        )
    }

    #[test]
    fn test_ports_and_unknown_ports() {
        let (master, slave) = pair(64);
        master.send_port(Some(8080)).unwrap();
        master.send_port(None).unwrap();

        assert_eq!(slave.receive_port().unwrap(), Some(8080));
        assert_eq!(slave.receive_port().unwrap(), None);
    }

    #[test]
    fn test_out_of_range_port_is_a_protocol_error() {
        let (master, slave) = pair(64);
        master.send_i32(70_000).unwrap();
        assert!(matches!(
            slave.receive_port(),
            Err(crate::PipeError::Protocol { .. })
        ));
    }

    #[test]
    fn test_text_and_unknown_text() {
        let (master, slave) = pair(64);
        master.send_text(Some("render-01")).unwrap();
        master.send_text(None).unwrap();

        assert_eq!(slave.receive_text().unwrap().as_deref(), Some("render-01"));
        assert_eq!(slave.receive_text().unwrap(), None);
    }

    #[test]
    fn test_fit_to_packet_respects_char_boundaries() {
        assert_eq!(fit_to_packet("abcdef".to_string(), 8), "abcd");
        assert_eq!(fit_to_packet("abc".to_string(), 8), "abc");
        // "é" is two bytes; cutting at 3 would split it.
        assert_eq!(fit_to_packet("abéd".to_string(), 7), "ab");
        assert_eq!(fit_to_packet("abc".to_string(), 2), "");
    }

    #[test]
    fn test_received_packets_are_released() {
        let cluster = InMemoryCluster::new(1, 64);
        let pipe_id = PipeId::new(1);
        let master = ReplicationChannel::new(cluster.master(), pipe_id);
        let slave_node = cluster.slave(0).unwrap();
        let slave = ReplicationChannel::new(slave_node.clone(), pipe_id);

        master.send_i32_pair(1, 2).unwrap();
        assert_eq!(slave.receive_i32_pair().unwrap(), (1, 2));
        assert_eq!(slave_node.released_packets(), 1);
    }
}
