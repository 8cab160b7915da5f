use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bytes::BytesMut;
use tracing::{debug, error, trace};

use crate::codec::{decode_frame, encode_frame};
use crate::error::{MuxError, Result};
use crate::multiplexer::{Multiplexer, PipeId, PipeIdAllocator};
use crate::packet::{Packet, DEFAULT_PACKET_CAPACITY, MIN_PACKET_CAPACITY};
use crate::queue::PacketQueues;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for a [`StreamMultiplexer`].
#[derive(Debug, Clone)]
pub struct StreamMultiplexerConfig {
    /// Payload capacity of every packet. Must match on all nodes.
    /// Default: [`DEFAULT_PACKET_CAPACITY`].
    pub packet_capacity: usize,
}

impl Default for StreamMultiplexerConfig {
    fn default() -> Self {
        Self {
            packet_capacity: DEFAULT_PACKET_CAPACITY,
        }
    }
}

/// A multiplexer that carries packets as frames over byte streams.
///
/// The master node owns one sink per slave and writes every packet to all of
/// them. A slave node owns one source; a background thread splits incoming
/// frames into per-pipe queues so that pipes driven from different threads
/// never wait on each other's frames.
///
/// Dropping a slave closes its queues but does not join the reader thread:
/// a blocking `Read` cannot be interrupted, so the thread exits once the
/// source delivers more bytes or reaches end of stream. Close the underlying
/// connection to release it promptly.
pub struct StreamMultiplexer {
    capacity: usize,
    ids: PipeIdAllocator,
    role: StreamRole,
}

enum StreamRole {
    Master(Mutex<FrameSinks>),
    Slave {
        queues: Arc<PacketQueues>,
        _demux: JoinHandle<()>,
    },
}

struct FrameSinks {
    sinks: Vec<Box<dyn Write + Send>>,
    buf: BytesMut,
}

impl StreamMultiplexer {
    /// Create the master side, broadcasting to one sink per slave.
    pub fn master(sinks: Vec<Box<dyn Write + Send>>, config: StreamMultiplexerConfig) -> Self {
        Self {
            capacity: config.packet_capacity.max(MIN_PACKET_CAPACITY),
            ids: PipeIdAllocator::new(),
            role: StreamRole::Master(Mutex::new(FrameSinks {
                sinks,
                buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            })),
        }
    }

    /// Create a slave side reading frames from `source`.
    pub fn slave(source: Box<dyn Read + Send>, config: StreamMultiplexerConfig) -> Result<Self> {
        let capacity = config.packet_capacity.max(MIN_PACKET_CAPACITY);
        let queues = Arc::new(PacketQueues::default());
        let demux = {
            let queues = Arc::clone(&queues);
            std::thread::Builder::new()
                .name("clusterpipe-demux".to_string())
                .spawn(move || demultiplex(source, &queues, capacity))?
        };
        Ok(Self {
            capacity,
            ids: PipeIdAllocator::new(),
            role: StreamRole::Slave {
                queues,
                _demux: demux,
            },
        })
    }

    /// Packets received for `pipe_id` and not yet consumed. Always zero on
    /// the master.
    pub fn pending_packets(&self, pipe_id: PipeId) -> usize {
        match &self.role {
            StreamRole::Master(_) => 0,
            StreamRole::Slave { queues, .. } => queues.pending(pipe_id),
        }
    }
}

impl Multiplexer for StreamMultiplexer {
    fn is_master(&self) -> bool {
        matches!(self.role, StreamRole::Master(_))
    }

    fn packet_capacity(&self) -> usize {
        self.capacity
    }

    fn open_pipe(&self) -> PipeId {
        self.ids.allocate()
    }

    fn send_packet(&self, pipe_id: PipeId, packet: Packet) -> Result<()> {
        let StreamRole::Master(sinks) = &self.role else {
            return Err(MuxError::WrongRole {
                operation: "send_packet",
                role: "slave",
            });
        };
        let mut sinks = sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let FrameSinks { sinks, buf } = &mut *sinks;

        buf.clear();
        encode_frame(pipe_id, packet.payload(), buf)?;
        for sink in sinks.iter_mut() {
            write_frame(sink.as_mut(), &buf[..])?;
        }
        trace!(%pipe_id, len = packet.len(), "broadcast frame");
        Ok(())
    }

    fn receive_packet(&self, pipe_id: PipeId) -> Result<Packet> {
        match &self.role {
            StreamRole::Slave { queues, .. } => queues.pop(pipe_id),
            StreamRole::Master(_) => Err(MuxError::WrongRole {
                operation: "receive_packet",
                role: "master",
            }),
        }
    }
}

impl Drop for StreamMultiplexer {
    fn drop(&mut self) {
        if let StreamRole::Slave { queues, .. } = &self.role {
            queues.close(None);
        }
    }
}

impl fmt::Debug for StreamMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            StreamRole::Master(_) => "master",
            StreamRole::Slave { .. } => "slave",
        };
        f.debug_struct("StreamMultiplexer")
            .field("role", &role)
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn write_frame(sink: &mut dyn Write, frame: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < frame.len() {
        match sink.write(&frame[offset..]) {
            Ok(0) => return Err(MuxError::Closed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(MuxError::Io(err)),
        }
    }
    loop {
        match sink.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(MuxError::Io(err)),
        }
    }
}

/// Read frames from `source` until it ends, queueing each by pipe id.
fn demultiplex(mut source: Box<dyn Read + Send>, queues: &PacketQueues, capacity: usize) {
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    let reason = loop {
        match decode_frame(&mut buf, capacity) {
            Ok(Some(frame)) => {
                let packet = match Packet::from_payload(&frame.payload, capacity) {
                    Ok(packet) => packet,
                    Err(err) => break Some(err.to_string()),
                };
                if queues.push(frame.pipe_id, packet).is_err() {
                    break None;
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => break Some(err.to_string()),
        }
        if queues.is_closed() {
            break None;
        }

        match source.read(&mut chunk) {
            Ok(0) if buf.is_empty() => break None,
            Ok(0) => break Some("connection closed (incomplete frame)".to_string()),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => break Some(format!("frame I/O error: {err}")),
        }
    };

    match &reason {
        Some(reason) => error!(%reason, "packet stream failed"),
        None => debug!("packet stream closed"),
    }
    queues.close(reason);
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::PacketError;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn status_packet(mux: &dyn Multiplexer, value: i32) -> Packet {
        let mut packet = mux.new_packet();
        packet.writer().write_i32(value).unwrap();
        packet
    }

    fn small_config() -> StreamMultiplexerConfig {
        StreamMultiplexerConfig { packet_capacity: 32 }
    }

    #[test]
    fn master_writes_identical_frames_to_every_sink() {
        let first = SharedSink::default();
        let second = SharedSink::default();
        let master = StreamMultiplexer::master(
            vec![Box::new(first.clone()), Box::new(second.clone())],
            small_config(),
        );
        let pipe = master.open_pipe();

        master.send_packet(pipe, status_packet(&master, 5)).unwrap();

        let wire = first.0.lock().unwrap().clone();
        assert_eq!(wire, *second.0.lock().unwrap());
        let frame = decode_frame(&mut BytesMut::from(wire.as_slice()), 32)
            .unwrap()
            .unwrap();
        assert_eq!(frame.pipe_id, pipe);
        assert_eq!(frame.payload.as_ref(), &5i32.to_le_bytes());
    }

    #[test]
    fn slave_demultiplexes_by_pipe() {
        let mut wire = BytesMut::new();
        encode_frame(PipeId::new(2), b"second", &mut wire).unwrap();
        encode_frame(PipeId::new(1), b"first-a", &mut wire).unwrap();
        encode_frame(PipeId::new(1), b"first-b", &mut wire).unwrap();

        let slave =
            StreamMultiplexer::slave(Box::new(Cursor::new(wire.to_vec())), small_config())
                .unwrap();

        assert!(!slave.is_master());
        assert_eq!(
            slave.receive_packet(PipeId::new(1)).unwrap().payload(),
            b"first-a"
        );
        assert_eq!(
            slave.receive_packet(PipeId::new(1)).unwrap().payload(),
            b"first-b"
        );
        assert_eq!(
            slave.receive_packet(PipeId::new(2)).unwrap().payload(),
            b"second"
        );
        assert!(matches!(
            slave.receive_packet(PipeId::new(1)),
            Err(MuxError::Closed)
        ));
    }

    #[test]
    fn truncated_stream_fails_receivers() {
        let mut wire = BytesMut::new();
        encode_frame(PipeId::new(1), b"complete", &mut wire).unwrap();
        encode_frame(PipeId::new(1), b"cut-off", &mut wire).unwrap();
        wire.truncate(wire.len() - 2);

        let slave =
            StreamMultiplexer::slave(Box::new(Cursor::new(wire.to_vec())), small_config())
                .unwrap();
        assert!(slave.receive_packet(PipeId::new(1)).is_ok());
        assert!(matches!(
            slave.receive_packet(PipeId::new(1)),
            Err(MuxError::Failed(_))
        ));
    }

    #[test]
    fn oversized_frame_fails_receivers() {
        let mut wire = BytesMut::new();
        encode_frame(PipeId::new(1), &[0u8; 64], &mut wire).unwrap();

        let slave =
            StreamMultiplexer::slave(Box::new(Cursor::new(wire.to_vec())), small_config())
                .unwrap();
        assert!(matches!(
            slave.receive_packet(PipeId::new(1)),
            Err(MuxError::Failed(_))
        ));
    }

    /// A source fed from a channel; reports on `dropped` when the reader
    /// thread lets go of it.
    struct ChannelSource {
        chunks: std::sync::mpsc::Receiver<Vec<u8>>,
        dropped: std::sync::mpsc::Sender<()>,
    }

    impl Read for ChannelSource {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.recv() {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    impl Drop for ChannelSource {
        fn drop(&mut self) {
            let _ = self.dropped.send(());
        }
    }

    #[test]
    fn dropped_slave_releases_reader_on_next_frame() {
        let (feed, chunks) = std::sync::mpsc::channel();
        let (dropped_tx, dropped) = std::sync::mpsc::channel();
        let source = ChannelSource {
            chunks,
            dropped: dropped_tx,
        };
        let slave = StreamMultiplexer::slave(Box::new(source), small_config()).unwrap();
        drop(slave);

        let mut wire = BytesMut::new();
        encode_frame(PipeId::new(1), b"late", &mut wire).unwrap();
        feed.send(wire.to_vec()).unwrap();

        dropped
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
    }

    #[test]
    fn roles_are_enforced() {
        let master = StreamMultiplexer::master(Vec::new(), small_config());
        assert!(matches!(
            master.receive_packet(PipeId::new(1)),
            Err(MuxError::WrongRole { .. })
        ));

        let slave =
            StreamMultiplexer::slave(Box::new(Cursor::new(Vec::new())), small_config()).unwrap();
        assert!(matches!(
            slave.send_packet(PipeId::new(1), slave.new_packet()),
            Err(MuxError::WrongRole { .. })
        ));
    }

    #[test]
    fn packet_capacity_bounds_payload() {
        let master = StreamMultiplexer::master(Vec::new(), small_config());
        let mut packet = master.new_packet();
        assert!(matches!(
            packet.writer().write_bytes(&[0u8; 33]),
            Err(PacketError::Overflow { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn master_to_slave_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let master = StreamMultiplexer::master(vec![Box::new(left)], small_config());
        let slave = StreamMultiplexer::slave(Box::new(right), small_config()).unwrap();

        let pipe = master.open_pipe();
        assert_eq!(slave.open_pipe(), pipe);

        for value in 0..32 {
            master
                .send_packet(pipe, status_packet(&master, value))
                .unwrap();
        }
        for expected in 0..32 {
            let packet = slave.receive_packet(pipe).unwrap();
            assert_eq!(packet.reader().read_i32().unwrap(), expected);
        }

        drop(master);
        assert!(matches!(slave.receive_packet(pipe), Err(MuxError::Closed)));
    }
}
