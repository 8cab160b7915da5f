use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clusterpipe_packet::{Multiplexer, PipeId};
use clusterpipe_transport::{
    lookup_host_name, ConstructionStage, PipeSocket, TcpSocket, TransportError,
};
use tracing::{debug, error, info, warn};

use crate::channel::{fit_to_packet, ReplicationChannel};
use crate::config::{Coupling, PipeConfig};
use crate::endpoint::PipeEndpoint;
use crate::error::{construction_error, read_error_code, PipeError, PipeResult, WriteError};

/// The master's end of a cluster pipe: owns the real socket and broadcasts
/// every outcome before returning it.
#[derive(Debug)]
pub struct MasterPipe {
    channel: ReplicationChannel,
    coupling: Coupling,
    socket: Box<dyn PipeSocket>,
    read_chunk: Vec<u8>,
    read_len: usize,
}

impl MasterPipe {
    /// Connect to `host:port` and broadcast the construction status.
    ///
    /// The status is broadcast whatever the coupling, so slaves constructed
    /// with [`SlavePipe::attach`](crate::SlavePipe::attach) always learn
    /// whether the pipe exists.
    pub fn connect(
        mux: Arc<dyn Multiplexer>,
        pipe_id: PipeId,
        host: &str,
        port: u16,
        config: &PipeConfig,
    ) -> PipeResult<Self> {
        let channel = ReplicationChannel::new(mux, pipe_id);
        match TcpSocket::connect(host, port, &config.socket) {
            Ok(socket) => Self::established(channel, Box::new(socket), config),
            Err(err) => {
                let stage = match &err {
                    TransportError::Construction { stage, .. } => *stage,
                    TransportError::Io(_) => ConstructionStage::Connect,
                };
                error!(%pipe_id, host, port, error = %err, "pipe construction failed");
                channel.send_i32(stage.code())?;
                Err(construction_error(stage, host, port))
            }
        }
    }

    /// Wrap an already connected socket and broadcast a successful
    /// construction status.
    pub fn from_socket(
        mux: Arc<dyn Multiplexer>,
        pipe_id: PipeId,
        socket: Box<dyn PipeSocket>,
        config: &PipeConfig,
    ) -> PipeResult<Self> {
        Self::established(ReplicationChannel::new(mux, pipe_id), socket, config)
    }

    fn established(
        channel: ReplicationChannel,
        socket: Box<dyn PipeSocket>,
        config: &PipeConfig,
    ) -> PipeResult<Self> {
        channel.send_i32(0)?;
        info!(pipe_id = %channel.pipe_id(), coupling = ?config.coupling, "master pipe ready");
        let read_chunk = vec![0; channel.packet_capacity()];
        Ok(Self {
            channel,
            coupling: config.coupling,
            socket,
            read_chunk,
            read_len: 0,
        })
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), WriteError> {
        let mut written = 0;
        while written < data.len() {
            match self.socket.write(&data[written..]) {
                Ok(0) => {
                    return Err(WriteError::SinkExhausted {
                        remaining_bytes: data.len() - written,
                    })
                }
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::yield_now(),
                Err(err) => return Err(WriteError::from_io(&err)),
            }
        }
        self.socket.flush().map_err(|err| WriteError::from_io(&err))
    }

    fn query<T>(
        &self,
        what: &'static str,
        op: impl FnOnce(&dyn PipeSocket) -> io::Result<T>,
    ) -> Option<T> {
        match op(&*self.socket) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(pipe_id = %self.channel.pipe_id(), what, error = %err, "metadata query failed");
                None
            }
        }
    }

    fn replicate_port(&self, port: Option<u16>) -> PipeResult<Option<u16>> {
        if self.coupling.read {
            self.channel.send_port(port)?;
        }
        Ok(port)
    }

    fn replicate_text(&self, text: Option<String>) -> PipeResult<Option<String>> {
        let text = text
            .map(|text| fit_to_packet(text, self.channel.packet_capacity()))
            .filter(|text| !text.is_empty());
        if self.coupling.read {
            self.channel.send_text(text.as_deref())?;
        }
        Ok(text)
    }
}

fn host_name(addr: io::Result<SocketAddr>) -> io::Result<String> {
    addr.and_then(|addr| lookup_host_name(&addr))
}

impl PipeEndpoint for MasterPipe {
    fn pipe_id(&self) -> PipeId {
        self.channel.pipe_id()
    }

    fn coupling(&self) -> Coupling {
        self.coupling
    }

    fn perform_read(&mut self) -> PipeResult<usize> {
        self.read_len = 0;
        let result = loop {
            match self.socket.read(&mut self.read_chunk) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) = self.socket.wait_readable(None) {
                        break Err(err);
                    }
                }
                other => break other,
            }
        };

        match result {
            Ok(0) => {
                debug!(pipe_id = %self.channel.pipe_id(), "end of stream");
                if self.coupling.read {
                    self.channel.send_bytes(&[])?;
                    self.channel.send_i32(0)?;
                }
                Ok(0)
            }
            Ok(n) => {
                debug!(pipe_id = %self.channel.pipe_id(), size = n, "read");
                if self.coupling.read {
                    self.channel.send_bytes(&self.read_chunk[..n])?;
                }
                self.read_len = n;
                Ok(n)
            }
            Err(err) => {
                let code = read_error_code(&err);
                error!(pipe_id = %self.channel.pipe_id(), error = %err, code, "read failed");
                if self.coupling.read {
                    self.channel.send_bytes(&[])?;
                    self.channel.send_i32(code)?;
                }
                Err(PipeError::Read { code })
            }
        }
    }

    fn read_buffer(&self) -> &[u8] {
        &self.read_chunk[..self.read_len]
    }

    fn perform_write(&mut self, data: &[u8]) -> PipeResult<()> {
        let outcome = self.write_all(data);
        match &outcome {
            Ok(()) => debug!(pipe_id = %self.channel.pipe_id(), size = data.len(), "wrote"),
            Err(err) => error!(pipe_id = %self.channel.pipe_id(), error = %err, "write failed"),
        }
        if self.coupling.write {
            let (error_type, code) = match &outcome {
                Ok(()) => (WriteError::SUCCESS, 0),
                Err(err) => err.to_wire(),
            };
            self.channel.send_i32_pair(error_type, code)?;
        }
        Ok(outcome?)
    }

    fn wait_for_data(&mut self, timeout: Option<Duration>) -> PipeResult<bool> {
        let ready = match self.socket.wait_readable(timeout) {
            Ok(ready) => ready,
            Err(err) => {
                warn!(pipe_id = %self.channel.pipe_id(), error = %err, "poll failed");
                false
            }
        };
        if self.coupling.read {
            self.channel.send_i32(i32::from(ready))?;
        }
        Ok(ready)
    }

    fn shutdown(&mut self, read: bool, write: bool) {
        let how = match (read, write) {
            (true, true) => Shutdown::Both,
            (true, false) => Shutdown::Read,
            (false, true) => Shutdown::Write,
            (false, false) => return,
        };
        if let Err(err) = self.socket.shutdown(how) {
            warn!(pipe_id = %self.channel.pipe_id(), ?how, error = %err, "shutdown failed");
        }
    }

    fn local_port(&mut self) -> PipeResult<Option<u16>> {
        let port = self.query("local port", |socket| socket.local_addr().map(|a| a.port()));
        self.replicate_port(port)
    }

    fn local_address(&mut self) -> PipeResult<Option<String>> {
        let address = self.query("local address", |socket| {
            socket.local_addr().map(|a| a.ip().to_string())
        });
        self.replicate_text(address)
    }

    fn local_host_name(&mut self) -> PipeResult<Option<String>> {
        let name = self.query("local host name", |socket| host_name(socket.local_addr()));
        self.replicate_text(name)
    }

    fn peer_port(&mut self) -> PipeResult<Option<u16>> {
        let port = self.query("peer port", |socket| socket.peer_addr().map(|a| a.port()));
        self.replicate_port(port)
    }

    fn peer_address(&mut self) -> PipeResult<Option<String>> {
        let address = self.query("peer address", |socket| {
            socket.peer_addr().map(|a| a.ip().to_string())
        });
        self.replicate_text(address)
    }

    fn peer_host_name(&mut self) -> PipeResult<Option<String>> {
        let name = self.query("peer host name", |socket| host_name(socket.peer_addr()));
        self.replicate_text(name)
    }
}
