use std::io;
use std::sync::Arc;
use std::time::Duration;

use clusterpipe_packet::{Multiplexer, PipeId};
use tracing::warn;

use crate::buffering::StreamBuffering;
use crate::config::PipeConfig;
use crate::endpoint::{PipeEndpoint, Role};
use crate::error::{PipeError, PipeResult};
use crate::master::MasterPipe;
use crate::slave::SlavePipe;

/// A buffered, replicated byte stream.
///
/// Every node of the cluster constructs a `ClusterPipe` with the same
/// arguments and issues the same sequence of calls on it. The master talks to
/// the network; slaves replay the master's results. Apart from
/// [`is_master`](Self::is_master), nothing about the API differs by role.
///
/// Buffering decisions are made from replicated state only, so a call that
/// is served from the buffer on the master is served from the buffer on
/// every slave too.
#[derive(Debug)]
pub struct ClusterPipe {
    buffering: StreamBuffering,
    role: Role,
}

impl ClusterPipe {
    /// Open a pipe to `host:port`.
    ///
    /// The pipe id comes from [`Multiplexer::open_pipe`], so all nodes must
    /// open their pipes in the same order.
    pub fn connect(
        mux: Arc<dyn Multiplexer>,
        host: &str,
        port: u16,
        config: PipeConfig,
    ) -> PipeResult<Self> {
        let pipe_id = mux.open_pipe();
        let role = if mux.is_master() {
            Role::Master(MasterPipe::connect(mux, pipe_id, host, port, &config)?)
        } else {
            Role::Slave(SlavePipe::attach(mux, pipe_id, host, port, &config)?)
        };
        Ok(Self::from_role(role, &config))
    }

    /// Wrap an endpoint built by hand.
    pub fn from_role(role: Role, config: &PipeConfig) -> Self {
        Self {
            buffering: StreamBuffering::new(config.write_buffer_size),
            role,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_master(&self) -> bool {
        self.role.is_master()
    }

    pub fn pipe_id(&self) -> PipeId {
        self.role.endpoint().pipe_id()
    }

    /// Bytes already received but not yet returned by [`read`](Self::read).
    pub fn unread(&self) -> usize {
        self.buffering.unread()
    }

    /// Read up to `buf.len()` bytes. Returns `0` at end of stream.
    ///
    /// Buffered bytes are returned first; the endpoint is only asked for more
    /// once they are used up.
    pub fn read(&mut self, buf: &mut [u8]) -> PipeResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffering.unread() == 0 {
            self.buffering.refilled(0);
            let n = self.role.endpoint_mut().perform_read()?;
            self.buffering.refilled(n);
            if n == 0 {
                return Ok(0);
            }
        }
        Ok(self.buffering.take(self.role.endpoint().read_buffer(), buf))
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> PipeResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => {
                    return Err(PipeError::UnexpectedEof {
                        missing: buf.len() - filled,
                    })
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    /// Buffer `data`, pushing the buffer to the endpoint each time it fills.
    pub fn write(&mut self, data: &[u8]) -> PipeResult<()> {
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.buffering.stage(rest);
            rest = &rest[n..];
            if self.buffering.is_write_full() {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Push buffered writes to the endpoint. The buffer is emptied even when
    /// the write fails.
    pub fn flush(&mut self) -> PipeResult<()> {
        if self.buffering.pending_write().is_empty() {
            return Ok(());
        }
        let result = self
            .role
            .endpoint_mut()
            .perform_write(self.buffering.pending_write());
        self.buffering.clear_write();
        result
    }

    /// Wait until data can be read.
    pub fn wait_for_data(&mut self) -> PipeResult<bool> {
        self.wait(None)
    }

    /// Wait until data can be read or `timeout` elapses.
    pub fn wait_for_data_timeout(&mut self, timeout: Duration) -> PipeResult<bool> {
        self.wait(Some(timeout))
    }

    fn wait(&mut self, timeout: Option<Duration>) -> PipeResult<bool> {
        if self.buffering.unread() > 0 {
            return Ok(true);
        }
        self.role.endpoint_mut().wait_for_data(timeout)
    }

    /// Flush, then shut down the requested directions of the socket.
    pub fn shutdown(&mut self, read: bool, write: bool) -> PipeResult<()> {
        let flushed = self.flush();
        self.role.endpoint_mut().shutdown(read, write);
        flushed
    }

    pub fn local_port(&mut self) -> PipeResult<Option<u16>> {
        self.role.endpoint_mut().local_port()
    }

    pub fn local_address(&mut self) -> PipeResult<Option<String>> {
        self.role.endpoint_mut().local_address()
    }

    pub fn local_host_name(&mut self) -> PipeResult<Option<String>> {
        self.role.endpoint_mut().local_host_name()
    }

    pub fn peer_port(&mut self) -> PipeResult<Option<u16>> {
        self.role.endpoint_mut().peer_port()
    }

    pub fn peer_address(&mut self) -> PipeResult<Option<String>> {
        self.role.endpoint_mut().peer_address()
    }

    pub fn peer_host_name(&mut self) -> PipeResult<Option<String>> {
        self.role.endpoint_mut().peer_host_name()
    }
}

impl Drop for ClusterPipe {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(pipe_id = %self.pipe_id(), error = %err, "flush on drop failed");
        }
    }
}

impl io::Read for ClusterPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(ClusterPipe::read(self, buf)?)
    }
}

impl io::Write for ClusterPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ClusterPipe::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(ClusterPipe::flush(self)?)
    }
}
