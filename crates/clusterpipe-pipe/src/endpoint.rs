use std::time::Duration;

use clusterpipe_packet::PipeId;

use crate::config::Coupling;
use crate::error::PipeResult;
use crate::master::MasterPipe;
use crate::slave::SlavePipe;

/// The role-specific half of a cluster pipe.
///
/// Each operation runs the real syscall on the master and reconstructs the
/// outcome from the broadcast on slaves. On a coupled direction every node
/// returns the same value or the same replicated error.
pub trait PipeEndpoint: Send + std::fmt::Debug {
    fn pipe_id(&self) -> PipeId;

    fn coupling(&self) -> Coupling;

    /// Read one chunk into the internal read buffer. Returns the number of
    /// bytes now available through [`read_buffer`](Self::read_buffer);
    /// `0` means end of stream.
    fn perform_read(&mut self) -> PipeResult<usize>;

    /// Bytes produced by the last successful `perform_read`.
    fn read_buffer(&self) -> &[u8];

    /// Write all of `data`.
    fn perform_write(&mut self, data: &[u8]) -> PipeResult<()>;

    /// Wait until data can be read, up to `timeout` (`None` waits forever).
    fn wait_for_data(&mut self, timeout: Option<Duration>) -> PipeResult<bool>;

    /// Shut down one or both directions. Not replicated.
    fn shutdown(&mut self, read: bool, write: bool);

    fn local_port(&mut self) -> PipeResult<Option<u16>>;

    fn local_address(&mut self) -> PipeResult<Option<String>>;

    fn local_host_name(&mut self) -> PipeResult<Option<String>>;

    fn peer_port(&mut self) -> PipeResult<Option<u16>>;

    fn peer_address(&mut self) -> PipeResult<Option<String>>;

    fn peer_host_name(&mut self) -> PipeResult<Option<String>>;
}

/// The endpoint a node holds for one pipe.
#[derive(Debug)]
pub enum Role {
    Master(MasterPipe),
    Slave(SlavePipe),
}

impl Role {
    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master(_))
    }

    pub fn endpoint(&self) -> &dyn PipeEndpoint {
        match self {
            Role::Master(pipe) => pipe,
            Role::Slave(pipe) => pipe,
        }
    }

    pub fn endpoint_mut(&mut self) -> &mut dyn PipeEndpoint {
        match self {
            Role::Master(pipe) => pipe,
            Role::Slave(pipe) => pipe,
        }
    }
}
