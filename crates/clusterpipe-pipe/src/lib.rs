//! Replicated TCP pipes for clusters that run one application on every node.
//!
//! Only the master node holds a real socket. Every observable result of an
//! operation on it (bytes read, write failures, poll results, address
//! metadata) is broadcast through a [`Multiplexer`](clusterpipe_packet::Multiplexer),
//! and each slave node reconstructs the identical result from the broadcast
//! without touching the network. Application code uses [`ClusterPipe`] the
//! same way on every node.
//!
//! # Layers
//!
//! - [`MasterPipe`] / [`SlavePipe`]: the two [`PipeEndpoint`] roles
//! - [`ClusterPipe`]: buffered byte stream over either role
//! - [`PipeError`]: the replicated error taxonomy

mod buffering;
mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod master;
pub mod pipe;
pub mod slave;

#[cfg(test)]
mod test_support;

pub use config::{Coupling, PipeConfig, DEFAULT_WRITE_BUFFER_SIZE};
pub use endpoint::{PipeEndpoint, Role};
pub use error::{ErrorKind, PipeError, PipeResult, WriteError};
pub use master::MasterPipe;
pub use pipe::ClusterPipe;
pub use slave::SlavePipe;

pub use clusterpipe_transport::ConstructionStage;
