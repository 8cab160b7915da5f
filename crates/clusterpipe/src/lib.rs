//! Replicated TCP pipes for clusters that run one application on every node.
//!
//! One node (the master) performs real network I/O. Every outcome is
//! broadcast to the other nodes (the slaves), which return the identical
//! result without touching the network.
//!
//! # Crate Structure
//!
//! - [`transport`]: staged TCP connection setup and socket metadata
//! - [`packet`]: broadcast packets and the ordered [`Multiplexer`](packet::Multiplexer) contract
//! - [`pipe`]: the master/slave pipe roles and the buffered [`ClusterPipe`]

/// Re-export transport types.
pub mod transport {
    pub use clusterpipe_transport::*;
}

/// Re-export packet and multiplexer types.
pub mod packet {
    pub use clusterpipe_packet::*;
}

/// Re-export pipe types.
pub mod pipe {
    pub use clusterpipe_pipe::*;
}

pub use clusterpipe_pipe::{ClusterPipe, Coupling, PipeConfig, PipeError, PipeResult};
