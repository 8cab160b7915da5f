//! Broadcast packets and the multiplexer contract for cluster pipes.
//!
//! A [`Packet`] is the unit the master node broadcasts to its slaves. It has
//! a fixed capacity and typed cursors ([`PacketWriter`], [`PacketReader`])
//! for the handful of primitive encodings pipes need.
//!
//! A [`Multiplexer`] delivers packets from the master to every slave,
//! addressed by [`PipeId`], in the master's send order per pipe. Two
//! implementations are provided:
//! - [`InMemoryCluster`]: master and slaves inside one process
//! - [`StreamMultiplexer`]: frames over byte streams between processes

pub mod codec;
pub mod error;
pub mod memory;
pub mod multiplexer;
pub mod packet;
mod queue;
pub mod stream;

pub use codec::{decode_frame, encode_frame, Frame, FRAME_HEADER_SIZE};
pub use error::{MuxError, PacketError, Result};
pub use memory::{InMemoryCluster, InMemoryNode};
pub use multiplexer::{Multiplexer, PipeId, PipeIdAllocator};
pub use packet::{
    Packet, PacketReader, PacketWriter, DEFAULT_PACKET_CAPACITY, MIN_PACKET_CAPACITY,
};
pub use stream::{StreamMultiplexer, StreamMultiplexerConfig};
