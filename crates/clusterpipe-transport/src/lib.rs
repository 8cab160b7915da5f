//! Real socket layer for cluster pipes.
//!
//! Only the master node of a cluster ever touches this crate at runtime.
//! It provides:
//! - [`TcpSocket`]: a TCP connection built in explicit stages so that the
//!   failing stage can be reported to (and mirrored by) slave nodes
//! - [`PipeSocket`]: the socket surface the master pipe drives, so that
//!   scripted sockets can stand in for real ones
//! - [`lookup_host_name`]: reverse name resolution for address metadata

pub mod error;
pub mod lookup;
pub mod tcp;
pub mod traits;

pub use error::{ConstructionStage, Result, TransportError};
pub use lookup::lookup_host_name;
pub use tcp::{SocketConfig, TcpSocket};
pub use traits::PipeSocket;
