use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

/// A connected byte-stream socket as seen by the master pipe.
///
/// Implemented by [`TcpSocket`](crate::TcpSocket). Anything else that can
/// read, write, poll and report its endpoints can stand in for it, which is
/// how fault conditions are exercised without a misbehaving network.
pub trait PipeSocket: Read + Write + Send + std::fmt::Debug {
    /// Block until data (or end-of-stream) is available to read.
    ///
    /// `None` waits indefinitely. Returns `false` when the timeout elapsed.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool>;

    /// Local endpoint of the connection.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;

    /// Remote endpoint of the connection.
    fn peer_addr(&self) -> std::io::Result<SocketAddr>;

    /// Shut down the read half, the write half, or both.
    fn shutdown(&self, how: Shutdown) -> std::io::Result<()>;
}
