use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::{debug, info};

use crate::error::{ConstructionStage, Result, TransportError};
use crate::traits::PipeSocket;

/// Options applied while establishing a [`TcpSocket`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Local address to bind before connecting. The address family of the
    /// remote host is chosen to match it. Default: `0.0.0.0:0`.
    pub bind_address: SocketAddr,
    /// Disable Nagle's algorithm after connecting. Default: `true`.
    pub no_delay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            no_delay: true,
        }
    }
}

/// A connected TCP socket.
///
/// Construction goes through the stages of [`ConstructionStage`] in order,
/// each one attempted only if the previous one succeeded, and reports the
/// first stage that failed.
#[derive(Debug)]
pub struct TcpSocket {
    stream: TcpStream,
}

impl TcpSocket {
    /// Connect to `host:port`.
    pub fn connect(host: &str, port: u16, config: &SocketConfig) -> Result<Self> {
        let fail = |stage: ConstructionStage| {
            move |source: std::io::Error| TransportError::Construction {
                stage,
                host: host.to_string(),
                port,
                source,
            }
        };

        let domain = Domain::for_address(config.bind_address);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(fail(ConstructionStage::SocketCreate))?;

        socket
            .bind(&config.bind_address.into())
            .map_err(fail(ConstructionStage::Bind))?;

        let target = resolve(host, port, config.bind_address.is_ipv4())
            .map_err(fail(ConstructionStage::HostResolve))?;
        debug!(host, port, %target, "resolved host");

        socket
            .connect(&target.into())
            .map_err(fail(ConstructionStage::Connect))?;

        let stream: TcpStream = socket.into();
        if config.no_delay {
            stream
                .set_nodelay(true)
                .map_err(fail(ConstructionStage::NagleConfig))?;
        }

        info!(host, port, %target, "connected tcp socket");
        Ok(Self { stream })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }
}

/// Resolve `host:port` to the first address of the requested family.
fn resolve(host: &str, port: u16, want_ipv4: bool) -> std::io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .find(|addr| addr.is_ipv4() == want_ipv4)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "no {} address for {host}",
                    if want_ipv4 { "IPv4" } else { "IPv6" }
                ),
            )
        })
}

impl Read for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpSocket {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl PipeSocket for TcpSocket {
    fn wait_readable(&mut self, timeout: Option<Duration>) -> std::io::Result<bool> {
        poll_readable(&self.stream, timeout)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn shutdown(&self, how: Shutdown) -> std::io::Result<()> {
        SockRef::from(&self.stream).shutdown(how)
    }
}

#[cfg(unix)]
fn poll_readable(stream: &TcpStream, timeout: Option<Duration>) -> std::io::Result<bool> {
    use std::os::fd::AsRawFd;

    let timeout_ms = poll_timeout_ms(timeout);
    let mut fds = libc::pollfd {
        fd: stream.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: `fds` is a single valid, writable pollfd and `fd` is an open
        // socket descriptor owned by `stream` for the duration of the call.
        let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if rc >= 0 {
            return Ok(rc > 0);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// `poll(2)` timeout for `timeout`, rounded up so a non-zero wait never
/// becomes a non-blocking check.
#[cfg(unix)]
fn poll_timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        Some(timeout) => timeout
            .as_nanos()
            .div_ceil(1_000_000)
            .min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    }
}

#[cfg(not(unix))]
fn poll_readable(stream: &TcpStream, timeout: Option<Duration>) -> std::io::Result<bool> {
    let mut probe = [0u8; 1];
    let result = match timeout {
        Some(timeout) if timeout.is_zero() => {
            stream.set_nonblocking(true)?;
            let result = stream.peek(&mut probe);
            stream.set_nonblocking(false)?;
            result
        }
        timeout => {
            stream.set_read_timeout(timeout)?;
            let result = stream.peek(&mut probe);
            stream.set_read_timeout(None)?;
            result
        }
    };
    match result {
        Ok(_) => Ok(true),
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
