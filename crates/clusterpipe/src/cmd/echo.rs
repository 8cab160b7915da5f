use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cmd::EchoArgs;
use crate::exit::{io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const ECHO_BUFFER_SIZE: usize = 8 * 1024;

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.addr).map_err(|err| io_error("bind failed", err))?;
    let local = listener
        .local_addr()
        .map_err(|err| io_error("bind failed", err))?;
    // Non-blocking accept so Ctrl-C is noticed between connections.
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    print_listening(local, format);
    tracing::info!(%local, "echo server listening");

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(|err| io_error("accept failed", err))?;
                tracing::info!(%peer, "accepted connection");
                thread::Builder::new()
                    .name(format!("echo-{peer}"))
                    .spawn(move || match echo_connection(stream) {
                        Ok(total) => tracing::info!(%peer, total, "connection closed"),
                        Err(err) => tracing::warn!(%peer, error = %err, "connection failed"),
                    })
                    .map_err(|err| io_error("connection thread failed", err))?;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error("accept failed", err)),
        }
    }

    tracing::info!("echo server stopped");
    Ok(SUCCESS)
}

/// Echo everything until the peer closes. Returns the number of bytes echoed.
fn echo_connection<S: Read + Write>(mut stream: S) -> io::Result<u64> {
    let mut buf = [0u8; ECHO_BUFFER_SIZE];
    let mut total = 0;
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        tracing::debug!(size = n, "echoing bytes");
        stream.write_all(&buf[..n])?;
        stream.flush()?;
        total += n as u64;
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn echoes_until_end_of_stream() {
        let mut duplex = Duplex {
            input: Cursor::new(b"PING".repeat(5000)),
            output: Vec::new(),
        };

        let total = echo_connection(&mut duplex).unwrap();
        assert_eq!(total, 20_000);
        assert_eq!(duplex.output, b"PING".repeat(5000));
    }
}
