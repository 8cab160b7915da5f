//! Scripted sockets and cluster fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clusterpipe_transport::PipeSocket;

/// A socket whose results are queued up front.
///
/// Reads pop from `reads` and report end of stream once it is empty. Writes
/// pop from `writes` and accept everything once it is empty.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSocket {
    reads: VecDeque<io::Result<Vec<u8>>>,
    writes: VecDeque<io::Result<usize>>,
    readable: VecDeque<io::Result<bool>>,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    written: Arc<Mutex<Vec<u8>>>,
    shutdowns: Arc<Mutex<Vec<Shutdown>>>,
}

impl ScriptedSocket {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(mut self, data: &[u8]) -> Self {
        self.reads.push_back(Ok(data.to_vec()));
        self
    }

    pub(crate) fn read_error(mut self, code: i32) -> Self {
        self.reads.push_back(Err(io::Error::from_raw_os_error(code)));
        self
    }

    pub(crate) fn read_failure(mut self, kind: io::ErrorKind) -> Self {
        self.reads.push_back(Err(io::Error::from(kind)));
        self
    }

    pub(crate) fn write_result(mut self, result: io::Result<usize>) -> Self {
        self.writes.push_back(result);
        self
    }

    pub(crate) fn readable(mut self, result: io::Result<bool>) -> Self {
        self.readable.push_back(result);
        self
    }

    pub(crate) fn endpoints(mut self, local: &str, peer: &str) -> Self {
        self.local = local.parse().ok();
        self.peer = peer.parse().ok();
        self
    }

    /// Everything the pipe has written so far.
    pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    pub(crate) fn shutdowns(&self) -> Arc<Mutex<Vec<Shutdown>>> {
        Arc::clone(&self.shutdowns)
    }

    pub(crate) fn boxed(self) -> Box<dyn PipeSocket> {
        Box::new(self)
    }
}

impl Read for ScriptedSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(err)) => Err(err),
            Some(Ok(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(Ok(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = match self.writes.pop_front() {
            None => buf.len(),
            Some(Err(err)) => return Err(err),
            Some(Ok(n)) => n.min(buf.len()),
        };
        self.written
            .lock()
            .unwrap()
            .extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl PipeSocket for ScriptedSocket {
    fn wait_readable(&mut self, _timeout: Option<Duration>) -> io::Result<bool> {
        self.readable
            .pop_front()
            .unwrap_or_else(|| Ok(!self.reads.is_empty()))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.local
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.shutdowns.lock().unwrap().push(how);
        Ok(())
    }
}
