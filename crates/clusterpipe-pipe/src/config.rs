use clusterpipe_transport::SocketConfig;

/// Default size of a pipe's write buffer.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// Which directions of a pipe take part in replication.
///
/// A decoupled direction sends and receives nothing: the master performs the
/// real operation silently, and slaves treat reads as end-of-stream and
/// writes as successful. Every node must use the same value for a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coupling {
    /// Reads, wait-for-data and address metadata are replicated.
    pub read: bool,
    /// Write outcomes are replicated.
    pub write: bool,
}

impl Coupling {
    /// Both directions replicated.
    pub const FULL: Coupling = Coupling {
        read: true,
        write: true,
    };

    /// Nothing replicated.
    pub const NONE: Coupling = Coupling {
        read: false,
        write: false,
    };

    pub const fn new(read: bool, write: bool) -> Self {
        Self { read, write }
    }
}

impl Default for Coupling {
    fn default() -> Self {
        Self::FULL
    }
}

/// Configuration for a cluster pipe.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Replicated directions. Default: [`Coupling::FULL`].
    pub coupling: Coupling,
    /// Bytes buffered by [`ClusterPipe::write`](crate::ClusterPipe::write)
    /// before they are pushed to the socket. Default: 8 KiB.
    pub write_buffer_size: usize,
    /// Socket options used by the master.
    pub socket: SocketConfig,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            coupling: Coupling::FULL,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            socket: SocketConfig::default(),
        }
    }
}

impl PipeConfig {
    /// Override the coupling.
    pub fn with_coupling(mut self, coupling: Coupling) -> Self {
        self.coupling = coupling;
        self
    }

    /// Override the write buffer size. Zero is raised to one byte.
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size.max(1);
        self
    }
}
