use std::io;

use clusterpipe_packet::{MuxError, PacketError, PipeId};
use clusterpipe_transport::ConstructionStage;

/// Code reported for read failures that carry no OS error number.
pub const UNKNOWN_ERROR_CODE: i32 = -1;

/// Ways a write can fail. Identical on the master and on every coupled slave.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// The peer hung up.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The sink stopped accepting bytes before the buffer was written.
    #[error("sink reached end of file with {remaining_bytes} bytes unwritten")]
    SinkExhausted { remaining_bytes: usize },

    /// Any other write failure.
    #[error("write failed: {}", describe_os_error(*code))]
    Other { code: i32 },
}

impl WriteError {
    /// Wire `errorType` for a successful write.
    pub const SUCCESS: i32 = 0;
    const PEER_CLOSED: i32 = 1;
    const SINK_EXHAUSTED: i32 = 2;
    const OTHER: i32 = 3;

    /// Classify a failed write syscall.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => WriteError::PeerClosed,
            _ => WriteError::Other {
                code: err.raw_os_error().unwrap_or(UNKNOWN_ERROR_CODE),
            },
        }
    }

    /// Encode as `(errorType, errorCode)`.
    pub fn to_wire(&self) -> (i32, i32) {
        match self {
            WriteError::PeerClosed => (Self::PEER_CLOSED, 0),
            WriteError::SinkExhausted { remaining_bytes } => (
                Self::SINK_EXHAUSTED,
                i32::try_from(*remaining_bytes).unwrap_or(i32::MAX),
            ),
            WriteError::Other { code } => (Self::OTHER, *code),
        }
    }

    /// Decode `(errorType, errorCode)`. `Ok(None)` means success; `Err`
    /// carries the unknown error type.
    pub fn from_wire(error_type: i32, code: i32) -> Result<Option<Self>, i32> {
        match error_type {
            Self::SUCCESS => Ok(None),
            Self::PEER_CLOSED => Ok(Some(WriteError::PeerClosed)),
            Self::SINK_EXHAUSTED => Ok(Some(WriteError::SinkExhausted {
                remaining_bytes: usize::try_from(code).unwrap_or(0),
            })),
            Self::OTHER => Ok(Some(WriteError::Other { code })),
            unknown => Err(unknown),
        }
    }
}

/// Errors raised by pipe operations.
///
/// `Construction`, `Read` and `Write` are replicated: the master broadcasts
/// them before returning, and coupled slaves return the same variant with
/// the same data. The remaining variants report failures of the broadcast
/// channel itself.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// Connection establishment failed.
    #[error("{stage} for {host}:{port}")]
    Construction {
        stage: ConstructionStage,
        host: String,
        port: u16,
    },

    /// A read failed with the given OS error code.
    #[error("read failed: {}", describe_os_error(*code))]
    Read { code: i32 },

    /// The stream ended before a [`read_exact`](crate::ClusterPipe::read_exact)
    /// buffer was filled.
    #[error("stream ended with {missing} bytes still expected")]
    UnexpectedEof { missing: usize },

    /// A write failed.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// The multiplexer failed to deliver a packet.
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] MuxError),

    /// A replicated packet could not be encoded or decoded.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// A replicated packet decoded to a value the protocol does not allow.
    #[error("protocol violation on pipe {pipe_id}: {message}")]
    Protocol { pipe_id: PipeId, message: String },
}

/// The comparable shape of a [`PipeError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Construction(ConstructionStage),
    Read { code: i32 },
    UnexpectedEof { missing: usize },
    Write(WriteError),
    /// Broadcast channel failure; never replicated.
    Channel,
}

impl PipeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipeError::Construction { stage, .. } => ErrorKind::Construction(*stage),
            PipeError::Read { code } => ErrorKind::Read { code: *code },
            PipeError::UnexpectedEof { missing } => ErrorKind::UnexpectedEof { missing: *missing },
            PipeError::Write(err) => ErrorKind::Write(err.clone()),
            PipeError::Multiplexer(_) | PipeError::Packet(_) | PipeError::Protocol { .. } => {
                ErrorKind::Channel
            }
        }
    }

    /// True for errors that every node raises identically.
    pub fn is_replicated(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Channel)
    }
}

impl From<PipeError> for io::Error {
    fn from(err: PipeError) -> Self {
        match err {
            PipeError::Read { code } | PipeError::Write(WriteError::Other { code }) if code > 0 => {
                io::Error::from_raw_os_error(code)
            }
            PipeError::Write(WriteError::PeerClosed) => {
                io::Error::new(io::ErrorKind::BrokenPipe, err)
            }
            PipeError::Write(WriteError::SinkExhausted { .. }) => {
                io::Error::new(io::ErrorKind::WriteZero, err)
            }
            PipeError::UnexpectedEof { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::other(other),
        }
    }
}

pub type PipeResult<T> = std::result::Result<T, PipeError>;

pub(crate) fn construction_error(stage: ConstructionStage, host: &str, port: u16) -> PipeError {
    PipeError::Construction {
        stage,
        host: host.to_string(),
        port,
    }
}

/// Error code broadcast for a failed read. Never zero: zero marks end of
/// stream.
pub(crate) fn read_error_code(err: &io::Error) -> i32 {
    match err.raw_os_error() {
        Some(code) if code != 0 => code,
        _ => UNKNOWN_ERROR_CODE,
    }
}

pub(crate) fn protocol_error(pipe_id: PipeId, message: impl Into<String>) -> PipeError {
    PipeError::Protocol {
        pipe_id,
        message: message.into(),
    }
}

fn describe_os_error(code: i32) -> String {
    if code == UNKNOWN_ERROR_CODE {
        return "unknown error".to_string();
    }
    io::Error::from_raw_os_error(code).to_string()
}
