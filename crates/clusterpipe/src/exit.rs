use std::fmt;
use std::io;

use clusterpipe_packet::MuxError;
use clusterpipe_pipe::PipeError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Io(source) => io_error(context, source),
        MuxError::Closed | MuxError::Failed(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        MuxError::InvalidMagic | MuxError::PayloadTooLarge { .. } | MuxError::Packet(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn pipe_error(context: &str, err: PipeError) -> CliError {
    match err {
        PipeError::Construction { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PipeError::Read { .. } | PipeError::Write(_) | PipeError::UnexpectedEof { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        PipeError::Multiplexer(err) => mux_error(context, err),
        PipeError::Packet(_) | PipeError::Protocol { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}
