use crate::multiplexer::PipeId;

/// Errors raised while encoding into or decoding from a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The value does not fit into the packet's remaining capacity.
    #[error("packet overflow ({needed} bytes needed, {available} available)")]
    Overflow { needed: usize, available: usize },

    /// The packet ended before the value was complete.
    #[error("packet underflow ({needed} bytes needed, {available} available)")]
    Underflow { needed: usize, available: usize },

    /// A length prefix was negative.
    #[error("invalid length prefix {0}")]
    InvalidLength(i32),

    /// A string payload was not valid UTF-8.
    #[error("invalid utf-8 in packet string: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Errors raised by multiplexer implementations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The channel was closed; no further packets will arrive.
    #[error("multiplexer closed")]
    Closed,

    /// The channel failed and was shut down.
    #[error("multiplexer failed: {0}")]
    Failed(String),

    /// The operation is not available on this node's role.
    #[error("{operation} is not available on a {role} node")]
    WrongRole {
        operation: &'static str,
        role: &'static str,
    },

    /// A stream frame started with the wrong magic bytes.
    #[error("invalid frame magic (expected 0x4350 \"CP\")")]
    InvalidMagic,

    /// A stream frame carried more payload than one packet can hold.
    #[error("frame payload too large for pipe {pipe_id} ({size} bytes, max {max})")]
    PayloadTooLarge {
        pipe_id: PipeId,
        size: usize,
        max: usize,
    },

    /// Packet encoding error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// An I/O error occurred on an underlying stream.
    #[error("multiplexer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MuxError>;
