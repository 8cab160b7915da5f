use std::fmt;

/// The step of connection establishment that failed.
///
/// The numeric codes are part of the replication wire format: `0` is
/// reserved for success, so stages start at `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructionStage {
    /// Creating the socket descriptor.
    SocketCreate,
    /// Binding the local address.
    Bind,
    /// Resolving the remote host name.
    HostResolve,
    /// Connecting to the remote endpoint.
    Connect,
    /// Disabling Nagle's algorithm.
    NagleConfig,
}

impl ConstructionStage {
    /// All stages, in the order they are attempted.
    pub const ALL: [ConstructionStage; 5] = [
        ConstructionStage::SocketCreate,
        ConstructionStage::Bind,
        ConstructionStage::HostResolve,
        ConstructionStage::Connect,
        ConstructionStage::NagleConfig,
    ];

    /// Wire code for this stage.
    pub fn code(self) -> i32 {
        match self {
            ConstructionStage::SocketCreate => 1,
            ConstructionStage::Bind => 2,
            ConstructionStage::HostResolve => 3,
            ConstructionStage::Connect => 4,
            ConstructionStage::NagleConfig => 5,
        }
    }

    /// Decode a wire code. Returns `None` for `0` (success) and unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.code() == code)
    }

    /// Short human-readable description.
    pub fn describe(self) -> &'static str {
        match self {
            ConstructionStage::SocketCreate => "unable to create socket",
            ConstructionStage::Bind => "unable to bind socket",
            ConstructionStage::HostResolve => "unable to resolve host name",
            ConstructionStage::Connect => "unable to connect",
            ConstructionStage::NagleConfig => "unable to disable Nagle's algorithm",
        }
    }
}

impl fmt::Display for ConstructionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Errors that can occur in socket operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection establishment failed at a specific stage.
    #[error("{stage} for {host}:{port}: {source}")]
    Construction {
        stage: ConstructionStage,
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// An I/O error occurred on an established socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The construction stage that failed, if this is a construction error.
    pub fn stage(&self) -> Option<ConstructionStage> {
        match self {
            TransportError::Construction { stage, .. } => Some(*stage),
            TransportError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_codes_are_distinct_and_nonzero() {
        for stage in ConstructionStage::ALL {
            assert_ne!(stage.code(), 0);
            assert_eq!(ConstructionStage::from_code(stage.code()), Some(stage));
        }
    }

    #[test]
    fn success_and_unknown_codes_decode_to_none() {
        assert_eq!(ConstructionStage::from_code(0), None);
        assert_eq!(ConstructionStage::from_code(42), None);
        assert_eq!(ConstructionStage::from_code(-1), None);
    }

    #[test]
    fn construction_error_names_stage_and_endpoint() {
        let err = TransportError::Construction {
            stage: ConstructionStage::Connect,
            host: "render-head".to_string(),
            port: 4242,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        let text = err.to_string();
        assert!(text.starts_with("unable to connect for render-head:4242"));
        assert_eq!(err.stage(), Some(ConstructionStage::Connect));
    }
}
