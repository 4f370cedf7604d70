/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server address could not be resolved.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end closed the connection (zero-byte read or write).
    #[error("connection closed by peer")]
    Closed,

    /// A configured socket timeout elapsed before the operation completed.
    #[error("transport operation timed out")]
    TimedOut,
}

pub type Result<T> = std::result::Result<T, TransportError>;
