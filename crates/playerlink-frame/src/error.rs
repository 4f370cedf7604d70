use playerlink_transport::TransportError;

use crate::codec::MessageHeader;

/// Errors that can occur while reading or writing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying transport failed. Always fatal to the connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The header's sync word did not match.
    ///
    /// The body announced by the header has already been consumed, so the
    /// stream is positioned at the next header.
    #[error("invalid sync word 0x{found:04x} (expected 0x5878)")]
    InvalidSync { found: u16, header: MessageHeader },

    /// The body exceeds the configured maximum message size.
    #[error("message body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Whether the stream can still be read after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::InvalidSync { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
