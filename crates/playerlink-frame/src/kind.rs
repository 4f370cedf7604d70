//! Message kinds.
//!
//! Codes 1-7 are defined by the protocol. Anything else is carried through
//! as [`MessageKind::Other`] so header decoding never fails.

/// Asynchronous device data pushed by the server.
pub const DATA: u16 = 1;

/// Fire-and-forget command from client to device.
pub const COMMAND: u16 = 2;

/// Synchronous request awaiting a response.
pub const REQUEST: u16 = 3;

/// Positive response to a request.
pub const RESPONSE_ACK: u16 = 4;

/// End of one data delivery round.
pub const SYNCH: u16 = 5;

/// Negative response: the server refused the request.
pub const RESPONSE_NACK: u16 = 6;

/// The server failed while handling the request.
pub const RESPONSE_ERROR: u16 = 7;

/// The kind field of a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Data,
    Command,
    Request,
    ResponseAck,
    ResponseNack,
    ResponseError,
    Synch,
    /// A code this library does not know about.
    Other(u16),
}

impl MessageKind {
    /// Map a wire code to a kind.
    pub fn from_code(code: u16) -> Self {
        match code {
            DATA => Self::Data,
            COMMAND => Self::Command,
            REQUEST => Self::Request,
            RESPONSE_ACK => Self::ResponseAck,
            SYNCH => Self::Synch,
            RESPONSE_NACK => Self::ResponseNack,
            RESPONSE_ERROR => Self::ResponseError,
            other => Self::Other(other),
        }
    }

    /// The wire code for this kind.
    pub fn code(self) -> u16 {
        match self {
            Self::Data => DATA,
            Self::Command => COMMAND,
            Self::Request => REQUEST,
            Self::ResponseAck => RESPONSE_ACK,
            Self::Synch => SYNCH,
            Self::ResponseNack => RESPONSE_NACK,
            Self::ResponseError => RESPONSE_ERROR,
            Self::Other(code) => code,
        }
    }

    /// Human-readable name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Command => "COMMAND",
            Self::Request => "REQUEST",
            Self::ResponseAck => "RESPONSE_ACK",
            Self::ResponseNack => "RESPONSE_NACK",
            Self::ResponseError => "RESPONSE_ERROR",
            Self::Synch => "SYNCH",
            Self::Other(_) => "UNKNOWN",
        }
    }

    /// Returns true for the three reply kinds.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::ResponseAck | Self::ResponseNack | Self::ResponseError
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(code) => write!(f, "UNKNOWN({code})"),
            known => f.write_str(known.name()),
        }
    }
}
