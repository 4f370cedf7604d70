use playerlink_frame::{DeviceAddr, FrameError};
use playerlink_transport::TransportError;

use crate::control::AccessMode;
use crate::registry::DeviceHandle;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error. The connection has been dropped.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing error while reading. The connection has been dropped.
    #[error("frame error: {0}")]
    Frame(#[source] FrameError),

    /// No connection is open.
    #[error("not connected")]
    NotConnected,

    /// The server banner could not be read.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A reply did not answer the outstanding request. The connection has
    /// been dropped.
    #[error(
        "reply for {got_addr} subtype {got_subtype} does not match request for {expected_addr} subtype {expected_subtype}"
    )]
    ProtocolMismatch {
        expected_addr: DeviceAddr,
        expected_subtype: u16,
        got_addr: DeviceAddr,
        got_subtype: u16,
    },

    /// No reply arrived within the iteration bound.
    #[error("no reply after {iterations} messages")]
    RequestTimeout { iterations: usize },

    /// The server refused the request (NACK).
    #[error("request {subtype} to {addr} rejected by server")]
    RequestRejected { addr: DeviceAddr, subtype: u16 },

    /// The server failed while handling the request.
    #[error("server error handling request {subtype} to {addr}")]
    ServerError { addr: DeviceAddr, subtype: u16 },

    /// The server granted different access than requested.
    #[error("requested {requested} access to {addr}, server granted {granted}")]
    AccessMismatch {
        addr: DeviceAddr,
        requested: AccessMode,
        granted: AccessMode,
        driver_name: String,
    },

    /// The device is not open for writing.
    #[error("device {addr} has {access} access; commands need write access")]
    AccessDenied { addr: DeviceAddr, access: AccessMode },

    /// A device with this address is already registered.
    #[error("device {0} already registered")]
    DuplicateDevice(DeviceAddr),

    /// No device is registered under this handle.
    #[error("unknown device handle {0}")]
    UnknownDevice(DeviceHandle),

    /// The device's callback list is full.
    #[error("device {addr} already has {max} callbacks")]
    TooManyCallbacks { addr: DeviceAddr, max: usize },

    /// A reply body did not have the expected shape.
    #[error("malformed reply to request {subtype}: {reason}")]
    MalformedReply { subtype: u16, reason: String },

    /// An outgoing body exceeds the maximum message size. Nothing was sent.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl ClientError {
    /// Whether the connection is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::Frame(_)
                | ClientError::NotConnected
                | ClientError::HandshakeFailed(_)
                | ClientError::ProtocolMismatch { .. }
        )
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Transport(err) => ClientError::Transport(err),
            other => ClientError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
