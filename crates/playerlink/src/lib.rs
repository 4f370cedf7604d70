//! Client library for Player robot servers.
//!
//! A Player server exposes robot devices (sonar, laser, position, ...) over
//! a single TCP connection. This crate re-exports the layers that talk to
//! it:
//!
//! - [`transport`]: blocking TCP byte pipe and the `Transport` seam
//! - [`frame`]: 30-byte message header codec and message reader/writer
//! - [`client`]: connection, request correlation and device dispatch
//!
//! The `playerlink` binary (feature `cli`) is a small tool built on top.

/// Re-export transport types.
pub mod transport {
    pub use playerlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use playerlink_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use playerlink_client::*;
}

pub use playerlink_client::{
    connect, AccessMode, Client, ClientConfig, ClientError, DeliveryMode, DeviceAddr,
    DeviceHandle, RawDevice, ReadEvent,
};
