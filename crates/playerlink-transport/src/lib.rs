//! Blocking TCP transport for Player robot servers.
//!
//! This is the lowest layer of playerlink. It owns the socket and exposes
//! exactly two data operations, "read exactly N bytes" and "write exactly
//! N bytes", both of which loop over partial I/O until they complete or
//! the connection breaks. Everything else builds on the [`Transport`]
//! trait defined here.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{ShutdownHandle, TcpTransport, TransportConfig, DEFAULT_PORT};
pub use traits::{read_full, write_full, IoTransport, Transport};
