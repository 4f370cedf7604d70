//! Client-side connection engine for Player robot servers.
//!
//! One [`Client`] owns one TCP connection and multiplexes every subscribed
//! device over it. Three blocking operations drive the protocol:
//!
//! - [`Client::read`] processes one message: a queued one if any,
//!   otherwise the next one from the socket. DATA is dispatched to the
//!   registered device, SYNCH marks the end of a round.
//! - [`Client::write`] sends a command to a device, fire-and-forget.
//! - [`Client::request`] sends a request and waits for the matching reply.
//!   DATA that arrives in the meantime is queued for the next `read`.
//!
//! ```no_run
//! use playerlink_client::{AccessMode, Client, DeviceAddr, RawDevice, ReadEvent};
//!
//! let mut client = Client::new();
//! client.connect("localhost", 6665)?;
//! let sonar = client.open_device(DeviceAddr::new(5, 0), AccessMode::Read, RawDevice::new())?;
//! loop {
//!     if let ReadEvent::Data { handle } = client.read()? {
//!         if handle == sonar {
//!             let raw = client.handler::<RawDevice>(sonar).unwrap();
//!             println!("{} bytes", raw.data().len());
//!         }
//!     }
//! }
//! # Ok::<(), playerlink_client::ClientError>(())
//! ```

pub mod client;
pub mod connector;
pub mod control;
pub mod error;
pub mod handshake;
pub mod queue;
pub mod registry;

pub use client::{Client, ClientConfig, ReadEvent, DEFAULT_REQUEST_ITERATION_LIMIT};
pub use connector::{connect, connect_with_config};
pub use control::{AccessMode, AccessReply, DeliveryMode, DeviceInfo};
pub use error::{ClientError, Result};
pub use handshake::{Banner, HandshakeConfig, DEFAULT_BANNER_LEN};
pub use queue::{PendingQueue, DEFAULT_QUEUE_CAPACITY};
pub use registry::{
    Callback, CallbackId, DeviceHandle, DeviceHandler, DeviceRecord, DeviceRegistry, RawDevice,
    DEFAULT_MAX_CALLBACKS,
};

pub use playerlink_frame::{DeviceAddr, MessageHeader, MessageKind, Timestamp};
