//! Player wire header codec and message framing.
//!
//! Every message on a Player connection is a fixed 30-byte header followed
//! by an opaque body:
//! - a 2-byte sync word (`0x5878`) for stream validation
//! - kind, subtype, device type and device index (2 bytes each)
//! - a 4-byte body length
//! - send and sample timestamps as seconds/microseconds pairs
//!
//! All multi-byte fields are big-endian. Bodies are never interpreted here.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_header, encode_header, encode_message, DeviceAddr, FrameConfig, Message,
    MessageHeader, Timestamp, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE, SYNC_WORD,
};
pub use error::{FrameError, Result};
pub use kind::MessageKind;
pub use reader::FrameReader;
pub use writer::FrameWriter;
