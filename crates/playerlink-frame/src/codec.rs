use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

/// Header size on the wire: 5 x u16 + 5 x u32 = 30 bytes.
pub const HEADER_SIZE: usize = 30;

/// Sync word that opens every valid header ("xX").
pub const SYNC_WORD: u16 = 0x5878;

/// Default maximum body size: 2 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Identifies one device on a server: interface type code plus index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceAddr {
    pub device_type: u16,
    pub index: u16,
}

impl DeviceAddr {
    /// The server itself; connection-level requests are addressed here.
    pub const SERVER: DeviceAddr = DeviceAddr::new(1, 0);

    pub const fn new(device_type: u16, index: u16) -> Self {
        Self { device_type, index }
    }
}

impl std::fmt::Display for DeviceAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device_type, self.index)
    }
}

/// A wall-clock instant as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub sec: u32,
    pub usec: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, usec: 0 };

    pub const fn new(sec: u32, usec: u32) -> Self {
        Self { sec, usec }
    }

    /// Current system time, truncated to the wire's 32-bit seconds.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs() as u32,
            usec: elapsed.subsec_micros(),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.sec) + f64::from(self.usec) / 1e6
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.usec == 0
    }
}

/// Decoded form of the fixed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Sync word as received. Outgoing headers always carry [`SYNC_WORD`].
    pub sync: u16,
    pub kind: MessageKind,
    pub subtype: u16,
    pub addr: DeviceAddr,
    /// Body length in bytes.
    pub size: u32,
    /// When the sender put the message on the wire.
    pub send_time: Timestamp,
    /// When the carried data was sampled.
    pub sample_time: Timestamp,
}

impl MessageHeader {
    /// A header with a valid sync word, zero size and zero timestamps.
    pub fn new(kind: MessageKind, addr: DeviceAddr, subtype: u16) -> Self {
        Self {
            sync: SYNC_WORD,
            kind,
            subtype,
            addr,
            size: 0,
            send_time: Timestamp::ZERO,
            sample_time: Timestamp::ZERO,
        }
    }

    pub fn has_valid_sync(&self) -> bool {
        self.sync == SYNC_WORD
    }

    /// True when `self` answers a request carrying `request`'s address and subtype.
    pub fn correlates_with(&self, request: &MessageHeader) -> bool {
        self.addr == request.addr && self.subtype == request.subtype
    }
}

/// Encode a header into its 30-byte wire form.
///
/// ```text
/// ┌──────┬──────┬─────────┬──────┬───────┬──────┬─────────────┬───────────────┐
/// │ sync │ kind │ subtype │ type │ index │ size │ send s / us │ sample s / us │
/// │ u16  │ u16  │ u16     │ u16  │ u16   │ u32  │ u32 / u32   │ u32 / u32     │
/// └──────┴──────┴─────────┴──────┴───────┴──────┴─────────────┴───────────────┘
/// ```
pub fn encode_header(header: &MessageHeader, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_u16(header.sync);
    dst.put_u16(header.kind.code());
    dst.put_u16(header.subtype);
    dst.put_u16(header.addr.device_type);
    dst.put_u16(header.addr.index);
    dst.put_u32(header.size);
    dst.put_u32(header.send_time.sec);
    dst.put_u32(header.send_time.usec);
    dst.put_u32(header.sample_time.sec);
    dst.put_u32(header.sample_time.usec);
}

/// Decode a header from its wire form. Performs no validation.
pub fn decode_header(src: &[u8; HEADER_SIZE]) -> MessageHeader {
    let mut buf = &src[..];
    let sync = buf.get_u16();
    let kind = MessageKind::from_code(buf.get_u16());
    let subtype = buf.get_u16();
    let device_type = buf.get_u16();
    let index = buf.get_u16();
    let size = buf.get_u32();
    let send_time = Timestamp::new(buf.get_u32(), buf.get_u32());
    let sample_time = Timestamp::new(buf.get_u32(), buf.get_u32());

    MessageHeader {
        sync,
        kind,
        subtype,
        addr: DeviceAddr::new(device_type, index),
        size,
        send_time,
        sample_time,
    }
}

/// Encode a header followed by `body`, rewriting the header's size field.
pub fn encode_message(header: &MessageHeader, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let size = u32::try_from(body.len()).map_err(|_| FrameError::BodyTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;
    let header = MessageHeader { size, ..*header };
    dst.reserve(HEADER_SIZE + body.len());
    encode_header(&header, dst);
    dst.put_slice(body);
    Ok(())
}

/// One complete message: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Message {
    /// Build a message, setting the header's size from `body`.
    pub fn new(header: MessageHeader, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let header = MessageHeader {
            size: body.len() as u32,
            ..header
        };
        Self { header, body }
    }

    /// Total wire size (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Configuration for message reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes, enforced in both directions. Default: 2 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
