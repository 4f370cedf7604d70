//! Connection-level requests and their body layouts.
//!
//! All of these are sent as REQUEST messages addressed at
//! [`DeviceAddr::SERVER`]. Bodies are big-endian like the header.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use playerlink_frame::DeviceAddr;

use crate::error::{ClientError, Result};

/// Request subtype: list the devices the server offers.
pub const REQ_DEVICE_LIST: u16 = 1;
/// Request subtype: name of the driver behind one device.
pub const REQ_DRIVER_INFO: u16 = 2;
/// Request subtype: open or close a device.
pub const REQ_DEVICE_ACCESS: u16 = 3;
/// Request subtype: deliver one round of data (pull modes).
pub const REQ_DATA: u16 = 4;
/// Request subtype: change the delivery mode.
pub const REQ_DATA_MODE: u16 = 5;
/// Request subtype: change the update frequency.
pub const REQ_DATA_FREQ: u16 = 6;
/// Request subtype: present an authentication key.
pub const REQ_AUTH: u16 = 7;

/// Access a client holds on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    Read,
    Write,
    All,
    #[default]
    Close,
    /// Only ever granted by the server, when it could not open the device.
    Error,
}

impl AccessMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'r' => Some(Self::Read),
            b'w' => Some(Self::Write),
            b'a' => Some(Self::All),
            b'c' => Some(Self::Close),
            b'e' => Some(Self::Error),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Read => b'r',
            Self::Write => b'w',
            Self::All => b'a',
            Self::Close => b'c',
            Self::Error => b'e',
        }
    }

    /// Whether commands may be sent with this access.
    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::All)
    }

    /// Whether data is delivered with this access.
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::All)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::All => "all",
            Self::Close => "close",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(Self::Read),
            "w" | "write" => Ok(Self::Write),
            "a" | "all" => Ok(Self::All),
            "c" | "close" => Ok(Self::Close),
            other => Err(format!(
                "invalid access mode '{other}' (expected r, w, a or c)"
            )),
        }
    }
}

/// Server policy for when data messages are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Every message, pushed continuously.
    PushAll,
    /// Every message, one round per client request.
    PullAll,
    /// Only new messages, pushed continuously. The server's initial mode.
    PushNew,
    /// Only new messages, one round per client request.
    PullNew,
    /// Messages pushed as soon as they are produced.
    PushAsync,
}

impl DeliveryMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::PushAll),
            1 => Some(Self::PullAll),
            2 => Some(Self::PushNew),
            3 => Some(Self::PullNew),
            4 => Some(Self::PushAsync),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::PushAll => 0,
            Self::PullAll => 1,
            Self::PushNew => 2,
            Self::PullNew => 3,
            Self::PushAsync => 4,
        }
    }

    /// Pull modes require a data-round request before each read.
    pub fn is_pull(self) -> bool {
        matches!(self, Self::PullAll | Self::PullNew)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PushAll => "push-all",
            Self::PullAll => "pull-all",
            Self::PushNew => "push-new",
            Self::PullNew => "pull-new",
            Self::PushAsync => "push-async",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "push-all" => Ok(Self::PushAll),
            "pull-all" => Ok(Self::PullAll),
            "push-new" => Ok(Self::PushNew),
            "pull-new" => Ok(Self::PullNew),
            "push-async" => Ok(Self::PushAsync),
            other => Err(format!(
                "invalid delivery mode '{other}' (expected push-all, pull-all, push-new, pull-new or push-async)"
            )),
        }
    }
}

/// One entry of the server's device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub addr: DeviceAddr,
    pub driver_name: String,
}

/// Decoded reply to a device-access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReply {
    pub addr: DeviceAddr,
    pub granted: AccessMode,
    pub driver_name: String,
}

const ADDR_LEN: usize = 4;

fn put_addr(buf: &mut BytesMut, addr: DeviceAddr) {
    buf.put_u16(addr.device_type);
    buf.put_u16(addr.index);
}

fn get_addr(buf: &mut &[u8]) -> DeviceAddr {
    let device_type = buf.get_u16();
    let index = buf.get_u16();
    DeviceAddr::new(device_type, index)
}

fn ensure_len(body: &[u8], needed: usize, subtype: u16) -> Result<()> {
    if body.len() < needed {
        return Err(ClientError::MalformedReply {
            subtype,
            reason: format!("expected at least {needed} bytes, got {}", body.len()),
        });
    }
    Ok(())
}

fn get_name(buf: &mut &[u8], subtype: u16) -> Result<String> {
    ensure_len(buf, 4, subtype)?;
    let len = buf.get_u32() as usize;
    if len > buf.len() {
        return Err(ClientError::MalformedReply {
            subtype,
            reason: format!("name length {len} exceeds remaining {} bytes", buf.len()),
        });
    }
    let name = String::from_utf8_lossy(&buf[..len])
        .trim_end_matches('\0')
        .to_string();
    buf.advance(len);
    Ok(name)
}

/// Body of a single-`u32` request (delivery mode, update frequency).
pub fn encode_u32(value: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(value);
    buf.freeze()
}

pub fn encode_access_request(addr: DeviceAddr, access: AccessMode) -> Bytes {
    let mut buf = BytesMut::with_capacity(ADDR_LEN + 5);
    put_addr(&mut buf, addr);
    buf.put_u8(access.code());
    buf.put_u32(0);
    buf.freeze()
}

pub fn decode_access_reply(body: &[u8]) -> Result<AccessReply> {
    ensure_len(body, ADDR_LEN + 1, REQ_DEVICE_ACCESS)?;
    let mut buf = body;
    let addr = get_addr(&mut buf);
    let code = buf.get_u8();
    let granted = AccessMode::from_code(code).ok_or_else(|| ClientError::MalformedReply {
        subtype: REQ_DEVICE_ACCESS,
        reason: format!("unknown access code 0x{code:02x}"),
    })?;
    let driver_name = get_name(&mut buf, REQ_DEVICE_ACCESS)?;
    Ok(AccessReply {
        addr,
        granted,
        driver_name,
    })
}

pub fn encode_driver_info_request(addr: DeviceAddr) -> Bytes {
    let mut buf = BytesMut::with_capacity(ADDR_LEN + 4);
    put_addr(&mut buf, addr);
    buf.put_u32(0);
    buf.freeze()
}

pub fn decode_driver_info_reply(body: &[u8]) -> Result<DeviceInfo> {
    ensure_len(body, ADDR_LEN, REQ_DRIVER_INFO)?;
    let mut buf = body;
    let addr = get_addr(&mut buf);
    let driver_name = get_name(&mut buf, REQ_DRIVER_INFO)?;
    Ok(DeviceInfo { addr, driver_name })
}

pub fn decode_device_list(body: &[u8]) -> Result<Vec<DeviceAddr>> {
    ensure_len(body, 4, REQ_DEVICE_LIST)?;
    let mut buf = body;
    let count = buf.get_u32() as usize;
    ensure_len(buf, count.saturating_mul(ADDR_LEN), REQ_DEVICE_LIST)?;
    Ok((0..count).map(|_| get_addr(&mut buf)).collect())
}

pub fn encode_auth_request(key: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + key.len());
    buf.put_u32(key.len() as u32);
    buf.put_slice(key);
    buf.freeze()
}
