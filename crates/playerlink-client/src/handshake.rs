use std::fmt;

use playerlink_transport::Transport;
use tracing::{debug, info};

use crate::control::DeliveryMode;
use crate::error::{ClientError, Result};

/// Length of the identification string a server sends on accept.
pub const DEFAULT_BANNER_LEN: usize = 32;

/// Configuration for connection setup.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Exact number of banner bytes to read.
    pub banner_len: usize,
    /// Delivery mode requested right after the banner. `None` keeps the
    /// server's default.
    pub initial_mode: Option<DeliveryMode>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            banner_len: DEFAULT_BANNER_LEN,
            initial_mode: Some(DeliveryMode::PushAsync),
        }
    }
}

/// The server's startup banner.
#[derive(Clone, PartialEq, Eq)]
pub struct Banner {
    raw: Vec<u8>,
}

impl Banner {
    pub fn from_bytes(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Banner text up to the first NUL, lossily decoded.
    pub fn text(&self) -> String {
        let end = self
            .raw
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(self.raw.len());
        String::from_utf8_lossy(&self.raw[..end]).trim().to_string()
    }
}

impl fmt::Debug for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Banner").field(&self.text()).finish()
    }
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Read the startup banner from a freshly connected transport.
pub fn read_banner<T: Transport + ?Sized>(
    transport: &mut T,
    config: &HandshakeConfig,
) -> Result<Banner> {
    let mut raw = vec![0u8; config.banner_len];
    transport.read_full(&mut raw).map_err(|err| {
        debug!(error = %err, "banner read failed");
        ClientError::HandshakeFailed(format!(
            "incomplete banner (expected {} bytes): {err}",
            config.banner_len
        ))
    })?;

    let banner = Banner::from_bytes(raw);
    info!(banner = %banner, transport = transport.transport_name(), "server banner received");
    Ok(banner)
}
