use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{is_timeout, read_full, write_full, Transport};

/// Port a Player server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6665;

/// Socket-level configuration for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on establishing the TCP connection. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Upper bound on any single blocking read. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Upper bound on any single blocking write. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm. Requests are small and latency-bound.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            nodelay: true,
        }
    }
}

/// A TCP connection to a Player server.
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
    closed: bool,
}

impl TcpTransport {
    /// Resolve `host` and connect to the first address that accepts.
    pub fn connect(host: &str, port: u16, config: &TransportConfig) -> Result<Self> {
        let target = format!("{host}:{port}");
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                addr: target.clone(),
                source,
            })?
            .collect();

        let mut last_err = std::io::Error::new(ErrorKind::NotFound, "no addresses resolved");
        for addr in addrs {
            let attempt = match config.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::from_stream(stream, config),
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = err;
                }
            }
        }

        Err(TransportError::Connect {
            addr: target,
            source: last_err,
        })
    }

    /// Wrap an already connected stream and apply `config` to it.
    pub fn from_stream(stream: TcpStream, config: &TransportConfig) -> Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        let peer = stream.peer_addr()?;
        info!(%peer, "connected to player server");
        Ok(Self {
            stream,
            peer,
            read_timeout: config.read_timeout,
            closed: false,
        })
    }

    /// Address of the connected server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// A handle that can close this socket from another thread.
    ///
    /// Closing through the handle makes any read blocked on this transport
    /// fail with a transport error.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            stream: self.stream.try_clone()?,
        })
    }

    fn peek_with(&mut self, timeout: Duration) -> std::io::Result<usize> {
        let mut probe = [0u8; 1];
        if timeout.is_zero() {
            self.stream.set_nonblocking(true)?;
            let res = self.stream.peek(&mut probe);
            self.stream.set_nonblocking(false)?;
            res
        } else {
            self.stream.set_read_timeout(Some(timeout))?;
            let res = self.stream.peek(&mut probe);
            self.stream.set_read_timeout(self.read_timeout)?;
            res
        }
    }
}

impl Transport for TcpTransport {
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        read_full(&mut self.stream, buf)
    }

    fn write_full(&mut self, buf: &[u8]) -> Result<()> {
        write_full(&mut self.stream, buf)
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        match self.peek_with(timeout) {
            Ok(0) => Err(TransportError::Closed),
            Ok(_) => Ok(true),
            Err(err) if is_timeout(&err) => Ok(false),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(false),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotConnected => {}
            Err(err) => return Err(TransportError::Io(err)),
        }
        debug!(peer = %self.peer, "transport closed");
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Closes a [`TcpTransport`]'s socket from outside the thread using it.
#[derive(Debug)]
pub struct ShutdownHandle {
    stream: TcpStream,
}

impl ShutdownHandle {
    /// Shut down both directions of the socket.
    pub fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}
