use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// A connected byte pipe to a Player server.
///
/// Implementations must treat every I/O failure, including an orderly
/// remote close, as a hard error. Retrying is the caller's business.
pub trait Transport {
    /// Block until `buf` is completely filled.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Block until all of `buf` has been sent.
    fn write_full(&mut self, buf: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for readable data without consuming it.
    ///
    /// Transports that cannot tell report `true`, so callers fall through
    /// to a blocking read.
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        let _ = timeout;
        Ok(true)
    }

    /// Release the underlying connection. Calling it twice is harmless.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_full(buf)
    }

    fn write_full(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_full(buf)
    }

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Fill `buf` from `reader`, looping over short reads.
///
/// A zero-byte read means the peer closed the stream and is reported as
/// [`TransportError::Closed`]. Interrupted reads are retried.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match reader.read(&mut buf[offset..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => return Err(TransportError::TimedOut),
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok(())
}

/// Send all of `buf` to `writer`, looping over short writes.
pub fn write_full<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match writer.write(&buf[offset..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => return Err(TransportError::TimedOut),
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

pub(crate) fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Adapts any `Read + Write` stream into a [`Transport`].
///
/// Useful for in-memory pipes and for driving the protocol over streams
/// that are not TCP sockets.
#[derive(Debug)]
pub struct IoTransport<S> {
    inner: S,
}

impl<S> IoTransport<S> {
    /// Wrap a stream.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read + Write> Transport for IoTransport<S> {
    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        read_full(&mut self.inner, buf)
    }

    fn write_full(&mut self, buf: &[u8]) -> Result<()> {
        write_full(&mut self.inner, buf)
    }

    fn transport_name(&self) -> &'static str {
        "io-stream"
    }
}
