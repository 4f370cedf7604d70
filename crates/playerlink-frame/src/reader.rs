use bytes::{Bytes, BytesMut};
use playerlink_transport::Transport;
use tracing::{trace, warn};

use crate::codec::{decode_header, FrameConfig, Message, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete messages from a [`Transport`].
///
/// The reader does not own the transport, so the same connection can be
/// shared with a [`FrameWriter`](crate::FrameWriter).
#[derive(Debug, Default)]
pub struct FrameReader {
    config: FrameConfig,
}

impl FrameReader {
    /// Create a new reader with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Read the next complete message (blocking).
    ///
    /// A header whose body exceeds the maximum size fails with
    /// [`FrameError::BodyTooLarge`] before the body is read; the stream is
    /// no longer aligned afterwards. A header with a bad sync word has its
    /// body consumed and then fails with [`FrameError::InvalidSync`], which
    /// leaves the stream at the next header.
    pub fn read_message<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Message> {
        let mut raw = [0u8; HEADER_SIZE];
        transport.read_full(&mut raw)?;
        let header = decode_header(&raw);

        let size = header.size as usize;
        if size > self.config.max_message_size {
            return Err(FrameError::BodyTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }

        let body = if size == 0 {
            Bytes::new()
        } else {
            let mut buf = BytesMut::zeroed(size);
            transport.read_full(&mut buf)?;
            buf.freeze()
        };

        if !header.has_valid_sync() {
            warn!(
                found = header.sync,
                size, "discarding message with invalid sync word"
            );
            return Err(FrameError::InvalidSync {
                found: header.sync,
                header,
            });
        }

        trace!(
            kind = %header.kind,
            subtype = header.subtype,
            device_type = header.addr.device_type,
            device_index = header.addr.index,
            size,
            "received message"
        );
        Ok(Message { header, body })
    }

    /// Update maximum body size for subsequent reads.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.config.max_message_size = max_message_size;
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};

    use bytes::{BufMut, BytesMut};
    use playerlink_transport::{IoTransport, TransportError};

    use super::*;
    use crate::codec::{encode_header, encode_message, DeviceAddr, MessageHeader};
    use crate::kind::MessageKind;

    fn wire(messages: &[(MessageKind, u16, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (kind, subtype, body) in messages {
            let header = MessageHeader::new(*kind, DeviceAddr::new(5, 0), *subtype);
            encode_message(&header, body, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    struct ByteByByte {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByte {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    impl Write for ByteByByte {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_multiple_messages() {
        let bytes = wire(&[
            (MessageKind::Data, 1, b"one"),
            (MessageKind::Synch, 0, b""),
            (MessageKind::ResponseAck, 3, b"three"),
        ]);
        let mut transport = IoTransport::new(Cursor::new(bytes));
        let mut reader = FrameReader::new();

        let first = reader.read_message(&mut transport).unwrap();
        assert_eq!(first.header.kind, MessageKind::Data);
        assert_eq!(first.body.as_ref(), b"one");

        let second = reader.read_message(&mut transport).unwrap();
        assert_eq!(second.header.kind, MessageKind::Synch);
        assert!(second.body.is_empty());

        let third = reader.read_message(&mut transport).unwrap();
        assert_eq!(third.header.subtype, 3);
        assert_eq!(third.body.as_ref(), b"three");
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[(MessageKind::Data, 2, b"slow")]);
        let mut transport = IoTransport::new(ByteByByte { bytes, pos: 0 });

        let message = FrameReader::new().read_message(&mut transport).unwrap();
        assert_eq!(message.header.subtype, 2);
        assert_eq!(message.body.as_ref(), b"slow");
    }

    #[test]
    fn invalid_sync_consumes_body_and_keeps_stream_aligned() {
        let mut buf = BytesMut::new();
        let bad = MessageHeader {
            sync: 0x1234,
            size: 4,
            ..MessageHeader::new(MessageKind::Data, DeviceAddr::new(5, 0), 1)
        };
        encode_header(&bad, &mut buf);
        buf.put_slice(b"junk");
        buf.extend_from_slice(&wire(&[(MessageKind::Data, 1, b"good")]));

        let mut transport = IoTransport::new(Cursor::new(buf.to_vec()));
        let mut reader = FrameReader::new();

        let err = reader.read_message(&mut transport).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, FrameError::InvalidSync { found: 0x1234, .. }));

        let next = reader.read_message(&mut transport).unwrap();
        assert_eq!(next.body.as_ref(), b"good");
    }

    #[test]
    fn body_over_limit_is_rejected_before_reading() {
        let bytes = wire(&[(MessageKind::Data, 1, &[0u8; 64])]);
        let mut transport = IoTransport::new(Cursor::new(bytes));
        let mut reader = FrameReader::with_config(FrameConfig {
            max_message_size: 16,
        });

        let err = reader.read_message(&mut transport).unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { size: 64, max: 16 }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn set_max_message_size_applies_to_next_read() {
        let bytes = wire(&[(MessageKind::Data, 1, &[7u8; 32])]);
        let mut transport = IoTransport::new(Cursor::new(bytes));
        let mut reader = FrameReader::with_config(FrameConfig {
            max_message_size: 8,
        });
        reader.set_max_message_size(32);
        assert_eq!(reader.config().max_message_size, 32);

        let message = reader.read_message(&mut transport).unwrap();
        assert_eq!(message.body.len(), 32);
    }

    #[test]
    fn connection_closed_mid_header() {
        let mut transport = IoTransport::new(Cursor::new(vec![0x58, 0x78, 0x00]));
        let err = FrameReader::new().read_message(&mut transport).unwrap_err();
        assert!(matches!(err, FrameError::Transport(TransportError::Closed)));
    }

    #[test]
    fn connection_closed_mid_body() {
        let mut bytes = wire(&[(MessageKind::Data, 1, b"truncated")]);
        bytes.truncate(bytes.len() - 3);
        let mut transport = IoTransport::new(Cursor::new(bytes));

        let err = FrameReader::new().read_message(&mut transport).unwrap_err();
        assert!(matches!(err, FrameError::Transport(TransportError::Closed)));
    }
}
