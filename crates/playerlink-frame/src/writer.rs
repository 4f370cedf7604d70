use bytes::BytesMut;
use playerlink_transport::Transport;
use tracing::trace;

use crate::codec::{encode_message, FrameConfig, MessageHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Encodes and sends complete messages over a [`Transport`].
///
/// Each message is encoded into one buffer and handed to the transport in a
/// single `write_full`, so a header is never sent without its body.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
    config: FrameConfig,
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::with_config(FrameConfig::default())
    }
}

impl FrameWriter {
    /// Create a new writer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new writer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode `header` and `body` and send them (blocking).
    ///
    /// The header's size field is taken from `body`.
    pub fn send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<()> {
        if body.len() > self.config.max_message_size {
            return Err(FrameError::BodyTooLarge {
                size: body.len(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        self.buf.reserve(HEADER_SIZE + body.len());
        encode_message(header, body, &mut self.buf)?;
        transport.write_full(&self.buf)?;

        trace!(
            kind = %header.kind,
            subtype = header.subtype,
            device_type = header.addr.device_type,
            device_index = header.addr.index,
            size = body.len(),
            "sent message"
        );
        Ok(())
    }

    /// Update maximum body size for subsequent writes.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.config.max_message_size = max_message_size;
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use playerlink_transport::{IoTransport, TransportError};

    use super::*;
    use crate::codec::{decode_header, DeviceAddr, SYNC_WORD};
    use crate::kind::MessageKind;
    use crate::reader::FrameReader;

    /// Counts write_full calls and records the bytes.
    #[derive(Default)]
    struct RecordingTransport {
        writes: Vec<Vec<u8>>,
    }

    impl Transport for RecordingTransport {
        fn read_full(&mut self, _buf: &mut [u8]) -> playerlink_transport::Result<()> {
            Err(TransportError::Closed)
        }

        fn write_full(&mut self, buf: &[u8]) -> playerlink_transport::Result<()> {
            self.writes.push(buf.to_vec());
            Ok(())
        }

        fn transport_name(&self) -> &'static str {
            "recording"
        }
    }

    #[test]
    fn send_writes_header_and_body_in_one_call() {
        let mut transport = RecordingTransport::default();
        let mut writer = FrameWriter::new();
        let header = MessageHeader::new(MessageKind::Command, DeviceAddr::new(4, 1), 1);

        writer.send(&mut transport, &header, b"speed").unwrap();

        assert_eq!(transport.writes.len(), 1);
        let sent = &transport.writes[0];
        assert_eq!(sent.len(), HEADER_SIZE + 5);

        let raw: [u8; HEADER_SIZE] = sent[..HEADER_SIZE].try_into().unwrap();
        let decoded = decode_header(&raw);
        assert_eq!(decoded.sync, SYNC_WORD);
        assert_eq!(decoded.kind, MessageKind::Command);
        assert_eq!(decoded.addr, DeviceAddr::new(4, 1));
        assert_eq!(decoded.size, 5);
        assert_eq!(&sent[HEADER_SIZE..], b"speed");
    }

    #[test]
    fn send_overrides_stale_size_field() {
        let mut transport = RecordingTransport::default();
        let header = MessageHeader {
            size: 9999,
            ..MessageHeader::new(MessageKind::Request, DeviceAddr::SERVER, 5)
        };

        FrameWriter::new()
            .send(&mut transport, &header, &[0, 0, 0, 4])
            .unwrap();

        let raw: [u8; HEADER_SIZE] = transport.writes[0][..HEADER_SIZE].try_into().unwrap();
        assert_eq!(decode_header(&raw).size, 4);
    }

    #[test]
    fn send_rejects_oversized_body() {
        let mut transport = RecordingTransport::default();
        let mut writer = FrameWriter::with_config(FrameConfig {
            max_message_size: 4,
        });
        let header = MessageHeader::new(MessageKind::Command, DeviceAddr::new(4, 0), 1);

        let err = writer.send(&mut transport, &header, b"too long").unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { size: 8, max: 4 }));
        assert!(transport.writes.is_empty());
    }

    #[test]
    fn written_messages_read_back() {
        let mut transport = IoTransport::new(Cursor::new(Vec::new()));
        let mut writer = FrameWriter::new();
        let data = MessageHeader::new(MessageKind::Data, DeviceAddr::new(5, 0), 1);
        let synch = MessageHeader::new(MessageKind::Synch, DeviceAddr::SERVER, 0);
        writer.send(&mut transport, &data, b"ranges").unwrap();
        writer.send(&mut transport, &synch, b"").unwrap();

        let bytes = transport.into_inner().into_inner();
        let mut transport = IoTransport::new(Cursor::new(bytes));
        let mut reader = FrameReader::new();

        let first = reader.read_message(&mut transport).unwrap();
        assert_eq!(first.header.kind, MessageKind::Data);
        assert_eq!(first.body.as_ref(), b"ranges");
        let second = reader.read_message(&mut transport).unwrap();
        assert_eq!(second.header.kind, MessageKind::Synch);
    }

    #[test]
    fn transport_failure_propagates() {
        struct Broken;
        impl Transport for Broken {
            fn read_full(&mut self, _buf: &mut [u8]) -> playerlink_transport::Result<()> {
                Err(TransportError::Closed)
            }
            fn write_full(&mut self, _buf: &[u8]) -> playerlink_transport::Result<()> {
                Err(TransportError::Closed)
            }
            fn transport_name(&self) -> &'static str {
                "broken"
            }
        }

        let header = MessageHeader::new(MessageKind::Command, DeviceAddr::new(4, 0), 1);
        let err = FrameWriter::new().send(&mut Broken, &header, b"x").unwrap_err();
        assert!(matches!(err, FrameError::Transport(TransportError::Closed)));
    }
}
