use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use bytes::{BufMut, BytesMut};
use playerlink_client::control::{REQ_DATA_MODE, REQ_DEVICE_ACCESS};
use playerlink_client::{
    AccessMode, Client, ClientConfig, ClientError, DeliveryMode, DeviceAddr, MessageHeader,
    MessageKind, RawDevice, ReadEvent, Timestamp,
};
use playerlink_frame::{FrameReader, FrameWriter, Message};
use playerlink_transport::IoTransport;

const SONAR: DeviceAddr = DeviceAddr::new(5, 0);

/// Minimal server side of the protocol for driving a real socket.
struct FakeServer {
    transport: IoTransport<TcpStream>,
    reader: FrameReader,
    writer: FrameWriter,
}

impl FakeServer {
    fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().unwrap();
        let mut server = Self {
            transport: IoTransport::new(stream),
            reader: FrameReader::new(),
            writer: FrameWriter::new(),
        };
        let mut banner = b"Player v.2.0".to_vec();
        banner.resize(32, 0);
        playerlink_transport::write_full(server.transport.get_mut(), &banner).unwrap();
        server
    }

    fn recv(&mut self) -> Message {
        self.reader.read_message(&mut self.transport).unwrap()
    }

    fn send(&mut self, kind: MessageKind, addr: DeviceAddr, subtype: u16, body: &[u8]) {
        self.send_header(MessageHeader::new(kind, addr, subtype), body);
    }

    fn send_header(&mut self, header: MessageHeader, body: &[u8]) {
        self.writer.send(&mut self.transport, &header, body).unwrap();
    }

    fn ack(&mut self, request: &Message, body: &[u8]) {
        self.send(
            MessageKind::ResponseAck,
            request.header.addr,
            request.header.subtype,
            body,
        );
    }

    fn ack_access(&mut self, request: &Message, driver: &str) {
        // Echo the device and requested access back.
        let mut body = BytesMut::new();
        body.put_slice(&request.body[..5]);
        body.put_u32(driver.len() as u32);
        body.put_slice(driver.as_bytes());
        self.ack(request, &body);
    }
}

fn spawn_server<F>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(FakeServer) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || script(FakeServer::accept(&listener)));
    (port, handle)
}

#[test]
fn subscribe_write_read_unsubscribe() {
    let (port, server) = spawn_server(|mut server| {
        let mode = server.recv();
        assert_eq!(mode.header.kind, MessageKind::Request);
        assert_eq!(mode.header.subtype, REQ_DATA_MODE);
        assert_eq!(mode.body.as_ref(), &[0, 0, 0, 4]);
        server.ack(&mode, &[]);

        let subscribe = server.recv();
        assert_eq!(subscribe.header.addr, DeviceAddr::SERVER);
        assert_eq!(subscribe.header.subtype, REQ_DEVICE_ACCESS);
        assert_eq!(subscribe.body.as_ref(), &[0, 5, 0, 0, b'a', 0, 0, 0, 0]);
        server.ack_access(&subscribe, "p2os");

        let command = server.recv();
        assert_eq!(command.header.kind, MessageKind::Command);
        assert_eq!(command.header.addr, SONAR);
        assert_eq!(command.body.as_ref(), b"forward");

        for reading in [b"r1", b"r2"] {
            server.send(MessageKind::Data, SONAR, 1, reading);
        }
        server.send_header(
            MessageHeader {
                sample_time: Timestamp::new(100, 250_000),
                ..MessageHeader::new(MessageKind::Synch, DeviceAddr::SERVER, 0)
            },
            &[],
        );

        let unsubscribe = server.recv();
        assert_eq!(unsubscribe.body[4], b'c');
        server.ack_access(&unsubscribe, "p2os");
    });

    let mut client = Client::new();
    client.connect("127.0.0.1", port).unwrap();
    assert_eq!(client.delivery_mode(), DeliveryMode::PushAsync);

    let sonar = client
        .open_device(SONAR, AccessMode::All, RawDevice::new())
        .unwrap();
    assert_eq!(client.device(sonar).unwrap().driver_name(), "p2os");

    client.write(sonar, 1, b"forward").unwrap();

    let mut data_events = 0;
    loop {
        match client.read().unwrap() {
            ReadEvent::Data { handle } => {
                assert_eq!(handle, sonar);
                data_events += 1;
            }
            ReadEvent::Synch { sample_time } => {
                assert_eq!(sample_time, Timestamp::new(100, 250_000));
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(data_events, 2);
    let raw = client.handler::<RawDevice>(sonar).unwrap();
    assert_eq!(raw.data(), b"r2");
    assert_eq!(raw.data_count(), 2);

    client.close_device(sonar).unwrap();
    client.disconnect().unwrap();
    assert!(matches!(client.read(), Err(ClientError::NotConnected)));

    server.join().unwrap();
}

#[test]
fn data_interleaved_with_reply_is_delivered_after_it() {
    let (port, server) = spawn_server(|mut server| {
        let subscribe = server.recv();
        server.send(MessageKind::Data, SONAR, 1, b"early");
        server.ack_access(&subscribe, "p2os");
        // Keep the connection open until the client is done.
        let _ = server.reader.read_message(&mut server.transport);
    });

    let config = ClientConfig {
        handshake: playerlink_client::HandshakeConfig {
            initial_mode: None,
            ..Default::default()
        },
        ..ClientConfig::default()
    };
    let mut client = Client::with_config(config);
    client.connect("127.0.0.1", port).unwrap();

    let sonar = client.register(SONAR, RawDevice::new()).unwrap();
    client.subscribe(SONAR, AccessMode::Read).unwrap();
    assert_eq!(client.pending(), 1);
    assert!(client.peek(std::time::Duration::ZERO).unwrap());

    assert_eq!(client.read().unwrap(), ReadEvent::Data { handle: sonar });
    assert_eq!(client.handler::<RawDevice>(sonar).unwrap().data(), b"early");

    client.disconnect().unwrap();
    server.join().unwrap();
}

#[test]
fn shutdown_handle_unblocks_read() {
    let (port, server) = spawn_server(|mut server| {
        let mode = server.recv();
        server.ack(&mode, &[]);
        // Never send data; wait for the client to go away.
        let _ = server.reader.read_message(&mut server.transport);
    });

    let mut client = Client::new();
    client.connect("127.0.0.1", port).unwrap();
    let handle = client.shutdown_handle().unwrap();

    let reader = thread::spawn(move || {
        let result = client.read();
        (result.map(|_| ()), client.is_connected())
    });

    thread::sleep(std::time::Duration::from_millis(50));
    handle.shutdown().unwrap();

    let (result, connected) = reader.join().unwrap();
    let err = result.unwrap_err();
    assert!(err.is_fatal());
    assert!(!connected);

    server.join().unwrap();
}
