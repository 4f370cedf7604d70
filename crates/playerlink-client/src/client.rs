use std::time::Duration;

use bytes::Bytes;
use playerlink_frame::{
    DeviceAddr, FrameConfig, FrameError, FrameReader, FrameWriter, Message, MessageHeader,
    MessageKind, Timestamp,
};
use playerlink_transport::{ShutdownHandle, TcpTransport, Transport, TransportConfig};
use tracing::{debug, error, info, trace, warn};

use crate::control::{
    decode_access_reply, decode_device_list, decode_driver_info_reply, encode_access_request,
    encode_auth_request, encode_driver_info_request, encode_u32, AccessMode, DeliveryMode,
    DeviceInfo, REQ_AUTH, REQ_DATA, REQ_DATA_FREQ, REQ_DATA_MODE, REQ_DEVICE_ACCESS,
    REQ_DEVICE_LIST, REQ_DRIVER_INFO,
};
use crate::error::{ClientError, Result};
use crate::handshake::{read_banner, Banner, HandshakeConfig};
use crate::queue::{PendingQueue, DEFAULT_QUEUE_CAPACITY};
use crate::registry::{
    CallbackId, DeviceHandle, DeviceHandler, DeviceRecord, DeviceRegistry, DEFAULT_MAX_CALLBACKS,
};

/// Default number of messages a request reads while waiting for its reply.
pub const DEFAULT_REQUEST_ITERATION_LIMIT: usize = 1000;

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket options, used by [`Client::connect`].
    pub transport: TransportConfig,
    /// Message size limit.
    pub frame: FrameConfig,
    /// Banner length and initial delivery mode.
    pub handshake: HandshakeConfig,
    /// Messages held while a request is in flight before the oldest is dropped.
    pub queue_capacity: usize,
    /// Messages a request reads before giving up on its reply.
    pub request_iteration_limit: usize,
    /// Callbacks allowed per device.
    pub max_callbacks: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            frame: FrameConfig::default(),
            handshake: HandshakeConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_iteration_limit: DEFAULT_REQUEST_ITERATION_LIMIT,
            max_callbacks: DEFAULT_MAX_CALLBACKS,
        }
    }
}

/// What a single [`Client::read`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// End of a data round.
    Synch { sample_time: Timestamp },
    /// DATA was dispatched to a registered device.
    Data { handle: DeviceHandle },
    /// DATA arrived for an address with no registered device.
    Unrouted { addr: DeviceAddr },
    /// A message that has no place in the read path was dropped.
    Discarded { kind: MessageKind },
}

enum Incoming {
    Message(Message),
    Corrupt(MessageHeader),
}

/// A connection to a Player server plus the devices registered on it.
///
/// All operations block and must be called from one thread at a time.
/// Wrap the client in a `Mutex` to share it.
#[derive(Debug)]
pub struct Client<T = TcpTransport> {
    transport: Option<T>,
    reader: FrameReader,
    writer: FrameWriter,
    queue: PendingQueue,
    registry: DeviceRegistry,
    config: ClientConfig,
    mode: DeliveryMode,
    banner: Option<Banner>,
    data_time: Timestamp,
    last_time: Timestamp,
    device_infos: Vec<DeviceInfo>,
    /// Data-round requests sent by `read` whose ACK has not been seen.
    unacked_rounds: usize,
    /// A data round was requested and its SYNCH has not arrived yet.
    round_open: bool,
}

impl Client<TcpTransport> {
    /// An unconnected TCP client with default configuration.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// An unconnected TCP client.
    pub fn with_config(config: ClientConfig) -> Self {
        Self::for_transport(config)
    }

    /// Connect to `host:port`, read the banner and negotiate the initial
    /// delivery mode.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let transport = TcpTransport::connect(host, port, &self.config.transport)?;
        self.connect_with(transport)
    }

    /// A handle that closes the socket from another thread, unblocking a
    /// pending [`read`](Self::read) with a transport error.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let transport = self.transport.as_ref().ok_or(ClientError::NotConnected)?;
        Ok(transport.shutdown_handle()?)
    }
}

impl Default for Client<TcpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Client<T> {
    /// An unconnected client for any transport type.
    pub fn for_transport(config: ClientConfig) -> Self {
        Self {
            transport: None,
            reader: FrameReader::with_config(config.frame.clone()),
            writer: FrameWriter::with_config(config.frame.clone()),
            queue: PendingQueue::new(config.queue_capacity),
            registry: DeviceRegistry::new(config.max_callbacks),
            config,
            mode: DeliveryMode::PushNew,
            banner: None,
            data_time: Timestamp::ZERO,
            last_time: Timestamp::ZERO,
            device_infos: Vec::new(),
            unacked_rounds: 0,
            round_open: false,
        }
    }

    /// Take over a connected transport: read the banner, then negotiate
    /// the initial delivery mode. Any existing connection is closed first.
    pub fn connect_with(&mut self, mut transport: T) -> Result<()> {
        if self.transport.is_some() {
            debug!("replacing existing connection");
            self.disconnect()?;
        }

        self.mode = DeliveryMode::PushNew;
        self.data_time = Timestamp::ZERO;
        self.last_time = Timestamp::ZERO;
        self.reset_rounds();

        let banner = match read_banner(&mut transport, &self.config.handshake) {
            Ok(banner) => banner,
            Err(err) => {
                let _ = transport.close();
                return Err(err);
            }
        };
        self.banner = Some(banner);
        self.transport = Some(transport);

        if let Some(mode) = self.config.handshake.initial_mode {
            if let Err(err) = self.set_delivery_mode(mode) {
                error!(error = %err, %mode, "unable to set initial delivery mode");
                self.drop_transport();
                return Err(err);
            }
        }

        info!(mode = %self.mode, "client connected");
        Ok(())
    }

    /// Close the connection. Registered devices stay registered but are
    /// marked closed. Calling this while disconnected does nothing.
    pub fn disconnect(&mut self) -> Result<()> {
        self.queue.clear();
        self.reset_rounds();
        self.registry.close_all();
        self.banner = None;
        match self.transport.take() {
            Some(mut transport) => {
                transport.close()?;
                info!("client disconnected");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Process one message.
    ///
    /// Queued messages are replayed first without touching the socket. In
    /// pull modes a data-round request is sent before reading, unless the
    /// previous round has not ended with a SYNCH yet.
    pub fn read(&mut self) -> Result<ReadEvent> {
        if self.transport.is_none() {
            return Err(ClientError::NotConnected);
        }

        let message = match self.queue.pop() {
            Some(message) => {
                trace!(remaining = self.queue.len(), "replaying queued message");
                message
            }
            None => {
                if self.mode.is_pull() && !self.round_open {
                    let header = request_header(DeviceAddr::SERVER, REQ_DATA);
                    self.send(&header, &[])?;
                    self.unacked_rounds += 1;
                    self.round_open = true;
                }
                match self.receive()? {
                    Incoming::Message(message) => message,
                    Incoming::Corrupt(header) => {
                        return Ok(ReadEvent::Discarded { kind: header.kind })
                    }
                }
            }
        };

        Ok(self.route(message))
    }

    /// Whether a [`read`](Self::read) would find a message: either one is
    /// queued or the socket becomes readable within `timeout`.
    pub fn peek(&mut self, timeout: Duration) -> Result<bool> {
        let transport = self.transport.as_mut().ok_or(ClientError::NotConnected)?;
        if !self.queue.is_empty() {
            return Ok(true);
        }
        match transport.poll_readable(timeout) {
            Ok(ready) => Ok(ready),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Send a command to a device. No reply is expected.
    pub fn write(&mut self, handle: DeviceHandle, subtype: u16, payload: &[u8]) -> Result<()> {
        if self.transport.is_none() {
            return Err(ClientError::NotConnected);
        }
        let record = self
            .registry
            .get(handle)
            .ok_or(ClientError::UnknownDevice(handle))?;
        if !record.access().can_write() {
            return Err(ClientError::AccessDenied {
                addr: record.addr(),
                access: record.access(),
            });
        }

        let now = Timestamp::now();
        let header = MessageHeader {
            send_time: now,
            sample_time: now,
            ..MessageHeader::new(MessageKind::Command, record.addr(), subtype)
        };
        self.send(&header, payload)
    }

    /// Send a request and wait for its reply body.
    ///
    /// `device` of `None` addresses the server itself.
    pub fn request(
        &mut self,
        device: Option<DeviceHandle>,
        subtype: u16,
        payload: &[u8],
    ) -> Result<Bytes> {
        let addr = self.resolve(device)?;
        self.request_addr(addr, subtype, payload)
    }

    /// Like [`request`](Self::request), copying at most `reply.len()` bytes
    /// of the reply into `reply`. Returns the number of bytes copied.
    pub fn request_into(
        &mut self,
        device: Option<DeviceHandle>,
        subtype: u16,
        payload: &[u8],
        reply: &mut [u8],
    ) -> Result<usize> {
        let body = self.request(device, subtype, payload)?;
        let len = body.len().min(reply.len());
        reply[..len].copy_from_slice(&body[..len]);
        Ok(len)
    }

    /// Send a request to an arbitrary address, registered or not.
    pub fn request_addr(
        &mut self,
        addr: DeviceAddr,
        subtype: u16,
        payload: &[u8],
    ) -> Result<Bytes> {
        self.transact(addr, subtype, payload).map(|reply| reply.body)
    }

    /// Request a device's geometry and hand the reply to its geometry handler.
    pub fn request_geometry(
        &mut self,
        handle: DeviceHandle,
        subtype: u16,
        payload: &[u8],
    ) -> Result<()> {
        let addr = self.resolve(Some(handle))?;
        let reply = self.transact(addr, subtype, payload)?;
        self.registry
            .dispatch_geometry(handle, &reply.header, &reply.body)
    }

    /// Request a device's configuration and hand the reply to its config handler.
    pub fn request_config(
        &mut self,
        handle: DeviceHandle,
        subtype: u16,
        payload: &[u8],
    ) -> Result<()> {
        let addr = self.resolve(Some(handle))?;
        let reply = self.transact(addr, subtype, payload)?;
        self.registry.dispatch_config(handle, &reply.header, &reply.body)
    }

    pub fn set_delivery_mode(&mut self, mode: DeliveryMode) -> Result<()> {
        self.transact(DeviceAddr::SERVER, REQ_DATA_MODE, &encode_u32(mode.code()))?;
        self.mode = mode;
        debug!(%mode, "delivery mode set");
        Ok(())
    }

    /// Delivery mode last acknowledged by the server.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn set_update_frequency(&mut self, hz: u32) -> Result<()> {
        self.transact(DeviceAddr::SERVER, REQ_DATA_FREQ, &encode_u32(hz))?;
        debug!(hz, "update frequency set");
        Ok(())
    }

    /// Ask for one round of data and wait for the acknowledgement.
    pub fn request_data(&mut self) -> Result<()> {
        self.transact(DeviceAddr::SERVER, REQ_DATA, &[])?;
        Ok(())
    }

    /// Request `access` to the device at `addr`. Returns the driver name.
    ///
    /// If the device is registered its record takes the granted access,
    /// even when that differs from the request.
    pub fn subscribe(&mut self, addr: DeviceAddr, access: AccessMode) -> Result<String> {
        let body = encode_access_request(addr, access);
        let reply = self.transact(DeviceAddr::SERVER, REQ_DEVICE_ACCESS, &body)?;
        let reply = decode_access_reply(&reply.body)?;
        if reply.addr != addr {
            return Err(ClientError::MalformedReply {
                subtype: REQ_DEVICE_ACCESS,
                reason: format!("access reply names {} instead of {addr}", reply.addr),
            });
        }

        if let Some(record) = self.registry.lookup_mut(addr) {
            record.set_subscription(reply.granted, reply.driver_name.clone());
        }

        if reply.granted != access {
            warn!(
                device = %addr,
                requested = %access,
                granted = %reply.granted,
                "server granted different access"
            );
            return Err(ClientError::AccessMismatch {
                addr,
                requested: access,
                granted: reply.granted,
                driver_name: reply.driver_name,
            });
        }

        info!(device = %addr, %access, driver = %reply.driver_name, "device access changed");
        Ok(reply.driver_name)
    }

    /// Close access to the device at `addr`. The device stays registered.
    pub fn unsubscribe(&mut self, addr: DeviceAddr) -> Result<()> {
        self.subscribe(addr, AccessMode::Close).map(|_| ())
    }

    /// Register a device and subscribe to it. The device is deregistered
    /// again if the subscription fails, and access the server granted
    /// anyway is closed.
    pub fn open_device<H: DeviceHandler>(
        &mut self,
        addr: DeviceAddr,
        access: AccessMode,
        handler: H,
    ) -> Result<DeviceHandle> {
        if self.transport.is_none() {
            return Err(ClientError::NotConnected);
        }
        let handle = self.registry.register(addr, handler)?;
        if let Err(err) = self.subscribe(addr, access) {
            if let ClientError::AccessMismatch { granted, .. } = &err {
                // The server holds a subscription; release it with the proxy.
                if !matches!(granted, AccessMode::Close | AccessMode::Error) {
                    if let Err(close_err) = self.unsubscribe(addr) {
                        warn!(
                            device = %addr,
                            error = %close_err,
                            "unable to release mismatched access"
                        );
                    }
                }
            }
            self.registry.deregister(handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// Unsubscribe from a device and deregister it. The device is
    /// deregistered even if the unsubscribe fails.
    pub fn close_device(&mut self, handle: DeviceHandle) -> Result<()> {
        let addr = self.resolve(Some(handle))?;
        let result = self.unsubscribe(addr);
        self.registry.deregister(handle);
        result
    }

    /// Fetch the server's device list, with driver names.
    pub fn get_device_list(&mut self) -> Result<&[DeviceInfo]> {
        let reply = self.transact(DeviceAddr::SERVER, REQ_DEVICE_LIST, &[])?;
        let addrs = decode_device_list(&reply.body)?;

        let mut infos = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let driver_name = self.get_driver_info(addr)?;
            infos.push(DeviceInfo { addr, driver_name });
        }
        self.device_infos = infos;
        Ok(&self.device_infos)
    }

    /// Device list from the last [`get_device_list`](Self::get_device_list).
    pub fn device_infos(&self) -> &[DeviceInfo] {
        &self.device_infos
    }

    /// Name of the driver behind the device at `addr`.
    pub fn get_driver_info(&mut self, addr: DeviceAddr) -> Result<String> {
        let reply = self.transact(
            DeviceAddr::SERVER,
            REQ_DRIVER_INFO,
            &encode_driver_info_request(addr),
        )?;
        Ok(decode_driver_info_reply(&reply.body)?.driver_name)
    }

    /// Present an authentication key to the server.
    pub fn authenticate(&mut self, key: &[u8]) -> Result<()> {
        self.transact(DeviceAddr::SERVER, REQ_AUTH, &encode_auth_request(key))?;
        debug!(key_len = key.len(), "authenticated");
        Ok(())
    }

    /// Register a device without subscribing.
    pub fn register<H: DeviceHandler>(
        &mut self,
        addr: DeviceAddr,
        handler: H,
    ) -> Result<DeviceHandle> {
        self.registry.register(addr, handler)
    }

    /// Remove a device. Returns false if it was not registered.
    pub fn deregister(&mut self, handle: DeviceHandle) -> bool {
        self.registry.deregister(handle)
    }

    pub fn add_callback<F>(&mut self, handle: DeviceHandle, callback: F) -> Result<CallbackId>
    where
        F: FnMut(&MessageHeader) + Send + 'static,
    {
        self.registry.add_callback(handle, callback)
    }

    pub fn remove_callback(&mut self, handle: DeviceHandle, id: CallbackId) -> bool {
        self.registry.remove_callback(handle, id)
    }

    pub fn device(&self, handle: DeviceHandle) -> Option<&DeviceRecord> {
        self.registry.get(handle)
    }

    pub fn device_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceRecord> {
        self.registry.get_mut(handle)
    }

    /// Typed access to a device's handler.
    pub fn handler<H: DeviceHandler>(&self, handle: DeviceHandle) -> Option<&H> {
        self.registry.handler(handle)
    }

    pub fn handler_mut<H: DeviceHandler>(&mut self, handle: DeviceHandle) -> Option<&mut H> {
        self.registry.handler_mut(handle)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    /// Sample time carried by the most recent SYNCH.
    pub fn data_time(&self) -> Timestamp {
        self.data_time
    }

    /// Sample time carried by the SYNCH before that.
    pub fn last_time(&self) -> Timestamp {
        self.last_time
    }

    /// Number of queued messages waiting to be read.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Send a request and wait for the reply that answers it.
    ///
    /// DATA and SYNCH messages read meanwhile are queued for `read`. The
    /// wait is bounded by `request_iteration_limit` messages.
    fn transact(&mut self, addr: DeviceAddr, subtype: u16, payload: &[u8]) -> Result<Message> {
        if self.transport.is_none() {
            return Err(ClientError::NotConnected);
        }

        let request = request_header(addr, subtype);
        self.send(&request, payload)?;
        debug!(device = %addr, subtype, size = payload.len(), "request sent");

        let limit = self.config.request_iteration_limit;
        for _ in 0..limit {
            let message = match self.receive()? {
                Incoming::Message(message) => message,
                Incoming::Corrupt(_) => continue,
            };
            let header = message.header;

            if self.settle_round_reply(&header) {
                trace!(device = %addr, subtype, "skipping reply to earlier data round");
                continue;
            }

            match header.kind {
                MessageKind::Data | MessageKind::Synch => self.enqueue(message),
                kind if kind.is_response() && !header.correlates_with(&request) => {
                    let err = ClientError::ProtocolMismatch {
                        expected_addr: addr,
                        expected_subtype: subtype,
                        got_addr: header.addr,
                        got_subtype: header.subtype,
                    };
                    return Err(self.fail(err));
                }
                MessageKind::ResponseAck => {
                    trace!(
                        device = %addr,
                        subtype,
                        size = message.body.len(),
                        "request acknowledged"
                    );
                    return Ok(message);
                }
                MessageKind::ResponseNack => {
                    warn!(device = %addr, subtype, "request rejected");
                    return Err(ClientError::RequestRejected { addr, subtype });
                }
                MessageKind::ResponseError => {
                    warn!(device = %addr, subtype, "server error");
                    return Err(ClientError::ServerError { addr, subtype });
                }
                kind => {
                    warn!(%kind, device = %header.addr, "unexpected message while awaiting reply");
                }
            }
        }

        warn!(device = %addr, subtype, iterations = limit, "timed out waiting for reply");
        Err(ClientError::RequestTimeout { iterations: limit })
    }

    fn enqueue(&mut self, message: Message) {
        if let Some(dropped) = self.queue.push(message) {
            warn!(
                dropped = %dropped.header.kind,
                device = %dropped.header.addr,
                capacity = self.queue.capacity(),
                "queue overflow; discarding oldest message"
            );
        }
    }

    fn route(&mut self, message: Message) -> ReadEvent {
        let header = message.header;
        match header.kind {
            MessageKind::Synch => {
                self.round_open = false;
                self.last_time = self.data_time;
                self.data_time = header.sample_time;
                trace!(sample_time = header.sample_time.as_secs_f64(), "end of data round");
                ReadEvent::Synch {
                    sample_time: header.sample_time,
                }
            }
            MessageKind::Data => match self.registry.dispatch(&header, &message.body) {
                Some(handle) => ReadEvent::Data { handle },
                None => ReadEvent::Unrouted { addr: header.addr },
            },
            kind if self.settle_round_reply(&header) => {
                trace!(%kind, "data round answered");
                ReadEvent::Discarded { kind }
            }
            kind => {
                warn!(
                    %kind,
                    device = %header.addr,
                    subtype = header.subtype,
                    "unexpected message; discarding"
                );
                ReadEvent::Discarded { kind }
            }
        }
    }

    /// Account for a reply to a data round that `read` requested without
    /// waiting. Returns true when `header` was such a reply.
    fn settle_round_reply(&mut self, header: &MessageHeader) -> bool {
        let is_round_reply = header.kind.is_response()
            && header.addr == DeviceAddr::SERVER
            && header.subtype == REQ_DATA;
        if !is_round_reply || self.unacked_rounds == 0 {
            return false;
        }
        self.unacked_rounds -= 1;
        if header.kind != MessageKind::ResponseAck {
            // A refused round never ends in a SYNCH.
            warn!(kind = %header.kind, "data round refused");
            self.round_open = false;
        }
        true
    }

    fn reset_rounds(&mut self) {
        self.unacked_rounds = 0;
        self.round_open = false;
    }

    fn receive(&mut self) -> Result<Incoming> {
        let transport = self.transport.as_mut().ok_or(ClientError::NotConnected)?;
        match self.reader.read_message(transport) {
            Ok(message) => Ok(Incoming::Message(message)),
            Err(FrameError::InvalidSync { header, .. }) => Ok(Incoming::Corrupt(header)),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn send(&mut self, header: &MessageHeader, payload: &[u8]) -> Result<()> {
        let max = self.writer.config().max_message_size;
        if payload.len() > max {
            return Err(ClientError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let transport = self.transport.as_mut().ok_or(ClientError::NotConnected)?;
        match self.writer.send(transport, header, payload) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn resolve(&self, device: Option<DeviceHandle>) -> Result<DeviceAddr> {
        match device {
            None => Ok(DeviceAddr::SERVER),
            Some(handle) => self
                .registry
                .get(handle)
                .map(DeviceRecord::addr)
                .ok_or(ClientError::UnknownDevice(handle)),
        }
    }

    /// Tear the connection down if `err` is fatal, then hand it back.
    fn fail(&mut self, err: ClientError) -> ClientError {
        if err.is_fatal() && self.transport.is_some() {
            error!(error = %err, "connection lost");
            self.drop_transport();
        }
        err
    }

    fn drop_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close();
        }
        self.queue.clear();
        self.registry.close_all();
        self.reset_rounds();
    }
}

fn request_header(addr: DeviceAddr, subtype: u16) -> MessageHeader {
    MessageHeader {
        send_time: Timestamp::now(),
        ..MessageHeader::new(MessageKind::Request, addr, subtype)
    }
}
