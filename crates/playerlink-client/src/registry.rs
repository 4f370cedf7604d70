//! Registered device proxies and message dispatch.

use std::any::Any;
use std::fmt;

use playerlink_frame::{DeviceAddr, MessageHeader, Timestamp};
use tracing::{debug, trace, warn};

use crate::control::AccessMode;
use crate::error::{ClientError, Result};

/// Default number of callbacks a device may carry.
pub const DEFAULT_MAX_CALLBACKS: usize = 4;

/// Decodes payloads for one device.
///
/// Only data payloads are required; geometry and config replies are
/// ignored unless the device type overrides the corresponding method.
pub trait DeviceHandler: Any + Send {
    /// Handle a DATA message addressed at this device.
    fn handle_data(&mut self, header: &MessageHeader, body: &[u8]);

    /// Handle the reply to a geometry request.
    fn handle_geometry(&mut self, header: &MessageHeader, body: &[u8]) {
        let _ = (header, body);
    }

    /// Handle the reply to a config request.
    fn handle_config(&mut self, header: &MessageHeader, body: &[u8]) {
        let _ = (header, body);
    }
}

impl<F> DeviceHandler for F
where
    F: FnMut(&MessageHeader, &[u8]) + Send + 'static,
{
    fn handle_data(&mut self, header: &MessageHeader, body: &[u8]) {
        self(header, body)
    }
}

/// Stable identifier of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a callback attached to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Invoked after a device's handler has consumed a DATA message.
pub type Callback = Box<dyn FnMut(&MessageHeader) + Send>;

/// Registration record for one device.
pub struct DeviceRecord {
    handle: DeviceHandle,
    addr: DeviceAddr,
    access: AccessMode,
    driver_name: String,
    data_time: Timestamp,
    last_time: Timestamp,
    fresh: bool,
    fresh_geometry: bool,
    fresh_config: bool,
    handler: Box<dyn DeviceHandler>,
    callbacks: Vec<(CallbackId, Callback)>,
}

impl DeviceRecord {
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn addr(&self) -> DeviceAddr {
        self.addr
    }

    /// Access granted by the server, `Close` until subscribed.
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Driver name reported when the device was subscribed.
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Sample time of the most recent data.
    pub fn data_time(&self) -> Timestamp {
        self.data_time
    }

    /// Sample time of the data before that.
    pub fn last_time(&self) -> Timestamp {
        self.last_time
    }

    /// Set when data is dispatched, cleared only by [`clear_fresh`](Self::clear_fresh).
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn is_fresh_geometry(&self) -> bool {
        self.fresh_geometry
    }

    pub fn is_fresh_config(&self) -> bool {
        self.fresh_config
    }

    /// Clear all three freshness flags.
    pub fn clear_fresh(&mut self) {
        self.fresh = false;
        self.fresh_geometry = false;
        self.fresh_config = false;
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub(crate) fn set_subscription(&mut self, access: AccessMode, driver_name: String) {
        self.access = access;
        self.driver_name = driver_name;
    }
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("handle", &self.handle)
            .field("addr", &self.addr)
            .field("access", &self.access)
            .field("driver_name", &self.driver_name)
            .field("data_time", &self.data_time)
            .field("fresh", &self.fresh)
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// Ordered collection of registered devices.
///
/// Lookups are linear scans; a connection carries a handful of devices.
#[derive(Debug)]
pub struct DeviceRegistry {
    records: Vec<DeviceRecord>,
    max_callbacks: usize,
    next_handle: u64,
    next_callback: u64,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLBACKS)
    }
}

impl DeviceRegistry {
    pub fn new(max_callbacks: usize) -> Self {
        Self {
            records: Vec::new(),
            max_callbacks,
            next_handle: 1,
            next_callback: 1,
        }
    }

    /// Register a device. Fails if `addr` is already registered.
    pub fn register<H: DeviceHandler>(
        &mut self,
        addr: DeviceAddr,
        handler: H,
    ) -> Result<DeviceHandle> {
        if self.lookup(addr).is_some() {
            return Err(ClientError::DuplicateDevice(addr));
        }

        let handle = DeviceHandle(self.next_handle);
        self.next_handle += 1;
        self.records.push(DeviceRecord {
            handle,
            addr,
            access: AccessMode::Close,
            driver_name: String::new(),
            data_time: Timestamp::ZERO,
            last_time: Timestamp::ZERO,
            fresh: false,
            fresh_geometry: false,
            fresh_config: false,
            handler: Box::new(handler),
            callbacks: Vec::new(),
        });
        debug!(
            %handle,
            device_type = addr.device_type,
            device_index = addr.index,
            "registered device"
        );
        Ok(handle)
    }

    /// Remove a device. Returns false if it was not registered.
    pub fn deregister(&mut self, handle: DeviceHandle) -> bool {
        match self.position(handle) {
            Some(pos) => {
                let record = self.records.remove(pos);
                debug!(%handle, device = %record.addr, "deregistered device");
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, addr: DeviceAddr) -> Option<&DeviceRecord> {
        self.records.iter().find(|record| record.addr == addr)
    }

    pub fn lookup_mut(&mut self, addr: DeviceAddr) -> Option<&mut DeviceRecord> {
        self.records.iter_mut().find(|record| record.addr == addr)
    }

    pub fn get(&self, handle: DeviceHandle) -> Option<&DeviceRecord> {
        self.records.iter().find(|record| record.handle == handle)
    }

    pub fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceRecord> {
        self.records.iter_mut().find(|record| record.handle == handle)
    }

    /// Typed access to a device's handler.
    pub fn handler<H: DeviceHandler>(&self, handle: DeviceHandle) -> Option<&H> {
        let record = self.get(handle)?;
        let handler: &dyn Any = &*record.handler;
        handler.downcast_ref::<H>()
    }

    /// Typed mutable access to a device's handler.
    pub fn handler_mut<H: DeviceHandler>(&mut self, handle: DeviceHandle) -> Option<&mut H> {
        let record = self.get_mut(handle)?;
        let handler: &mut dyn Any = &mut *record.handler;
        handler.downcast_mut::<H>()
    }

    /// Attach a callback, run after the device's handler on every DATA message.
    pub fn add_callback<F>(&mut self, handle: DeviceHandle, callback: F) -> Result<CallbackId>
    where
        F: FnMut(&MessageHeader) + Send + 'static,
    {
        let max = self.max_callbacks;
        let id = CallbackId(self.next_callback);
        let record = self
            .get_mut(handle)
            .ok_or(ClientError::UnknownDevice(handle))?;

        if record.callbacks.len() >= max {
            warn!(device = %record.addr, max, "too many callbacks; ignoring new callback");
            return Err(ClientError::TooManyCallbacks {
                addr: record.addr,
                max,
            });
        }

        record.callbacks.push((id, Box::new(callback)));
        self.next_callback += 1;
        Ok(id)
    }

    /// Detach a callback. Returns false if it was not attached.
    pub fn remove_callback(&mut self, handle: DeviceHandle, id: CallbackId) -> bool {
        let Some(record) = self.get_mut(handle) else {
            return false;
        };
        let before = record.callbacks.len();
        record.callbacks.retain(|(existing, _)| *existing != id);
        record.callbacks.len() != before
    }

    /// Route a DATA message to the device it is addressed at.
    ///
    /// Returns the handle of the device that consumed it, or `None` if no
    /// device is registered at that address.
    pub fn dispatch(&mut self, header: &MessageHeader, body: &[u8]) -> Option<DeviceHandle> {
        let Some(record) = self.lookup_mut(header.addr) else {
            trace!(device = %header.addr, "no device registered; dropping data");
            return None;
        };

        record.last_time = record.data_time;
        record.data_time = header.sample_time;
        record.handler.handle_data(header, body);
        record.fresh = true;
        for (_, callback) in record.callbacks.iter_mut() {
            callback(header);
        }
        Some(record.handle)
    }

    /// Route a geometry reply to a device's geometry handler.
    pub fn dispatch_geometry(
        &mut self,
        handle: DeviceHandle,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<()> {
        let record = self
            .get_mut(handle)
            .ok_or(ClientError::UnknownDevice(handle))?;
        record.handler.handle_geometry(header, body);
        record.fresh_geometry = true;
        Ok(())
    }

    /// Route a config reply to a device's config handler.
    pub fn dispatch_config(
        &mut self,
        handle: DeviceHandle,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<()> {
        let record = self
            .get_mut(handle)
            .ok_or(ClientError::UnknownDevice(handle))?;
        record.handler.handle_config(header, body);
        record.fresh_config = true;
        Ok(())
    }

    /// Mark every device closed, as after a disconnect.
    pub(crate) fn close_all(&mut self) {
        for record in &mut self.records {
            record.access = AccessMode::Close;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_callbacks(&self) -> usize {
        self.max_callbacks
    }

    fn position(&self, handle: DeviceHandle) -> Option<usize> {
        self.records.iter().position(|record| record.handle == handle)
    }
}

/// A handler that keeps raw payloads without decoding them.
#[derive(Debug, Default, Clone)]
pub struct RawDevice {
    data: Vec<u8>,
    geometry: Option<Vec<u8>>,
    config: Option<Vec<u8>>,
    data_count: u64,
    last_header: Option<MessageHeader>,
}

impl RawDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body of the most recent DATA message.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn geometry(&self) -> Option<&[u8]> {
        self.geometry.as_deref()
    }

    pub fn config(&self) -> Option<&[u8]> {
        self.config.as_deref()
    }

    /// Number of DATA messages handled.
    pub fn data_count(&self) -> u64 {
        self.data_count
    }

    pub fn last_header(&self) -> Option<&MessageHeader> {
        self.last_header.as_ref()
    }
}

impl DeviceHandler for RawDevice {
    fn handle_data(&mut self, header: &MessageHeader, body: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(body);
        self.data_count += 1;
        self.last_header = Some(*header);
    }

    fn handle_geometry(&mut self, _header: &MessageHeader, body: &[u8]) {
        self.geometry = Some(body.to_vec());
    }

    fn handle_config(&mut self, _header: &MessageHeader, body: &[u8]) {
        self.config = Some(body.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use playerlink_frame::MessageKind;

    use super::*;

    fn data_header(addr: DeviceAddr, sec: u32) -> MessageHeader {
        MessageHeader {
            sample_time: Timestamp::new(sec, 0),
            ..MessageHeader::new(MessageKind::Data, addr, 1)
        }
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let mut registry = DeviceRegistry::default();
        registry.register(DeviceAddr::new(4, 0), RawDevice::new()).unwrap();

        let err = registry
            .register(DeviceAddr::new(4, 0), RawDevice::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::DuplicateDevice(addr) if addr == DeviceAddr::new(4, 0)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_twice_is_noop() {
        let mut registry = DeviceRegistry::default();
        let handle = registry.register(DeviceAddr::new(4, 0), RawDevice::new()).unwrap();

        assert!(registry.deregister(handle));
        assert!(!registry.deregister(handle));
        assert!(registry.is_empty());

        // The address can be reused, with a new handle.
        let again = registry.register(DeviceAddr::new(4, 0), RawDevice::new()).unwrap();
        assert_ne!(again, handle);
    }

    #[test]
    fn dispatch_routes_only_to_matching_device() {
        let mut registry = DeviceRegistry::default();
        let laser = registry.register(DeviceAddr::new(6, 0), RawDevice::new()).unwrap();
        let sonar = registry.register(DeviceAddr::new(5, 0), RawDevice::new()).unwrap();

        let routed = registry.dispatch(&data_header(DeviceAddr::new(5, 0), 7), b"ranges");
        assert_eq!(routed, Some(sonar));

        let sonar_raw = registry.handler::<RawDevice>(sonar).unwrap();
        assert_eq!(sonar_raw.data(), b"ranges");
        assert_eq!(sonar_raw.data_count(), 1);
        assert_eq!(registry.handler::<RawDevice>(laser).unwrap().data_count(), 0);
        assert!(registry.get(sonar).unwrap().is_fresh());
        assert!(!registry.get(laser).unwrap().is_fresh());
    }

    #[test]
    fn dispatch_to_unregistered_address_is_silent() {
        let mut registry = DeviceRegistry::default();
        let handle = registry.register(DeviceAddr::new(6, 0), RawDevice::new()).unwrap();

        assert_eq!(registry.dispatch(&data_header(DeviceAddr::new(6, 1), 1), b"x"), None);
        assert_eq!(registry.handler::<RawDevice>(handle).unwrap().data_count(), 0);
    }

    #[test]
    fn dispatch_shifts_timestamps() {
        let mut registry = DeviceRegistry::default();
        let handle = registry.register(DeviceAddr::new(5, 0), RawDevice::new()).unwrap();

        registry.dispatch(&data_header(DeviceAddr::new(5, 0), 10), b"a");
        registry.dispatch(&data_header(DeviceAddr::new(5, 0), 11), b"b");

        let record = registry.get(handle).unwrap();
        assert_eq!(record.data_time(), Timestamp::new(11, 0));
        assert_eq!(record.last_time(), Timestamp::new(10, 0));
    }

    #[test]
    fn handler_runs_before_callbacks_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut registry = DeviceRegistry::default();

        let handler_log = Arc::clone(&log);
        let handle = registry
            .register(DeviceAddr::new(5, 0), move |_: &MessageHeader, body: &[u8]| {
                handler_log
                    .lock()
                    .unwrap()
                    .push(format!("handler:{}", String::from_utf8_lossy(body)));
            })
            .unwrap();

        for name in ["first", "second", "third"] {
            let cb_log = Arc::clone(&log);
            registry
                .add_callback(handle, move |_| cb_log.lock().unwrap().push(name.to_string()))
                .unwrap();
        }

        registry.dispatch(&data_header(DeviceAddr::new(5, 0), 1), b"x");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["handler:x", "first", "second", "third"]
        );
    }

    #[test]
    fn callback_capacity_is_enforced() {
        let mut registry = DeviceRegistry::new(2);
        let handle = registry.register(DeviceAddr::new(5, 0), RawDevice::new()).unwrap();

        registry.add_callback(handle, |_| {}).unwrap();
        registry.add_callback(handle, |_| {}).unwrap();
        let err = registry.add_callback(handle, |_| {}).unwrap_err();
        assert!(matches!(err, ClientError::TooManyCallbacks { max: 2, .. }));
        assert_eq!(registry.get(handle).unwrap().callback_count(), 2);
    }

    #[test]
    fn removed_callback_is_not_invoked() {
        let hits = Arc::new(Mutex::new(0u32));
        let mut registry = DeviceRegistry::default();
        let handle = registry.register(DeviceAddr::new(5, 0), RawDevice::new()).unwrap();

        let counter = Arc::clone(&hits);
        let id = registry
            .add_callback(handle, move |_| *counter.lock().unwrap() += 1)
            .unwrap();
        registry.dispatch(&data_header(DeviceAddr::new(5, 0), 1), b"x");
        assert!(registry.remove_callback(handle, id));
        assert!(!registry.remove_callback(handle, id));
        registry.dispatch(&data_header(DeviceAddr::new(5, 0), 2), b"y");

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn callbacks_on_unknown_device_fail() {
        let mut registry = DeviceRegistry::default();
        let handle = registry.register(DeviceAddr::new(5, 0), RawDevice::new()).unwrap();
        registry.deregister(handle);

        let err = registry.add_callback(handle, |_| {}).unwrap_err();
        assert!(matches!(err, ClientError::UnknownDevice(h) if h == handle));
    }

    #[test]
    fn geometry_and_config_slots() {
        let mut registry = DeviceRegistry::default();
        let handle = registry.register(DeviceAddr::new(6, 0), RawDevice::new()).unwrap();
        let header = MessageHeader::new(MessageKind::ResponseAck, DeviceAddr::new(6, 0), 1);

        registry.dispatch_geometry(handle, &header, b"pose").unwrap();
        registry.dispatch_config(handle, &header, b"cfg").unwrap();

        let record = registry.get(handle).unwrap();
        assert!(record.is_fresh_geometry());
        assert!(record.is_fresh_config());
        assert!(!record.is_fresh());

        let raw = registry.handler::<RawDevice>(handle).unwrap();
        assert_eq!(raw.geometry(), Some(&b"pose"[..]));
        assert_eq!(raw.config(), Some(&b"cfg"[..]));

        registry.get_mut(handle).unwrap().clear_fresh();
        assert!(!registry.get(handle).unwrap().is_fresh_geometry());
    }

    #[test]
    fn closure_handler_ignores_geometry() {
        let mut registry = DeviceRegistry::default();
        let handle = registry
            .register(DeviceAddr::new(6, 0), |_: &MessageHeader, _: &[u8]| {})
            .unwrap();
        let header = MessageHeader::new(MessageKind::ResponseAck, DeviceAddr::new(6, 0), 1);
        registry.dispatch_geometry(handle, &header, b"pose").unwrap();
        assert!(registry.handler::<RawDevice>(handle).is_none());
    }
}
