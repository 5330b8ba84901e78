/*!
 * Sessions on simulated resources.
 *
 * A session is one client's connection to a registered instrument. It owns
 * the read buffer, the attribute set, the status byte and the event queues,
 * lends the last two to its device while open, and shares the exclusive lock
 * with every other session on the same resource name.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use mockvisa_core::config::SimulatorConfig;
use mockvisa_core::error::Error as CoreError;
use mockvisa_core::types::Value;

use crate::attribute::{AttributeId, AttributeValue, Attributes};
use crate::error::{Result, VisaError};
use crate::event::{EventKind, EventTable};
use crate::instrument::{Device, SessionLink};
use crate::lock::{LockGuard, LockKind, ResourceLock};
use crate::resource_name::ResourceName;
use crate::status::StatusByte;
use crate::timeout::Timeout;

/// Settings applied to newly opened sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Event kinds sessions support
    pub supported_events: Vec<EventKind>,
    /// Initial `TMO_VALUE`, milliseconds
    pub timeout_ms: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            supported_events: vec![EventKind::ServiceRequest],
            timeout_ms: 25_000,
        }
    }
}

impl SessionOptions {
    /// Options from the simulator section of the configuration
    pub fn from_config(config: &SimulatorConfig) -> Result<Self> {
        let supported_events = config
            .supported_events
            .iter()
            .map(|name| name.parse::<EventKind>().map_err(CoreError::config))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            supported_events,
            timeout_ms: config.default_timeout_ms,
        })
    }
}

/// An open session
pub struct Session {
    handle: u32,
    name: ResourceName,
    device: Arc<dyn Device>,
    attributes: Attributes,
    status: Arc<StatusByte>,
    events: Arc<EventTable>,
    lock: Arc<ResourceLock>,
    buffer: Mutex<BytesMut>,
    closed: AtomicBool,
}

impl Session {
    /// Open a session and attach it to `device`
    pub fn open(
        handle: u32,
        rm_session: u32,
        name: ResourceName,
        device: Arc<dyn Device>,
        lock: Arc<ResourceLock>,
        options: &SessionOptions,
    ) -> Self {
        let status = Arc::new(StatusByte::new());
        let events = Arc::new(EventTable::new(options.supported_events.iter().copied()));
        device.attach(SessionLink {
            status: status.clone(),
            events: events.clone(),
        });

        info!(session = handle, resource = %name, instrument = device.type_name(), "Opened session");

        Self {
            handle,
            attributes: Attributes::new(rm_session, &name, options.timeout_ms),
            name,
            device,
            status,
            events,
            lock,
            buffer: Mutex::new(BytesMut::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Session handle
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// The resource this session is open on
    pub fn resource_name(&self) -> &ResourceName {
        &self.name
    }

    /// The attached device
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Dispatch `command`; a non-null result replaces the read buffer
    pub fn write(&self, command: &str) -> Result<()> {
        let value = self.device.send(command)?;
        self.store_reply(&value);
        Ok(())
    }

    fn store_reply(&self, value: &Value) {
        if let Some(reply) = value.to_reply() {
            let mut buffer = self.buffer.lock();
            buffer.clear();
            buffer.extend_from_slice(&reply);
        }
    }

    /// The read buffer as text, left in place
    pub fn read(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Take up to `count` bytes off the front of the read buffer
    pub fn read_bytes(&self, count: usize) -> Bytes {
        let mut buffer = self.buffer.lock();
        let count = count.min(buffer.len());
        buffer.split_to(count).freeze()
    }

    /// Bytes waiting in the read buffer
    pub fn bytes_available(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Write then read
    pub fn query(&self, command: &str) -> Result<String> {
        self.write(command)?;
        Ok(self.read())
    }

    /// Status byte, cleared by the read
    pub fn read_status_byte(&self) -> u8 {
        self.status.read_and_clear()
    }

    /// Start queuing `kind`
    pub fn enable_event(&self, kind: EventKind) -> Result<()> {
        self.events.enable(kind)
    }

    /// Stop queuing `kind`
    pub fn disable_event(&self, kind: EventKind) -> Result<()> {
        self.events.disable(kind)
    }

    /// Drop queued occurrences of `kind`
    pub fn discard_events(&self, kind: EventKind) -> Result<()> {
        self.events.discard(kind)
    }

    /// Queue one occurrence of `kind`
    pub fn signal_event(&self, kind: EventKind) -> Result<()> {
        self.events.signal(kind)
    }

    /// Take one occurrence of `kind`, blocking up to `timeout`
    pub fn wait_on_event(&self, kind: EventKind, timeout: Timeout) -> Result<()> {
        self.events.wait(kind, timeout)
    }

    /// Enable `kind` unless already enabled.
    ///
    /// Returns whether this call enabled it.
    pub fn ensure_event_enabled(&self, kind: EventKind) -> Result<bool> {
        match self.events.enable(kind) {
            Ok(()) => Ok(true),
            Err(VisaError::AlreadyEnabled(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Disable `kind` unless already disabled.
    ///
    /// Returns whether this call disabled it.
    pub fn ensure_event_disabled(&self, kind: EventKind) -> Result<bool> {
        match self.events.disable(kind) {
            Ok(()) => Ok(true),
            Err(VisaError::NotEnabled(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The event table of this session
    pub fn events(&self) -> &EventTable {
        &self.events
    }

    fn holder(&self) -> String {
        format!("session {}", self.handle)
    }

    /// Take the exclusive resource lock
    pub fn lock(&self, timeout: Timeout) -> Result<()> {
        self.lock.acquire(&self.holder(), timeout)
    }

    /// Take the resource lock in the given mode
    pub fn lock_with(&self, kind: LockKind, requested_key: Option<&str>, timeout: Timeout) -> Result<()> {
        self.lock.acquire_with(kind, requested_key, &self.holder(), timeout)
    }

    /// Release the resource lock
    pub fn unlock(&self) -> Result<()> {
        self.lock.release()
    }

    /// Take the exclusive lock until the guard drops
    pub fn lock_guard(&self, timeout: Timeout) -> Result<LockGuard> {
        self.lock.guard(&self.holder(), timeout)
    }

    /// Read an attribute
    pub fn get_attribute(&self, id: AttributeId) -> Result<AttributeValue> {
        self.attributes.get(id)
    }

    /// Write an attribute
    pub fn set_attribute(&self, id: AttributeId, value: AttributeValue) -> Result<()> {
        self.attributes.set(id, value)
    }

    /// Timeout from the `TMO_VALUE` attribute
    pub fn timeout(&self) -> Timeout {
        self.attributes.timeout()
    }

    /// Disable all events and detach from the device.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.events.disable_all() {
            warn!(session = self.handle, "Failed to disable events: {}", e);
        }
        self.device.detach(&SessionLink {
            status: self.status.clone(),
            events: self.events.clone(),
        });
        debug!(session = self.handle, "Detached from device");
        info!(session = self.handle, resource = %self.name, "Closed session");
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
