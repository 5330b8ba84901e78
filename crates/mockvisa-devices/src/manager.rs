/*!
 * Resource manager and client-side resource handles.
 *
 * The [`ResourceManager`] opens sessions on registered names and keeps the
 * table of open sessions. A [`Resource`] wraps one session with the
 * conveniences client code expects: string queries, lock scopes and waiting
 * for a service request.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use mockvisa_core::config::SimulatorConfig;
use mockvisa_core::pattern::CommandPattern;

use crate::attribute::{AttributeId, AttributeValue};
use crate::binary::from_ieee_block;
use crate::devices::default_resources;
use crate::error::{Result, VisaError};
use crate::event::EventKind;
use crate::lock::LockGuard;
use crate::registry::ResourceRegistry;
use crate::resource_name::{ResourceName, DEFAULT_QUERY};
use crate::session::{Session, SessionOptions};
use crate::status::StatusBits;
use crate::timeout::Timeout;

/// Handle of the manager's own session
pub const RM_SESSION: u32 = 1;

/// Opens sessions on the instruments of a registry
pub struct ResourceManager {
    registry: Arc<ResourceRegistry>,
    options: SessionOptions,
    sessions: RwLock<HashMap<u32, Arc<Session>>>,
    next_handle: AtomicU32,
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("sessions", &self.sessions())
            .finish()
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ResourceManager {
    /// Manager over `registry` with default session options
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self::with_options(registry, SessionOptions::default())
    }

    /// Manager over `registry` opening sessions with `options`
    pub fn with_options(registry: Arc<ResourceRegistry>, options: SessionOptions) -> Self {
        Self {
            registry,
            options,
            sessions: RwLock::new(HashMap::new()),
            next_handle: AtomicU32::new(RM_SESSION + 1),
        }
    }

    /// Manager over the fixture instruments
    pub fn with_defaults() -> Self {
        let registry = ResourceRegistry::new();
        registry.register_all(default_resources());
        Self::new(Arc::new(registry))
    }

    /// Manager configured from the simulator settings.
    ///
    /// A non-zero default call delay is applied to every registered device.
    pub fn with_config(registry: Arc<ResourceRegistry>, config: &SimulatorConfig) -> Result<Self> {
        let options = SessionOptions::from_config(config)?;
        let delay = config.default_call_delay();
        if !delay.is_zero() {
            for name in registry.names() {
                registry.get(&name)?.set_call_delay(delay);
            }
            debug!(?delay, "Applied default call delay");
        }
        Ok(Self::with_options(registry, options))
    }

    /// The registry sessions are opened against
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Handle of this manager
    pub fn handle(&self) -> u32 {
        RM_SESSION
    }

    /// Names matching a VISA resource expression, `?*::INSTR` if `None`
    pub fn list_resources(&self, query: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .registry
            .list(query.unwrap_or(DEFAULT_QUERY))?
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    /// Open a session on `name`
    #[instrument(skip(self))]
    pub fn open(&self, name: &str) -> Result<Arc<Session>> {
        let name: ResourceName = name.parse()?;
        let (device, lock) = self.registry.resolve(&name)?;

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::open(handle, RM_SESSION, name, device, lock, &self.options));
        self.sessions.write().insert(handle, session.clone());
        Ok(session)
    }

    /// Open a session on `name` wrapped in a [`Resource`]
    pub fn open_resource(&self, name: &str) -> Result<Resource> {
        self.open(name).map(Resource::new)
    }

    /// The open session with `handle`
    pub fn session(&self, handle: u32) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(&handle)
            .filter(|session| !session.is_closed())
            .cloned()
            .ok_or(VisaError::InvalidSession(handle))
    }

    /// Handles of every open session, in order
    pub fn sessions(&self) -> Vec<u32> {
        let mut handles: Vec<u32> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| !session.is_closed())
            .map(|(handle, _)| *handle)
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Close the session with `handle`
    pub fn close(&self, handle: u32) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&handle)
            .ok_or(VisaError::InvalidSession(handle))?;
        session.close();
        Ok(())
    }

    /// Close every open session
    pub fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "Closing all sessions");
        }
        for session in sessions {
            session.close();
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Client-side handle on one session
#[derive(Clone)]
pub struct Resource {
    session: Arc<Session>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("handle", &self.session.handle())
            .field("name", &self.session.resource_name().to_string())
            .finish()
    }
}

impl Resource {
    /// Wrap an open session
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn live(&self) -> Result<&Session> {
        if self.session.is_closed() {
            return Err(VisaError::InvalidSession(self.session.handle()));
        }
        Ok(&self.session)
    }

    /// The underlying session
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Session handle
    pub fn handle(&self) -> u32 {
        self.session.handle()
    }

    /// Resource name as opened
    pub fn resource_name(&self) -> String {
        self.session.resource_name().to_string()
    }

    /// Send one command
    pub fn write(&self, command: &str) -> Result<()> {
        self.live()?.write(command)
    }

    /// The last reply
    pub fn read(&self) -> Result<String> {
        Ok(self.live()?.read())
    }

    /// Send one command and read the reply
    pub fn query(&self, command: &str) -> Result<String> {
        self.live()?.query(command)
    }

    /// Consume up to `count` bytes of the last reply
    pub fn read_bytes(&self, count: usize) -> Result<Bytes> {
        Ok(self.live()?.read_bytes(count))
    }

    /// Consume whatever is left of the last reply
    pub fn read_raw(&self) -> Result<Bytes> {
        let session = self.live()?;
        Ok(session.read_bytes(session.bytes_available()))
    }

    /// Query and decode an IEEE binary block of `f32`
    pub fn query_binary_values(&self, command: &str) -> Result<Vec<f32>> {
        self.write(command)?;
        let data = self.read_raw()?;
        Ok(from_ieee_block(&data)?)
    }

    /// Status byte, cleared by the read
    pub fn read_stb(&self) -> Result<u8> {
        Ok(self.live()?.read_status_byte())
    }

    /// Timeout from `TMO_VALUE`
    pub fn timeout(&self) -> Timeout {
        self.session.timeout()
    }

    /// Set `TMO_VALUE`; `None` waits forever
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let millis = match timeout {
            None => crate::timeout::INFINITE_MILLIS,
            Some(d) => u32::try_from(d.as_millis()).unwrap_or(crate::timeout::INFINITE_MILLIS - 1),
        };
        self.live()?
            .set_attribute(AttributeId::TMO_VALUE, AttributeValue::Integer(millis))
    }

    /// Read an attribute
    pub fn get_attribute(&self, id: AttributeId) -> Result<AttributeValue> {
        self.live()?.get_attribute(id)
    }

    /// Write an attribute
    pub fn set_attribute(&self, id: AttributeId, value: AttributeValue) -> Result<()> {
        self.live()?.set_attribute(id, value)
    }

    fn timeout_or_default(&self, timeout: Option<Duration>) -> Timeout {
        timeout.map(Timeout::from).unwrap_or_else(|| self.timeout())
    }

    /// Take the exclusive lock; `None` uses the session timeout
    pub fn lock(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = self.timeout_or_default(timeout);
        self.live()?.lock(timeout)
    }

    /// Release the exclusive lock
    pub fn unlock(&self) -> Result<()> {
        self.live()?.unlock()
    }

    /// Hold the exclusive lock until the guard drops
    pub fn lock_context(&self, timeout: Option<Duration>) -> Result<LockGuard> {
        let timeout = self.timeout_or_default(timeout);
        self.live()?.lock_guard(timeout)
    }

    /// Enable `kind`, tolerating an earlier enable
    pub fn enable_event(&self, kind: EventKind) -> Result<()> {
        self.live()?.ensure_event_enabled(kind).map(|_| ())
    }

    /// Disable `kind`, tolerating an earlier disable
    pub fn disable_event(&self, kind: EventKind) -> Result<()> {
        self.live()?.ensure_event_disabled(kind).map(|_| ())
    }

    /// Drop queued occurrences of `kind`
    pub fn discard_events(&self, kind: EventKind) -> Result<()> {
        self.live()?.discard_events(kind)
    }

    /// Wait for an occurrence of `kind`; `None` uses the session timeout
    pub fn wait_on_event(&self, kind: EventKind, timeout: Option<Duration>) -> Result<()> {
        let timeout = self.timeout_or_default(timeout);
        self.live()?.wait_on_event(kind, timeout)
    }

    /// Block until the device requests service.
    ///
    /// Enables the service-request queue if needed, then waits until an
    /// occurrence arrives while the status byte has `REQUEST_SERVICE` set.
    /// Each check reads and so clears the status byte. Leftover occurrences
    /// are discarded before returning the status byte that satisfied the
    /// wait. `None` uses the session timeout.
    pub fn wait_for_srq(&self, timeout: Option<Duration>) -> Result<u8> {
        let session = self.live()?;
        session.ensure_event_enabled(EventKind::ServiceRequest)?;

        let timeout = self.timeout_or_default(timeout);
        let deadline = timeout.deadline();
        loop {
            session.wait_on_event(EventKind::ServiceRequest, Timeout::until(deadline))?;
            let stb = session.read_status_byte();
            if stb & StatusBits::REQUEST_SERVICE != 0 {
                session.discard_events(EventKind::ServiceRequest)?;
                debug!(handle = session.handle(), stb, "Service requested");
                return Ok(stb);
            }
            if timeout == Timeout::Immediate {
                warn!(handle = session.handle(), "Service request without RQS bit");
                return Err(VisaError::timeout("waiting for service request"));
            }
        }
    }

    /// Replace the delay applied to every command of the device
    pub fn set_call_delay(&self, delay: Duration) -> Result<()> {
        self.live()?.device().set_call_delay(delay);
        Ok(())
    }

    /// Override the delay of the command declared as `template`
    pub fn set_command_delay(&self, template: &str, delay: Duration) -> Result<()> {
        let pattern = CommandPattern::scpi(template).map_err(mockvisa_core::error::Error::from)?;
        self.live()?.device().set_command_delay(&pattern, delay)
    }

    /// Close the session
    pub fn close(&self) {
        self.session.close();
    }
}
