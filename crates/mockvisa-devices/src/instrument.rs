/*!
 * Instrument model.
 *
 * A simulated instrument is any type implementing [`Instrument`]: it declares
 * its commands through [`Commands`] and embeds an [`InstrumentCore`] holding
 * its call delays and the links to the status byte and event queues of every
 * open session. Sessions talk to instruments through the object-safe
 * [`Device`] view, implemented for every instrument.
 */
use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use mockvisa_core::dispatch::{CallDelays, CommandRegistry, Commands};
use mockvisa_core::handler::Signature;
use mockvisa_core::pattern::CommandPattern;
use mockvisa_core::types::Value;

use crate::error::{Result, VisaError};
use crate::event::{EventKind, EventTable};
use crate::status::{StatusBits, StatusByte};

/// What a session shares with its device for the session's lifetime
#[derive(Clone)]
pub struct SessionLink {
    /// Status byte, written by the device and read by the client
    pub status: Arc<StatusByte>,
    /// Event queues of the session
    pub events: Arc<EventTable>,
}

impl SessionLink {
    /// Whether both links refer to the same session state
    pub fn same_session(&self, other: &SessionLink) -> bool {
        Arc::ptr_eq(&self.events, &other.events)
    }
}

impl fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLink")
            .field("status", &self.status)
            .field("events", &self.events)
            .finish()
    }
}

/// State every simulated instrument embeds
#[derive(Debug, Default)]
pub struct InstrumentCore {
    delays: CallDelays,
    links: RwLock<Vec<SessionLink>>,
}

impl InstrumentCore {
    /// Core with no call delay
    pub fn new() -> Self {
        Self::default()
    }

    /// Core whose commands all sleep `delay` before running
    pub fn with_call_delay(delay: Duration) -> Self {
        Self {
            delays: CallDelays::new(delay),
            ..Self::default()
        }
    }

    /// Call delays of this instance
    pub fn delays(&self) -> &CallDelays {
        &self.delays
    }

    /// Bits set in the status byte of any attached session, not cleared
    pub fn status_byte(&self) -> u8 {
        self.links
            .read()
            .iter()
            .fold(0, |bits, link| bits | link.status.peek())
    }

    /// Replace the status byte of every attached session
    pub fn set_status_byte(&self, value: u8) {
        for link in self.links.read().iter() {
            link.status.set(value);
        }
    }

    /// OR bits into the status byte of every attached session
    pub fn raise_status(&self, mask: u8) {
        for link in self.links.read().iter() {
            link.status.raise(mask);
        }
    }

    /// Clear bits in the status byte of every attached session
    pub fn lower_status(&self, mask: u8) {
        for link in self.links.read().iter() {
            link.status.lower(mask);
        }
    }

    /// Raise `REQUEST_SERVICE` and queue a service-request occurrence in
    /// every attached session.
    ///
    /// Returns whether any occurrence was queued; none is for sessions that
    /// have the event disabled.
    pub fn request_service(&self) -> Result<bool> {
        let links = self.links.read().clone();
        if links.is_empty() {
            return Err(VisaError::NotAttached("service request".to_string()));
        }

        let mut queued = false;
        for link in links {
            link.status.raise(StatusBits::REQUEST_SERVICE);
            match link.events.signal(EventKind::ServiceRequest) {
                Ok(()) => {
                    trace!("Queued service request");
                    queued = true;
                }
                Err(VisaError::NotEnabled(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(queued)
    }

    /// Install the link of a newly opened session
    pub fn attach(&self, link: SessionLink) {
        let mut links = self.links.write();
        if !links.iter().any(|installed| installed.same_session(&link)) {
            links.push(link);
        }
    }

    /// Remove `link`.
    ///
    /// Returns whether it was the last attached session.
    pub fn detach(&self, link: &SessionLink) -> bool {
        let mut links = self.links.write();
        let before = links.len();
        links.retain(|installed| !installed.same_session(link));
        links.len() < before && links.is_empty()
    }

    /// Whether any session is attached
    pub fn is_attached(&self) -> bool {
        !self.links.read().is_empty()
    }

    /// Number of attached sessions
    pub fn session_count(&self) -> usize {
        self.links.read().len()
    }
}

/// A simulated instrument
pub trait Instrument: Commands {
    /// The embedded core
    fn core(&self) -> &InstrumentCore;

    /// Called when the last session on this instrument closes
    fn on_close(&self) {}
}

/// Object-safe view of an instrument used by sessions
pub trait Device: Send + Sync {
    /// Rust type name of the instrument
    fn type_name(&self) -> &'static str;

    /// Dispatch one command
    fn send(&self, command: &str) -> Result<Value>;

    /// Install a session link
    fn attach(&self, link: SessionLink);

    /// Remove a session link, running the close hook once no session remains
    fn detach(&self, link: &SessionLink);

    /// Replace the delay applied to every command
    fn set_call_delay(&self, delay: Duration);

    /// Override the delay of one declared command
    fn set_command_delay(&self, pattern: &CommandPattern, delay: Duration) -> Result<()>;

    /// Template and signature of every command
    fn commands(&self) -> Result<Vec<(String, Signature)>>;
}

impl<T: Instrument> Device for T {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn send(&self, command: &str) -> Result<Value> {
        Ok(CommandRegistry::global().dispatch(self, self.core().delays(), command)?)
    }

    fn attach(&self, link: SessionLink) {
        debug!(instrument = type_name::<T>(), "Attached session");
        self.core().attach(link);
    }

    fn detach(&self, link: &SessionLink) {
        if self.core().detach(link) {
            debug!(instrument = type_name::<T>(), "Detached session");
            self.on_close();
        }
    }

    fn set_call_delay(&self, delay: Duration) {
        self.core().delays().set_default(delay);
    }

    fn set_command_delay(&self, pattern: &CommandPattern, delay: Duration) -> Result<()> {
        let table = CommandRegistry::global().table::<T>()?;
        Ok(table.set_command_delay(self.core().delays(), pattern, delay)?)
    }

    fn commands(&self) -> Result<Vec<(String, Signature)>> {
        Ok(CommandRegistry::global().commands::<T>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockvisa_core::dispatch::CommandSet;
    use mockvisa_core::error::Error as CoreError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Probe {
        core: InstrumentCore,
        closed: AtomicBool,
    }

    impl Probe {
        fn srq(&self) -> std::result::Result<bool, CoreError> {
            self.core
                .request_service()
                .map_err(|e| CoreError::runtime(e.to_string()))
        }
    }

    impl Commands for Probe {
        fn commands(set: &mut CommandSet<Self>) -> mockvisa_core::error::Result<()> {
            set.scpi("\\*IDN\\?", |_: &Self| "Probe")?
                .scpi(":SRQ", Self::srq)?;
            Ok(())
        }
    }

    impl Instrument for Probe {
        fn core(&self) -> &InstrumentCore {
            &self.core
        }

        fn on_close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn link() -> SessionLink {
        SessionLink {
            status: Arc::new(StatusByte::new()),
            events: Arc::new(EventTable::new([EventKind::ServiceRequest])),
        }
    }

    #[test]
    fn test_send_through_device_view() {
        let probe = Probe::default();
        let device: &dyn Device = &probe;
        assert_eq!(device.send("*idn?").unwrap(), Value::from("Probe"));
        assert!(device.type_name().ends_with("Probe"));
        assert_eq!(device.commands().unwrap().len(), 2);
    }

    #[test]
    fn test_request_service_needs_session() {
        let probe = Probe::default();
        assert!(matches!(
            probe.core().request_service(),
            Err(VisaError::NotAttached(_))
        ));
    }

    #[test]
    fn test_request_service_queues_when_enabled() {
        let probe = Probe::default();
        let link = link();
        probe.attach(link.clone());

        assert!(!probe.core().request_service().unwrap());
        assert_eq!(link.status.peek(), StatusBits::REQUEST_SERVICE);

        link.events.enable(EventKind::ServiceRequest).unwrap();
        assert_eq!(probe.send(":SRQ").unwrap(), Value::Bool(true));
        assert_eq!(link.events.pending(EventKind::ServiceRequest).unwrap(), 1);
    }

    #[test]
    fn test_close_hook_waits_for_last_session() {
        let probe = Probe::default();
        let first = link();
        let second = link();
        probe.attach(first.clone());
        probe.attach(second.clone());
        assert_eq!(probe.core().session_count(), 2);

        probe.detach(&second);
        assert!(probe.core().is_attached());
        assert!(!probe.closed.load(Ordering::SeqCst));

        // The remaining session still receives service requests
        first.events.enable(EventKind::ServiceRequest).unwrap();
        assert!(probe.core().request_service().unwrap());
        assert_eq!(first.events.pending(EventKind::ServiceRequest).unwrap(), 1);
        assert_eq!(second.status.peek(), 0);

        probe.detach(&second);
        assert!(!probe.closed.load(Ordering::SeqCst));

        probe.detach(&first);
        assert!(!probe.core().is_attached());
        assert!(probe.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_each_session_has_its_own_status_byte() {
        let probe = Probe::default();
        let first = link();
        let second = link();
        probe.attach(first.clone());
        probe.attach(second.clone());

        probe.core().raise_status(StatusBits::EVENT_SUMMARY);
        assert_eq!(second.status.read_and_clear(), StatusBits::EVENT_SUMMARY);
        assert_eq!(first.status.peek(), StatusBits::EVENT_SUMMARY);
        assert_eq!(probe.core().status_byte(), StatusBits::EVENT_SUMMARY);

        probe.core().lower_status(StatusBits::EVENT_SUMMARY);
        assert_eq!(probe.core().status_byte(), 0);
    }

    #[test]
    fn test_command_delay_must_be_declared() {
        let probe = Probe::default();
        let idn = CommandPattern::scpi("\\*IDN\\?").unwrap();
        probe.set_command_delay(&idn, Duration::from_millis(5)).unwrap();
        assert_eq!(probe.core().delays().delay_for(&idn), Duration::from_millis(5));

        let missing = CommandPattern::scpi(":MISSing").unwrap();
        assert!(probe.set_command_delay(&missing, Duration::from_millis(5)).is_err());
    }
}
