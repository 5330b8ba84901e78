/*!
 * Per-session event queues.
 *
 * Each event kind a session supports has an enabled flag and a queue of
 * payload-free occurrence markers. The flags are guarded by a reentrant lock
 * of their own; blocking waits only ever hold the lock of the queue they wait
 * on, so a device thread can signal while a client thread waits.
 */
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{Result, VisaError};
use crate::timeout::Timeout;

/// Event kinds a VISA session can queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Service request from the device
    ServiceRequest,
    /// Asynchronous I/O completed
    IoCompletion,
    /// Trigger
    Trigger,
    /// Device clear
    Clear,
    /// GPIB talker addressed
    GpibTalk,
    /// GPIB listener addressed
    GpibListen,
    /// PXI interrupt
    PxiInterrupt,
    /// TCP/IP connection request
    TcpipConnect,
    /// Error condition
    Exception,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 9] = [
        EventKind::ServiceRequest,
        EventKind::IoCompletion,
        EventKind::Trigger,
        EventKind::Clear,
        EventKind::GpibTalk,
        EventKind::GpibListen,
        EventKind::PxiInterrupt,
        EventKind::TcpipConnect,
        EventKind::Exception,
    ];

    /// The `VI_EVENT_*` constant
    pub fn code(&self) -> u32 {
        match self {
            EventKind::ServiceRequest => 0x3FFF_200B,
            EventKind::IoCompletion => 0x3FFF_2009,
            EventKind::Trigger => 0xBFFF_200A,
            EventKind::Clear => 0x3FFF_200D,
            EventKind::GpibTalk => 0x3FFF_2011,
            EventKind::GpibListen => 0x3FFF_2012,
            EventKind::PxiInterrupt => 0x3FFF_2022,
            EventKind::TcpipConnect => 0x3FFF_2036,
            EventKind::Exception => 0xBFFF_200E,
        }
    }

    /// Snake-case name, as used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ServiceRequest => "service_request",
            EventKind::IoCompletion => "io_completion",
            EventKind::Trigger => "trigger",
            EventKind::Clear => "clear",
            EventKind::GpibTalk => "gpib_talk",
            EventKind::GpibListen => "gpib_listen",
            EventKind::PxiInterrupt => "pxi_interrupt",
            EventKind::TcpipConnect => "tcpip_connect",
            EventKind::Exception => "exception",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown event kind {:?}", s))
    }
}

/// Outcome of [`EventQueue::pop_timeout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    /// One occurrence was taken
    Ready,
    /// Nothing arrived in time
    TimedOut,
    /// The queue was closed while waiting
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: usize,
    closed: bool,
}

/// FIFO of occurrence markers
#[derive(Debug, Default)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl EventQueue {
    /// An empty, open queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one occurrence
    pub fn push(&self) {
        let mut state = self.state.lock();
        state.pending += 1;
        self.ready.notify_one();
    }

    /// Take one occurrence without blocking
    pub fn try_pop(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending > 0 {
            state.pending -= 1;
            true
        } else {
            false
        }
    }

    /// Take one occurrence, blocking up to `timeout`
    pub fn pop_timeout(&self, timeout: Timeout) -> Pop {
        let deadline = timeout.deadline();
        let mut state = self.state.lock();
        loop {
            if state.pending > 0 {
                state.pending -= 1;
                return Pop::Ready;
            }
            if state.closed {
                return Pop::Closed;
            }
            match (timeout, deadline) {
                (Timeout::Immediate, _) => return Pop::TimedOut,
                (_, Some(deadline)) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() && state.pending == 0 {
                        return if state.closed { Pop::Closed } else { Pop::TimedOut };
                    }
                }
                (_, None) => self.ready.wait(&mut state),
            }
        }
    }

    /// Drop every queued occurrence
    pub fn clear(&self) {
        self.state.lock().pending = 0;
    }

    /// Drop every queued occurrence and wake all waiters
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.pending = 0;
        state.closed = true;
        self.ready.notify_all();
    }

    /// Number of queued occurrences
    pub fn len(&self) -> usize {
        self.state.lock().pending
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Slot {
    enabled: Cell<bool>,
    queue: RefCell<Arc<EventQueue>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            enabled: Cell::new(false),
            queue: RefCell::new(Arc::new(EventQueue::new())),
        }
    }
}

/// Enabled flags and queues of one session
pub struct EventTable {
    slots: ReentrantMutex<HashMap<EventKind, Slot>>,
}

impl EventTable {
    /// A table supporting exactly `supported`, every kind disabled
    pub fn new<I: IntoIterator<Item = EventKind>>(supported: I) -> Self {
        let slots = supported.into_iter().map(|kind| (kind, Slot::new())).collect();
        Self {
            slots: ReentrantMutex::new(slots),
        }
    }

    fn with_slot<T>(&self, kind: EventKind, f: impl FnOnce(&Slot) -> Result<T>) -> Result<T> {
        let slots = self.slots.lock();
        let slot = slots.get(&kind).ok_or(VisaError::NotSupported(kind))?;
        f(slot)
    }

    fn with_enabled<T>(&self, kind: EventKind, f: impl FnOnce(&Slot) -> Result<T>) -> Result<T> {
        self.with_slot(kind, |slot| {
            if !slot.enabled.get() {
                return Err(VisaError::NotEnabled(kind));
            }
            f(slot)
        })
    }

    /// Start queuing `kind`, from an empty queue
    pub fn enable(&self, kind: EventKind) -> Result<()> {
        self.with_slot(kind, |slot| {
            if slot.enabled.get() {
                return Err(VisaError::AlreadyEnabled(kind));
            }
            *slot.queue.borrow_mut() = Arc::new(EventQueue::new());
            slot.enabled.set(true);
            trace!(event = %kind, "Enabled event");
            Ok(())
        })
    }

    /// Stop queuing `kind`; queued occurrences are dropped
    pub fn disable(&self, kind: EventKind) -> Result<()> {
        self.with_enabled(kind, |slot| {
            slot.enabled.set(false);
            let old = slot.queue.replace(Arc::new(EventQueue::new()));
            old.close();
            trace!(event = %kind, "Disabled event");
            Ok(())
        })
    }

    /// Empty the queue of `kind`
    pub fn discard(&self, kind: EventKind) -> Result<()> {
        self.with_enabled(kind, |slot| {
            slot.queue.borrow().clear();
            trace!(event = %kind, "Discarded events");
            Ok(())
        })
    }

    /// Enqueue one occurrence of `kind`
    pub fn signal(&self, kind: EventKind) -> Result<()> {
        self.with_enabled(kind, |slot| {
            slot.queue.borrow().push();
            trace!(event = %kind, "Signalled event");
            Ok(())
        })
    }

    /// Take one occurrence of `kind`, blocking up to `timeout`.
    ///
    /// The flag lock is released before blocking.
    pub fn wait(&self, kind: EventKind, timeout: Timeout) -> Result<()> {
        let queue = self.with_enabled(kind, |slot| Ok(slot.queue.borrow().clone()))?;

        match queue.pop_timeout(timeout) {
            Pop::Ready => {
                trace!(event = %kind, "Received event");
                Ok(())
            }
            Pop::TimedOut => {
                warn!(event = %kind, %timeout, "Timed out waiting for event");
                Err(VisaError::timeout(format!("waiting for {} ({})", kind, timeout)))
            }
            Pop::Closed => Err(VisaError::NotEnabled(kind)),
        }
    }

    /// Enable every supported kind that is not yet enabled
    pub fn enable_all(&self) -> Result<Vec<EventKind>> {
        let _guard = self.slots.lock();
        let mut enabled = Vec::new();
        for kind in self.supported() {
            if !self.is_enabled(kind) {
                self.enable(kind)?;
                enabled.push(kind);
            }
        }
        Ok(enabled)
    }

    /// Disable every enabled kind
    pub fn disable_all(&self) -> Result<Vec<EventKind>> {
        let _guard = self.slots.lock();
        let mut disabled = Vec::new();
        for kind in self.supported() {
            if self.is_enabled(kind) {
                self.disable(kind)?;
                disabled.push(kind);
            }
        }
        Ok(disabled)
    }

    /// Whether `kind` is supported and enabled
    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.slots
            .lock()
            .get(&kind)
            .map(|slot| slot.enabled.get())
            .unwrap_or(false)
    }

    /// Whether `kind` is supported
    pub fn supports(&self, kind: EventKind) -> bool {
        self.slots.lock().contains_key(&kind)
    }

    /// Supported kinds, in declaration order
    pub fn supported(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = self.slots.lock().keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Queued occurrences of an enabled kind
    pub fn pending(&self, kind: EventKind) -> Result<usize> {
        self.with_enabled(kind, |slot| Ok(slot.queue.borrow().len()))
    }
}

impl fmt::Debug for EventTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled: Vec<EventKind> = self
            .supported()
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect();
        f.debug_struct("EventTable")
            .field("supported", &self.supported())
            .field("enabled", &enabled)
            .finish()
    }
}
