/*!
 * Multimeter with simulated measurement latency.
 *
 * `:VOLTage?` blocks the caller for the measurement time. `:MEAS` returns at
 * once and hands the measurement to a worker thread, which stores the result
 * for `:REAd?` and requests service when done.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use mockvisa_core::dispatch::{CommandSet, Commands};
use mockvisa_core::error::{Error as CoreError, Result as CoreResult};

use crate::instrument::{Instrument, InstrumentCore};

/// Default measurement time
pub const MEASUREMENT_TIME: Duration = Duration::from_millis(200);

/// Identification string
pub const IDN: &str = "Mocker,testing,00000,0.01";

/// Status bit mirrored while a measurement is in flight
pub const OPERATION_PENDING: u8 = 0x01;

struct DmmState {
    core: InstrumentCore,
    measurement_time: Duration,
    voltages: Mutex<HashMap<i64, f64>>,
    readings: Mutex<HashMap<i64, f64>>,
    in_flight: AtomicBool,
}

impl DmmState {
    fn voltage(&self, channel: i64) -> f64 {
        self.voltages.lock().get(&channel).copied().unwrap_or(0.0)
    }

    fn measure(&self, channel: i64) {
        thread::sleep(self.measurement_time);
        let value = self.voltage(channel);
        self.readings.lock().insert(channel, value);
        self.in_flight.store(false, Ordering::SeqCst);
        self.core.lower_status(OPERATION_PENDING);
        debug!(channel, value, "Measurement complete");

        if let Err(e) = self.core.request_service() {
            warn!("Measurement finished without a session: {}", e);
        }
    }
}

/// A single-range voltmeter addressed as `:INSTRument:CHANNEL<n>`
pub struct Dmm {
    state: Arc<DmmState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Dmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dmm")
            .field("measurement_time", &self.state.measurement_time)
            .field("readings", &*self.state.readings.lock())
            .field("in_flight", &self.state.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for Dmm {
    fn default() -> Self {
        Self::new()
    }
}

impl Dmm {
    /// Meter taking [`MEASUREMENT_TIME`] per reading
    pub fn new() -> Self {
        Self::with_measurement_time(MEASUREMENT_TIME)
    }

    /// Meter taking `measurement_time` per reading
    pub fn with_measurement_time(measurement_time: Duration) -> Self {
        Self {
            state: Arc::new(DmmState {
                core: InstrumentCore::new(),
                measurement_time,
                voltages: Mutex::new(HashMap::new()),
                readings: Mutex::new(HashMap::new()),
                in_flight: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Time one measurement takes
    pub fn measurement_time(&self) -> Duration {
        self.state.measurement_time
    }

    fn idn(&self) -> &'static str {
        IDN
    }

    fn set_voltage(&self, channel: i64, volts: f64) {
        self.state.voltages.lock().insert(channel, volts);
    }

    fn measure_now(&self, channel: i64) -> f64 {
        thread::sleep(self.state.measurement_time);
        self.state.voltage(channel)
    }

    /// Whether a `:MEAS` is still running
    pub fn is_measuring(&self) -> bool {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    fn start_measurement(&self, channel: i64) {
        if self.state.in_flight.swap(true, Ordering::SeqCst) {
            debug!(channel, "Measurement already in flight");
            return;
        }
        self.state.core.raise_status(OPERATION_PENDING);

        let mut worker = self.worker.lock();
        // The previous worker has cleared the flag and is finishing up
        if let Some(handle) = worker.take() {
            join(handle);
        }
        let state = self.state.clone();
        *worker = Some(thread::spawn(move || state.measure(channel)));
    }

    fn reading(&self, channel: i64) -> CoreResult<f64> {
        let reading = self.state.readings.lock().get(&channel).copied();
        reading.ok_or_else(|| CoreError::runtime(format!("no measurement on channel {}", channel)))
    }

    fn clear_status(&self) {
        let pending = if self.is_measuring() { OPERATION_PENDING } else { 0 };
        self.state.core.set_status_byte(pending);
    }

    fn join_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            join(handle);
        }
    }
}

fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("Measurement worker panicked");
    }
}

impl Commands for Dmm {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.scpi("\\*IDN\\?", Self::idn)?
            .scpi("\\*CLS", Self::clear_status)?
            .scpi(":INSTRument:CHANNEL(.*):VOLTage (.*)", Self::set_voltage)?
            .scpi(":INSTRument:CHANNEL(.*):VOLTage\\?", Self::measure_now)?
            .scpi(":INSTRument:CHANNEL(.*):MEAS", Self::start_measurement)?
            .scpi(":INSTRument:CHANNEL(.*):REAd\\?", Self::reading)?;
        Ok(())
    }
}

impl Instrument for Dmm {
    fn core(&self) -> &InstrumentCore {
        &self.state.core
    }

    fn on_close(&self) {
        self.join_worker();
    }
}

impl Drop for Dmm {
    fn drop(&mut self) {
        self.join_worker();
    }
}
