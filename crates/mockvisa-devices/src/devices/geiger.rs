/*!
 * Geiger counter with a background sampling thread.
 *
 * While running, the counter takes a reading every sampling period and adds
 * it to the accumulated exposure. A reading or an exposure above its alert
 * threshold sets the matching status bit and requests service.
 */
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use mockvisa_core::dispatch::{CommandSet, Commands};
use mockvisa_core::error::{Error as CoreError, Result as CoreResult};

use crate::instrument::{Instrument, InstrumentCore};

/// Identification string
pub const IDN: &str = "geiger counter:fake corp:123456";

/// Default time between readings
pub const SAMPLING_PERIOD: Duration = Duration::from_millis(100);

/// Mean of a single reading
pub const READING_MEAN: f64 = 1.0;

/// Standard deviation of a single reading
pub const READING_STD_DEV: f64 = 1000.0;

/// Counter-specific status bits
pub struct GeigerBits;

impl GeigerBits {
    /// Accumulated exposure exceeded its threshold
    pub const EXPOSURE_LIMIT: u8 = 0x01;
    /// A single reading exceeded its threshold
    pub const READING_LIMIT: u8 = 0x02;
}

#[derive(Debug, Default)]
struct Measurements {
    readings: Vec<f64>,
    exposure: f64,
    exposure_threshold: Option<f64>,
    reading_threshold: Option<f64>,
}

struct GeigerState {
    core: InstrumentCore,
    period: Duration,
    running: AtomicBool,
    measurements: Mutex<Measurements>,
}

/// Draw from a normal distribution with the Box-Muller transform
fn gauss<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

impl GeigerState {
    fn sample(&self) {
        let mut rng = rand::thread_rng();
        while self.running.load(Ordering::SeqCst) {
            self.take_reading(gauss(&mut rng, READING_MEAN, READING_STD_DEV));
            thread::sleep(self.period);
        }
        debug!("Sampling stopped");
    }

    /// Record one reading and check both thresholds under one lock
    fn take_reading(&self, reading: f64) {
        let mut m = self.measurements.lock();
        m.readings.push(reading);
        m.exposure += reading;
        trace!(reading, exposure = m.exposure, "Took reading");

        let mut bits = 0;
        if m.reading_threshold.is_some_and(|limit| reading > limit) {
            bits |= GeigerBits::READING_LIMIT;
        }
        if m.exposure_threshold.is_some_and(|limit| m.exposure > limit) {
            bits |= GeigerBits::EXPOSURE_LIMIT;
        }
        if bits == 0 {
            return;
        }

        self.core.raise_status(bits);
        if let Err(e) = self.core.request_service() {
            debug!("Alert with no session attached: {}", e);
        }
    }
}

/// A counter sampling on its own thread between `MEAS:START` and `MEAS:STOP`
pub struct GeigerCounter {
    state: Arc<GeigerState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for GeigerCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeigerCounter")
            .field("period", &self.state.period)
            .field("running", &self.is_running())
            .field("measurements", &*self.state.measurements.lock())
            .finish()
    }
}

impl Default for GeigerCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl GeigerCounter {
    /// Counter sampling every [`SAMPLING_PERIOD`]
    pub fn new() -> Self {
        Self::with_period(SAMPLING_PERIOD)
    }

    /// Counter sampling every `period`
    pub fn with_period(period: Duration) -> Self {
        Self {
            state: Arc::new(GeigerState {
                core: InstrumentCore::new(),
                period,
                running: AtomicBool::new(false),
                measurements: Mutex::new(Measurements::default()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Whether the sampling thread is running
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Feed one reading as if the sampling thread had taken it
    pub fn record(&self, reading: f64) {
        self.state.take_reading(reading);
    }

    /// Number of readings taken so far
    pub fn reading_count(&self) -> usize {
        self.state.measurements.lock().readings.len()
    }

    /// Start sampling; a no-op while already running
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if self.state.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = self.state.clone();
        *worker = Some(thread::spawn(move || state.sample()));
        info!(period = ?self.state.period, "Started sampling");
    }

    /// Stop sampling and wait for the thread to finish
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        self.state.running.store(false, Ordering::SeqCst);
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                warn!("Sampling thread panicked");
            }
            info!("Stopped sampling");
        }
    }

    fn idn(&self) -> &'static str {
        IDN
    }

    fn clear_status(&self) {
        self.state.core.set_status_byte(0);
    }

    fn set_exposure_threshold(&self, limit: f64) {
        self.state.measurements.lock().exposure_threshold = Some(limit);
    }

    fn exposure_threshold(&self) -> CoreResult<f64> {
        self.state
            .measurements
            .lock()
            .exposure_threshold
            .ok_or_else(|| CoreError::runtime("exposure threshold not set"))
    }

    fn set_reading_threshold(&self, limit: f64) {
        self.state.measurements.lock().reading_threshold = Some(limit);
    }

    fn reading_threshold(&self) -> CoreResult<f64> {
        self.state
            .measurements
            .lock()
            .reading_threshold
            .ok_or_else(|| CoreError::runtime("reading threshold not set"))
    }

    fn last_reading(&self) -> CoreResult<f64> {
        self.state
            .measurements
            .lock()
            .readings
            .last()
            .copied()
            .ok_or_else(|| CoreError::runtime("no reading taken"))
    }

    fn exposure(&self) -> f64 {
        self.state.measurements.lock().exposure
    }
}

impl Commands for GeigerCounter {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.scpi("\\*IDN\\?", Self::idn)?
            .scpi("\\*CLS", Self::clear_status)?
            .scpi("ALERT:EXPOSURE:THRESHOLD (.*)", Self::set_exposure_threshold)?
            .scpi("ALERT:EXPOSURE:THRESHOLD\\?", Self::exposure_threshold)?
            .scpi("ALERT:READING:THRESHOLD (.*)", Self::set_reading_threshold)?
            .scpi("ALERT:READING:THRESHOLD\\?", Self::reading_threshold)?
            .scpi("MEAS:READING\\?", Self::last_reading)?
            .scpi("MEAS:EXPOSURE\\?", Self::exposure)?
            .scpi("MEAS:START", Self::start)?
            .scpi("MEAS:STOP", Self::stop)?;
        Ok(())
    }
}

impl Instrument for GeigerCounter {
    fn core(&self) -> &InstrumentCore {
        &self.state.core
    }

    fn on_close(&self) {
        self.stop();
    }
}

impl Drop for GeigerCounter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventTable};
    use crate::instrument::{Device, SessionLink};
    use crate::status::{StatusBits, StatusByte};
    use mockvisa_core::types::Value;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn attached(counter: &GeigerCounter) -> SessionLink {
        let link = SessionLink {
            status: Arc::new(StatusByte::new()),
            events: Arc::new(EventTable::new([EventKind::ServiceRequest])),
        };
        link.events.enable(EventKind::ServiceRequest).unwrap();
        counter.attach(link.clone());
        link
    }

    #[test]
    fn test_gauss_is_centred() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mean = (0..n).map(|_| gauss(&mut rng, 5.0, 1.0)).sum::<f64>() / n as f64;
        assert!((mean - 5.0).abs() < 0.05, "{}", mean);
    }

    #[test]
    fn test_thresholds() {
        let counter = GeigerCounter::new();
        assert!(counter.send("ALERT:READING:THRESHOLD?").is_err());
        counter.send("ALERT:READING:THRESHOLD 10").unwrap();
        counter.send("ALERT:EXPOSURE:THRESHOLD 25").unwrap();
        assert_eq!(counter.send("alert:reading:threshold?").unwrap(), Value::Float(10.0));
        assert_eq!(counter.send("ALERT:EXPOSURE:THRESHOLD?").unwrap(), Value::Float(25.0));
        assert_eq!(counter.send("*IDN?").unwrap(), Value::from(IDN));
    }

    #[test]
    fn test_readings_raise_alerts() {
        let counter = GeigerCounter::new();
        let link = attached(&counter);
        counter.send("ALERT:READING:THRESHOLD 10").unwrap();
        counter.send("ALERT:EXPOSURE:THRESHOLD 25").unwrap();

        counter.record(5.0);
        assert_eq!(link.status.peek(), 0);
        assert_eq!(counter.send("MEAS:READING?").unwrap(), Value::Float(5.0));

        counter.record(15.0);
        assert_eq!(link.status.peek(), GeigerBits::READING_LIMIT | StatusBits::REQUEST_SERVICE);
        counter.send("*CLS").unwrap();

        counter.record(6.0);
        assert_eq!(link.status.peek(), GeigerBits::EXPOSURE_LIMIT | StatusBits::REQUEST_SERVICE);
        assert_eq!(counter.send("MEAS:EXPOSURE?").unwrap(), Value::Float(26.0));
        assert_eq!(link.events.pending(EventKind::ServiceRequest).unwrap(), 2);
        counter.detach(&link);
    }

    #[test_log::test]
    fn test_start_stop_sampling() {
        let counter = GeigerCounter::with_period(Duration::from_millis(5));
        counter.send("MEAS:START").unwrap();
        counter.send("MEAS:START").unwrap();
        assert!(counter.is_running());
        thread::sleep(Duration::from_millis(50));
        counter.send("MEAS:STOP").unwrap();
        assert!(!counter.is_running());

        let taken = counter.reading_count();
        assert!(taken > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.reading_count(), taken);
        assert!(counter.send("MEAS:READING?").is_ok());
    }

    #[test]
    fn test_close_stops_sampling() {
        let counter = GeigerCounter::with_period(Duration::from_millis(5));
        let link = attached(&counter);
        counter.start();
        counter.detach(&link);
        assert!(!counter.is_running());
    }
}
