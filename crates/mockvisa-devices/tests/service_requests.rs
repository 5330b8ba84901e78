//! Service requests raised by instruments and awaited by clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mockvisa_devices::devices::geiger::GeigerBits;
use mockvisa_devices::devices::{Dmm, GeigerCounter};
use mockvisa_devices::{EventKind, ResourceManager, ResourceRegistry, StatusBits};

const MEASUREMENT_TIME: Duration = Duration::from_millis(100);

fn dmm_manager() -> ResourceManager {
    let registry = Arc::new(ResourceRegistry::new());
    registry.register(
        "MOCK0::dmm::INSTR".parse().unwrap(),
        Arc::new(Dmm::with_measurement_time(MEASUREMENT_TIME)),
    );
    ResourceManager::new(registry)
}

#[test_log::test]
fn test_measurement_scenario() {
    let rm = dmm_manager();
    let dmm = rm.open_resource("MOCK0::dmm::INSTR").unwrap();

    let started = Instant::now();
    dmm.write(":instr:channel1:volt 12").unwrap();
    assert!(started.elapsed() < MEASUREMENT_TIME / 2);

    let started = Instant::now();
    assert_eq!(dmm.query(":inStrument:channel1:vOlT?").unwrap(), "12.0");
    assert!(started.elapsed() > MEASUREMENT_TIME / 2);

    dmm.write("*CLS").unwrap();
    let started = Instant::now();
    dmm.write(":inStrument:channel1:MEAS").unwrap();
    assert!(started.elapsed() < MEASUREMENT_TIME / 2);

    assert!(dmm.wait_for_srq(Some(Duration::ZERO)).unwrap_err().is_timeout());

    let started = Instant::now();
    let stb = dmm.wait_for_srq(None).unwrap();
    assert!(started.elapsed() > MEASUREMENT_TIME / 2);
    assert_ne!(stb & StatusBits::REQUEST_SERVICE, 0);

    let started = Instant::now();
    assert_eq!(dmm.query(":inStrument:channel1:REAd?").unwrap(), "12.0");
    assert!(started.elapsed() < MEASUREMENT_TIME / 2);
}

#[test]
fn test_wait_for_srq_times_out() {
    let rm = dmm_manager();
    let dmm = rm.open_resource("MOCK0::dmm::INSTR").unwrap();

    let started = Instant::now();
    let err = dmm.wait_for_srq(Some(Duration::from_millis(30))).unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_millis(30));
    // The queue stays enabled for the next wait
    assert!(dmm.session().events().is_enabled(EventKind::ServiceRequest));
}

#[test]
fn test_wait_for_srq_clears_status_and_queue() {
    let rm = dmm_manager();
    let dmm = rm.open_resource("MOCK0::dmm::INSTR").unwrap();
    dmm.enable_event(EventKind::ServiceRequest).unwrap();
    dmm.enable_event(EventKind::ServiceRequest).unwrap();

    dmm.write(":INSTR:CHANNEL2:VOLT 0.5").unwrap();
    dmm.write(":INSTR:CHANNEL2:MEAS").unwrap();
    dmm.wait_for_srq(Some(Duration::from_secs(5))).unwrap();

    assert_eq!(dmm.read_stb().unwrap(), 0);
    assert_eq!(
        dmm.session().events().pending(EventKind::ServiceRequest).unwrap(),
        0
    );
    assert_eq!(dmm.query(":INSTR:CHANNEL2:READ?").unwrap(), "0.5");

    dmm.disable_event(EventKind::ServiceRequest).unwrap();
    dmm.disable_event(EventKind::ServiceRequest).unwrap();
}

#[test]
fn test_measurement_without_enabled_queue_sets_status_only() {
    let rm = dmm_manager();
    let dmm = rm.open_resource("MOCK0::dmm::INSTR").unwrap();
    dmm.write(":INSTR:CHANNEL1:MEAS").unwrap();
    std::thread::sleep(MEASUREMENT_TIME * 3);

    assert_eq!(dmm.read_stb().unwrap(), StatusBits::REQUEST_SERVICE);
    assert_eq!(dmm.query(":INSTR:CHANNEL1:READ?").unwrap(), "0.0");
}

#[test_log::test]
fn test_geiger_counter_alert() {
    let registry = Arc::new(ResourceRegistry::new());
    let counter = registry.register_instrument(
        "MOCK0::geiger::INSTR".parse().unwrap(),
        GeigerCounter::with_period(Duration::from_millis(5)),
    );
    let rm = ResourceManager::new(registry);
    let geiger = rm.open_resource("MOCK0::geiger::INSTR").unwrap();

    assert_eq!(geiger.query("*IDN?").unwrap(), "geiger counter:fake corp:123456");
    geiger.write("ALERT:READING:THRESHOLD 100").unwrap();
    geiger.write("ALERT:EXPOSURE:THRESHOLD 1e12").unwrap();
    geiger.enable_event(EventKind::ServiceRequest).unwrap();
    geiger.write("MEAS:START").unwrap();

    // Readings spread by 1000 around 1, so one passes 100 quickly
    let stb = geiger.wait_for_srq(Some(Duration::from_secs(10))).unwrap();
    assert_ne!(stb & GeigerBits::READING_LIMIT, 0);
    assert_ne!(stb & StatusBits::REQUEST_SERVICE, 0);

    geiger.write("MEAS:STOP").unwrap();
    assert!(!counter.is_running());
    assert!(geiger.query("MEAS:READING?").unwrap().parse::<f64>().is_ok());
    assert!(geiger.query("MEAS:EXPOSURE?").unwrap().parse::<f64>().is_ok());
}

#[test]
fn test_closing_last_session_stops_sampling() {
    let registry = Arc::new(ResourceRegistry::new());
    let counter = registry.register_instrument(
        "MOCK0::geiger::INSTR".parse().unwrap(),
        GeigerCounter::with_period(Duration::from_millis(5)),
    );
    let rm = ResourceManager::new(registry);
    let geiger = rm.open_resource("MOCK0::geiger::INSTR").unwrap();
    geiger.write("MEAS:START").unwrap();
    assert!(counter.is_running());

    rm.close(geiger.handle()).unwrap();
    assert!(!counter.is_running());
}

#[test]
fn test_first_session_outlives_second() {
    let registry = Arc::new(ResourceRegistry::new());
    let counter = registry.register_instrument(
        "MOCK0::geiger::INSTR".parse().unwrap(),
        GeigerCounter::with_period(Duration::from_millis(5)),
    );
    let rm = ResourceManager::new(registry);
    let first = rm.open_resource("MOCK0::geiger::INSTR").unwrap();
    let second = rm.open_resource("MOCK0::geiger::INSTR").unwrap();
    first.write("MEAS:START").unwrap();
    first.write("ALERT:READING:THRESHOLD 10").unwrap();

    rm.close(second.handle()).unwrap();
    assert!(counter.is_running());

    first.write("MEAS:STOP").unwrap();
    first.enable_event(EventKind::ServiceRequest).unwrap();
    counter.record(50.0);
    let stb = first.wait_for_srq(Some(Duration::from_millis(500))).unwrap();
    assert_ne!(stb & GeigerBits::READING_LIMIT, 0);

    first.write("MEAS:START").unwrap();
    rm.close(first.handle()).unwrap();
    assert!(!counter.is_running());
}

#[test]
fn test_status_byte_is_per_session() {
    let registry = Arc::new(ResourceRegistry::new());
    let counter = registry.register_instrument(
        "MOCK0::geiger::INSTR".parse().unwrap(),
        GeigerCounter::new(),
    );
    let rm = ResourceManager::new(registry);
    let first = rm.open_resource("MOCK0::geiger::INSTR").unwrap();
    let second = rm.open_resource("MOCK0::geiger::INSTR").unwrap();
    first.write("ALERT:READING:THRESHOLD 10").unwrap();

    counter.record(50.0);
    let alert = GeigerBits::READING_LIMIT | StatusBits::REQUEST_SERVICE;
    assert_eq!(second.read_stb().unwrap(), alert);
    assert_eq!(first.read_stb().unwrap(), alert);
    assert_eq!(first.read_stb().unwrap(), 0);
}
