use std::time::Duration;

use mockvisa_devices::devices::geiger::GeigerBits;
use mockvisa_devices::{EventKind, ResourceManager, StatusBits};

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Open the counter among the fixture instruments
    let rm = ResourceManager::with_defaults();
    info!("Available resources: {:?}", rm.list_resources(None)?);
    let geiger = rm.open_resource("MOCK0::geiger::INSTR")?;
    info!("Connected to {}", geiger.query("*IDN?")?);

    // Alert on a single reading above 1500 or on 20000 accumulated
    geiger.write("ALERT:READING:THRESHOLD 1500")?;
    geiger.write("ALERT:EXPOSURE:THRESHOLD 20000")?;
    geiger.enable_event(EventKind::ServiceRequest)?;
    geiger.write("MEAS:START")?;

    for _ in 0..5 {
        match geiger.wait_for_srq(Some(Duration::from_secs(2))) {
            Ok(stb) => {
                if stb & GeigerBits::READING_LIMIT != 0 {
                    info!("Reading alert: {}", geiger.query("MEAS:READING?")?);
                }
                if stb & GeigerBits::EXPOSURE_LIMIT != 0 {
                    info!("Exposure alert: {}", geiger.query("MEAS:EXPOSURE?")?);
                }
                debug_assert!(stb & StatusBits::REQUEST_SERVICE != 0);
            }
            Err(e) if e.is_timeout() => warn!("No alert within 2 s"),
            Err(e) => return Err(e.into()),
        }
    }

    geiger.write("MEAS:STOP")?;
    info!("Total exposure: {}", geiger.query("MEAS:EXPOSURE?")?);

    rm.close_all();
    Ok(())
}
