/*!
 * MockVISA Devices
 *
 * This crate provides the session side of the MockVISA simulator: the status
 * byte and event queues shared between a session and its instrument, resource
 * locks, attributes, the resource manager, and a set of fixture instruments.
 */

#![warn(missing_docs)]

// Re-export core types
pub use mockvisa_core::prelude;

pub mod attribute;
pub mod binary;
pub mod devices;
pub mod error;
pub mod event;
pub mod instrument;
pub mod lock;
pub mod manager;
pub mod registry;
pub mod resource_name;
pub mod session;
pub mod status;
pub mod timeout;

// Re-export the main types for convenience
pub use error::{Result, VisaError};
pub use event::EventKind;
pub use instrument::{Device, Instrument, InstrumentCore};
pub use manager::{Resource, ResourceManager};
pub use registry::ResourceRegistry;
pub use resource_name::ResourceName;
pub use session::{Session, SessionOptions};
pub use status::{StatusBits, StatusByte};
pub use timeout::Timeout;

/// MockVISA devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device system
pub fn init() -> std::result::Result<(), mockvisa_core::error::Error> {
    tracing::info!("MockVISA Devices {} initialized", VERSION);
    Ok(())
}
