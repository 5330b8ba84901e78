/*!
 * MockVISA Core
 *
 * This crate provides the command engine of the MockVISA simulator: the SCPI
 * pattern compiler, typed handlers and their composition, per-type dispatch
 * tables, configuration, and logging.
 */

#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logging;
pub mod pattern;
pub mod prelude;
pub mod types;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use bytes;
    pub use parking_lot;
    pub use regex;
    pub use serde;
    pub use tracing;
}

/// MockVISA core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("MockVISA Core {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
