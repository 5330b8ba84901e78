/*!
 * Fixture instruments.
 *
 * Small simulated instruments used by the tests, the demo and the CLI.
 * [`default_resources`] names them the way a client would open them.
 */
use std::sync::Arc;

use crate::instrument::Device;
use crate::resource_name::ResourceName;

pub mod channel;
pub mod digitizer;
pub mod dmm;
pub mod geiger;
pub mod pass_fail;
pub mod voltage_source;

pub use channel::{Channel, ChannelBank, Rack};
pub use digitizer::Digitizer;
pub use dmm::Dmm;
pub use geiger::GeigerCounter;
pub use pass_fail::PassFail;
pub use voltage_source::VoltageSource;

/// The fixture set, each on board 0 of the `MOCK` interface
pub fn default_resources() -> Vec<(ResourceName, Arc<dyn Device>)> {
    let devices: Vec<(&str, Arc<dyn Device>)> = vec![
        ("mock1", Arc::new(VoltageSource::new())),
        ("mock2", Arc::new(VoltageSource::doubling())),
        ("mock3", Arc::new(ChannelBank::new())),
        ("mock4", Arc::new(Rack::new())),
        ("mock5", Arc::new(Dmm::new())),
        ("mock6", Arc::new(PassFail::new())),
        ("mock7", Arc::new(Digitizer::new())),
        ("geiger", Arc::new(GeigerCounter::new())),
    ];

    devices
        .into_iter()
        .map(|(name, device)| (ResourceName::new(0, name), device))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_fixture_builds_its_table() {
        let resources = default_resources();
        assert_eq!(resources.len(), 8);
        for (name, device) in &resources {
            let commands = device.commands().unwrap();
            assert!(!commands.is_empty(), "{}", name);
        }
        assert_eq!(resources[0].0.to_string(), "MOCK0::mock1::INSTR");
    }
}
