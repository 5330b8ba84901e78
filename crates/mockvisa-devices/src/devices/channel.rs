/*!
 * Composed instruments.
 *
 * A [`Channel`] knows only `:VOLTage`. A [`ChannelBank`] exposes its channels
 * behind `:CHANNEL<n>` and a [`Rack`] exposes its banks behind
 * `:INSTRument<n>`, so `:INSTR2:CHANNEL1:VOLT 3` reaches the first channel of
 * the second bank through two routes.
 */
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use mockvisa_core::dispatch::{CommandSet, Commands};
use mockvisa_core::error::Result as CoreResult;

use crate::instrument::{Instrument, InstrumentCore};

/// Channels per bank and banks per rack
pub const UNITS: usize = 2;

/// Pick unit `index` (1-based) out of `units`
fn unit<T>(units: &[Arc<T>], index: i64) -> Option<Arc<T>> {
    let index = usize::try_from(index).ok()?.checked_sub(1)?;
    units.get(index).cloned()
}

/// One voltage channel, reachable only through a [`ChannelBank`]
#[derive(Default)]
pub struct Channel {
    voltage: Mutex<f64>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("voltage", &*self.voltage.lock()).finish()
    }
}

impl Channel {
    /// Channel at `0.0`
    pub fn new() -> Self {
        Self::default()
    }

    /// Current setting
    pub fn voltage(&self) -> f64 {
        *self.voltage.lock()
    }

    fn set_voltage(&self, volts: f64) {
        *self.voltage.lock() = volts;
    }
}

impl Commands for Channel {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.scpi(":VOLTage (.*)", Self::set_voltage)?
            .scpi(":VOLTage\\?", Self::voltage)?;
        Ok(())
    }
}

/// Channels addressed as `:CHANNEL<n>`, numbered from 1
pub struct ChannelBank {
    core: InstrumentCore,
    channels: Vec<Arc<Channel>>,
}

impl fmt::Debug for ChannelBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBank").field("channels", &self.channels).finish()
    }
}

impl Default for ChannelBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBank {
    /// Bank of [`UNITS`] channels
    pub fn new() -> Self {
        Self {
            core: InstrumentCore::new(),
            channels: (0..UNITS).map(|_| Arc::new(Channel::new())).collect(),
        }
    }

    /// Channel `index`, numbered from 1
    pub fn channel(&self, index: i64) -> Option<Arc<Channel>> {
        unit(&self.channels, index)
    }
}

impl Commands for ChannelBank {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.subsystem::<Channel, _, _>(":CHANNEL(.*)", Self::channel)?;
        Ok(())
    }
}

impl Instrument for ChannelBank {
    fn core(&self) -> &InstrumentCore {
        &self.core
    }
}

/// Banks addressed as `:INSTRument<n>`, numbered from 1
pub struct Rack {
    core: InstrumentCore,
    banks: Vec<Arc<ChannelBank>>,
}

impl fmt::Debug for Rack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rack").field("banks", &self.banks).finish()
    }
}

impl Default for Rack {
    fn default() -> Self {
        Self::new()
    }
}

impl Rack {
    /// Rack of [`UNITS`] banks
    pub fn new() -> Self {
        Self {
            core: InstrumentCore::new(),
            banks: (0..UNITS).map(|_| Arc::new(ChannelBank::new())).collect(),
        }
    }

    /// Bank `index`, numbered from 1
    pub fn bank(&self, index: i64) -> Option<Arc<ChannelBank>> {
        unit(&self.banks, index)
    }
}

impl Commands for Rack {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.subsystem::<ChannelBank, _, _>(":INSTRument(.*)", Self::bank)?;
        Ok(())
    }
}

impl Instrument for Rack {
    fn core(&self) -> &InstrumentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Device;
    use mockvisa_core::dispatch::{CallDelays, CommandRegistry};
    use mockvisa_core::error::Error as CoreError;
    use mockvisa_core::types::Value;

    #[test]
    fn test_bank_routes_to_channels() {
        let bank = ChannelBank::new();
        bank.send(":CHANNEL1:VOLT 12").unwrap();
        assert_eq!(bank.send(":channel1:voltage?").unwrap(), Value::Float(12.0));
        assert_eq!(bank.send(":CHANNEL2:VOLT?").unwrap().to_string(), "0.0");
        assert_eq!(bank.channel(1).unwrap().voltage(), 12.0);
    }

    #[test]
    fn test_rack_routes_through_two_levels() {
        let rack = Rack::new();
        rack.send(":INSTR2:CHANNEL1:VOLT 3.5").unwrap();
        assert_eq!(rack.send(":instrument2:channel1:volt?").unwrap(), Value::Float(3.5));
        assert_eq!(rack.send(":INSTR1:CHANNEL1:VOLT?").unwrap(), Value::Float(0.0));
        assert_eq!(rack.bank(2).unwrap().channel(1).unwrap().voltage(), 3.5);
    }

    #[test]
    fn test_missing_unit() {
        let rack = Rack::new();
        for command in [":INSTR3:CHANNEL1:VOLT?", ":INSTR1:CHANNEL0:VOLT?", ":INSTR-1:CHANNEL1:VOLT?"] {
            let err = rack.send(command).unwrap_err();
            assert!(
                matches!(err.as_command(), Some(CoreError::NoSuchUnit(_))),
                "{}: {}",
                command,
                err
            );
        }
    }

    #[test]
    fn test_channel_alone() {
        let registry = CommandRegistry::new();
        let channel = Channel::new();
        let delays = CallDelays::default();
        registry.dispatch(&channel, &delays, ":VOLT 1.5").unwrap();
        assert_eq!(channel.voltage(), 1.5);
        assert!(registry.dispatch(&channel, &delays, ":CHANNEL1:VOLT?").is_err());
    }

    #[test]
    fn test_composed_signatures() {
        let rack = Rack::new();
        let commands = rack.commands().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .any(|(template, signature)| template.ends_with(":VOLTage (.*)") && signature.args.len() == 3));
    }
}
