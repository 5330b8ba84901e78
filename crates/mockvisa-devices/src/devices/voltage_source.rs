/*!
 * Multi-channel voltage source.
 */
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use mockvisa_core::dispatch::{CommandSet, Commands};
use mockvisa_core::error::Result as CoreResult;

use crate::instrument::{Instrument, InstrumentCore};

/// A voltage source addressed as `:INSTRument:CHANNEL<n>:VOLTage`.
///
/// Every channel starts at `0.0`. Reading a voltage back multiplies it by the
/// source's gain.
pub struct VoltageSource {
    core: InstrumentCore,
    gain: f64,
    voltages: Mutex<HashMap<i64, f64>>,
}

impl fmt::Debug for VoltageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoltageSource")
            .field("gain", &self.gain)
            .field("voltages", &*self.voltages.lock())
            .finish()
    }
}

impl Default for VoltageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VoltageSource {
    /// Source with unit gain
    pub fn new() -> Self {
        Self::with_gain(1.0)
    }

    /// Source reading back twice what was set
    pub fn doubling() -> Self {
        Self::with_gain(2.0)
    }

    /// Source with an arbitrary read-back gain
    pub fn with_gain(gain: f64) -> Self {
        Self {
            core: InstrumentCore::new(),
            gain,
            voltages: Mutex::new(HashMap::new()),
        }
    }

    /// Apply `delay` before every command
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.core = InstrumentCore::with_call_delay(delay);
        self
    }

    /// Read-back gain
    pub fn gain(&self) -> f64 {
        self.gain
    }

    fn set_voltage(&self, channel: i64, volts: f64) {
        debug!(channel, volts, "Setting voltage");
        self.voltages.lock().insert(channel, volts);
    }

    fn voltage(&self, channel: i64) -> f64 {
        self.voltages.lock().get(&channel).copied().unwrap_or(0.0) * self.gain
    }
}

impl Commands for VoltageSource {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.scpi(":INSTRument:CHANNEL(.*):VOLTage (.*)", Self::set_voltage)?
            .scpi(":INSTRument:CHANNEL(.*):VOLTage\\?", Self::voltage)?;
        Ok(())
    }
}

impl Instrument for VoltageSource {
    fn core(&self) -> &InstrumentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Device;
    use mockvisa_core::types::Value;

    #[test]
    fn test_channels_are_independent() {
        let source = VoltageSource::new();
        source.send(":INSTR:CHANNEL1:VOLT 12").unwrap();
        assert_eq!(source.send(":instrument:channel1:voltage?").unwrap(), Value::Float(12.0));
        assert_eq!(source.send(":INSTR:CHANNEL2:VOLT?").unwrap(), Value::Float(0.0));
    }

    #[test]
    fn test_doubling_gain() {
        let source = VoltageSource::doubling();
        source.send(":INSTR:CHANNEL1:VOLT 13.4").unwrap();
        assert_eq!(source.send(":INSTR:CHANNEL1:VOLT?").unwrap().to_string(), "26.8");
    }

    #[test]
    fn test_bad_channel_is_an_argument_error() {
        let source = VoltageSource::new();
        let err = source.send(":INSTR:CHANNELx:VOLT 1").unwrap_err();
        assert!(matches!(
            err.as_command(),
            Some(mockvisa_core::error::Error::Argument(_))
        ));
    }
}
