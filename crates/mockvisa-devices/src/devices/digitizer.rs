/*!
 * Digitizer returning binary waveforms.
 */
use bytes::Bytes;
use parking_lot::RwLock;

use mockvisa_core::dispatch::{CommandSet, Commands};
use mockvisa_core::error::Result as CoreResult;

use crate::binary::to_ieee_block;
use crate::instrument::{Instrument, InstrumentCore};

/// Waveform loaded at construction
pub const DEFAULT_WAVEFORM: [f32; 3] = [1.0, 2.0, 3.0];

/// `FETCh?` answers the waveform as comma-separated ASCII bytes and
/// `FETCh:BLOCk?` as an IEEE definite-length block.
#[derive(Debug)]
pub struct Digitizer {
    core: InstrumentCore,
    waveform: RwLock<Vec<f32>>,
}

impl Default for Digitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Digitizer {
    /// Digitizer holding [`DEFAULT_WAVEFORM`]
    pub fn new() -> Self {
        Self::with_waveform(DEFAULT_WAVEFORM.to_vec())
    }

    /// Digitizer holding `waveform`
    pub fn with_waveform(waveform: Vec<f32>) -> Self {
        Self {
            core: InstrumentCore::new(),
            waveform: RwLock::new(waveform),
        }
    }

    /// Replace the stored waveform
    pub fn load(&self, waveform: Vec<f32>) {
        *self.waveform.write() = waveform;
    }

    fn fetch(&self) -> Bytes {
        let text: Vec<String> = self.waveform.read().iter().map(|v| format!("{:?}", v)).collect();
        Bytes::from(text.join(","))
    }

    fn fetch_block(&self) -> Bytes {
        to_ieee_block(&self.waveform.read())
    }

    fn points(&self) -> usize {
        self.waveform.read().len()
    }
}

impl Commands for Digitizer {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.scpi("FETCh\\?", Self::fetch)?
            .scpi("FETCh:BLOCk\\?", Self::fetch_block)?
            .scpi(":WAVeform:POINts\\?", Self::points)?;
        Ok(())
    }
}

impl Instrument for Digitizer {
    fn core(&self) -> &InstrumentCore {
        &self.core
    }
}
