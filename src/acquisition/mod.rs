//! Analog acquisition module
//!
//! Abstracts over where raw ADC readings come from:
//! - Linux: an MCP3008 (or any SPI ADC) exposed through the kernel IIO subsystem
//! - Simulated: a deterministic soil drying curve for demos and tests

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

#[cfg(target_os = "linux")]
pub use linux::IioAdc;
pub use simulated::SimulatedProbe;

use crate::core::{Error, Result};

/// Analog monitor that abstracts over different acquisition sources
pub struct AnalogMonitor {
    source: Box<dyn AnalogSource>,
}

impl AnalogMonitor {
    /// Open the ADC attached to SPI bus `port`, chip select `device`
    #[cfg(target_os = "linux")]
    pub fn open(port: u32, device: u32) -> Result<Self> {
        let adc = IioAdc::open(port, device)?;
        log::info!("Using {} for acquisition", adc.name());
        Ok(Self::from_source(adc))
    }

    /// Open the ADC attached to SPI bus `port`, chip select `device`
    #[cfg(not(target_os = "linux"))]
    pub fn open(port: u32, device: u32) -> Result<Self> {
        Err(Error::PermanentAcquisition(format!(
            "no ADC driver for spi{}.{} on this platform",
            port, device
        )))
    }

    /// Use the simulated probe
    pub fn simulated() -> Self {
        Self::from_source(SimulatedProbe::new())
    }

    /// Wrap any source
    pub fn from_source(source: impl AnalogSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Read the raw value of `channel`
    pub fn read_channel(&mut self, channel: u32) -> Result<i32> {
        self.source.read_channel(channel)
    }

    /// Get the name of the current source
    pub fn get_source_name(&self) -> &str {
        self.source.name()
    }

    /// Release the underlying device
    pub fn release(&mut self) {
        self.source.release();
    }
}

/// Trait for analog acquisition sources
pub trait AnalogSource {
    /// Read one raw sample.
    ///
    /// Must return `Error::TransientAcquisition` for failures worth retrying
    /// on the next tick and `Error::PermanentAcquisition` when the device is
    /// gone for good.
    fn read_channel(&mut self, channel: u32) -> Result<i32>;

    /// Name of this source
    fn name(&self) -> &str;

    /// Release any held resources. Reads after this are permanent errors.
    fn release(&mut self) {}
}

/// Map an I/O error from a device read into the acquisition taxonomy
pub(crate) fn classify_io(context: &str, err: std::io::Error) -> Error {
    match err.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            Error::PermanentAcquisition(format!("{}: {}", context, err))
        }
        _ => Error::TransientAcquisition(format!("{}: {}", context, err)),
    }
}
