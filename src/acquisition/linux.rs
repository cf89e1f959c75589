//! Linux ADC acquisition through the IIO subsystem
//!
//! The `mcp320x` kernel driver exposes each MCP3008 channel as
//! `/sys/bus/iio/devices/iio:deviceN/in_voltage<channel>_raw`. The IIO device
//! is matched to the configured SPI bus/chip select through its sysfs parent,
//! which is named `spi<port>.<device>`.

use crate::acquisition::{classify_io, AnalogSource};
use crate::core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const SYSFS_ROOT: &str = "/sys";

/// SPI ADC exposed as an IIO device
pub struct IioAdc {
    device_path: Option<PathBuf>,
    name: String,
}

impl IioAdc {
    pub fn open(port: u32, device: u32) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_ROOT), port, device)
    }

    /// Open under an alternate sysfs root
    pub fn open_at(sysfs: &Path, port: u32, device: u32) -> Result<Self> {
        let iio_base = sysfs.join("bus/iio/devices");
        let spi_name = format!("spi{}.{}", port, device);

        if !iio_base.exists() {
            return Err(Error::PermanentAcquisition(
                "IIO not available (is the SPI ADC overlay loaded?)".to_string(),
            ));
        }

        let entries = fs::read_dir(&iio_base)
            .map_err(|e| Error::PermanentAcquisition(format!("{}: {}", iio_base.display(), e)))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(real) = fs::canonicalize(&path) else {
                continue;
            };
            let parent = real.parent().and_then(|p| p.file_name());
            if parent.map_or(true, |p| p != spi_name.as_str()) {
                continue;
            }

            let chip = fs::read_to_string(real.join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "adc".to_string());
            log::info!("Found {} on {} at {:?}", chip, spi_name, real);

            return Ok(Self {
                device_path: Some(real),
                name: format!("{} ({})", chip, spi_name),
            });
        }

        Err(Error::PermanentAcquisition(format!(
            "no IIO ADC found on {}",
            spi_name
        )))
    }
}

impl AnalogSource for IioAdc {
    fn read_channel(&mut self, channel: u32) -> Result<i32> {
        let device_path = self.device_path.as_ref().ok_or_else(|| {
            Error::PermanentAcquisition(format!("{} has been released", self.name))
        })?;
        let raw_path = device_path.join(format!("in_voltage{}_raw", channel));

        let raw = fs::read_to_string(&raw_path)
            .map_err(|e| classify_io(&format!("channel {}", channel), e))?;

        raw.trim().parse().map_err(|_| {
            Error::TransientAcquisition(format!(
                "channel {} returned {:?}",
                channel,
                raw.trim()
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) {
        if self.device_path.take().is_some() {
            log::debug!("Released {}", self.name);
        }
    }
}
