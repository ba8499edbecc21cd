//! RF input selection
//!
//! The front end has two RF inputs; captures whose low edge is above 1 GHz
//! use RF1, everything else uses RF2.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, info};

/// Highest low-edge frequency still served by RF2
const HIGH_BAND_THRESHOLD_HZ: u64 = 999_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfPath {
    /// High band input (above 1 GHz)
    Rf1,
    /// Low band input
    Rf2,
}

impl RfPath {
    /// Select the path from the low edge of the captured span
    pub fn for_low_edge(lo_hz: u64) -> Self {
        if lo_hz > HIGH_BAND_THRESHOLD_HZ {
            RfPath::Rf1
        } else {
            RfPath::Rf2
        }
    }

    pub fn is_high_band(&self) -> bool {
        matches!(self, RfPath::Rf1)
    }
}

impl std::fmt::Display for RfPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RfPath::Rf1 => write!(f, "RF1"),
            RfPath::Rf2 => write!(f, "RF2"),
        }
    }
}

/// Antenna path switch driver
pub trait AntennaSwitch: Send {
    fn select_path(&mut self, high_band: bool) -> io::Result<()>;
}

/// Switch for boards without a controllable RF switch; only logs the choice
#[derive(Debug, Default)]
pub struct LoggingSwitch;

impl AntennaSwitch for LoggingSwitch {
    fn select_path(&mut self, high_band: bool) -> io::Result<()> {
        debug!(
            "Antenna path {} requested (no switch attached)",
            if high_band { RfPath::Rf1 } else { RfPath::Rf2 }
        );
        Ok(())
    }
}

/// Switch driven by a sysfs GPIO `value` file: `1` selects RF1, `0` selects RF2
#[derive(Debug)]
pub struct GpioSwitch {
    value_path: PathBuf,
}

impl GpioSwitch {
    pub fn new(value_path: impl Into<PathBuf>) -> Self {
        Self {
            value_path: value_path.into(),
        }
    }
}

impl AntennaSwitch for GpioSwitch {
    fn select_path(&mut self, high_band: bool) -> io::Result<()> {
        fs::write(&self.value_path, if high_band { "1\n" } else { "0\n" })?;
        info!(
            "Antenna switched to {} via {}",
            if high_band { RfPath::Rf1 } else { RfPath::Rf2 },
            self.value_path.display()
        );
        Ok(())
    }
}
