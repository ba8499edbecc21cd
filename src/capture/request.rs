//! Capture request as given by the caller

use std::str::FromStr;

use super::planner::{FrequencyPlan, PlanError};
use crate::sdr::{NARROWBAND_SAMPLE_RATE_HZ, SWEPT_SAMPLE_RATE_HZ};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Tile ±10 MHz around the center into 20 MHz windows
    #[default]
    Swept,
    /// One pass at the center frequency
    Narrowband,
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "swept" | "sweep" | "rx" => Ok(CaptureMode::Swept),
            "narrowband" | "narrow" | "tdt" => Ok(CaptureMode::Narrowband),
            other => Err(format!("unknown capture mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Swept => write!(f, "swept"),
            CaptureMode::Narrowband => write!(f, "narrowband"),
        }
    }
}

/// Parameters of one capture run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Complex samples to store per band
    pub sample_quota: u64,
    pub center_freq_mhz: u64,
    /// Capture at most this many bands of the plan (`None` for all)
    pub band_count: Option<usize>,
    pub mode: CaptureMode,
    pub lna_gain_db: u32,
    pub vga_gain_db: u32,
    /// Shift the swept span up 2 MHz to fill gaps between windows
    pub second_sample: bool,
}

impl CaptureRequest {
    pub fn sample_rate_hz(&self) -> u64 {
        match self.mode {
            CaptureMode::Swept => SWEPT_SAMPLE_RATE_HZ,
            CaptureMode::Narrowband => NARROWBAND_SAMPLE_RATE_HZ,
        }
    }

    pub fn plan(&self) -> Result<FrequencyPlan, PlanError> {
        match self.mode {
            CaptureMode::Swept => FrequencyPlan::swept_around(
                self.center_freq_mhz,
                self.second_sample,
                SWEPT_SAMPLE_RATE_HZ,
            ),
            CaptureMode::Narrowband => FrequencyPlan::narrowband_mhz(self.center_freq_mhz),
        }
    }
}
