//! Configuration loaded from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::capture::{CaptureMode, CaptureRequest, EngineConfig, BYTES_PER_SAMPLE};
use crate::sdr::{HackRfConfig, LNA_GAIN_MAX_DB, VGA_GAIN_MAX_DB};
use crate::spectrum::{WelchParams, WindowFunction};

/// Which front end to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdrBackend {
    HackRf,
    Simulated,
}

impl FromStr for SdrBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hackrf" => Ok(SdrBackend::HackRf),
            "simulated" | "sim" => Ok(SdrBackend::Simulated),
            other => Err(format!("unknown SDR backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name}={value} is not valid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Complex samples stored per band
    pub sample_quota: u64,

    /// Capture center frequency in MHz
    pub center_freq_mhz: u64,

    /// Capture at most this many bands (unset or 0 for all)
    pub band_count: Option<usize>,

    pub mode: CaptureMode,

    /// LNA (IF) gain, 0-40 dB in 8 dB steps
    pub lna_gain_db: u32,

    /// VGA (baseband) gain, 0-62 dB in 2 dB steps
    pub vga_gain_db: u32,

    /// Shift the swept span up 2 MHz
    pub second_sample: bool,

    /// Raw capture files, one per band
    pub samples_dir: PathBuf,

    /// PSD CSV files
    pub outputs_dir: PathBuf,

    /// Upper bound on each pass's streaming phase
    pub acquisition_interval_ms: u64,

    /// Ring size in bytes for buffered capture; unset writes directly
    pub ring_capacity: Option<usize>,

    pub segment_length: usize,
    pub overlap: f64,
    pub window: WindowFunction,

    pub backend: SdrBackend,
    pub hackrf_transfer_path: String,
    pub hackrf_info_path: String,
    pub hackrf_serial: Option<String>,

    /// sysfs GPIO value file driving the RF switch
    pub antenna_gpio_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            sample_quota: parsed(&lookup, "CAPTURE_SAMPLES").unwrap_or(2_000_000),

            center_freq_mhz: parsed(&lookup, "CENTER_FREQ_MHZ").unwrap_or(200),

            band_count: lookup("BAND_COUNT")
                .and_then(|s| s.trim().parse().ok())
                .filter(|&n: &usize| n > 0),

            mode: lookup("CAPTURE_MODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),

            lna_gain_db: parsed(&lookup, "LNA_GAIN").unwrap_or(32),

            vga_gain_db: parsed(&lookup, "VGA_GAIN").unwrap_or(32),

            second_sample: lookup("SECOND_SAMPLE")
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),

            samples_dir: lookup("SAMPLES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("Samples")),

            outputs_dir: lookup("OUTPUTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("Outputs")),

            // A pass that moves nothing for a whole second is a dead board
            acquisition_interval_ms: parsed(&lookup, "ACQUISITION_INTERVAL_MS").unwrap_or(1000),

            ring_capacity: lookup("RING_CAPACITY").and_then(|s| s.trim().parse().ok()),

            segment_length: parsed(&lookup, "SEGMENT_LENGTH").unwrap_or(4096),

            overlap: parsed(&lookup, "OVERLAP").unwrap_or(0.75),

            window: lookup("WINDOW")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),

            backend: lookup("SDR_BACKEND")
                .and_then(|s| s.parse().ok())
                .unwrap_or(SdrBackend::HackRf),

            hackrf_transfer_path: lookup("HACKRF_TRANSFER_PATH")
                .unwrap_or_else(|| "hackrf_transfer".to_string()),

            hackrf_info_path: lookup("HACKRF_INFO_PATH")
                .unwrap_or_else(|| "hackrf_info".to_string()),

            hackrf_serial: lookup("HACKRF_SERIAL").filter(|s| !s.trim().is_empty()),

            antenna_gpio_path: lookup("ANTENNA_GPIO_PATH").map(PathBuf::from),
        }
    }

    /// Reject values the capture or estimator would fail on later
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_quota == 0 {
            return Err(ConfigError::invalid("CAPTURE_SAMPLES", 0, "must be positive"));
        }
        if self.sample_quota > u64::MAX / BYTES_PER_SAMPLE {
            return Err(ConfigError::invalid(
                "CAPTURE_SAMPLES",
                self.sample_quota,
                format!("must be at most {}", u64::MAX / BYTES_PER_SAMPLE),
            ));
        }
        if self.lna_gain_db > LNA_GAIN_MAX_DB {
            return Err(ConfigError::invalid(
                "LNA_GAIN",
                self.lna_gain_db,
                format!("must be 0-{} dB", LNA_GAIN_MAX_DB),
            ));
        }
        if self.vga_gain_db > VGA_GAIN_MAX_DB {
            return Err(ConfigError::invalid(
                "VGA_GAIN",
                self.vga_gain_db,
                format!("must be 0-{} dB", VGA_GAIN_MAX_DB),
            ));
        }
        if self.acquisition_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "ACQUISITION_INTERVAL_MS",
                0,
                "must be positive",
            ));
        }
        if let Some(capacity) = self.ring_capacity {
            if capacity < 2 {
                return Err(ConfigError::invalid(
                    "RING_CAPACITY",
                    capacity,
                    "must be at least 2 bytes",
                ));
            }
        }
        if let Err(e) = self.capture_request().plan() {
            return Err(ConfigError::invalid(
                "CENTER_FREQ_MHZ",
                self.center_freq_mhz,
                e.to_string(),
            ));
        }
        if let Err(e) = self.welch_params().validate() {
            return Err(ConfigError::invalid(
                "SEGMENT_LENGTH/OVERLAP",
                format!("{}/{}", self.segment_length, self.overlap),
                e.to_string(),
            ));
        }
        Ok(())
    }

    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            sample_quota: self.sample_quota,
            center_freq_mhz: self.center_freq_mhz,
            band_count: self.band_count,
            mode: self.mode,
            lna_gain_db: self.lna_gain_db,
            vga_gain_db: self.vga_gain_db,
            second_sample: self.second_sample,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            samples_dir: self.samples_dir.clone(),
            acquisition_interval: Duration::from_millis(self.acquisition_interval_ms),
            ring_capacity: self.ring_capacity,
        }
    }

    pub fn welch_params(&self) -> WelchParams {
        WelchParams {
            segment_length: self.segment_length,
            overlap: self.overlap,
            window: self.window,
        }
    }

    pub fn hackrf_config(&self) -> HackRfConfig {
        HackRfConfig {
            transfer_path: self.hackrf_transfer_path.clone(),
            info_path: self.hackrf_info_path.clone(),
            serial: self.hackrf_serial.clone(),
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}
