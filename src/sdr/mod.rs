//! HackRF front-end access
//!
//! The capture engine only sees the [`SdrDriver`] / [`SdrSession`] pair:
//! 1. `open()` acquires an exclusive session
//! 2. the session is tuned (sample rate, frequency, gains, hardware sync)
//! 3. `start_rx()` moves a [`TransferSink`] into the delivery context
//! 4. `stop_rx()` halts delivery and hands the sink back
//! 5. `close()` releases the hardware
//!
//! Backends: the `hackrf_transfer` command-line tools and a simulated
//! front end for bench runs without a board.

pub mod antenna;
pub mod hackrf;
pub mod simulated;

pub use antenna::{AntennaSwitch, GpioSwitch, LoggingSwitch, RfPath};
pub use hackrf::{HackRfConfig, HackRfDriver};
pub use simulated::{SimulatedConfig, SimulatedDriver};

use thiserror::Error;

use crate::capture::TransferSink;

/// Sample rate used for every swept acquisition window (also the window width)
pub const SWEPT_SAMPLE_RATE_HZ: u64 = 20_000_000;

/// Sample rate used for single-frequency captures
pub const NARROWBAND_SAMPLE_RATE_HZ: u64 = 2_000_000;

/// LNA (IF) gain range, 8 dB steps
pub const LNA_GAIN_MAX_DB: u32 = 40;
const LNA_GAIN_STEP_DB: u32 = 8;

/// VGA (baseband) gain range, 2 dB steps
pub const VGA_GAIN_MAX_DB: u32 = 62;
const VGA_GAIN_STEP_DB: u32 = 2;

const SAMPLE_RATE_MIN_HZ: u64 = 2_000_000;
const SAMPLE_RATE_MAX_HZ: u64 = 20_000_000;
const FREQ_MIN_HZ: u64 = 1_000_000;
const FREQ_MAX_HZ: u64 = 6_000_000_000;

/// Failure of a single hardware operation
#[derive(Debug, Error)]
#[error("{op}() failed: {message}")]
pub struct DeviceError {
    /// Name of the hardware operation that failed
    pub op: &'static str,
    pub message: String,
}

impl DeviceError {
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Opens exclusive hardware sessions
pub trait SdrDriver: Send {
    type Session: SdrSession;

    /// Acquire the hardware. Fails if the board is missing or busy.
    fn open(&mut self) -> Result<Self::Session, DeviceError>;
}

/// One open hardware handle
pub trait SdrSession: Send {
    fn set_sample_rate(&mut self, rate_hz: u64) -> Result<(), DeviceError>;
    fn set_freq(&mut self, freq_hz: u64) -> Result<(), DeviceError>;
    fn set_lna_gain(&mut self, gain_db: u32) -> Result<(), DeviceError>;
    fn set_vga_gain(&mut self, gain_db: u32) -> Result<(), DeviceError>;
    fn set_hw_sync_mode(&mut self, enabled: bool) -> Result<(), DeviceError>;

    /// Move the sink into the delivery context and start sample flow.
    /// The sink is invoked once per delivered block until it returns
    /// [`Flow::Stop`](crate::capture::Flow) or the stream is stopped.
    fn start_rx(&mut self, sink: TransferSink) -> Result<(), DeviceError>;

    fn is_streaming(&self) -> bool;

    /// Stop sample flow and return the sink once the delivery context has let go of it
    fn stop_rx(&mut self) -> Result<TransferSink, DeviceError>;

    fn close(self) -> Result<(), DeviceError>
    where
        Self: Sized;
}

/// Tuning state shared by the backends, validated against the HackRF limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunerSettings {
    pub sample_rate_hz: u64,
    pub freq_hz: u64,
    pub lna_gain_db: u32,
    pub vga_gain_db: u32,
    pub hw_sync: bool,
}

impl TunerSettings {
    pub fn set_sample_rate(&mut self, rate_hz: u64) -> Result<(), DeviceError> {
        if !(SAMPLE_RATE_MIN_HZ..=SAMPLE_RATE_MAX_HZ).contains(&rate_hz) {
            return Err(DeviceError::new(
                "hackrf_set_sample_rate",
                format!(
                    "{} Hz outside {}..={} Hz",
                    rate_hz, SAMPLE_RATE_MIN_HZ, SAMPLE_RATE_MAX_HZ
                ),
            ));
        }
        self.sample_rate_hz = rate_hz;
        Ok(())
    }

    pub fn set_freq(&mut self, freq_hz: u64) -> Result<(), DeviceError> {
        if !(FREQ_MIN_HZ..=FREQ_MAX_HZ).contains(&freq_hz) {
            return Err(DeviceError::new(
                "hackrf_set_freq",
                format!("{} Hz outside {}..={} Hz", freq_hz, FREQ_MIN_HZ, FREQ_MAX_HZ),
            ));
        }
        self.freq_hz = freq_hz;
        Ok(())
    }

    /// Out-of-range values are rejected, in-range values round down to the 8 dB step
    pub fn set_lna_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
        if gain_db > LNA_GAIN_MAX_DB {
            return Err(DeviceError::new(
                "hackrf_set_lna_gain",
                format!("{} dB above {} dB", gain_db, LNA_GAIN_MAX_DB),
            ));
        }
        self.lna_gain_db = gain_db - gain_db % LNA_GAIN_STEP_DB;
        Ok(())
    }

    /// Out-of-range values are rejected, in-range values round down to the 2 dB step
    pub fn set_vga_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
        if gain_db > VGA_GAIN_MAX_DB {
            return Err(DeviceError::new(
                "hackrf_set_vga_gain",
                format!("{} dB above {} dB", gain_db, VGA_GAIN_MAX_DB),
            ));
        }
        self.vga_gain_db = gain_db - gain_db % VGA_GAIN_STEP_DB;
        Ok(())
    }

    pub fn is_tuned(&self) -> bool {
        self.sample_rate_hz != 0 && self.freq_hz != 0
    }
}
