//! Exclusive hardware session for one pass

use tracing::debug;

use super::sink::TransferSink;
use super::state::SessionState;
use crate::sdr::{DeviceError, SdrDriver, SdrSession};

/// Tuning requested for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneRequest {
    pub sample_rate_hz: u64,
    pub center_freq_hz: u64,
    pub lna_gain_db: u32,
    pub vga_gain_db: u32,
}

/// One open hardware handle plus its streaming state
pub struct CaptureSession<S: SdrSession> {
    inner: S,
    state: SessionState,
}

impl<S: SdrSession> CaptureSession<S> {
    pub fn open<D: SdrDriver<Session = S>>(driver: &mut D) -> Result<Self, DeviceError> {
        let inner = driver.open()?;
        Ok(Self {
            inner,
            state: SessionState::Idle,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply rate, frequency and gains, with hardware sync disabled
    pub fn configure(&mut self, tune: TuneRequest) -> Result<(), DeviceError> {
        self.inner.set_sample_rate(tune.sample_rate_hz)?;
        self.inner.set_hw_sync_mode(false)?;
        self.inner.set_freq(tune.center_freq_hz)?;
        self.inner.set_vga_gain(tune.vga_gain_db)?;
        self.inner.set_lna_gain(tune.lna_gain_db)?;
        debug!(
            "Tuned to {:.3} MHz at {:.1} MSPS (LNA {} dB, VGA {} dB)",
            tune.center_freq_hz as f64 / 1e6,
            tune.sample_rate_hz as f64 / 1e6,
            tune.lna_gain_db,
            tune.vga_gain_db
        );
        Ok(())
    }

    pub fn start(&mut self, sink: TransferSink) -> Result<(), DeviceError> {
        if self.state != SessionState::Idle {
            return Err(DeviceError::new("hackrf_start_rx", "session is not idle"));
        }
        self.inner.start_rx(sink)?;
        self.state = SessionState::Streaming;
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming && self.inner.is_streaming()
    }

    pub fn stop(&mut self) -> Result<TransferSink, DeviceError> {
        self.state = SessionState::Stopping;
        let sink = self.inner.stop_rx();
        self.state = SessionState::Idle;
        sink
    }

    pub fn close(mut self) -> Result<(), DeviceError> {
        if self.state == SessionState::Streaming {
            self.stop()?;
        }
        self.inner.close()
    }
}
