//! Simulated front end
//!
//! Generates a complex tone plus uniform noise and a DC offset (the
//! local-oscillator leakage a real board shows) as signed 8-bit IQ, and
//! delivers it from its own thread the same way the hardware does.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use super::{DeviceError, SdrDriver, SdrSession, TunerSettings};
use crate::capture::{Flow, TransferSink};

/// Signal shape and delivery behaviour of the simulated board
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Tone offset from the tuned center frequency
    pub tone_offset_hz: f64,
    /// Tone amplitude in full-scale units (1.0 = 127 counts)
    pub tone_amplitude: f64,
    /// Peak noise amplitude in full-scale units
    pub noise_amplitude: f64,
    /// DC offset added to I and Q, in full-scale units
    pub dc_offset: f64,
    /// Bytes per delivered block
    pub block_size: usize,
    /// Pace delivery at the configured sample rate
    pub realtime: bool,
    /// Open succeeds but no samples are ever delivered
    pub stalled: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            tone_offset_hz: 1_250_000.0,
            tone_amplitude: 0.5,
            noise_amplitude: 0.05,
            dc_offset: 0.1,
            block_size: 256 * 1024,
            realtime: true,
            stalled: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    config: SimulatedConfig,
}

impl SimulatedDriver {
    pub fn new(config: SimulatedConfig) -> Self {
        Self { config }
    }
}

impl SdrDriver for SimulatedDriver {
    type Session = SimulatedSession;

    fn open(&mut self) -> Result<SimulatedSession, DeviceError> {
        debug!("Simulated front end opened");
        Ok(SimulatedSession {
            config: self.config.clone(),
            settings: TunerSettings::default(),
            stream: None,
        })
    }
}

struct Stream {
    running: Arc<AtomicBool>,
    worker: JoinHandle<TransferSink>,
}

pub struct SimulatedSession {
    config: SimulatedConfig,
    settings: TunerSettings,
    stream: Option<Stream>,
}

impl SdrSession for SimulatedSession {
    fn set_sample_rate(&mut self, rate_hz: u64) -> Result<(), DeviceError> {
        self.settings.set_sample_rate(rate_hz)
    }

    fn set_freq(&mut self, freq_hz: u64) -> Result<(), DeviceError> {
        self.settings.set_freq(freq_hz)
    }

    fn set_lna_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
        self.settings.set_lna_gain(gain_db)
    }

    fn set_vga_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
        self.settings.set_vga_gain(gain_db)
    }

    fn set_hw_sync_mode(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.settings.hw_sync = enabled;
        Ok(())
    }

    fn start_rx(&mut self, sink: TransferSink) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            return Err(DeviceError::new("hackrf_start_rx", "already streaming"));
        }
        if !self.settings.is_tuned() {
            return Err(DeviceError::new(
                "hackrf_start_rx",
                "sample rate and frequency must be set first",
            ));
        }

        info!(
            "Simulated RX at {:.3} MHz, tone at {:+.3} MHz",
            self.settings.freq_hz as f64 / 1e6,
            self.config.tone_offset_hz / 1e6
        );

        let running = Arc::new(AtomicBool::new(true));
        let worker_running = running.clone();
        let config = self.config.clone();
        let sample_rate = self.settings.sample_rate_hz;

        let worker = thread::Builder::new()
            .name("sim-rx".to_string())
            .spawn(move || deliver(config, sample_rate, sink, worker_running))
            .map_err(|e| {
                DeviceError::new("hackrf_start_rx", format!("failed to spawn worker: {}", e))
            })?;

        self.stream = Some(Stream { running, worker });
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .map(|s| s.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn stop_rx(&mut self) -> Result<TransferSink, DeviceError> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| DeviceError::new("hackrf_stop_rx", "not streaming"))?;
        stream.running.store(false, Ordering::Release);
        stream
            .worker
            .join()
            .map_err(|_| DeviceError::new("hackrf_stop_rx", "worker thread panicked"))
    }

    fn close(mut self) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            self.stop_rx()?;
        }
        Ok(())
    }
}

/// Quantize a full-scale value to a signed byte
fn to_i8(value: f64) -> u8 {
    (value * 127.0).round().clamp(-128.0, 127.0) as i8 as u8
}

/// Fill `block` with interleaved IQ, continuing from sample index `start`
pub fn synthesize(
    config: &SimulatedConfig,
    sample_rate_hz: u64,
    start: u64,
    block: &mut [u8],
    rng: &mut impl Rng,
) {
    let omega = 2.0 * PI * config.tone_offset_hz / sample_rate_hz as f64;
    for (k, pair) in block.chunks_exact_mut(2).enumerate() {
        let phase = omega * (start + k as u64) as f64;
        let (noise_i, noise_q) = if config.noise_amplitude > 0.0 {
            (
                rng.gen_range(-config.noise_amplitude..=config.noise_amplitude),
                rng.gen_range(-config.noise_amplitude..=config.noise_amplitude),
            )
        } else {
            (0.0, 0.0)
        };
        pair[0] = to_i8(config.tone_amplitude * phase.cos() + noise_i + config.dc_offset);
        pair[1] = to_i8(config.tone_amplitude * phase.sin() + noise_q + config.dc_offset);
    }
}

/// Delivery loop (runs in the `sim-rx` thread)
fn deliver(
    config: SimulatedConfig,
    sample_rate_hz: u64,
    mut sink: TransferSink,
    running: Arc<AtomicBool>,
) -> TransferSink {
    let mut rng = rand::thread_rng();
    let mut block = vec![0u8; config.block_size.max(2) & !1];
    let block_period =
        Duration::from_secs_f64((block.len() / 2) as f64 / sample_rate_hz as f64);
    let mut sample_index = 0u64;
    let started = Instant::now();
    let mut blocks_sent = 0u32;

    while running.load(Ordering::Acquire) {
        if config.stalled {
            thread::sleep(Duration::from_millis(5));
            continue;
        }

        synthesize(&config, sample_rate_hz, sample_index, &mut block, &mut rng);
        sample_index += (block.len() / 2) as u64;
        blocks_sent += 1;

        if sink.on_transfer(&block) == Flow::Stop {
            break;
        }

        if config.realtime {
            let due = block_period * blocks_sent;
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
        }
    }

    running.store(false, Ordering::Release);
    sink
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_clean_tone() {
        let config = SimulatedConfig {
            tone_offset_hz: 0.0,
            tone_amplitude: 0.5,
            noise_amplitude: 0.0,
            dc_offset: 0.0,
            ..SimulatedConfig::default()
        };
        let mut block = vec![0u8; 8];
        synthesize(&config, 2_000_000, 0, &mut block, &mut rand::thread_rng());
        // cos(0) = 1, sin(0) = 0 for every sample
        for pair in block.chunks_exact(2) {
            assert_eq!(pair[0] as i8, 64);
            assert_eq!(pair[1] as i8, 0);
        }
    }

    #[test]
    fn test_synthesize_clamps() {
        let config = SimulatedConfig {
            tone_offset_hz: 0.0,
            tone_amplitude: 2.0,
            noise_amplitude: 0.0,
            dc_offset: 0.0,
            ..SimulatedConfig::default()
        };
        let mut block = vec![0u8; 2];
        synthesize(&config, 2_000_000, 0, &mut block, &mut rand::thread_rng());
        assert_eq!(block[0] as i8, 127);
    }

    #[test]
    fn test_start_requires_tuning() {
        let mut session = SimulatedDriver::default().open().unwrap();
        let sink = TransferSink::closed(0);
        let err = session.start_rx(sink).unwrap_err();
        assert_eq!(err.op, "hackrf_start_rx");
        assert!(!session.is_streaming());
    }
}
