//! Capture engine
//!
//! Runs every band of a [`FrequencyPlan`] through the pass state machine:
//!
//! ```text
//! Idle -> Opening -> Configuring -> Streaming -> Draining -> Closed
//! ```
//!
//! The controlling thread never polls the sink. After `start` it blocks in
//! [`CancelToken::wait`] until the acquisition interval elapses, the sink
//! finishes the pass, or a global abort arrives. A pass that moved zero
//! bytes ends the whole run.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::cancel::CancelToken;
use super::planner::{FrequencyBand, FrequencyPlan, PlanError};
use super::report::{CaptureSummary, ManifestWriter, PassOutcome, PassReport};
use super::request::CaptureRequest;
use super::ring::{ring_buffer, RingConsumer};
use super::session::{CaptureSession, TuneRequest};
use super::sink::{ByteQuota, Output, TransferSink};
use super::state::{CaptureContext, PassPhase, StopReason};
use crate::sdr::{AntennaSwitch, DeviceError, RfPath, SdrDriver};

/// Write buffer in front of each pass file
pub const OUTPUT_BUFFER_BYTES: usize = 1 << 20;

/// Name of the per-run manifest inside the samples directory
pub const MANIFEST_FILE: &str = "manifest.csv";

/// Drain thread back-off when the ring is empty
const DRAIN_IDLE: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("pass {pass}: {source}")]
    Device {
        pass: usize,
        #[source]
        source: DeviceError,
    },
    #[error("pass {pass}: {op} {}: {source}", path.display())]
    Io {
        pass: usize,
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("pass {pass}: no output file open")]
    OutputClosed { pass: usize },
    #[error("pass {pass}: couldn't transfer any bytes in {interval_ms} ms")]
    NoData { pass: usize, interval_ms: u128 },
    #[error("capture aborted during pass {pass}")]
    Aborted { pass: usize },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("quota of {samples} samples does not fit in a byte count")]
    QuotaTooLarge { samples: u64 },
    #[error("samples directory {}: {source}", path.display())]
    SamplesDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl CaptureError {
    pub fn pass(&self) -> Option<usize> {
        match self {
            CaptureError::Device { pass, .. }
            | CaptureError::Io { pass, .. }
            | CaptureError::OutputClosed { pass }
            | CaptureError::NoData { pass, .. }
            | CaptureError::Aborted { pass } => Some(*pass),
            CaptureError::Plan(_)
            | CaptureError::QuotaTooLarge { .. }
            | CaptureError::SamplesDir { .. }
            | CaptureError::Manifest { .. } => None,
        }
    }
}

/// Engine-wide settings that do not change between runs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory receiving one file per pass, named by band index
    pub samples_dir: PathBuf,
    /// Upper bound on the streaming phase of each pass
    pub acquisition_interval: Duration,
    /// Ring size for buffered mode; `None` writes from the delivery context
    pub ring_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            samples_dir: PathBuf::from("Samples"),
            acquisition_interval: Duration::from_millis(1000),
            ring_capacity: None,
        }
    }
}

/// Tuning and quota applied to every pass of a run
#[derive(Debug, Clone, Copy)]
pub struct PassSettings {
    pub sample_rate_hz: u64,
    pub lna_gain_db: u32,
    pub vga_gain_db: u32,
    pub quota: ByteQuota,
}

/// Background writer emptying the ring into the pass file
struct RingDrain {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<io::Result<(u64, BufWriter<File>)>>,
}

impl RingDrain {
    fn spawn(mut consumer: RingConsumer, mut writer: BufWriter<File>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("ring-drain".to_string())
            .spawn(move || {
                let mut written = 0u64;
                loop {
                    // Read the flag first: once set, the producer has stopped,
                    // so an empty drain afterwards means everything is out
                    let done = thread_stop.load(Ordering::Acquire);
                    let n = consumer.drain_to(&mut writer)?;
                    written += n as u64;
                    if n == 0 {
                        if done {
                            break;
                        }
                        thread::sleep(DRAIN_IDLE);
                    }
                }
                Ok((written, writer))
            })?;
        Ok(Self { stop, handle })
    }

    fn finish(self) -> io::Result<(u64, BufWriter<File>)> {
        self.stop.store(true, Ordering::Release);
        self.handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "drain thread panicked"))?
    }
}

pub struct CaptureEngine<D: SdrDriver> {
    driver: D,
    antenna: Box<dyn AntennaSwitch>,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<D: SdrDriver> CaptureEngine<D> {
    pub fn new(
        driver: D,
        antenna: Box<dyn AntennaSwitch>,
        config: EngineConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            driver,
            antenna,
            config,
            cancel,
        }
    }

    /// Handle for aborting the run from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Plan and capture a request
    pub fn capture(&mut self, request: &CaptureRequest) -> Result<CaptureSummary, CaptureError> {
        let plan = request.plan()?;
        let quota = ByteQuota::for_samples(request.sample_quota).ok_or(
            CaptureError::QuotaTooLarge {
                samples: request.sample_quota,
            },
        )?;
        let settings = PassSettings {
            sample_rate_hz: request.sample_rate_hz(),
            lna_gain_db: request.lna_gain_db,
            vga_gain_db: request.vga_gain_db,
            quota,
        };
        self.run_plan(&plan, settings, request.band_count)
    }

    /// Capture the first `band_limit` bands of `plan` (all of them for `None` or 0)
    pub fn run_plan(
        &mut self,
        plan: &FrequencyPlan,
        settings: PassSettings,
        band_limit: Option<usize>,
    ) -> Result<CaptureSummary, CaptureError> {
        let mut bands = plan.bands()?;
        if let Some(limit) = band_limit.filter(|&n| n > 0) {
            bands.truncate(limit);
        }
        let rf_path = plan.rf_path();

        fs::create_dir_all(&self.config.samples_dir).map_err(|source| {
            CaptureError::SamplesDir {
                path: self.config.samples_dir.clone(),
                source,
            }
        })?;
        let manifest_path = self.config.samples_dir.join(MANIFEST_FILE);
        let mut manifest =
            ManifestWriter::create(&manifest_path).map_err(|source| CaptureError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;

        info!("Capture plan: {} band(s), antenna {}", bands.len(), rf_path);
        for band in &bands {
            info!(
                "  Band {}: {:.3} MHz",
                band.index,
                band.center_hz as f64 / 1e6
            );
        }

        let mut summary = CaptureSummary::default();
        for band in bands {
            let result = if self.cancel.is_cancelled() {
                Err(CaptureError::Aborted { pass: band.index })
            } else {
                self.run_pass(band, rf_path, &settings)
            };

            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    if matches!(e, CaptureError::Aborted { .. }) {
                        warn!("{}", e);
                    } else {
                        error!("{}", e);
                    }
                    self.cancel.cancel();
                    info!(
                        "Stopped after {} pass(es), {} bytes written",
                        summary.passes.len(),
                        summary.total_bytes()
                    );
                    return Err(e);
                }
            };

            manifest
                .append(&report)
                .map_err(|source| CaptureError::Manifest {
                    path: manifest_path.clone(),
                    source,
                })?;
            summary.push(report);
        }

        info!(
            "Capture complete: {} pass(es), {} bytes written, {} overflow drops",
            summary.passes.len(),
            summary.total_bytes(),
            summary.total_drops()
        );
        Ok(summary)
    }

    fn run_pass(
        &mut self,
        band: FrequencyBand,
        rf_path: RfPath,
        settings: &PassSettings,
    ) -> Result<PassReport, CaptureError> {
        let pass = band.index;
        let path = self.config.samples_dir.join(pass.to_string());
        let started_at_ms = Utc::now().timestamp_millis();
        log_phase(pass, PassPhase::Idle);

        log_phase(pass, PassPhase::Opening);
        let file = File::create(&path).map_err(io_error(pass, "create", &path))?;
        let writer = BufWriter::with_capacity(OUTPUT_BUFFER_BYTES, file);
        let mut session = CaptureSession::open(&mut self.driver)
            .map_err(|source| CaptureError::Device { pass, source })?;

        log_phase(pass, PassPhase::Configuring);
        let tune = TuneRequest {
            sample_rate_hz: settings.sample_rate_hz,
            center_freq_hz: band.center_hz,
            lna_gain_db: settings.lna_gain_db,
            vga_gain_db: settings.vga_gain_db,
        };
        let configured = session.configure(tune).and_then(|()| {
            self.antenna
                .select_path(rf_path.is_high_band())
                .map_err(|e| DeviceError::new("select_antenna", e.to_string()))
        });
        if let Err(source) = configured {
            close_quietly(pass, session);
            return Err(CaptureError::Device { pass, source });
        }

        log_phase(pass, PassPhase::Streaming);
        let (output, drain) = match self.config.ring_capacity {
            None => (Output::Direct(Box::new(writer)), None),
            Some(capacity) => {
                let (producer, consumer) = ring_buffer(capacity);
                match RingDrain::spawn(consumer, writer) {
                    Ok(drain) => (Output::Ring(producer), Some(drain)),
                    Err(source) => {
                        close_quietly(pass, session);
                        return Err(CaptureError::Io {
                            pass,
                            op: "spawn drain for",
                            path,
                            source,
                        });
                    }
                }
            }
        };

        self.cancel.clear_pending();
        let context = Arc::new(CaptureContext::new(self.cancel.clone()));
        let sink = TransferSink::new(pass, output, settings.quota, context.clone());
        if let Err(source) = session.start(sink) {
            if let Some(drain) = drain {
                finish_quietly(pass, drain);
            }
            close_quietly(pass, session);
            return Err(CaptureError::Device { pass, source });
        }

        let wake = self.cancel.wait(self.config.acquisition_interval);
        debug!(
            "[Pass {}] woke on {:?}, streaming: {}",
            pass,
            wake,
            session.is_streaming()
        );

        log_phase(pass, PassPhase::Draining);
        let stopped = session.stop();
        if let Err(e) = session.close() {
            warn!("[Pass {}] close failed: {}", pass, e);
        }
        log_phase(pass, PassPhase::Closed);

        let (output, write_error) = match stopped {
            Ok(sink) => sink.into_parts(),
            Err(source) => {
                if let Some(drain) = drain {
                    finish_quietly(pass, drain);
                }
                return Err(CaptureError::Device { pass, source });
            }
        };

        let (bytes_written, overflow_drops) = match (output, drain) {
            (Output::Ring(producer), Some(drain)) => {
                let drops = producer.drops();
                drop(producer);
                let (written, mut writer) = drain
                    .finish()
                    .map_err(io_error(pass, "write", &path))?;
                writer.flush().map_err(io_error(pass, "flush", &path))?;
                (written, drops)
            }
            (Output::Direct(mut writer), _) => {
                writer.flush().map_err(io_error(pass, "flush", &path))?;
                (context.stats.get_accepted(), 0)
            }
            (_, drain) => {
                if let Some(drain) = drain {
                    finish_quietly(pass, drain);
                }
                (0, 0)
            }
        };

        if self.cancel.is_cancelled() {
            return Err(CaptureError::Aborted { pass });
        }

        match context.stop_reason() {
            StopReason::WriteFailed => {
                let source =
                    write_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::WriteZero));
                return Err(CaptureError::Io {
                    pass,
                    op: "write",
                    path,
                    source,
                });
            }
            StopReason::NoOutput => return Err(CaptureError::OutputClosed { pass }),
            StopReason::Running | StopReason::QuotaExhausted => {}
        }

        let bytes_delivered = context.stats.get_delivered();
        if bytes_delivered == 0 {
            return Err(CaptureError::NoData {
                pass,
                interval_ms: self.config.acquisition_interval.as_millis(),
            });
        }

        let outcome = if context.stop_reason() == StopReason::QuotaExhausted {
            PassOutcome::QuotaExhausted
        } else {
            PassOutcome::TimerExpired
        };

        info!(
            "[Pass {}] {:.3} MHz: {} bytes written ({} delivered, {} blocks, {} drops), {:?}",
            pass,
            band.center_hz as f64 / 1e6,
            bytes_written,
            bytes_delivered,
            context.stats.get_blocks(),
            overflow_drops,
            outcome
        );

        Ok(PassReport {
            pass,
            center_hz: band.center_hz,
            sample_rate_hz: settings.sample_rate_hz,
            path,
            bytes_delivered,
            bytes_written,
            overflow_drops,
            outcome,
            started_at_ms,
        })
    }
}

fn log_phase(pass: usize, phase: PassPhase) {
    debug!("[Pass {}] {}", pass, phase);
}

fn io_error<'a>(
    pass: usize,
    op: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> CaptureError + 'a {
    move |source| CaptureError::Io {
        pass,
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Join the drain on an error path; the pass error takes precedence
fn finish_quietly(pass: usize, drain: RingDrain) {
    if let Err(e) = drain.finish() {
        warn!("[Pass {}] drain failed: {}", pass, e);
    }
}

fn close_quietly<S: crate::sdr::SdrSession>(pass: usize, session: CaptureSession<S>) {
    if let Err(e) = session.close() {
        warn!("[Pass {}] close failed: {}", pass, e);
    }
}
