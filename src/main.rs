//! Spectrum Capture - HackRF swept IQ capture with Welch PSD estimation
//!
//! Captures raw IQ from a HackRF across one or more 20 MHz windows, stores
//! each window as signed 8-bit IQ, then estimates and exports the power
//! spectral density of every captured window.

mod capture;
mod config;
mod sdr;
mod spectrum;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use capture::{CancelToken, CaptureEngine, CaptureRequest, CaptureSummary};
use config::{Config, SdrBackend};
use sdr::{AntennaSwitch, GpioSwitch, HackRfDriver, LoggingSwitch, SimulatedDriver};
use spectrum::{export_band, load_cs8, EstimateError, SpectralEstimator, WelchParams};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   Spectrum Capture - HackRF");
    info!("   Swept IQ capture + Welch PSD");
    info!("===========================================");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;

    info!("Configuration:");
    info!("  Mode: {}", config.mode);
    info!("  Center frequency: {} MHz", config.center_freq_mhz);
    info!("  Samples per band: {}", config.sample_quota);
    info!("  LNA gain: {} dB, VGA gain: {} dB", config.lna_gain_db, config.vga_gain_db);
    info!("  Second sample: {}", config.second_sample);
    info!("  Backend: {:?}", config.backend);
    match config.ring_capacity {
        Some(capacity) => info!("  Buffered capture, ring of {} bytes", capacity),
        None => info!("  Direct capture"),
    }
    info!(
        "  Welch: L={}, overlap={}, window={}",
        config.segment_length, config.overlap, config.window
    );

    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, aborting capture");
            signal_cancel.cancel();
        }
    });

    info!("===========================================");
    info!("  Starting capture...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let request = config.capture_request();
    let capture_config = config.clone();
    let summary =
        tokio::task::spawn_blocking(move || run_capture(&capture_config, &request, cancel))
            .await
            .context("capture task panicked")??;

    fs::create_dir_all(&config.outputs_dir)
        .with_context(|| format!("creating {}", config.outputs_dir.display()))?;

    let params = config.welch_params();
    let outputs_dir = config.outputs_dir.clone();
    let total_bytes = summary.total_bytes();
    let exported =
        tokio::task::spawn_blocking(move || estimate_all(&summary, params, &outputs_dir))
            .await
            .context("estimation task panicked")??;

    info!(
        "Shutdown complete. {} bytes captured, {} PSD(s) written to {}",
        total_bytes,
        exported,
        config.outputs_dir.display()
    );
    Ok(())
}

/// Run the capture on the configured backend (blocking)
fn run_capture(
    config: &Config,
    request: &CaptureRequest,
    cancel: CancelToken,
) -> Result<CaptureSummary> {
    let antenna: Box<dyn AntennaSwitch> = match &config.antenna_gpio_path {
        Some(path) => Box::new(GpioSwitch::new(path.clone())),
        None => Box::new(LoggingSwitch),
    };

    let result = match config.backend {
        SdrBackend::HackRf => {
            CaptureEngine::new(
                HackRfDriver::new(config.hackrf_config()),
                antenna,
                config.engine_config(),
                cancel,
            )
            .capture(request)
        }
        SdrBackend::Simulated => CaptureEngine::new(
            SimulatedDriver::default(),
            antenna,
            config.engine_config(),
            cancel,
        )
        .capture(request),
    };

    result.context("capture failed")
}

/// Estimate and export the PSD of every captured band, returning how many were written
fn estimate_all(summary: &CaptureSummary, params: WelchParams, outputs_dir: &Path) -> Result<usize> {
    let estimator = SpectralEstimator::new(params)?;
    let mut exported = 0;

    for report in &summary.passes {
        let mut samples = load_cs8(&report.path)
            .with_context(|| format!("decoding pass {}", report.pass))?;

        let psd = match estimator.estimate(&mut samples, report.sample_rate_hz as f64) {
            Ok(psd) => psd,
            Err(e @ EstimateError::InsufficientSamples { .. }) => {
                warn!("[Pass {}] skipped: {}", report.pass, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let files = export_band(outputs_dir, report.pass, &psd)
            .with_context(|| format!("exporting PSD for pass {}", report.pass))?;

        if let Some((offset_hz, power)) = psd.peak() {
            info!(
                "[Pass {}] {} segments, peak {:.1} dB at {:.3} MHz -> {}",
                report.pass,
                psd.segments,
                10.0 * power.max(spectrum::DB_FLOOR_EPSILON).log10(),
                (report.center_hz as f64 + offset_hz) / 1e6,
                files.db.display()
            );
        }
        exported += 1;
    }

    Ok(exported)
}
