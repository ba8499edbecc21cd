//! HackRF access via the hackrf command-line tools
//!
//! `hackrf_info` probes for a board when a session is opened, and
//! `hackrf_transfer -r -` streams signed 8-bit IQ to stdout. A reader
//! thread hands each chunk of stdout to the [`TransferSink`].

use std::io::{BufRead, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use super::{DeviceError, SdrDriver, SdrSession, TunerSettings};
use crate::capture::{Flow, TransferSink};

/// libhackrf delivers 256 KiB per USB transfer, match it
const TRANSFER_BLOCK_BYTES: usize = 256 * 1024;

/// Paths to the hackrf tools and the board to use
#[derive(Debug, Clone)]
pub struct HackRfConfig {
    pub transfer_path: String,
    pub info_path: String,
    /// Serial number of the board, `None` for the first one found
    pub serial: Option<String>,
}

impl Default for HackRfConfig {
    fn default() -> Self {
        Self {
            transfer_path: "hackrf_transfer".to_string(),
            info_path: "hackrf_info".to_string(),
            serial: None,
        }
    }
}

/// Extract board serial numbers from `hackrf_info` output
///
/// Lines look like `Serial number: 0000000000000000457863c8234e5c0f`
pub fn parse_serials(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Serial number:"))
        .map(|sn| sn.trim().trim_start_matches("0x").to_string())
        .filter(|sn| !sn.is_empty() && sn.chars().all(|c| c.is_ascii_hexdigit()))
        .collect()
}

/// Build the `hackrf_transfer` argument list for a receive stream to stdout
pub fn transfer_args(settings: &TunerSettings, serial: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(sn) = serial {
        args.push("-d".to_string());
        args.push(sn.to_string());
    }
    args.extend([
        "-r".to_string(),
        "-".to_string(),
        "-f".to_string(),
        settings.freq_hz.to_string(),
        "-s".to_string(),
        settings.sample_rate_hz.to_string(),
        "-l".to_string(),
        settings.lna_gain_db.to_string(),
        "-g".to_string(),
        settings.vga_gain_db.to_string(),
        "-a".to_string(),
        "0".to_string(),
    ]);
    if settings.hw_sync {
        args.push("-H".to_string());
    }
    args
}

/// Driver that opens sessions on a HackRF through the command-line tools
#[derive(Debug)]
pub struct HackRfDriver {
    config: HackRfConfig,
}

impl HackRfDriver {
    pub fn new(config: HackRfConfig) -> Self {
        Self { config }
    }
}

impl SdrDriver for HackRfDriver {
    type Session = HackRfSession;

    fn open(&mut self) -> Result<HackRfSession, DeviceError> {
        let output = Command::new(&self.config.info_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                DeviceError::new(
                    "hackrf_open",
                    format!("failed to run {}: {}", self.config.info_path, e),
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let serials = parse_serials(&stdout);
        if serials.is_empty() {
            return Err(DeviceError::new("hackrf_open", "no HackRF boards found"));
        }

        let serial = match &self.config.serial {
            Some(wanted) => {
                if !serials.iter().any(|sn| sn.ends_with(wanted.as_str())) {
                    return Err(DeviceError::new(
                        "hackrf_open",
                        format!("board {} not found (have: {})", wanted, serials.join(", ")),
                    ));
                }
                Some(wanted.clone())
            }
            None => {
                if serials.len() > 1 {
                    info!("{} boards found, using {}", serials.len(), serials[0]);
                }
                Some(serials[0].clone())
            }
        };

        info!("HackRF opened (serial {})", serial.as_deref().unwrap_or("?"));

        Ok(HackRfSession {
            transfer_path: self.config.transfer_path.clone(),
            serial,
            settings: TunerSettings::default(),
            stream: None,
        })
    }
}

/// Running `hackrf_transfer` process and its stdout reader
struct Stream {
    child: Child,
    running: Arc<AtomicBool>,
    reader: JoinHandle<TransferSink>,
}

/// Open HackRF session
pub struct HackRfSession {
    transfer_path: String,
    serial: Option<String>,
    settings: TunerSettings,
    stream: Option<Stream>,
}

impl SdrSession for HackRfSession {
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

        let mut cmd = Command::new(&self.transfer_path);
        cmd.args(transfer_args(&self.settings, self.serial.as_deref()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Executing: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            DeviceError::new(
                "hackrf_start_rx",
                format!("failed to spawn {}: {}", self.transfer_path, e),
            )
        })?;

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                return Err(DeviceError::new(
                    "hackrf_start_rx",
                    "failed to capture hackrf_transfer stdout",
                ));
            }
        };

        // hackrf_transfer reports throughput once a second on stderr
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let reader = std::io::BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    if !line.trim().is_empty() {
                        debug!("[hackrf_transfer] {}", line.trim());
                    }
                }
            });
        }

        let running = Arc::new(AtomicBool::new(true));
        let reader_running = running.clone();
        let reader = thread::Builder::new()
            .name("hackrf-rx".to_string())
            .spawn(move || deliver(stdout, sink, reader_running))
            .map_err(|e| {
                DeviceError::new("hackrf_start_rx", format!("failed to spawn reader: {}", e))
            });

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        self.stream = Some(Stream {
            child,
            running,
            reader,
        });
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .map(|s| s.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn stop_rx(&mut self) -> Result<TransferSink, DeviceError> {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| DeviceError::new("hackrf_stop_rx", "not streaming"))?;

        stream.running.store(false, Ordering::Release);
        // Killing the process closes stdout, which unblocks the reader
        if let Err(e) = stream.child.kill() {
            debug!("hackrf_transfer already exited: {}", e);
        }
        match stream.child.wait() {
            Ok(status) => debug!("hackrf_transfer exited: {}", status),
            Err(e) => warn!("Failed to reap hackrf_transfer: {}", e),
        }

        stream
            .reader
            .join()
            .map_err(|_| DeviceError::new("hackrf_stop_rx", "reader thread panicked"))
    }

    fn close(mut self) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            self.stop_rx()?;
        }
        Ok(())
    }
}

impl Drop for HackRfSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.running.store(false, Ordering::Release);
            let _ = stream.child.kill();
            let _ = stream.child.wait();
        }
    }
}

/// Reader loop (runs in the `hackrf-rx` thread)
fn deliver(mut stdout: impl Read, mut sink: TransferSink, running: Arc<AtomicBool>) -> TransferSink {
    let mut buffer = vec![0u8; TRANSFER_BLOCK_BYTES];

    while running.load(Ordering::Acquire) {
        match stdout.read(&mut buffer) {
            Ok(0) => {
                debug!("hackrf_transfer stdout closed (EOF)");
                break;
            }
            Ok(n_read) => {
                if sink.on_transfer(&buffer[..n_read]) == Flow::Stop {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Error reading from hackrf_transfer: {}", e);
                break;
            }
        }
    }

    running.store(false, Ordering::Release);
    sink
}
