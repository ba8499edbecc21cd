//! Pass results and the capture manifest

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// How a successful pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// The byte quota was filled
    QuotaExhausted,
    /// The acquisition interval elapsed first
    TimerExpired,
}

/// Result of one acquisition pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass: usize,
    pub center_hz: u64,
    pub sample_rate_hz: u64,
    pub path: PathBuf,
    pub bytes_delivered: u64,
    pub bytes_written: u64,
    pub overflow_drops: u64,
    pub outcome: PassOutcome,
    pub started_at_ms: i64,
}

impl PassReport {
    /// Complex samples stored in the pass file
    pub fn samples_written(&self) -> u64 {
        self.bytes_written / super::sink::BYTES_PER_SAMPLE
    }
}

/// Result of a whole capture run
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub passes: Vec<PassReport>,
}

impl CaptureSummary {
    pub fn push(&mut self, report: PassReport) {
        self.passes.push(report);
    }

    pub fn total_bytes(&self) -> u64 {
        self.passes.iter().map(|p| p.bytes_written).sum()
    }

    pub fn total_drops(&self) -> u64 {
        self.passes.iter().map(|p| p.overflow_drops).sum()
    }
}

/// Appends one CSV row per completed pass, flushing each so an aborted run
/// still leaves a usable manifest
pub struct ManifestWriter {
    writer: csv::Writer<File>,
}

impl ManifestWriter {
    pub fn create(path: &Path) -> csv::Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }

    pub fn append(&mut self, report: &PassReport) -> csv::Result<()> {
        self.writer.serialize(report)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(pass: usize, bytes: u64) -> PassReport {
        PassReport {
            pass,
            center_hz: 200_000_000,
            sample_rate_hz: 20_000_000,
            path: PathBuf::from(format!("Samples/{}", pass)),
            bytes_delivered: bytes + 100,
            bytes_written: bytes,
            overflow_drops: 1,
            outcome: PassOutcome::QuotaExhausted,
            started_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_summary_totals() {
        let mut summary = CaptureSummary::default();
        summary.push(report(0, 4000));
        summary.push(report(1, 6000));
        assert_eq!(summary.total_bytes(), 10_000);
        assert_eq!(summary.total_drops(), 2);
        assert_eq!(summary.passes[1].samples_written(), 3000);
    }

    #[test]
    fn test_manifest_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        let mut manifest = ManifestWriter::create(&path).unwrap();
        manifest.append(&report(0, 4000)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "pass,center_hz,sample_rate_hz,path,bytes_delivered,bytes_written,overflow_drops,outcome,started_at_ms"
        );
        assert_eq!(
            lines.next().unwrap(),
            "0,200000000,20000000,Samples/0,4100,4000,1,quota_exhausted,1700000000000"
        );
    }
}
