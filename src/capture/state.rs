//! Per-pass capture state shared between the controlling thread and the delivery context

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use super::cancel::{CancelToken, Wake};

/// Transfer counters for one pass (written by the delivery context only)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub bytes_delivered: AtomicU64,
    pub bytes_accepted: AtomicU64,
    pub blocks: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self, bytes: usize) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_accepted(&self, bytes: usize) {
        self.bytes_accepted.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn get_delivered(&self) -> u64 {
        self.bytes_delivered.load(Ordering::Relaxed)
    }

    pub fn get_accepted(&self) -> u64 {
        self.bytes_accepted.load(Ordering::Relaxed)
    }

    pub fn get_blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }
}

/// Why the sink stopped accepting blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    Running = 0,
    QuotaExhausted = 1,
    WriteFailed = 2,
    NoOutput = 3,
}

impl From<u8> for StopReason {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::QuotaExhausted,
            2 => Self::WriteFailed,
            3 => Self::NoOutput,
            _ => Self::Running,
        }
    }
}

/// State bundle handed to the delivery callback for one pass
#[derive(Debug)]
pub struct CaptureContext {
    pub stats: CaptureStats,
    stop_reason: AtomicU8,
    cancel: CancelToken,
}

impl CaptureContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            stats: CaptureStats::new(),
            stop_reason: AtomicU8::new(StopReason::Running as u8),
            cancel,
        }
    }

    pub fn stop_reason(&self) -> StopReason {
        StopReason::from(self.stop_reason.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_reason() != StopReason::Running
    }

    /// Record the terminal condition and wake the controlling thread.
    /// Only the first call has any effect.
    pub fn finish(&self, reason: StopReason) -> bool {
        let first = self
            .stop_reason
            .compare_exchange(
                StopReason::Running as u8,
                reason as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if first {
            self.cancel.notify(Wake::PassFinished);
        }
        first
    }
}

/// Streaming state of an open hardware session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Stopping,
}

/// Phase of one acquisition pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Opening,
    Configuring,
    Streaming,
    Draining,
    Closed,
}

impl std::fmt::Display for PassPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PassPhase::Idle => "idle",
            PassPhase::Opening => "opening",
            PassPhase::Configuring => "configuring",
            PassPhase::Streaming => "streaming",
            PassPhase::Draining => "draining",
            PassPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_finish_only_once() {
        let cancel = CancelToken::new();
        let context = CaptureContext::new(cancel.clone());
        assert!(!context.is_stopped());

        assert!(context.finish(StopReason::QuotaExhausted));
        assert!(!context.finish(StopReason::WriteFailed));
        assert_eq!(context.stop_reason(), StopReason::QuotaExhausted);
        assert_eq!(cancel.wait(Duration::from_secs(5)), Wake::PassFinished);
        // The finish is pass-local, not a global abort
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_stats_counters() {
        let stats = CaptureStats::new();
        stats.record_delivered(30);
        stats.record_delivered(30);
        stats.record_accepted(40);
        assert_eq!(stats.get_delivered(), 60);
        assert_eq!(stats.get_accepted(), 40);
        assert_eq!(stats.get_blocks(), 2);
    }
}
