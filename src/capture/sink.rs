//! Delivery callback for one capture pass
//!
//! [`TransferSink::on_transfer`] runs on the hardware delivery thread once
//! per block. It never blocks on the controlling thread and takes no locks:
//! direct mode does one buffered write, buffered mode one or two memcpys.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::{error, trace};

use super::cancel::CancelToken;
use super::ring::RingProducer;
use super::state::{CaptureContext, StopReason};

/// 8-bit interleaved IQ: one byte I, one byte Q
pub const BYTES_PER_SAMPLE: u64 = 2;

/// What the delivery context should do after a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Remaining bytes permitted for the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteQuota {
    remaining: Option<u64>,
}

impl ByteQuota {
    pub fn bytes(limit: u64) -> Self {
        Self {
            remaining: Some(limit),
        }
    }

    /// `None` when the byte count overflows
    pub fn for_samples(samples: u64) -> Option<Self> {
        samples.checked_mul(BYTES_PER_SAMPLE).map(Self::bytes)
    }

    pub fn unlimited() -> Self {
        Self { remaining: None }
    }

    /// Accept up to `len` bytes, returning how many fit
    pub fn take(&mut self, len: usize) -> usize {
        match &mut self.remaining {
            None => len,
            Some(remaining) => {
                let accepted = (len as u64).min(*remaining);
                *remaining -= accepted;
                accepted as usize
            }
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Where accepted bytes go
pub enum Output {
    /// Written synchronously to the pass file
    Direct(Box<dyn Write + Send>),
    /// Copied into the ring for the drain thread
    Ring(RingProducer),
    /// No output file open
    Closed,
}

/// Consumer of asynchronously delivered sample blocks
pub struct TransferSink {
    pass: usize,
    output: Output,
    quota: ByteQuota,
    context: Arc<CaptureContext>,
    write_error: Option<io::Error>,
}

impl TransferSink {
    pub fn new(pass: usize, output: Output, quota: ByteQuota, context: Arc<CaptureContext>) -> Self {
        Self {
            pass,
            output,
            quota,
            context,
            write_error: None,
        }
    }

    /// Sink with no output file, for a pass that never opened one
    pub fn closed(pass: usize) -> Self {
        Self::new(
            pass,
            Output::Closed,
            ByteQuota::unlimited(),
            Arc::new(CaptureContext::new(CancelToken::new())),
        )
    }

    pub fn context(&self) -> &Arc<CaptureContext> {
        &self.context
    }

    pub fn quota(&self) -> ByteQuota {
        self.quota
    }

    /// Handle one delivered block
    pub fn on_transfer(&mut self, block: &[u8]) -> Flow {
        // Late blocks after the pass finished are rejected without side effects
        if self.context.is_stopped() {
            return Flow::Stop;
        }

        let accepted = match &mut self.output {
            Output::Closed => {
                self.context.finish(StopReason::NoOutput);
                return Flow::Stop;
            }
            Output::Direct(writer) => {
                self.context.stats.record_delivered(block.len());
                let accepted = self.quota.take(block.len());
                if let Err(e) = writer.write_all(&block[..accepted]) {
                    error!("Pass {}: short write ({} bytes): {}", self.pass, accepted, e);
                    self.write_error = Some(e);
                    self.context.finish(StopReason::WriteFailed);
                    return Flow::Stop;
                }
                accepted
            }
            Output::Ring(producer) => {
                self.context.stats.record_delivered(block.len());
                let accepted = self.quota.take(block.len());
                if !producer.push(&block[..accepted]) {
                    trace!("Pass {}: ring full, dropped {} bytes", self.pass, accepted);
                    0
                } else {
                    accepted
                }
            }
        };

        self.context.stats.record_accepted(accepted);

        if self.quota.is_exhausted() {
            self.context.finish(StopReason::QuotaExhausted);
            return Flow::Stop;
        }
        Flow::Continue
    }

    /// Give back the output and any write error once delivery has stopped
    pub fn into_parts(self) -> (Output, Option<io::Error>) {
        (self.output, self.write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ring::ring_buffer;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Writer that appends into a shared Vec
    #[derive(Clone, Default)]
    struct SharedVec(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedVec {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer that accepts a fixed number of bytes, then writes nothing
    struct ShortWriter {
        room: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.room);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn direct_sink(quota: ByteQuota) -> (TransferSink, SharedVec, CancelToken) {
        let cancel = CancelToken::new();
        let out = SharedVec::default();
        let context = Arc::new(CaptureContext::new(cancel.clone()));
        let sink = TransferSink::new(0, Output::Direct(Box::new(out.clone())), quota, context);
        (sink, out, cancel)
    }

    #[test]
    fn test_quota_scenario() {
        // quota 40: block A (30) accepted, block B (30) capped to 10, pass ends
        let (mut sink, out, _) = direct_sink(ByteQuota::bytes(40));

        assert_eq!(sink.on_transfer(&[1u8; 30]), Flow::Continue);
        assert_eq!(sink.quota().remaining(), Some(10));

        assert_eq!(sink.on_transfer(&[2u8; 30]), Flow::Stop);
        assert_eq!(sink.quota().remaining(), Some(0));
        assert_eq!(sink.context().stop_reason(), StopReason::QuotaExhausted);

        let written = out.0.lock().unwrap().clone();
        assert_eq!(written.len(), 40);
        assert!(written[30..].iter().all(|&b| b == 2));
        assert_eq!(sink.context().stats.get_delivered(), 60);
        assert_eq!(sink.context().stats.get_accepted(), 40);
    }

    #[test]
    fn test_late_blocks_rejected() {
        let (mut sink, out, _) = direct_sink(ByteQuota::bytes(4));
        assert_eq!(sink.on_transfer(&[0u8; 8]), Flow::Stop);
        assert_eq!(sink.on_transfer(&[0u8; 8]), Flow::Stop);
        assert_eq!(out.0.lock().unwrap().len(), 4);
        assert_eq!(sink.context().stats.get_delivered(), 8);
    }

    #[test]
    fn test_no_output_signals_stop() {
        let mut sink = TransferSink::closed(3);
        assert_eq!(sink.on_transfer(&[0u8; 16]), Flow::Stop);
        assert_eq!(sink.context().stop_reason(), StopReason::NoOutput);
        assert_eq!(sink.context().stats.get_delivered(), 0);
    }

    #[test]
    fn test_short_write_ends_pass() {
        let cancel = CancelToken::new();
        let context = Arc::new(CaptureContext::new(cancel));
        let mut sink = TransferSink::new(
            1,
            Output::Direct(Box::new(ShortWriter { room: 10 })),
            ByteQuota::bytes(100),
            context,
        );
        assert_eq!(sink.on_transfer(&[0u8; 8]), Flow::Continue);
        assert_eq!(sink.on_transfer(&[0u8; 8]), Flow::Stop);
        assert_eq!(sink.context().stop_reason(), StopReason::WriteFailed);

        let (_, error) = sink.into_parts();
        assert_eq!(error.unwrap().kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_ring_mode_drops_whole_blocks() {
        let (producer, mut consumer) = ring_buffer(16);
        let context = Arc::new(CaptureContext::new(CancelToken::new()));
        let mut sink = TransferSink::new(
            0,
            Output::Ring(producer),
            ByteQuota::unlimited(),
            context,
        );

        assert_eq!(sink.on_transfer(&[7u8; 10]), Flow::Continue);
        assert_eq!(sink.on_transfer(&[8u8; 10]), Flow::Continue);
        assert_eq!(consumer.len(), 10);
        assert_eq!(consumer.drops(), 1);
        assert_eq!(sink.context().stats.get_accepted(), 10);

        let mut out = [0u8; 16];
        assert_eq!(consumer.read(&mut out), 10);
        assert!(out[..10].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_quota_from_samples() {
        assert_eq!(ByteQuota::for_samples(10_000), Some(ByteQuota::bytes(20_000)));
        assert_eq!(
            ByteQuota::for_samples(u64::MAX / BYTES_PER_SAMPLE).and_then(|q| q.remaining()),
            Some(u64::MAX - 1)
        );
        assert_eq!(ByteQuota::for_samples(u64::MAX), None);
    }

    #[test]
    fn test_unlimited_quota() {
        let (mut sink, out, _) = direct_sink(ByteQuota::unlimited());
        for _ in 0..10 {
            assert_eq!(sink.on_transfer(&[0u8; 100]), Flow::Continue);
        }
        assert_eq!(out.0.lock().unwrap().len(), 1000);
    }

    proptest! {
        #[test]
        fn prop_quota_never_exceeded(
            quota in 0u64..4096,
            blocks in proptest::collection::vec(1usize..512, 1..64),
        ) {
            let (mut sink, out, _) = direct_sink(ByteQuota::bytes(quota));
            let mut cumulative = 0u64;
            for len in blocks {
                let flow = sink.on_transfer(&vec![0u8; len]);
                cumulative = (cumulative + len as u64).min(quota);
                let written = out.0.lock().unwrap().len() as u64;
                prop_assert!(written <= quota);
                prop_assert_eq!(written, cumulative);
                // The pass ends exactly when the accepted total reaches the quota
                prop_assert_eq!(flow == Flow::Stop, written == quota);
                if flow == Flow::Stop {
                    break;
                }
            }
        }
    }
}
