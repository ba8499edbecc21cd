//! Single-producer/single-consumer byte ring
//!
//! The producer half belongs to the delivery callback, the consumer half to
//! the drain thread. A ring of `capacity` holds at most `capacity - 1` live
//! bytes, so free space is `(capacity - 1 + head - tail) mod capacity`. A
//! block that does not fit is dropped whole and counted.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

/// Writing half, owned by the delivery callback
pub struct RingProducer {
    inner: Producer<u8>,
    capacity: usize,
    drops: Arc<AtomicU64>,
}

/// Reading half, owned by the drain thread
pub struct RingConsumer {
    inner: Consumer<u8>,
    drops: Arc<AtomicU64>,
}

/// Create a ring able to hold `capacity - 1` bytes
///
/// # Panics
/// If `capacity < 2`.
pub fn ring_buffer(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity >= 2, "ring capacity must be at least 2 bytes");
    let (producer, consumer) = RingBuffer::new(capacity - 1);
    let drops = Arc::new(AtomicU64::new(0));
    (
        RingProducer {
            inner: producer,
            capacity,
            drops: drops.clone(),
        },
        RingConsumer {
            inner: consumer,
            drops,
        },
    )
}

impl RingProducer {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can be pushed right now
    pub fn free_space(&self) -> usize {
        self.inner.slots()
    }

    /// Copy `block` in as a whole, or count a drop and copy nothing
    ///
    /// Never blocks. Returns `false` when the block was dropped.
    pub fn push(&mut self, block: &[u8]) -> bool {
        match self.inner.write_chunk(block.len()) {
            Ok(mut chunk) => {
                // At most two pieces when the write wraps around the end
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&block[..split]);
                second.copy_from_slice(&block[split..]);
                chunk.commit_all();
                true
            }
            Err(_) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Blocks discarded for lack of space
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

impl RingConsumer {
    /// Live bytes waiting to be read
    pub fn len(&self) -> usize {
        self.inner.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Copy up to `dst.len()` live bytes out and release their slots
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.inner.slots());
        let chunk = match self.inner.read_chunk(n) {
            Ok(chunk) => chunk,
            Err(_) => return 0,
        };
        let (a, b) = chunk.as_slices();
        dst[..a.len()].copy_from_slice(a);
        dst[a.len()..n].copy_from_slice(b);
        chunk.commit_all();
        n
    }

    /// Write every live byte to `writer`, then release the slots.
    /// On a write error nothing is released.
    pub fn drain_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<usize> {
        let n = self.inner.slots();
        if n == 0 {
            return Ok(0);
        }
        let chunk = match self.inner.read_chunk(n) {
            Ok(chunk) => chunk,
            Err(_) => return Ok(0),
        };
        let (a, b) = chunk.as_slices();
        writer.write_all(a)?;
        writer.write_all(b)?;
        chunk.commit_all();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Ring whose cursors both sit at `offset`
    fn ring_at(capacity: usize, offset: usize) -> (RingProducer, RingConsumer) {
        let (mut producer, mut consumer) = ring_buffer(capacity);
        let mut scratch = vec![0u8; capacity];
        let mut moved = 0;
        while moved < offset {
            let step = (offset - moved).min(capacity - 1);
            assert!(producer.push(&scratch[..step]));
            assert_eq!(consumer.read(&mut scratch[..step]), step);
            moved += step;
        }
        (producer, consumer)
    }

    #[test]
    fn test_free_space_scenario() {
        // capacity 1024, tail 1020, head 0 -> (1024 - 1 + 0 - 1020) mod 1024 = 3
        let (mut producer, consumer) = ring_buffer(1024);
        assert_eq!(producer.capacity(), 1024);
        assert!(producer.push(&[0x55; 1020]));
        assert_eq!(producer.free_space(), 3);

        assert!(!producer.push(&[0xAA; 10]));
        assert_eq!(producer.drops(), 1);
        // Nothing partially written
        assert_eq!(consumer.len(), 1020);
        assert_eq!(producer.free_space(), 3);
    }

    #[test]
    fn test_capacity_minus_one() {
        let (mut producer, consumer) = ring_buffer(16);
        assert_eq!(producer.free_space(), 15);
        assert!(!producer.push(&[1; 16]));
        assert!(producer.push(&[1; 15]));
        assert_eq!(consumer.len(), 15);
        assert_eq!(producer.free_space(), 0);
        assert!(!producer.push(&[1]));
        assert_eq!(producer.drops(), 2);
    }

    #[test]
    fn test_wraparound_read_back() {
        let (mut producer, mut consumer) = ring_at(8, 6);
        let block = [1u8, 2, 3, 4, 5];
        assert!(producer.push(&block));
        // the write wraps past the end of the storage
        assert_eq!(consumer.len(), 5);

        let mut out = [0u8; 8];
        assert_eq!(consumer.read(&mut out), 5);
        assert_eq!(&out[..5], &block);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_drain_to_writer() {
        let (mut producer, mut consumer) = ring_at(8, 5);
        assert!(producer.push(b"abcdef"));
        let mut sink = Vec::new();
        assert_eq!(consumer.drain_to(&mut sink).unwrap(), 6);
        assert_eq!(sink, b"abcdef");
        assert_eq!(consumer.drain_to(&mut sink).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn prop_live_bytes_bounded(
            capacity in 2usize..256,
            ops in proptest::collection::vec((0usize..64, 0usize..64), 1..64),
        ) {
            let (mut producer, mut consumer) = ring_buffer(capacity);
            let mut scratch = vec![0u8; 64];
            for (push_len, read_len) in ops {
                let free = producer.free_space();
                let drops = producer.drops();
                let before = consumer.len();
                let pushed = producer.push(&scratch[..push_len]);
                if push_len > free {
                    prop_assert!(!pushed);
                    prop_assert_eq!(producer.drops(), drops + 1);
                    prop_assert_eq!(consumer.len(), before);
                } else {
                    prop_assert!(pushed);
                    prop_assert_eq!(consumer.len(), before + push_len);
                }
                prop_assert!(consumer.len() <= capacity - 1);
                consumer.read(&mut scratch[..read_len]);
            }
        }

        #[test]
        fn prop_matches_unbounded_stream(
            capacity in 2usize..64,
            start in 0usize..64,
            blocks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 1..32),
        ) {
            // Starting the cursors anywhere must not change the byte stream seen by the reader
            let (mut producer, mut consumer) = ring_at(capacity, start);
            let mut expected = Vec::new();
            let mut actual = Vec::new();
            for block in blocks {
                if producer.push(&block) {
                    expected.extend_from_slice(&block);
                }
                consumer.drain_to(&mut actual).unwrap();
            }
            prop_assert_eq!(actual, expected);
        }
    }
}
