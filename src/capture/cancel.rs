//! Abort flag and wake-up channel for the controlling thread
//!
//! The controlling thread blocks in [`CancelToken::wait`] until the
//! acquisition timer fires or something posts a [`Wake`]. Timer expiry and
//! notifications resolve through the same `select!`, so the caller handles
//! both uniformly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, Receiver, Sender};

/// Why the controlling thread woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Acquisition interval elapsed
    Timer,
    /// Global abort requested
    Aborted,
    /// The sink finished the pass (quota reached, write failure, no output)
    PassFinished,
}

#[derive(Debug)]
struct Inner {
    aborted: AtomicBool,
    tx: Sender<Wake>,
    rx: Receiver<Wake>,
}

/// Cloneable handle shared by the engine, the sink and signal handlers
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        // Single slot: one pending wake-up is enough to release the waiter
        let (tx, rx) = bounded(1);
        Self {
            inner: Arc::new(Inner {
                aborted: AtomicBool::new(false),
                tx,
                rx,
            }),
        }
    }

    /// Set the global abort flag and wake the controlling thread
    pub fn cancel(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.notify(Wake::Aborted);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Post a wake-up without blocking. A full slot already holds a pending wake-up.
    pub fn notify(&self, wake: Wake) {
        let _ = self.inner.tx.try_send(wake);
    }

    /// Discard wake-ups left over from a previous pass
    pub fn clear_pending(&self) {
        while self.inner.rx.try_recv().is_ok() {}
    }

    /// Block until `interval` elapses or a wake-up is posted
    pub fn wait(&self, interval: Duration) -> Wake {
        if self.is_cancelled() {
            return Wake::Aborted;
        }
        select! {
            recv(self.inner.rx) -> msg => msg.unwrap_or(Wake::Aborted),
            recv(after(interval)) -> _ => Wake::Timer,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
