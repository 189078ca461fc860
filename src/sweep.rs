//! Background sweep plumbing: the cancellation signal and the handle owners
//! use to wait for the sweeper to finish.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CancellationToken
// ---------------------------------------------------------------------------

/// An externally-owned stop signal observed by the background sweep.
///
/// Cloning yields handles to the same signal.  Cancelling is idempotent and
/// wakes every waiter at once: internally the token holds the sending half of
/// a channel no message is ever sent on, and [`cancel`] drops it, so every
/// pending or future receive observes the disconnect immediately.
///
/// # Example
/// ```
/// use solo::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// assert!(!observer.is_cancelled());
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
///
/// [`cancel`]: CancellationToken::cancel
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        CancellationToken {
            inner: Arc::new(TokenInner {
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Fires the signal.  Safe to call more than once.
    pub fn cancel(&self) {
        self.inner.tx.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// Blocks for up to `timeout`.  Returns `true` if the token was cancelled
    /// (possibly before the call), `false` if the timeout elapsed first.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SweepHandle
// ---------------------------------------------------------------------------

/// Completion handle of the background sweep thread.
///
/// Returned by [`Cache::schedule_purge`]; joining it after cancelling the
/// cache's token gives a graceful shutdown.
///
/// [`Cache::schedule_purge`]: crate::Cache::schedule_purge
pub struct SweepHandle {
    pub(crate) thread: JoinHandle<()>,
}

impl SweepHandle {
    /// Waits for the sweep thread to terminate.
    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::error!("background sweep thread panicked");
        }
    }

    /// Whether the sweep thread has already terminated.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
