//! Abort and seek signals for one viewing session.
//!
//! Abort is terminal: a [`CancellationToken`] checked at every yield point.
//! Seek is a single-slot "latest target" cell. Requesting a seek overwrites
//! any target not yet consumed and wakes a sleeping replay loop; the loop
//! takes the target cooperatively at the top of its next iteration.
//!
//! A new session gets fresh signals. Signals are never reused across
//! sessions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Single-slot seek target shared between the session and its loop.
#[derive(Clone, Default)]
pub struct SeekSlot {
    inner: Arc<SeekInner>,
}

#[derive(Default)]
struct SeekInner {
    target_ms: Mutex<Option<i64>>,
    notify: Notify,
}

impl SeekSlot {
    /// Store `target_ms` as the latest seek target and wake the loop.
    pub fn request(&self, target_ms: i64) {
        *self.inner.target_ms.lock() = Some(target_ms);
        self.inner.notify.notify_one();
    }

    /// Consume the pending target, if any.
    pub fn take(&self) -> Option<i64> {
        self.inner.target_ms.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.target_ms.lock().is_some()
    }

    /// Resolve once a target is pending.
    ///
    /// `notify_one` stores a permit when nobody is waiting, so a request
    /// made between the check and the await still wakes us. Stale permits
    /// (target already taken) loop back to waiting.
    pub async fn requested(&self) {
        loop {
            if self.is_pending() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}

impl std::fmt::Debug for SeekSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeekSlot").field("target_ms", &*self.inner.target_ms.lock()).finish()
    }
}

/// What ended a [`SessionSignals::pace`] wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Seek,
    Abort,
}

/// Abort token plus seek slot.
#[derive(Clone, Debug, Default)]
pub struct SessionSignals {
    pub abort: CancellationToken,
    pub seek: SeekSlot,
}

impl SessionSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Sleep for `wait`, or forever when `None`, waking early on abort or
    /// on a pending seek.
    pub async fn pace(&self, wait: Option<Duration>) -> Wake {
        if self.is_aborted() {
            return Wake::Abort;
        }
        let timer = async {
            match wait {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Wake::Abort,
            _ = self.seek.requested() => Wake::Seek,
            _ = timer => Wake::Elapsed,
        }
    }

    /// Sleep for `wait`, waking early only on abort.
    pub async fn sleep(&self, wait: Duration) -> Wake {
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Wake::Abort,
            _ = tokio::time::sleep(wait) => Wake::Elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_latest_seek_wins() {
        let slot = SeekSlot::default();
        slot.request(1000);
        slot.request(5000);
        assert!(slot.is_pending());
        assert_eq!(slot.take(), Some(5000));
        assert_eq!(slot.take(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_elapses() {
        let signals = SessionSignals::new();
        let start = Instant::now();
        assert_eq!(signals.pace(Some(Duration::from_millis(750))).await, Wake::Elapsed);
        assert_eq!(start.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_interrupts_indefinite_wait() {
        let signals = SessionSignals::new();
        let remote = signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            remote.seek.request(42_000);
        });
        assert_eq!(signals.pace(None).await, Wake::Seek);
        assert_eq!(signals.seek.take(), Some(42_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_permit_does_not_wake() {
        let signals = SessionSignals::new();
        signals.seek.request(1);
        signals.seek.take();
        let start = Instant::now();
        assert_eq!(signals.pace(Some(Duration::from_millis(250))).await, Wake::Elapsed);
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_wins() {
        let signals = SessionSignals::new();
        signals.seek.request(1);
        signals.abort.cancel();
        assert_eq!(signals.pace(None).await, Wake::Abort);
        assert_eq!(signals.sleep(Duration::from_secs(1)).await, Wake::Abort);
    }
}
