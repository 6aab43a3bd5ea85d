//! Feed lifecycle status.
//!
//! The synchronizer publishes a [`FeedStatus`] on a broadcast channel each
//! time its loop changes phase. Subscribe via
//! [`FeedHandle::subscribe_status()`](crate::FeedHandle::subscribe_status).

use danmaku_types::FeedMode;

/// Why a synchronizer loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// The abort signal fired.
    Aborted,
    /// The server returned no further continuation.
    Exhausted,
    /// The replay chain looped back on itself.
    Recursive,
    /// Nobody is receiving batches any more.
    Disconnected,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Synchronizer lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Polling { mode: FeedMode },
    /// The last fetch failed; the same continuation is retried.
    Retrying { attempt: u32 },
    /// The replay offset stopped advancing; waiting for a seek.
    Stalled,
    Stopped(StopReason),
}

impl FeedStatus {
    pub fn is_stopped(&self) -> bool {
        matches!(self, FeedStatus::Stopped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_strings() {
        assert_eq!(StopReason::Recursive.to_string(), "recursive");
        assert_eq!("exhausted".parse::<StopReason>().unwrap(), StopReason::Exhausted);
        assert!("nope".parse::<StopReason>().is_err());
    }

    #[test]
    fn test_is_stopped() {
        assert!(FeedStatus::Stopped(StopReason::Aborted).is_stopped());
        assert!(!FeedStatus::Stalled.is_stopped());
    }
}
