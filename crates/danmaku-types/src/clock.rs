//! Playback clock contract.
//!
//! The core reads the host's media position; it never controls playback.
//! Seeks reach the core through the session, not through this trait.

/// Read-only view of a media playback position.
pub trait PlaybackClock: Send + Sync {
    /// Current video-relative position in milliseconds.
    fn offset_ms(&self) -> i64;

    /// Playback rate (1.0 = normal speed).
    fn rate(&self) -> f64;

    fn is_paused(&self) -> bool;

    /// Rate clamped to something usable as a divisor.
    fn effective_rate(&self) -> f64 {
        let rate = self.rate();
        if rate.is_finite() && rate > 0.0 { rate } else { 1.0 }
    }
}
