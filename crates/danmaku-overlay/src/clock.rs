//! Playback clocks.
//!
//! [`WallClock`] advances with real time scaled by the playback rate and is
//! what the CLI uses. [`ManualClock`] only moves when told to.

use parking_lot::Mutex;
use tokio::time::Instant;

use danmaku_types::PlaybackClock;

/// A clock moved by hand.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    offset_ms: i64,
    rate: f64,
    paused: bool,
}

impl ManualClock {
    pub fn new(offset_ms: i64) -> Self {
        Self { state: Mutex::new(ManualState { offset_ms, rate: 1.0, paused: false }) }
    }

    pub fn set_offset(&self, offset_ms: i64) {
        self.state.lock().offset_ms = offset_ms;
    }

    pub fn advance(&self, delta_ms: i64) {
        self.state.lock().offset_ms += delta_ms;
    }

    pub fn set_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl PlaybackClock for ManualClock {
    fn offset_ms(&self) -> i64 {
        self.state.lock().offset_ms
    }

    fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

/// Real-time clock: `offset = anchor_offset + elapsed * rate` while playing.
///
/// Uses tokio's clock, so paused-time tests drive it too.
#[derive(Debug)]
pub struct WallClock {
    state: Mutex<WallState>,
}

#[derive(Debug)]
struct WallState {
    anchor_offset_ms: i64,
    anchor: Instant,
    rate: f64,
    paused: bool,
}

impl WallState {
    fn offset_now(&self) -> i64 {
        if self.paused {
            return self.anchor_offset_ms;
        }
        let elapsed_ms = self.anchor.elapsed().as_secs_f64() * 1000.0;
        self.anchor_offset_ms + (elapsed_ms * self.rate) as i64
    }

    /// Fold elapsed time into the anchor before changing rate or pause state.
    fn rebase(&mut self) {
        self.anchor_offset_ms = self.offset_now();
        self.anchor = Instant::now();
    }
}

impl WallClock {
    pub fn new(start_offset_ms: i64, rate: f64) -> Self {
        Self {
            state: Mutex::new(WallState {
                anchor_offset_ms: start_offset_ms,
                anchor: Instant::now(),
                rate,
                paused: false,
            }),
        }
    }

    pub fn seek(&self, offset_ms: i64) {
        let mut state = self.state.lock();
        state.anchor_offset_ms = offset_ms;
        state.anchor = Instant::now();
    }

    pub fn set_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        state.rebase();
        state.rate = rate;
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        state.rebase();
        state.paused = paused;
    }
}

impl PlaybackClock for WallClock {
    fn offset_ms(&self) -> i64 {
        self.state.lock().offset_now()
    }

    fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1000);
        clock.advance(250);
        assert_eq!(clock.offset_ms(), 1250);
        clock.set_rate(0.0);
        assert_eq!(clock.effective_rate(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_scales_by_rate() {
        let clock = WallClock::new(10_000, 2.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.offset_ms(), 11_000);

        clock.set_rate(1.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.offset_ms(), 11_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_pause_and_seek() {
        let clock = WallClock::new(0, 1.0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        clock.set_paused(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.offset_ms(), 300);
        assert!(clock.is_paused());

        clock.seek(60_000);
        clock.set_paused(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(clock.offset_ms(), 60_100);
    }
}
