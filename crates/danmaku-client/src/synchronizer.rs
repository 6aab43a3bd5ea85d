//! Feed Synchronizer — the poll loop.
//!
//! One synchronizer drives one feed for one session. It pulls pages from a
//! [`ContinuationSource`], emits [`EventBatch`]es in fetch order over an mpsc
//! channel, and publishes [`FeedStatus`] on a broadcast channel.
//!
//! ```text
//!            spawn_synchronizer()
//!   Idle ───────────────┬──────────────────────┐
//!                       ▼                      ▼
//!                 LivePolling            ReplayPolling
//!                       │                      │
//!   abort / no next / receiver dropped / chain recursion
//!                       └──────────┬───────────┘
//!                                  ▼
//!                               Stopped
//! ```
//!
//! # Live
//!
//! Fetch, drop any add whose timestamp is not strictly greater than the last
//! one dispatched, emit, sleep [`LIVE_POLL_INTERVAL`], repeat.
//!
//! # Replay
//!
//! Pacing follows the offsets the server returns:
//!
//! | Page                         | Next wait                                   |
//! |------------------------------|---------------------------------------------|
//! | failed (self-loop)           | pacing floor                                |
//! | offset advanced `prev → new` | `max(floor, (new - prev) / rate - floor)`   |
//! | offset did not advance       | until seek or abort; cycle map cleared      |
//! | seek pending                 | none, refetch immediately                   |
//!
//! A seek fetches the last player-seek continuation with the target as the
//! player offset. Before each chained fetch the token is checked against
//! the `next → prev` map; a chain that walks back on itself ends the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use danmaku_types::{ChatAction, ContinuationToken, EventBatch, FeedMode, PlaybackClock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::constants::{
    BATCH_CHANNEL_CAPACITY, LIVE_POLL_INTERVAL, REPLAY_LOOKBACK_MS, REPLAY_PACING_FLOOR,
    STATUS_CHANNEL_CAPACITY,
};
use crate::continuation::{ContinuationSource, Page};
use crate::signals::{SessionSignals, Wake};
use crate::status::{FeedStatus, StopReason};

// ============================================================================
// Configuration
// ============================================================================

/// Pacing and channel configuration. Transport settings (origin, timeout,
/// user agent) live on [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub live_interval: Duration,
    pub pacing_floor: Duration,
    /// Replay look-back window handed to the session's `ReplayBuffer`.
    pub lookback_ms: i64,
    pub batch_capacity: usize,
    pub status_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            live_interval: LIVE_POLL_INTERVAL,
            pacing_floor: REPLAY_PACING_FLOOR,
            lookback_ms: REPLAY_LOOKBACK_MS,
            batch_capacity: BATCH_CHANNEL_CAPACITY,
            status_capacity: STATUS_CHANNEL_CAPACITY,
        }
    }
}

/// Next wait after a replay page advanced from `prev_ms` to `new_ms`.
pub fn replay_interval(prev_ms: i64, new_ms: i64, rate: f64, floor: Duration) -> Duration {
    let floor_ms = floor.as_secs_f64() * 1000.0;
    let span_ms = (new_ms - prev_ms) as f64 / rate;
    // Tiny rates overflow Duration; pace at the floor rather than panic.
    Duration::try_from_secs_f64((span_ms - floor_ms).max(floor_ms) / 1000.0).map_or(floor, |d| d.max(floor))
}

// ============================================================================
// Cycle detection
// ============================================================================

/// `next → prev` links of the replay chain.
#[derive(Debug, Default)]
pub struct CycleDetector {
    prev_of: HashMap<ContinuationToken, ContinuationToken>,
}

impl CycleDetector {
    /// Record that fetching `prev` returned `next`. Self-loops are skipped.
    pub fn record(&mut self, prev: &ContinuationToken, next: &ContinuationToken) {
        if prev != next {
            self.prev_of.insert(next.clone(), prev.clone());
        }
    }

    /// True when walking back from `current` takes more steps than there
    /// are links, i.e. the walk revisits a token.
    pub fn is_recursive(&self, current: &ContinuationToken) -> bool {
        let mut cursor = current;
        let mut steps = 0;
        while let Some(prev) = self.prev_of.get(cursor) {
            steps += 1;
            if steps > self.prev_of.len() {
                return true;
            }
            cursor = prev;
        }
        false
    }

    pub fn clear(&mut self) {
        self.prev_of.clear();
    }

    pub fn len(&self) -> usize {
        self.prev_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev_of.is_empty()
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Loop state. Mirrors what is published as [`FeedStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    LivePolling,
    ReplayPolling,
    Stopped(StopReason),
}

/// Where a feed starts.
#[derive(Debug, Clone)]
pub struct FeedStart {
    pub mode: FeedMode,
    pub seed: ContinuationToken,
}

pub struct FeedSynchronizer<S> {
    source: S,
    start: FeedStart,
    config: SyncConfig,
    clock: Arc<dyn PlaybackClock>,
    signals: SessionSignals,
    batches: mpsc::Sender<EventBatch>,
    status: broadcast::Sender<FeedStatus>,
    state: SyncState,
}

impl<S: ContinuationSource> FeedSynchronizer<S> {
    pub fn new(
        source: S,
        start: FeedStart,
        config: SyncConfig,
        clock: Arc<dyn PlaybackClock>,
        signals: SessionSignals,
        batches: mpsc::Sender<EventBatch>,
        status: broadcast::Sender<FeedStatus>,
    ) -> Self {
        Self { source, start, config, clock, signals, batches, status, state: SyncState::Idle }
    }

    /// Run until stopped. Returns why.
    pub async fn run(mut self) -> StopReason {
        let mode = self.start.mode;
        self.transition(match mode {
            FeedMode::Live => SyncState::LivePolling,
            FeedMode::Replay => SyncState::ReplayPolling,
        });
        self.publish(FeedStatus::Polling { mode });

        let reason = match mode {
            FeedMode::Live => self.run_live().await,
            FeedMode::Replay => self.run_replay().await,
        };

        self.transition(SyncState::Stopped(reason));
        self.publish(FeedStatus::Stopped(reason));
        info!(%mode, %reason, "feed stopped");
        reason
    }

    // ── live ───────────────────────────────────────────────────────────────

    async fn run_live(&mut self) -> StopReason {
        let mut token = self.start.seed.clone();
        let mut last_ts: Option<u64> = None;
        let mut failures = 0u32;

        loop {
            let page = self.fetch(FeedMode::Live, &token, None).await;
            if self.signals.is_aborted() {
                return StopReason::Aborted;
            }
            self.note_outcome(page.failed, &mut failures, FeedMode::Live);

            let actions: Vec<ChatAction> = page.batches.into_iter().flat_map(|b| b.actions).collect();
            let (fresh, newest) = filter_live(actions, last_ts);
            if !fresh.is_empty() {
                if let Err(reason) = self.emit(EventBatch::live(fresh)).await {
                    return reason;
                }
            }
            if let Some(ts) = newest {
                last_ts = Some(last_ts.map_or(ts, |last| last.max(ts)));
            }

            match page.continuations.next {
                Some(next) => token = next,
                None => return StopReason::Exhausted,
            }
            if self.signals.sleep(self.config.live_interval).await == Wake::Abort {
                return StopReason::Aborted;
            }
        }
    }

    // ── replay ─────────────────────────────────────────────────────────────

    async fn run_replay(&mut self) -> StopReason {
        let mut token = self.start.seed.clone();
        let mut chain = CycleDetector::default();
        let mut player_seek: Option<ContinuationToken> = None;
        let mut prev_offset = self.clock.offset_ms();
        let mut first_fetch = true;
        let mut failures = 0u32;

        loop {
            if self.signals.is_aborted() {
                return StopReason::Aborted;
            }

            let (fetched, player_offset) = match self.signals.seek.take() {
                Some(target_ms) => {
                    chain.clear();
                    prev_offset = target_ms;
                    let via = player_seek.clone().unwrap_or_else(|| token.clone());
                    info_span!("seek.refetch", target_ms, token = via.short()).in_scope(|| {
                        info!(target_ms, has_player_seek = player_seek.is_some(), "seek: refetching");
                    });
                    (via, Some(target_ms))
                }
                None => {
                    if chain.is_recursive(&token) {
                        warn!(token = token.short(), links = chain.len(), "replay continuation chain is recursive");
                        return StopReason::Recursive;
                    }
                    let offset = first_fetch.then(|| self.clock.offset_ms());
                    (token.clone(), offset)
                }
            };

            let page = self.fetch(FeedMode::Replay, &fetched, player_offset).await;
            if self.signals.is_aborted() {
                return StopReason::Aborted;
            }
            self.note_outcome(page.failed, &mut failures, FeedMode::Replay);
            if !page.failed {
                first_fetch = false;
            }
            if let Some(seek_token) = &page.continuations.player_seek {
                player_seek = Some(seek_token.clone());
            }

            let failed = page.failed;
            let newest = page.max_offset_ms();
            for batch in page.batches {
                if batch.is_empty() {
                    continue;
                }
                if let Err(reason) = self.emit(batch).await {
                    return reason;
                }
            }

            let Some(next) = page.continuations.next else {
                return StopReason::Exhausted;
            };
            chain.record(&fetched, &next);
            token = next;

            if self.signals.seek.is_pending() {
                continue;
            }

            let wait = if failed {
                Some(self.config.pacing_floor)
            } else {
                match newest {
                    Some(new_ms) if new_ms > prev_offset => {
                        let wait = replay_interval(prev_offset, new_ms, self.clock.effective_rate(), self.config.pacing_floor);
                        trace!(prev_offset, new_ms, wait_ms = wait.as_millis() as u64, "replay pacing");
                        prev_offset = new_ms;
                        Some(wait)
                    }
                    _ => {
                        debug!(prev_offset, ?newest, "replay offset did not advance, waiting for seek");
                        chain.clear();
                        self.publish(FeedStatus::Stalled);
                        None
                    }
                }
            };

            if self.signals.pace(wait).await == Wake::Abort {
                return StopReason::Aborted;
            }
        }
    }

    // ── helpers ────────────────────────────────────────────────────────────

    async fn fetch(&self, mode: FeedMode, token: &ContinuationToken, player_offset_ms: Option<i64>) -> Page {
        let span = info_span!("feed.poll", %mode, token = token.short(), player_offset_ms);
        self.source.fetch_page(mode, token, player_offset_ms).instrument(span).await
    }

    /// Send one batch downstream, giving up on abort or a dropped receiver.
    async fn emit(&self, batch: EventBatch) -> Result<(), StopReason> {
        tokio::select! {
            biased;
            _ = self.signals.abort.cancelled() => Err(StopReason::Aborted),
            sent = self.batches.send(batch) => sent.map_err(|_| StopReason::Disconnected),
        }
    }

    /// Count consecutive failures; publish `Retrying` or the recovery.
    fn note_outcome(&self, failed: bool, failures: &mut u32, mode: FeedMode) {
        if failed {
            *failures += 1;
            self.publish(FeedStatus::Retrying { attempt: *failures });
        } else if *failures > 0 {
            *failures = 0;
            self.publish(FeedStatus::Polling { mode });
        }
    }

    fn transition(&mut self, next: SyncState) {
        trace!(from = ?self.state, to = ?next, "synchronizer state");
        self.state = next;
    }

    fn publish(&self, status: FeedStatus) {
        // No subscribers is fine.
        let _ = self.status.send(status);
    }
}

/// Drop adds whose timestamp is not newer than `last_ts`. Returns the kept
/// actions and the newest timestamp among kept adds.
fn filter_live(actions: Vec<ChatAction>, last_ts: Option<u64>) -> (Vec<ChatAction>, Option<u64>) {
    let mut newest: Option<u64> = None;
    let kept = actions
        .into_iter()
        .filter(|action| match action.add_timestamp_usec() {
            Some(ts) if last_ts.is_some_and(|last| ts <= last) => {
                trace!(ts, "dropping already-dispatched add");
                false
            }
            Some(ts) => {
                newest = Some(newest.map_or(ts, |n| n.max(ts)));
                true
            }
            None => true,
        })
        .collect();
    (kept, newest)
}

// ============================================================================
// Spawned handle
// ============================================================================

/// Control surface of a running synchronizer.
#[derive(Debug)]
pub struct FeedHandle {
    signals: SessionSignals,
    status: broadcast::Sender<FeedStatus>,
    task: JoinHandle<StopReason>,
}

impl FeedHandle {
    /// Ask the replay loop to jump to `target_ms`. Ignored by live feeds.
    pub fn seek(&self, target_ms: i64) {
        self.signals.seek.request(target_ms);
    }

    pub fn abort(&self) {
        self.signals.abort.cancel();
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end.
    pub async fn join(self) -> StopReason {
        match self.task.await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(error = %e, "synchronizer task did not complete");
                StopReason::Aborted
            }
        }
    }
}

/// Spawn a synchronizer task. Batches arrive on the returned receiver.
pub fn spawn_synchronizer<S>(
    source: S,
    start: FeedStart,
    config: SyncConfig,
    clock: Arc<dyn PlaybackClock>,
    signals: SessionSignals,
) -> (FeedHandle, mpsc::Receiver<EventBatch>)
where
    S: ContinuationSource + 'static,
{
    let (batch_tx, batch_rx) = mpsc::channel(config.batch_capacity.max(1));
    let (status_tx, _) = broadcast::channel(config.status_capacity.max(1));

    info!(mode = %start.mode, seed = start.seed.short(), "starting feed");
    let synchronizer =
        FeedSynchronizer::new(source, start, config, clock, signals.clone(), batch_tx, status_tx.clone());
    let task = tokio::spawn(synchronizer.run());

    (FeedHandle { signals, status: status_tx, task }, batch_rx)
}
