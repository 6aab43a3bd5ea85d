//! Session context: one video, one feed, one surface.
//!
//! ```text
//!   FeedSynchronizer ──EventBatch──▶ Session ──┬─ live:   dispatch now
//!        ▲   (task)                            └─ replay: ReplayBuffer
//!        │                                                  │ pending_since(clock)
//!   seek/abort ◀── Session::seek / close                    ▼
//!                                          Formatter ─▶ LayoutEngine ─▶ Surface
//! ```
//!
//! Nothing here is global: navigating to another video drops the `Session`
//! (which aborts its feed) and starts a new one.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{Instrument, debug, info, info_span, warn};

use danmaku_client::{
    ContinuationClient, ContinuationSource, FeedHandle, FeedStart, FeedStatus, ReplayBuffer, SessionSignals,
    StartError, StopReason, SyncConfig, spawn_synchronizer,
};
use danmaku_layout::{LayoutEngine, SurfaceBox};
use danmaku_types::{ChatAction, EventBatch, FeedMode, ItemId, ItemIdAllocator, PlaybackClock, SessionId};

use crate::formatter::{Formatter, PlainTextFormatter};
use crate::settings::Settings;
use crate::surface::Surface;

/// Everything a session needs besides its source and clock.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub settings: Settings,
    pub surface: SurfaceBox,
    pub sync: SyncConfig,
    /// Force a feed mode instead of the discovered one.
    pub mode: Option<FeedMode>,
}

impl SessionOptions {
    pub fn new(settings: Settings, surface: SurfaceBox) -> Self {
        Self { settings, surface, sync: SyncConfig::default(), mode: None }
    }
}

/// What one call to [`Session::pump`] or [`Session::next_batch`] changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PumpReport {
    pub batches: usize,
    pub placed: Vec<ItemId>,
    pub removed: Vec<ItemId>,
    /// Adds the formatter declined.
    pub suppressed: usize,
}

impl PumpReport {
    fn merge(&mut self, other: PumpReport) {
        self.batches += other.batches;
        self.placed.extend(other.placed);
        self.removed.extend(other.removed);
        self.suppressed += other.suppressed;
    }
}

pub struct Session {
    id: SessionId,
    mode: FeedMode,
    feed: Option<FeedHandle>,
    batches: mpsc::Receiver<EventBatch>,
    status: broadcast::Receiver<FeedStatus>,
    last_status: FeedStatus,
    feed_closed: bool,
    replay: ReplayBuffer,
    engine: LayoutEngine,
    surface: Surface,
    formatter: Box<dyn Formatter>,
    settings: Settings,
    clock: Arc<dyn PlaybackClock>,
    ids: ItemIdAllocator,
}

impl Session {
    /// Discover the chat log for `video_id` and start following it.
    pub async fn start(
        mut client: ContinuationClient,
        video_id: &str,
        clock: Arc<dyn PlaybackClock>,
        options: SessionOptions,
    ) -> Result<Self, StartError> {
        let span = info_span!("session.start", video_id);
        async move {
            let discovery = client.discover(video_id).await?;
            client.set_context(discovery.client_context(), discovery.api_key.clone());
            let start = discovery.feed_start();
            Ok(Self::with_source(client, start, clock, options))
        }
        .instrument(span)
        .await
    }

    /// Start a session on an arbitrary source. Must be called inside a tokio
    /// runtime; the synchronizer is spawned immediately.
    pub fn with_source<S>(source: S, mut start: FeedStart, clock: Arc<dyn PlaybackClock>, options: SessionOptions) -> Self
    where
        S: ContinuationSource + 'static,
    {
        if let Some(mode) = options.mode {
            start.mode = mode;
        }
        let id = SessionId::new();
        let mode = start.mode;
        let lookback_ms = options.sync.lookback_ms;

        let (feed, batches) = spawn_synchronizer(source, start, options.sync, clock.clone(), SessionSignals::new());
        let status = feed.subscribe_status();
        info!(session = %id.short(), %mode, "session started");

        let settings = options.settings;
        Self {
            id,
            mode,
            feed: Some(feed),
            batches,
            status,
            last_status: FeedStatus::Idle,
            feed_closed: false,
            replay: ReplayBuffer::with_lookback(lookback_ms),
            engine: LayoutEngine::new(settings.layout_config()),
            surface: Surface::new(
                options.surface,
                danmaku_layout::Direction::from_reversed(settings.reversed),
                settings.max_visible_items,
            ),
            formatter: Box::new(PlainTextFormatter),
            settings,
            clock,
            ids: ItemIdAllocator::new(),
        }
    }

    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Latest feed status seen by [`pump`](Self::pump).
    pub fn status(&self) -> FeedStatus {
        self.last_status
    }

    /// The feed has stopped and every batch it sent has been taken.
    pub fn is_feed_done(&self) -> bool {
        self.feed_closed
    }

    /// Why the feed stopped, if it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.last_status {
            FeedStatus::Stopped(reason) => Some(reason),
            _ => None,
        }
    }

    /// Wait for the next batch and ingest it. `None` once the feed is gone.
    pub async fn next_batch(&mut self) -> Option<PumpReport> {
        let batch = self.batches.recv().await;
        self.drain_status();
        match batch {
            Some(batch) => Some(self.ingest(batch)),
            None => {
                self.feed_closed = true;
                None
            }
        }
    }

    /// Take whatever the feed has delivered, release replay entries that are
    /// due at the current playback offset, and drop finished items.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        loop {
            match self.batches.try_recv() {
                Ok(batch) => report.merge(self.ingest(batch)),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.feed_closed = true;
                    break;
                }
            }
        }
        self.drain_status();

        let now_ms = self.clock.offset_ms();
        if self.mode == FeedMode::Replay {
            for action in self.replay.pending_since(now_ms) {
                self.dispatch(&action, now_ms, &mut report);
            }
        }
        report.removed.extend(self.surface.tick(now_ms));
        report
    }

    /// Jump playback to `target_ms`: clear the screen, rewind the buffer and
    /// send the synchronizer after the new position.
    pub fn seek(&mut self, target_ms: i64) {
        let _span = info_span!("seek.request", session = %self.id.short(), target_ms).entered();
        if self.mode == FeedMode::Live {
            debug!("seek ignored for live feed");
            return;
        }
        let retracted = self.surface.retract_all();
        self.replay.rewind(target_ms);
        if let Some(feed) = &self.feed {
            feed.seek(target_ms);
        }
        info!(retracted, "seek requested");
    }

    /// Abort the feed, clear everything, and wait for the task to end.
    pub async fn close(mut self) -> StopReason {
        self.surface.retract_all();
        self.replay.reset();
        let reason = match self.feed.take() {
            Some(feed) => {
                feed.abort();
                feed.join().await
            }
            None => StopReason::Aborted,
        };
        info!(session = %self.id.short(), %reason, "session closed");
        reason
    }

    fn ingest(&mut self, batch: EventBatch) -> PumpReport {
        let mut report = PumpReport { batches: 1, ..PumpReport::default() };
        match self.mode {
            FeedMode::Live => {
                let now_ms = self.clock.offset_ms();
                for action in &batch.actions {
                    self.dispatch(action, now_ms, &mut report);
                }
            }
            FeedMode::Replay => {
                let added = self.replay.push_batch(&batch);
                debug!(offset_ms = ?batch.offset_ms, added, buffered = self.replay.len(), "buffered replay batch");
            }
        }
        report
    }

    fn dispatch(&mut self, action: &ChatAction, now_ms: i64, report: &mut PumpReport) {
        match action {
            ChatAction::Add(_) => {
                let Some(request) = self.formatter.format(action, &self.settings) else {
                    report.suppressed += 1;
                    return;
                };
                let id = self.ids.next();
                let duration_ms = self.settings.duration_ms as f64;
                match self.surface.place(&self.engine, id, request, duration_ms, now_ms) {
                    Ok(_) => report.placed.push(id),
                    Err(e) => warn!(error = %e, "placement rejected"),
                }
            }
            ChatAction::Delete { target_id } => {
                report.removed.extend(self.surface.delete(target_id));
            }
            ChatAction::DeleteByAuthor { channel_id } => {
                report.removed.extend(self.surface.delete_by_author(channel_id));
            }
            ChatAction::Replace { target_id, .. } => match self.formatter.format(action, &self.settings) {
                Some(request) => {
                    self.surface.replace(target_id, request);
                }
                None => report.removed.extend(self.surface.delete(target_id)),
            },
        }
    }

    fn drain_status(&mut self) {
        loop {
            match self.status.try_recv() {
                Ok(status) => self.last_status = status,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "feed status lagged");
                }
                Err(_) => break,
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(feed) = &self.feed {
            feed.abort();
        }
    }
}
