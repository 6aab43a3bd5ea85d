//! Danmaku feed client library
//!
//! Pulls a continuation-paginated chat log in live or replay mode and turns
//! it into ordered [`EventBatch`](danmaku_types::EventBatch)es.
//!
//! ```text
//!   discover(video_id) ──▶ FeedStart { mode, seed }
//!                                │
//!                                ▼
//!   ContinuationClient ◀── FeedSynchronizer ──mpsc──▶ EventBatch ──▶ ReplayBuffer (replay)
//!   (HTTP, self-loop       (pacing, cycles,  ──bcast─▶ FeedStatus     or straight to
//!    on failure)            seek, abort)                              layout (live)
//! ```
//!
//! The synchronizer is generic over [`ContinuationSource`], so tests drive it
//! with scripted pages instead of HTTP.

pub mod auth;
pub mod constants;
pub mod continuation;
pub mod discovery;
pub mod replay;
pub mod signals;
pub mod status;
pub mod synchronizer;
pub mod wire;

pub use auth::AuthContext;
pub use continuation::{ClientConfig, ClientError, ContinuationClient, ContinuationSource, Page};
pub use discovery::{Discovery, StartError, parse_watch_page};
pub use replay::ReplayBuffer;
pub use signals::{SeekSlot, SessionSignals, Wake};
pub use status::{FeedStatus, StopReason};
pub use synchronizer::{
    CycleDetector, FeedHandle, FeedStart, FeedSynchronizer, SyncConfig, SyncState, replay_interval,
    spawn_synchronizer,
};
pub use wire::{ClientContext, Continuations};
