//! Shared identity, chat action, and playback types for danmaku.
//!
//! This crate is the leaf of the workspace: typed IDs, the continuation
//! token, the chat action sum type, event batches, and the playback clock
//! contract. It has **no internal danmaku dependencies**.
//!
//! # Data Flow
//!
//! ```text
//! ContinuationToken ──fetch──▶ EventBatch { actions: Vec<ChatAction>, offset_ms }
//!                                    │
//!                                    ├── Live:   dispatched immediately
//!                                    └── Replay: indexed by offset_ms, released
//!                                                against PlaybackClock::offset_ms()
//! ```
//!
//! # Key Types
//!
//! |---------------------|----------------------------------------------|
//! | Type                | Purpose                                      |
//! |---------------------|----------------------------------------------|
//! | [`SessionId`]       | One viewing session (UUIDv7)                 |
//! | [`ItemId`]          | One visual item on the surface               |
//! | [`ContinuationToken`] | Opaque cursor into the remote event log    |
//! | [`ChatAction`]      | Add / Delete / DeleteByAuthor / Replace      |
//! | [`EventBatch`]      | Ordered actions from one page (or one offset)|
//! | [`FeedMode`]        | Live or Replay                               |
//! | [`PlaybackClock`]   | Read-only view of the host's media clock     |
//! |---------------------|----------------------------------------------|

pub mod action;
pub mod clock;
pub mod feed;
pub mod ids;

pub use action::{ActionKind, AddedItem, ChatAction};
pub use clock::PlaybackClock;
pub use feed::{ContinuationToken, EventBatch, FeedMode};
pub use ids::{ItemId, ItemIdAllocator, SessionId};
