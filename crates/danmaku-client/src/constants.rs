//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Site origin used for requests and the authorization digest.
pub const DEFAULT_ORIGIN: &str = "https://www.youtube.com";

/// Live chat continuation endpoint (relative to the origin).
pub const LIVE_ENDPOINT: &str = "/youtubei/v1/live_chat/get_live_chat";

/// Replay chat continuation endpoint (relative to the origin).
pub const REPLAY_ENDPOINT: &str = "/youtubei/v1/live_chat/get_live_chat_replay";

/// Watch page used to discover the initial continuation.
pub const WATCH_PATH: &str = "/watch";

/// Client name sent in the request context.
pub const CLIENT_NAME: &str = "WEB";

/// Client version used when discovery cannot find one in the page.
pub const DEFAULT_CLIENT_VERSION: &str = "2.20240101.00.00";

/// Browser-like user agent; the endpoints reject obviously scripted agents.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Fixed pause between live polls.
pub const LIVE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Floor for the adaptive replay pacing, also subtracted from each interval
/// so the next page lands before playback reaches it.
pub const REPLAY_PACING_FLOOR: Duration = Duration::from_millis(250);

/// Per-request timeout. A timed out request becomes a self-loop page.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How far behind the playhead a late replay batch may still surface.
pub const REPLAY_LOOKBACK_MS: i64 = 5_000;

/// Capacity of the synchronizer → session batch channel.
pub const BATCH_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the feed status broadcast channel.
pub const STATUS_CHANNEL_CAPACITY: usize = 16;
