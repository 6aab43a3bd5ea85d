//! Feed pagination types: continuation tokens, batches, and modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::action::ChatAction;

/// Opaque cursor into the paginated event log.
///
/// Tokens are only ever replaced, never edited; equality is byte equality.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing 8 characters — tokens share long common prefixes, the tail
    /// is what differs between pages. For logs only.
    pub fn short(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.0[start..]
    }
}

impl fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContinuationToken(…{})", self.short())
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Synchronization mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum FeedMode {
    /// Real-time: events dispatched as soon as fetched.
    #[default]
    Live,
    /// Indexed to a seekable timeline.
    #[strum(serialize = "replay", serialize = "archive")]
    Replay,
}

impl FeedMode {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Live => "live",
            FeedMode::Replay => "replay",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered raw events from one page fetch.
///
/// Replay batches carry the video-relative offset they belong to; live
/// batches have `offset_ms = None` and rely on per-action timestamps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub actions: Vec<ChatAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_ms: Option<i64>,
}

impl EventBatch {
    pub fn live(actions: Vec<ChatAction>) -> Self {
        Self { actions, offset_ms: None }
    }

    pub fn replay(offset_ms: i64, actions: Vec<ChatAction>) -> Self {
        Self { actions, offset_ms: Some(offset_ms) }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_token_tail() {
        let token = ContinuationToken::new("0ofMyANhGlhDaWtxSkFB1234abcd");
        assert_eq!(token.short(), "1234abcd");
        assert_eq!(ContinuationToken::new("abc").short(), "abc");
    }

    #[test]
    fn test_feed_mode_aliases() {
        assert_eq!(FeedMode::from_str("REPLAY"), Some(FeedMode::Replay));
        assert_eq!(FeedMode::from_str("archive"), Some(FeedMode::Replay));
        assert_eq!(FeedMode::from_str("live"), Some(FeedMode::Live));
        assert_eq!(FeedMode::from_str("vod"), None);
    }

    #[test]
    fn test_batch_constructors() {
        assert_eq!(EventBatch::replay(1000, vec![]).offset_ms, Some(1000));
        assert!(EventBatch::live(vec![]).is_empty());
    }
}
