//! Replay Buffer — time-indexed, deduplicated replay events.
//!
//! Replay pages arrive ahead of (or slightly behind) the playhead. The buffer
//! indexes their actions by video offset and releases them as playback
//! crosses each offset.
//!
//! # Release window
//!
//! ```text
//!            lookback_ms
//!       ◀─────────────────▶
//! ──────┬─────────┬─────────┬──────────▶ offset
//!   current-lookback   checkpoint   current
//!
//! released = (max(checkpoint, current - lookback), current]
//! ```
//!
//! After each query the checkpoint moves to `current` and everything at or
//! below it is dropped from the index. A non-decreasing sequence of queries
//! therefore never returns an action twice.
//!
//! # Dedup
//!
//! Pagination retries re-deliver whole pages. Each action is keyed by the
//! BLAKE3 hash of its JSON serialization; a hash stays known while its entry
//! is indexed. Pruning past the checkpoint forgets it, as do
//! [`ReplayBuffer::reset`] and [`ReplayBuffer::rewind`]. Batches at or below
//! the checkpoint are dropped on arrival since they can never be released.

use std::collections::{BTreeMap, HashSet};

use danmaku_types::{ChatAction, EventBatch};
use tracing::{debug, trace, warn};

use crate::constants::REPLAY_LOOKBACK_MS;

/// Offset-indexed buffer of replay actions for one session.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// offset_ms → actions first observed at that offset.
    index: BTreeMap<i64, Vec<Indexed>>,
    /// Content hashes of the indexed actions.
    seen: HashSet<blake3::Hash>,
    /// Offset up to which actions have been released. None = never queried.
    checkpoint: Option<i64>,
    lookback_ms: i64,
}

#[derive(Debug, Clone)]
struct Indexed {
    /// None when the action could not be serialized.
    hash: Option<blake3::Hash>,
    action: ChatAction,
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayBuffer {
    pub fn new() -> Self {
        Self::with_lookback(REPLAY_LOOKBACK_MS)
    }

    pub fn with_lookback(lookback_ms: i64) -> Self {
        Self {
            index: BTreeMap::new(),
            seen: HashSet::new(),
            checkpoint: None,
            lookback_ms: lookback_ms.max(0),
        }
    }

    /// Index a replay batch. Returns how many actions were new.
    ///
    /// Batches without an offset (live batches) are ignored.
    pub fn push_batch(&mut self, batch: &EventBatch) -> usize {
        let Some(offset_ms) = batch.offset_ms else {
            trace!(actions = batch.len(), "untimed batch ignored by replay buffer");
            return 0;
        };
        if self.checkpoint.is_some_and(|checkpoint| offset_ms <= checkpoint) {
            trace!(offset_ms, checkpoint = ?self.checkpoint, actions = batch.len(), "stale replay batch dropped");
            return 0;
        }

        let mut inserted = 0;
        for action in &batch.actions {
            let hash = content_hash(action);
            match hash {
                Some(hash) if !self.seen.insert(hash) => {
                    trace!(offset_ms, kind = %action.kind(), "duplicate replay action dropped");
                    continue;
                }
                Some(_) => {}
                None => warn!(offset_ms, "replay action could not be hashed, indexing without dedup"),
            }
            self.index.entry(offset_ms).or_default().push(Indexed { hash, action: action.clone() });
            inserted += 1;
        }
        inserted
    }

    /// Release actions whose offset lies in the window ending at `current_ms`,
    /// then advance the checkpoint.
    ///
    /// The checkpoint only moves forward; playing backwards without a
    /// [`rewind`](Self::rewind) releases nothing.
    pub fn pending_since(&mut self, current_ms: i64) -> Vec<ChatAction> {
        let window_start = current_ms.saturating_sub(self.lookback_ms);
        let lower = match self.checkpoint {
            Some(checkpoint) => checkpoint.max(window_start),
            None => window_start,
        };

        let checkpoint = self.checkpoint.map_or(current_ms, |c| c.max(current_ms));
        self.checkpoint = Some(checkpoint);
        // Everything at or below the checkpoint can never be released again.
        let kept = self.index.split_off(&checkpoint.saturating_add(1));
        let pruned = std::mem::replace(&mut self.index, kept);

        // The release window ends at `current_ms <= checkpoint`, so it lies
        // entirely within the pruned part.
        let mut released = Vec::new();
        for (offset_ms, entries) in pruned {
            let due = lower < offset_ms && offset_ms <= current_ms;
            for entry in entries {
                if let Some(hash) = entry.hash {
                    self.seen.remove(&hash);
                }
                if due {
                    released.push(entry.action);
                }
            }
        }

        if !released.is_empty() {
            debug!(current_ms, lower, released = released.len(), "replay actions released");
        }
        released
    }

    /// Clear the index, the dedup set, and the checkpoint.
    pub fn reset(&mut self) {
        self.index.clear();
        self.seen.clear();
        self.checkpoint = None;
    }

    /// Reset for a seek: nothing at or before `target_ms` will be released.
    pub fn rewind(&mut self, target_ms: i64) {
        self.reset();
        self.checkpoint = Some(target_ms);
    }

    pub fn checkpoint(&self) -> Option<i64> {
        self.checkpoint
    }

    /// Number of actions waiting to be released.
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// BLAKE3 over the action's JSON form. Object keys serialize in a stable
/// order, so identical payloads hash identically across pages.
fn content_hash(action: &ChatAction) -> Option<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, action).ok()?;
    Some(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmaku_types::AddedItem;
    use serde_json::json;

    fn add(id: &str) -> ChatAction {
        ChatAction::Add(AddedItem::new(id, "liveChatTextMessageRenderer", json!({ "id": id, "text": id })))
    }

    fn ids(actions: &[ChatAction]) -> Vec<String> {
        actions
            .iter()
            .map(|a| match a {
                ChatAction::Add(item) => item.id.clone(),
                other => format!("{:?}", other.kind()),
            })
            .collect()
    }

    #[test]
    fn test_duplicate_batches_at_same_offset() {
        let mut buffer = ReplayBuffer::new();
        buffer.push_batch(&EventBatch::replay(1000, vec![add("a")]));
        buffer.push_batch(&EventBatch::replay(1000, vec![add("a")]));
        buffer.push_batch(&EventBatch::replay(2500, vec![add("b")]));

        let released = buffer.pending_since(3000);
        assert_eq!(ids(&released), vec!["a", "b"]);
    }

    #[test]
    fn test_same_content_under_another_offset_is_dropped() {
        let mut buffer = ReplayBuffer::new();
        assert_eq!(buffer.push_batch(&EventBatch::replay(1000, vec![add("a")])), 1);
        assert_eq!(buffer.push_batch(&EventBatch::replay(1200, vec![add("a")])), 0);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_forward_queries_are_disjoint() {
        let mut buffer = ReplayBuffer::new();
        for (offset, id) in [(100, "a"), (200, "b"), (300, "c"), (400, "d")] {
            buffer.push_batch(&EventBatch::replay(offset, vec![add(id)]));
        }

        let first = buffer.pending_since(250);
        let second = buffer.pending_since(250);
        let third = buffer.pending_since(400);
        assert_eq!(ids(&first), vec!["a", "b"]);
        assert!(second.is_empty());
        assert_eq!(ids(&third), vec!["c", "d"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_late_batch_within_lookback_is_released() {
        let mut buffer = ReplayBuffer::with_lookback(5000);
        buffer.pending_since(10_000);

        // Arrives after the playhead passed 9_000, but within the lookback.
        buffer.push_batch(&EventBatch::replay(9_000, vec![add("late")]));
        buffer.push_batch(&EventBatch::replay(10_500, vec![add("next")]));
        let released = buffer.pending_since(11_000);
        assert_eq!(ids(&released), vec!["next"], "at/below checkpoint is never released");

        // Before the first query, the lookback bounds the window.
        let mut fresh = ReplayBuffer::with_lookback(5000);
        fresh.push_batch(&EventBatch::replay(1_000, vec![add("old")]));
        fresh.push_batch(&EventBatch::replay(9_000, vec![add("recent")]));
        assert_eq!(ids(&fresh.pending_since(10_000)), vec!["recent"]);
    }

    #[test]
    fn test_pruned_entries_release_their_hashes() {
        let mut buffer = ReplayBuffer::new();
        buffer.push_batch(&EventBatch::replay(1000, vec![add("a")]));
        buffer.push_batch(&EventBatch::replay(5000, vec![add("b")]));
        assert_eq!(buffer.seen.len(), 2);

        assert_eq!(ids(&buffer.pending_since(2000)), vec!["a"]);
        assert_eq!(buffer.seen.len(), 1);
        // Still pending, so a retry of the same page is still a duplicate.
        assert_eq!(buffer.push_batch(&EventBatch::replay(5000, vec![add("b")])), 0);

        assert_eq!(ids(&buffer.pending_since(6000)), vec!["b"]);
        assert!(buffer.seen.is_empty());
        assert!(buffer.is_empty());

        // Redelivered behind the checkpoint: never releasable, never indexed.
        assert_eq!(buffer.push_batch(&EventBatch::replay(1000, vec![add("a")])), 0);
        assert!(buffer.seen.is_empty());
        assert!(buffer.pending_since(7000).is_empty());
    }

    #[test]
    fn test_backward_query_releases_nothing() {
        let mut buffer = ReplayBuffer::new();
        buffer.push_batch(&EventBatch::replay(500, vec![add("a")]));
        buffer.pending_since(1000);
        buffer.push_batch(&EventBatch::replay(800, vec![add("b")]));
        assert!(buffer.pending_since(900).is_empty());
        assert_eq!(buffer.checkpoint(), Some(1000));
    }

    #[test]
    fn test_rewind_sets_checkpoint_and_forgets_hashes() {
        let mut buffer = ReplayBuffer::new();
        buffer.push_batch(&EventBatch::replay(1000, vec![add("a")]));
        buffer.pending_since(2000);

        buffer.rewind(500);
        assert_eq!(buffer.checkpoint(), Some(500));
        assert!(buffer.is_empty());

        // Re-delivered after the seek: indexed again, released once.
        assert_eq!(buffer.push_batch(&EventBatch::replay(1000, vec![add("a")])), 1);
        assert_eq!(ids(&buffer.pending_since(1500)), vec!["a"]);
        assert!(buffer.pending_since(1500).is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut buffer = ReplayBuffer::new();
        buffer.push_batch(&EventBatch::replay(1000, vec![add("a")]));
        buffer.pending_since(500);
        buffer.reset();
        assert_eq!(buffer.checkpoint(), None);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_live_batch_ignored() {
        let mut buffer = ReplayBuffer::new();
        assert_eq!(buffer.push_batch(&EventBatch::live(vec![add("a")])), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_non_add_actions_are_buffered() {
        let mut buffer = ReplayBuffer::new();
        buffer.push_batch(&EventBatch::replay(
            100,
            vec![add("a"), ChatAction::Delete { target_id: "a".into() }],
        ));
        assert_eq!(buffer.pending_since(100).len(), 2);
    }
}
