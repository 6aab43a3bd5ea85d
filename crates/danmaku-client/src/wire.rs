//! JSON wire format of the continuation endpoints.
//!
//! Requests carry `{ context, continuation, currentPlayerState? }`. Responses
//! nest the interesting parts under
//! `continuationContents.liveChatContinuation.{continuations, actions}`.
//!
//! Every action object has one key naming its kind. Decoding happens
//! here, once, into [`ChatAction`]; unknown kinds are skipped.
//!
//! ```text
//! actions[]
//! ├── addChatItemAction            → ChatAction::Add
//! ├── markChatItemAsDeletedAction  → ChatAction::Delete
//! ├── markChatItemsByAuthorAsDeletedAction → ChatAction::DeleteByAuthor
//! ├── replaceChatItemAction        → ChatAction::Replace
//! └── replayChatItemAction { actions[], videoOffsetTimeMsec }
//!                                  → EventBatch at that offset (replay only)
//! ```

use danmaku_types::{AddedItem, ChatAction, ContinuationToken, EventBatch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::constants::{CLIENT_NAME, DEFAULT_CLIENT_VERSION};

// ============================================================================
// Request
// ============================================================================

/// Client context sent with every request.
#[derive(Debug, Clone, Serialize)]
pub struct ClientContext {
    pub client: ClientInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_name: String,
    pub client_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hl: Option<String>,
}

impl ClientContext {
    pub fn new(client_version: impl Into<String>) -> Self {
        Self {
            client: ClientInfo {
                client_name: CLIENT_NAME.to_string(),
                client_version: client_version.into(),
                hl: None,
            },
        }
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_VERSION)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest<'a> {
    pub context: &'a ClientContext,
    pub continuation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player_state: Option<PlayerState>,
}

/// The endpoint expects the offset as a decimal string.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerState {
    pub player_offset_ms: String,
}

impl PlayerState {
    pub fn at(offset_ms: i64) -> Self {
        Self { player_offset_ms: offset_ms.max(0).to_string() }
    }
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    #[serde(default)]
    continuation_contents: Option<ContinuationContents>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinuationContents {
    live_chat_continuation: LiveChatContinuation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveChatContinuation {
    #[serde(default)]
    continuations: Vec<ContinuationEntry>,
    #[serde(default)]
    actions: Vec<Value>,
}

/// One element of `continuations[]`; exactly one field is set in practice.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinuationEntry {
    invalidation_continuation_data: Option<ContinuationData>,
    timed_continuation_data: Option<ContinuationData>,
    reload_continuation_data: Option<ContinuationData>,
    live_chat_replay_continuation_data: Option<ContinuationData>,
    player_seek_continuation_data: Option<ContinuationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinuationData {
    continuation: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Next-page tokens extracted from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Continuations {
    /// Chained continuation (invalidation/timed for live, replay chain for replay).
    pub next: Option<ContinuationToken>,
    /// Replay only: token that jumps to an arbitrary player offset.
    pub player_seek: Option<ContinuationToken>,
    /// Server-suggested poll delay, informational.
    pub timeout_ms: Option<u64>,
}

impl Continuations {
    /// A page that points back at the token that produced it.
    pub fn self_loop(token: &ContinuationToken) -> Self {
        Self { next: Some(token.clone()), player_seek: None, timeout_ms: None }
    }
}

/// A decoded response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPage {
    pub batches: Vec<EventBatch>,
    pub continuations: Continuations,
}

/// Decode a response body.
pub fn decode_page(body: &[u8]) -> Result<DecodedPage, serde_json::Error> {
    let response: ChatResponse = serde_json::from_slice(body)?;
    let Some(contents) = response.continuation_contents else {
        // No continuation contents: the log has ended.
        return Ok(DecodedPage::default());
    };
    let chat = contents.live_chat_continuation;

    let mut continuations = Continuations::default();
    for entry in chat.continuations {
        if let Some(seek) = entry.player_seek_continuation_data {
            continuations.player_seek = Some(ContinuationToken::new(seek.continuation));
            continue;
        }
        let chained = entry
            .invalidation_continuation_data
            .or(entry.timed_continuation_data)
            .or(entry.reload_continuation_data)
            .or(entry.live_chat_replay_continuation_data);
        if let Some(data) = chained {
            if continuations.next.is_none() {
                continuations.timeout_ms = data.timeout_ms;
                continuations.next = Some(ContinuationToken::new(data.continuation));
            }
        }
    }

    Ok(DecodedPage { batches: decode_actions(&chat.actions), continuations })
}

/// Split raw actions into batches: one untimed batch for bare actions, one
/// timed batch per replay wrapper.
pub fn decode_actions(raw: &[Value]) -> Vec<EventBatch> {
    let mut untimed = Vec::new();
    let mut timed = Vec::new();

    for value in raw {
        let Some(obj) = value.as_object() else { continue };
        if let Some(wrapper) = obj.get("replayChatItemAction") {
            let Some(offset_ms) = wrapper.get("videoOffsetTimeMsec").and_then(parse_i64) else {
                trace!("replay wrapper without offset skipped");
                continue;
            };
            let actions = wrapper
                .get("actions")
                .and_then(Value::as_array)
                .map(|inner| inner.iter().filter_map(decode_action).collect())
                .unwrap_or_default();
            timed.push(EventBatch::replay(offset_ms, actions));
        } else if let Some(action) = decode_action(value) {
            untimed.push(action);
        }
    }

    let mut batches = Vec::with_capacity(timed.len() + 1);
    if !untimed.is_empty() {
        batches.push(EventBatch::live(untimed));
    }
    batches.extend(timed);
    batches
}

/// Decode a single (non-wrapper) action object.
///
/// Action objects may carry bookkeeping keys (`clickTrackingParams`) next to
/// the kind key, so every key is checked.
pub fn decode_action(value: &Value) -> Option<ChatAction> {
    let obj = value.as_object()?;
    for (key, body) in obj {
        let action = match key.as_str() {
            "addChatItemAction" => body
                .get("item")
                .and_then(Value::as_object)
                .and_then(decode_item)
                .map(ChatAction::Add),
            "markChatItemAsDeletedAction" => body
                .get("targetItemId")
                .and_then(Value::as_str)
                .map(|id| ChatAction::Delete { target_id: id.to_string() }),
            "markChatItemsByAuthorAsDeletedAction" => body
                .get("externalChannelId")
                .and_then(Value::as_str)
                .map(|id| ChatAction::DeleteByAuthor { channel_id: id.to_string() }),
            "replaceChatItemAction" => {
                let target_id = body.get("targetItemId").and_then(Value::as_str);
                let item = body
                    .get("replacementItem")
                    .and_then(Value::as_object)
                    .and_then(decode_item);
                target_id
                    .zip(item)
                    .map(|(target_id, item)| ChatAction::Replace { target_id: target_id.to_string(), item })
            }
            "clickTrackingParams" => continue,
            other => {
                trace!(kind = other, "unhandled chat action skipped");
                None
            }
        };
        return action;
    }
    None
}

/// `item` is `{ "<rendererName>": { id, timestampUsec, authorExternalChannelId, ... } }`.
fn decode_item(item: &Map<String, Value>) -> Option<AddedItem> {
    let (renderer, payload) = item.iter().next()?;
    let id = payload.get("id")?.as_str()?.to_string();
    Some(AddedItem {
        id,
        renderer: renderer.clone(),
        author_channel_id: payload
            .get("authorExternalChannelId")
            .and_then(Value::as_str)
            .map(String::from),
        timestamp_usec: payload.get("timestampUsec").and_then(parse_u64),
        payload: payload.clone(),
    })
}

/// Numbers arrive as decimal strings; accept plain numbers too.
fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
