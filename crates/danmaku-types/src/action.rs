//! Chat actions — the raw event kinds carried by a feed page.
//!
//! The remote log speaks in string-keyed action objects. They are decoded
//! once, at the client boundary, into [`ChatAction`]; everything downstream
//! matches exhaustively on the enum.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// One raw event from the chat log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatAction {
    /// A new chat entry (message, paid message, membership, sticker...).
    Add(AddedItem),
    /// A single entry was retracted.
    Delete { target_id: String },
    /// Every entry by one author was retracted.
    DeleteByAuthor { channel_id: String },
    /// An entry's content was replaced in place.
    Replace { target_id: String, item: AddedItem },
}

impl ChatAction {
    /// Discriminator name, for logging.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Add(_) => ActionKind::Add,
            Self::Delete { .. } => ActionKind::Delete,
            Self::DeleteByAuthor { .. } => ActionKind::DeleteByAuthor,
            Self::Replace { .. } => ActionKind::Replace,
        }
    }

    /// Embedded wall-clock timestamp of an `Add`, in microseconds.
    pub fn add_timestamp_usec(&self) -> Option<u64> {
        match self {
            Self::Add(item) => item.timestamp_usec,
            _ => None,
        }
    }
}

/// Field-less mirror of [`ChatAction`] for logs and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Add,
    Delete,
    DeleteByAuthor,
    Replace,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Content of an added (or replacement) chat entry.
///
/// `payload` is the renderer object exactly as received; formatting it into
/// display content is the formatter's job, not the feed's.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddedItem {
    /// Server-assigned entry ID (target of Delete/Replace).
    pub id: String,
    /// Renderer key, e.g. `liveChatTextMessageRenderer`.
    pub renderer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_channel_id: Option<String>,
    /// Wall-clock microseconds (live mode dedup key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_usec: Option<u64>,
    pub payload: serde_json::Value,
}

impl AddedItem {
    pub fn new(id: impl Into<String>, renderer: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            renderer: renderer.into(),
            author_channel_id: None,
            timestamp_usec: None,
            payload,
        }
    }

    pub fn with_timestamp_usec(mut self, ts: u64) -> Self {
        self.timestamp_usec = Some(ts);
        self
    }

    pub fn with_author(mut self, channel_id: impl Into<String>) -> Self {
        self.author_channel_id = Some(channel_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_names() {
        let add = ChatAction::Add(AddedItem::new("a", "liveChatTextMessageRenderer", serde_json::json!({})));
        assert_eq!(add.kind().to_string(), "add");
        let del = ChatAction::DeleteByAuthor { channel_id: "UC1".into() };
        assert_eq!(del.kind().as_ref(), "delete_by_author");
        assert_eq!(ActionKind::from_str("replace").unwrap(), ActionKind::Replace);
    }

    #[test]
    fn test_add_timestamp_only_for_add() {
        let add = ChatAction::Add(
            AddedItem::new("a", "r", serde_json::Value::Null).with_timestamp_usec(150),
        );
        assert_eq!(add.add_timestamp_usec(), Some(150));
        let replace = ChatAction::Replace {
            target_id: "a".into(),
            item: AddedItem::new("a", "r", serde_json::Value::Null).with_timestamp_usec(150),
        };
        assert_eq!(replace.add_timestamp_usec(), None);
    }

    #[test]
    fn test_serialization_is_tagged() {
        let action = ChatAction::Delete { target_id: "x".into() };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "delete");
        assert_eq!(json["target_id"], "x");
    }
}
