//! Turning chat actions into sized display requests.
//!
//! A formatter returns `None` to suppress an entry; the session never asks
//! why. [`PlainTextFormatter`] flattens the renderer payload to one line of
//! text and estimates its width from the glyph count.

use serde_json::Value;

use danmaku_types::{AddedItem, ChatAction};

use crate::settings::Settings;

/// A displayable entry, sized but not yet placed.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRequest {
    /// Server entry id (target of Delete/Replace).
    pub chat_id: String,
    pub author_channel_id: Option<String>,
    pub author: Option<String>,
    pub text: String,
    pub width: f64,
    pub height: f64,
}

pub trait Formatter: Send + Sync {
    /// Format an `Add` or `Replace`; everything else yields `None`.
    fn format(&self, action: &ChatAction, settings: &Settings) -> Option<ItemRequest>;
}

/// One-line text formatter.
#[derive(Debug, Clone, Default)]
pub struct PlainTextFormatter;

impl PlainTextFormatter {
    fn format_item(&self, item: &AddedItem, settings: &Settings) -> Option<ItemRequest> {
        let payload = &item.payload;
        let mut text = runs_text(payload.get("message"));
        if text.is_empty() {
            // Membership milestones carry their text in the header.
            text = runs_text(payload.get("headerSubtext"));
        }
        if let Some(amount) = simple_text(payload.get("purchaseAmountText")) {
            text = if text.is_empty() { amount } else { format!("{amount} {text}") };
        }
        if text.is_empty() {
            return None;
        }

        let author = simple_text(payload.get("authorName"));
        let line = match (&author, settings.show_author) {
            (Some(name), true) => format!("{name}: {text}"),
            _ => text.clone(),
        };

        Some(ItemRequest {
            chat_id: item.id.clone(),
            author_channel_id: item.author_channel_id.clone(),
            author,
            width: estimate_width(&line, settings.font_size_px),
            height: settings.item_height(),
            text: line,
        })
    }
}

impl Formatter for PlainTextFormatter {
    fn format(&self, action: &ChatAction, settings: &Settings) -> Option<ItemRequest> {
        match action {
            ChatAction::Add(item) | ChatAction::Replace { item, .. } => self.format_item(item, settings),
            ChatAction::Delete { .. } | ChatAction::DeleteByAuthor { .. } => None,
        }
    }
}

/// Concatenate `{ runs: [{ text } | { emoji }] }`. Emoji render as their
/// first shortcut (`:wave:`), falling back to the emoji id.
fn runs_text(value: Option<&Value>) -> String {
    let Some(runs) = value.and_then(|v| v.get("runs")).and_then(Value::as_array) else {
        return simple_text(value).unwrap_or_default();
    };
    let mut out = String::new();
    for run in runs {
        if let Some(text) = run.get("text").and_then(Value::as_str) {
            out.push_str(text);
        } else if let Some(emoji) = run.get("emoji") {
            let label = emoji
                .get("shortcuts")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .or_else(|| emoji.get("emojiId").and_then(Value::as_str));
            if let Some(label) = label {
                out.push_str(label);
            }
        }
    }
    out.trim().to_string()
}

fn simple_text(value: Option<&Value>) -> Option<String> {
    value?
        .get("simpleText")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Half an em per narrow glyph, a full em per wide one.
pub fn estimate_width(text: &str, font_size_px: f64) -> f64 {
    let units: usize = text.chars().map(|c| if is_wide(c) { 2 } else { 1 }).sum();
    (units as f64 * font_size_px / 2.0).ceil()
}

/// East Asian wide and fullwidth ranges, plus emoji.
fn is_wide(c: char) -> bool {
    matches!(
        c as u32,
        0x1100..=0x115F
            | 0x2E80..=0x303E
            | 0x3041..=0x33FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xA000..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x1F300..=0x1F64F
            | 0x1F900..=0x1F9FF
            | 0x20000..=0x3FFFD
    )
}
