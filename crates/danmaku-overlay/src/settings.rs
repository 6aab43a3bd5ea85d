//! User settings with explicit load/save.
//!
//! Settings live in `~/.config/danmaku/settings.ron`. Nothing persists
//! implicitly: callers build a [`SettingsPatch`] and hand it to
//! [`SettingsStore::save`], which validates, writes a temp file next to the
//! target and renames it into place.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use danmaku_layout::{Direction, LayoutConfig};

/// Errors from loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("RON serialize error: {0}")]
    Serialize(#[from] ron::Error),
    #[error("unknown setting: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("no config directory available")]
    NoConfigDir,
}

fn invalid(key: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid { key, reason: reason.into() }
}

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Time for an item to cross the surface width.
    pub duration_ms: u64,
    pub font_size_px: f64,
    /// Lane height as a multiple of the font size.
    pub line_height: f64,
    pub opacity: f64,
    /// Floor for overlapping items.
    pub min_overlap_opacity: f64,
    /// Travel left-to-right instead of right-to-left.
    pub reversed: bool,
    /// 0 = unlimited.
    pub max_visible_items: usize,
    pub show_author: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            duration_ms: 8_000,
            font_size_px: 24.0,
            line_height: 1.25,
            opacity: 1.0,
            min_overlap_opacity: 0.3,
            reversed: false,
            max_visible_items: 0,
            show_author: false,
        }
    }
}

impl Settings {
    pub const KEYS: &'static [&'static str] = &[
        "duration_ms",
        "font_size_px",
        "line_height",
        "opacity",
        "min_overlap_opacity",
        "reversed",
        "max_visible_items",
        "show_author",
    ];

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.duration_ms == 0 {
            return Err(invalid("duration_ms", "must be greater than zero"));
        }
        if !(self.font_size_px.is_finite() && self.font_size_px > 0.0) {
            return Err(invalid("font_size_px", "must be a positive number"));
        }
        if !(self.line_height.is_finite() && self.line_height >= 1.0) {
            return Err(invalid("line_height", "must be at least 1.0"));
        }
        if !(self.opacity > 0.0 && self.opacity <= 1.0) {
            return Err(invalid("opacity", "must be in (0, 1]"));
        }
        if !(self.min_overlap_opacity >= 0.0 && self.min_overlap_opacity <= self.opacity) {
            return Err(invalid("min_overlap_opacity", "must be in [0, opacity]"));
        }
        Ok(())
    }

    /// Pixel height of one lane.
    pub fn item_height(&self) -> f64 {
        (self.font_size_px * self.line_height).ceil()
    }

    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            direction: Direction::from_reversed(self.reversed),
            base_opacity: self.opacity,
            min_opacity: self.min_overlap_opacity,
            ..LayoutConfig::default()
        }
    }

    /// Current value of `key`, formatted for display.
    pub fn get(&self, key: &str) -> Result<String, SettingsError> {
        Ok(match key {
            "duration_ms" => self.duration_ms.to_string(),
            "font_size_px" => self.font_size_px.to_string(),
            "line_height" => self.line_height.to_string(),
            "opacity" => self.opacity.to_string(),
            "min_overlap_opacity" => self.min_overlap_opacity.to_string(),
            "reversed" => self.reversed.to_string(),
            "max_visible_items" => self.max_visible_items.to_string(),
            "show_author" => self.show_author.to_string(),
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        })
    }
}

// ============================================================================
// Patch
// ============================================================================

/// An immutable set of changes. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub duration_ms: Option<u64>,
    pub font_size_px: Option<f64>,
    pub line_height: Option<f64>,
    pub opacity: Option<f64>,
    pub min_overlap_opacity: Option<f64>,
    pub reversed: Option<bool>,
    pub max_visible_items: Option<usize>,
    pub show_author: Option<bool>,
}

impl SettingsPatch {
    /// Build a patch from `key=value` assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patch = Self::default();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let Some((key, value)) = assignment.split_once('=') else {
                return Err(SettingsError::UnknownKey(assignment.to_string()));
            };
            patch = patch.with(key.trim(), value.trim())?;
        }
        Ok(patch)
    }

    /// Return a copy with `key` set from its string form.
    pub fn with(mut self, key: &str, value: &str) -> Result<Self, SettingsError> {
        match key {
            "duration_ms" => self.duration_ms = Some(parse("duration_ms", value)?),
            "font_size_px" => self.font_size_px = Some(parse("font_size_px", value)?),
            "line_height" => self.line_height = Some(parse("line_height", value)?),
            "opacity" => self.opacity = Some(parse("opacity", value)?),
            "min_overlap_opacity" => self.min_overlap_opacity = Some(parse("min_overlap_opacity", value)?),
            "reversed" => self.reversed = Some(parse("reversed", value)?),
            "max_visible_items" => self.max_visible_items = Some(parse("max_visible_items", value)?),
            "show_author" => self.show_author = Some(parse("show_author", value)?),
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, base: &Settings) -> Settings {
        Settings {
            duration_ms: self.duration_ms.unwrap_or(base.duration_ms),
            font_size_px: self.font_size_px.unwrap_or(base.font_size_px),
            line_height: self.line_height.unwrap_or(base.line_height),
            opacity: self.opacity.unwrap_or(base.opacity),
            min_overlap_opacity: self.min_overlap_opacity.unwrap_or(base.min_overlap_opacity),
            reversed: self.reversed.unwrap_or(base.reversed),
            max_visible_items: self.max_visible_items.unwrap_or(base.max_visible_items),
            show_author: self.show_author.unwrap_or(base.show_author),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, format!("{value:?}: {e}")))
}

// ============================================================================
// Store
// ============================================================================

/// Settings file location plus explicit load/save.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/danmaku/settings.ron` (platform config dir).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("danmaku").join("settings.ron"))
    }

    pub fn open_default() -> Result<Self, SettingsError> {
        Self::default_path().map(Self::new).ok_or(SettingsError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields the defaults.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            info!("Settings file not found at {:?}, using defaults", self.path);
            return Ok(Settings::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let settings: Settings = ron::from_str(&text)?;
        settings.validate()?;
        debug!(path = ?self.path, "settings loaded");
        Ok(settings)
    }

    /// Apply `patch` to the stored settings and persist the result.
    pub fn save(&self, patch: &SettingsPatch) -> Result<Settings, SettingsError> {
        let next = patch.apply(&self.load()?);
        next.validate()?;

        let text = ron::ser::to_string_pretty(&next, ron::ser::PrettyConfig::default())?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("ron.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;

        info!(path = ?self.path, "settings saved");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("danmaku").join("settings.ron"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let patch = SettingsPatch { duration_ms: Some(5_000), reversed: Some(true), ..Default::default() };
        let saved = store.save(&patch).unwrap();
        assert_eq!(saved.duration_ms, 5_000);
        assert!(saved.reversed);
        assert_eq!(saved.font_size_px, Settings::default().font_size_px);

        assert_eq!(store.load().unwrap(), saved);
        assert!(!store.path().with_extension("ron.tmp").exists());
    }

    #[test]
    fn test_invalid_patch_is_not_written() {
        let (_dir, store) = store();
        let err = store.save(&SettingsPatch { duration_ms: Some(0), ..Default::default() }).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "duration_ms", .. }));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "(duration_ms: 3000)").unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.duration_ms, 3000);
        assert_eq!(loaded.opacity, 1.0);
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{{ not ron").unwrap();
        assert!(matches!(store.load(), Err(SettingsError::Parse(_))));
    }

    #[test]
    fn test_patch_from_assignments() {
        let patch = SettingsPatch::from_assignments(["opacity=0.8", "show_author = true"]).unwrap();
        assert_eq!(patch.opacity, Some(0.8));
        assert_eq!(patch.show_author, Some(true));
        assert!(!patch.is_empty());

        assert!(matches!(
            SettingsPatch::from_assignments(["colour=red"]),
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(matches!(
            SettingsPatch::from_assignments(["duration_ms=fast"]),
            Err(SettingsError::Invalid { key: "duration_ms", .. })
        ));
    }

    #[test]
    fn test_every_key_is_readable() {
        let settings = Settings::default();
        for key in Settings::KEYS {
            assert!(settings.get(key).is_ok(), "{key}");
        }
        assert_eq!(settings.get("reversed").unwrap(), "false");
    }

    #[test]
    fn test_layout_config_follows_settings() {
        let settings = Settings { reversed: true, opacity: 0.9, min_overlap_opacity: 0.2, ..Settings::default() };
        let config = settings.layout_config();
        assert_eq!(config.direction, Direction::LeftToRight);
        assert_eq!(config.base_opacity, 0.9);
        assert_eq!(config.min_opacity, 0.2);
        assert_eq!(Settings::default().item_height(), 30.0);
    }
}
