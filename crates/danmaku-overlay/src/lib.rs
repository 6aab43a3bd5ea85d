//! Danmaku overlay: chat entries flying across the video surface.
//!
//! This crate ties the feed (`danmaku-client`) to the lane layout
//! (`danmaku-layout`) and keeps the resulting items on a headless
//! [`Surface`]. A [`Session`] is the unit of work: one video, one feed task,
//! one replay buffer, one surface.
//!
//! | Module      | Contents                                          |
//! |-------------|---------------------------------------------------|
//! | `session`   | [`Session`], [`SessionOptions`], [`PumpReport`]   |
//! | `surface`   | [`Surface`] and what is on it                     |
//! | `formatter` | [`Formatter`] seam, [`PlainTextFormatter`]        |
//! | `clock`     | [`ManualClock`], [`WallClock`]                    |
//! | `settings`  | [`Settings`], [`SettingsPatch`], [`SettingsStore`]|

pub mod clock;
pub mod formatter;
pub mod session;
pub mod settings;
pub mod surface;

pub use clock::{ManualClock, WallClock};
pub use formatter::{Formatter, ItemRequest, PlainTextFormatter, estimate_width};
pub use session::{PumpReport, Session, SessionOptions};
pub use settings::{Settings, SettingsError, SettingsPatch, SettingsStore};
pub use surface::{RenderedItem, Surface, SurfaceItem};
