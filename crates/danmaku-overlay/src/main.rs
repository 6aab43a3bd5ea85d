//! danmaku: follow a video's chat and lay it out as scrolling overlay lines.
//!
//! ```bash
//! # Follow a live chat (surface defaults to 1280x720)
//! danmaku watch <VIDEO_ID>
//!
//! # Chat replay from 10 minutes in, at 1.5x
//! danmaku watch <VIDEO_ID> --replay --start-ms 600000 --rate 1.5
//!
//! # Settings
//! danmaku settings show
//! danmaku settings set duration_ms=6000 reversed=true
//! ```
//!
//! While watching, stdin accepts `seek <ms>`, `pause`, `play`, `rate <r>`
//! and `quit`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use danmaku_client::{AuthContext, ClientConfig, ContinuationClient};
use danmaku_layout::SurfaceBox;
use danmaku_overlay::{Session, SessionOptions, Settings, SettingsPatch, SettingsStore, WallClock};
use danmaku_types::{FeedMode, PlaybackClock};

/// Render interval for the headless surface.
const FRAME: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "danmaku")]
#[command(about = "Scrolling chat overlay for live streams and replays")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the chat of a video
    Watch {
        video_id: String,

        /// Treat the chat as a replay even if the page says live
        #[arg(long)]
        replay: bool,

        /// Playback position to start from
        #[arg(long, default_value_t = 0)]
        start_ms: i64,

        /// Playback rate
        #[arg(long, default_value_t = 1.0, value_parser = parse_rate)]
        rate: f64,

        #[arg(long, default_value_t = 1280.0)]
        width: f64,

        #[arg(long, default_value_t = 720.0)]
        height: f64,

        /// SAPISID cookie value for authorized requests
        #[arg(long)]
        sid: Option<String>,
    },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Set one or more `key=value` pairs
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    let _otel_guard = if danmaku_telemetry::otel_enabled() {
        match danmaku_telemetry::otel_layer("danmaku") {
            Ok((otel_layer, guard)) => {
                registry.with(otel_layer).init();
                Some(guard)
            }
            Err(e) => {
                registry.init();
                tracing::warn!(error = %e, "OTel export disabled");
                None
            }
        }
    } else {
        registry.init();
        None
    };
    #[cfg(not(feature = "telemetry"))]
    {
        registry.init();
    }

    let args = Args::parse();
    let store = SettingsStore::open_default()?;

    match args.command {
        Command::Watch { video_id, replay, start_ms, rate, width, height, sid } => {
            let settings = store.load().with_context(|| format!("loading {}", store.path().display()))?;
            let config = ClientConfig { auth: sid.map(AuthContext::new), ..ClientConfig::default() };
            let client = ContinuationClient::new(config)?;
            let clock = Arc::new(WallClock::new(start_ms, rate));

            let mut options = SessionOptions::new(settings, SurfaceBox::new(width, height));
            options.mode = replay.then_some(FeedMode::Replay);

            let session = Session::start(client, &video_id, clock.clone(), options).await?;
            watch(session, clock).await
        }
        Command::Settings { action: SettingsAction::Show } => {
            let settings = store.load()?;
            print_settings(&store, &settings)
        }
        Command::Settings { action: SettingsAction::Set { assignments } } => {
            let patch = SettingsPatch::from_assignments(&assignments)?;
            let settings = store.save(&patch)?;
            print_settings(&store, &settings)
        }
    }
}

async fn watch(mut session: Session, clock: Arc<WallClock>) -> Result<()> {
    let mut frames = tokio::time::interval(FRAME);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !control(&line, &mut session, &clock) {
                        break;
                    }
                }
                None => stdin_open = false,
            },
            _ = frames.tick() => {
                let report = session.pump();
                let now_ms = clock.offset_ms();
                for id in &report.placed {
                    if let Some(item) = session.surface().get(*id) {
                        println!(
                            "{:>9} lane {:>2} {:.2} {}",
                            format_offset(now_ms),
                            item.assignment.lane,
                            item.assignment.opacity,
                            item.text
                        );
                    }
                }
                if session.is_feed_done() && session.surface().is_empty() && session.replay_buffer().is_empty() {
                    break;
                }
            }
        }
    }

    let reason = session.close().await;
    tracing::info!(%reason, "done");
    Ok(())
}

/// Apply one stdin command. Returns false to quit.
fn control(line: &str, session: &mut Session, clock: &WallClock) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("quit" | "q"), _) => return false,
        (Some("pause"), _) => clock.set_paused(true),
        (Some("play"), _) => clock.set_paused(false),
        (Some("seek"), Some(ms)) => match ms.parse::<i64>() {
            Ok(target) => {
                clock.seek(target);
                session.seek(target);
            }
            Err(e) => eprintln!("seek: {e}"),
        },
        (Some("rate"), Some(r)) => match parse_rate(r) {
            Ok(rate) => clock.set_rate(rate),
            Err(e) => eprintln!("rate: {e}"),
        },
        (None, _) => {}
        (Some(other), _) => eprintln!("unknown command: {other}"),
    }
    true
}

fn parse_rate(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
        _ => Err(format!("expected a positive number, got {s:?}")),
    }
}

fn print_settings(store: &SettingsStore, settings: &Settings) -> Result<()> {
    println!("# {}", store.path().display());
    for key in Settings::KEYS {
        println!("{key} = {}", settings.get(key)?);
    }
    Ok(())
}

fn format_offset(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
