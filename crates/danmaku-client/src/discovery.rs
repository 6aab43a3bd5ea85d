//! Session start: find the initial continuation for a video.
//!
//! The watch page embeds the chat frame's seed continuation together with
//! the API key and client version the endpoints expect. A page with no
//! chat continuation means the content has no event log, and the session
//! start is rejected.

use std::sync::LazyLock;

use danmaku_types::{ContinuationToken, FeedMode};
use regex::Regex;
use tracing::{debug, info};

use crate::constants::WATCH_PATH;
use crate::continuation::{ClientError, ContinuationClient};
use crate::synchronizer::FeedStart;
use crate::wire::ClientContext;

static RELOAD_CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""reloadContinuationData"\s*:\s*\{\s*"continuation"\s*:\s*"([^"]+)""#)
        .expect("static regex")
});
static API_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).expect("static regex"));
static CLIENT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_CLIENT_VERSION"\s*:\s*"([^"]+)""#).expect("static regex")
});
static IS_REPLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""isReplay"\s*:\s*true"#).expect("static regex"));

/// Why a session could not start.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("no chat log for this content")]
    NoChatLog,
    #[error("discovery request failed: {0}")]
    Discovery(#[from] ClientError),
}

/// Everything needed to start a synchronizer for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub seed: ContinuationToken,
    pub mode: FeedMode,
    pub api_key: Option<String>,
    pub client_version: Option<String>,
}

impl Discovery {
    /// Request context matching the discovered client version.
    pub fn client_context(&self) -> ClientContext {
        match &self.client_version {
            Some(version) => ClientContext::new(version.clone()),
            None => ClientContext::default(),
        }
    }

    /// Where the synchronizer should start for this discovery.
    pub fn feed_start(&self) -> FeedStart {
        FeedStart { mode: self.mode, seed: self.seed.clone() }
    }
}

/// Extract discovery data from watch page HTML.
pub fn parse_watch_page(html: &str) -> Result<Discovery, StartError> {
    let seed = RELOAD_CONTINUATION
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| ContinuationToken::new(m.as_str()))
        .ok_or(StartError::NoChatLog)?;

    let capture = |re: &Regex| re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());

    Ok(Discovery {
        seed,
        mode: if IS_REPLAY.is_match(html) { FeedMode::Replay } else { FeedMode::Live },
        api_key: capture(&API_KEY),
        client_version: capture(&CLIENT_VERSION),
    })
}

impl ContinuationClient {
    /// Fetch the watch page for `video_id` and extract the seed continuation.
    pub async fn discover(&self, video_id: &str) -> Result<Discovery, StartError> {
        let url = format!("{}{}", self.config().origin, WATCH_PATH);
        debug!(video_id, %url, "discovering chat continuation");

        let response = self
            .http()
            .get(&url)
            .query(&[("v", video_id)])
            .send()
            .await
            .map_err(ClientError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()).into());
        }
        let html = response.text().await.map_err(ClientError::from)?;

        let discovery = parse_watch_page(&html)?;
        info!(video_id, mode = %discovery.mode, seed = discovery.seed.short(), "chat log found");
        Ok(discovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<script>ytcfg.set({"INNERTUBE_API_KEY":"AIzaKEY","INNERTUBE_CLIENT_VERSION":"2.20240601.01.00"});</script>
<script>var ytInitialData = {"conversationBar":{"liveChatRenderer":{"continuations":[{"reloadContinuationData":{"continuation":"op2w0wRgGlhDaWtxSkFB","clickTrackingParams":"x"}}],"isReplay":true}}};</script>"#;

    #[test]
    fn test_parse_replay_page() {
        let discovery = parse_watch_page(PAGE).unwrap();
        assert_eq!(discovery.seed, ContinuationToken::new("op2w0wRgGlhDaWtxSkFB"));
        assert_eq!(discovery.mode, FeedMode::Replay);
        assert_eq!(discovery.api_key.as_deref(), Some("AIzaKEY"));
        assert_eq!(discovery.client_version.as_deref(), Some("2.20240601.01.00"));
        assert_eq!(discovery.client_context().client.client_version, "2.20240601.01.00");
    }

    #[test]
    fn test_live_page_without_replay_flag() {
        let html = r#"{"reloadContinuationData": {"continuation": "live-seed"}}"#;
        let discovery = parse_watch_page(html).unwrap();
        assert_eq!(discovery.mode, FeedMode::Live);
        assert_eq!(discovery.api_key, None);
        assert_eq!(discovery.client_context().client.client_name, "WEB");
    }

    #[test]
    fn test_page_without_chat_is_rejected() {
        let err = parse_watch_page("<html>no chat here</html>").unwrap_err();
        assert!(matches!(err, StartError::NoChatLog));
    }
}
