//! Continuation Client — one page per call, no retries.
//!
//! [`ContinuationSource`] is the seam the synchronizer is written against;
//! [`ContinuationClient`] is the HTTP implementation. Failures never reach the
//! caller as errors: a transport or decode failure comes back as a page whose
//! next continuation is the token that was just used (a self-loop), so the
//! synchronizer's pacing handles retry uniformly.
//!
//! ```text
//!   FeedSynchronizer                        ContinuationClient
//!   ┌──────────────────┐  fetch_page(mode,  ┌───────────────────────────┐
//!   │ live / replay    │  token, offset?)   │ POST get_live_chat[_replay]│
//!   │ loop             │ ─────────────────▶ │ Authorization (optional)  │
//!   │                  │ ◀───────────────── │ decode → Page             │
//!   └──────────────────┘   Page (never Err) │ on error → self-loop Page │
//!                                           └───────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use danmaku_types::{ContinuationToken, EventBatch, FeedMode};
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::constants::{DEFAULT_ORIGIN, LIVE_ENDPOINT, REPLAY_ENDPOINT, REQUEST_TIMEOUT, USER_AGENT};
use crate::wire::{ChatRequest, ClientContext, Continuations, DecodedPage, PlayerState, decode_page};

// ============================================================================
// Error Type
// ============================================================================

/// Errors from a single continuation request.
///
/// These stay inside the client: [`ContinuationSource::fetch_page`] turns
/// them into self-loop pages. Discovery surfaces them through `StartError`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

// ============================================================================
// Page
// ============================================================================

/// One fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub batches: Vec<EventBatch>,
    pub continuations: Continuations,
    /// True for the synthetic self-loop page produced on failure.
    pub failed: bool,
}

impl Page {
    /// Synthetic page for a failed request: no events, next = `token`.
    pub fn self_loop(token: &ContinuationToken) -> Self {
        Self {
            batches: Vec::new(),
            continuations: Continuations::self_loop(token),
            failed: true,
        }
    }

    /// Largest replay offset among the page's batches.
    pub fn max_offset_ms(&self) -> Option<i64> {
        self.batches.iter().filter_map(|b| b.offset_ms).max()
    }

    pub fn action_count(&self) -> usize {
        self.batches.iter().map(EventBatch::len).sum()
    }
}

impl From<DecodedPage> for Page {
    fn from(decoded: DecodedPage) -> Self {
        Self { batches: decoded.batches, continuations: decoded.continuations, failed: false }
    }
}

// ============================================================================
// ContinuationSource
// ============================================================================

/// Anything that can produce the next page of the event log.
#[async_trait]
pub trait ContinuationSource: Send + Sync {
    /// Fetch the page addressed by `token`.
    ///
    /// `player_offset_ms` is sent as the player state (replay only); it
    /// positions the server when `token` is a player-seek continuation.
    async fn fetch_page(
        &self,
        mode: FeedMode,
        token: &ContinuationToken,
        player_offset_ms: Option<i64>,
    ) -> Page;
}

#[async_trait]
impl<T: ContinuationSource + ?Sized> ContinuationSource for Arc<T> {
    async fn fetch_page(
        &self,
        mode: FeedMode,
        token: &ContinuationToken,
        player_offset_ms: Option<i64>,
    ) -> Page {
        (**self).fetch_page(mode, token, player_offset_ms).await
    }
}

// ============================================================================
// HTTP client
// ============================================================================

/// Connection parameters for [`ContinuationClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme + host, e.g. `https://www.youtube.com`. Overridable for tests.
    pub origin: String,
    /// API key appended as `?key=`; optional.
    pub api_key: Option<String>,
    pub context: ClientContext,
    /// Session credentials; `None` sends requests unauthenticated.
    pub auth: Option<AuthContext>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            api_key: None,
            context: ClientContext::default(),
            auth: None,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// HTTP implementation of [`ContinuationSource`].
#[derive(Debug, Clone)]
pub struct ContinuationClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ContinuationClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the request context and API key (after discovery).
    pub fn set_context(&mut self, context: ClientContext, api_key: Option<String>) {
        self.config.context = context;
        if api_key.is_some() {
            self.config.api_key = api_key;
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Full endpoint URL for a mode.
    pub fn endpoint(&self, mode: FeedMode) -> String {
        let path = match mode {
            FeedMode::Live => LIVE_ENDPOINT,
            FeedMode::Replay => REPLAY_ENDPOINT,
        };
        let mut url = format!("{}{}?prettyPrint=false", self.config.origin, path);
        if let Some(key) = &self.config.api_key {
            url.push_str("&key=");
            url.push_str(key);
        }
        url
    }

    /// Fetch and decode one page, surfacing failures.
    pub async fn try_fetch(
        &self,
        mode: FeedMode,
        token: &ContinuationToken,
        player_offset_ms: Option<i64>,
    ) -> Result<DecodedPage, ClientError> {
        let body = ChatRequest {
            context: &self.config.context,
            continuation: token.as_str(),
            current_player_state: match mode {
                FeedMode::Replay => player_offset_ms.map(PlayerState::at),
                FeedMode::Live => None,
            },
        };

        let mut request = self.http.post(self.endpoint(mode)).json(&body);
        if let Some(auth) = &self.config.auth {
            request = request
                .header("Authorization", auth.authorization())
                .header("X-Origin", auth.origin())
                .header("X-Goog-AuthUser", "0");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        Ok(decode_page(&bytes)?)
    }
}

#[async_trait]
impl ContinuationSource for ContinuationClient {
    async fn fetch_page(
        &self,
        mode: FeedMode,
        token: &ContinuationToken,
        player_offset_ms: Option<i64>,
    ) -> Page {
        match self.try_fetch(mode, token, player_offset_ms).await {
            Ok(decoded) => {
                let page = Page::from(decoded);
                debug!(
                    %mode,
                    token = token.short(),
                    actions = page.action_count(),
                    has_next = page.continuations.next.is_some(),
                    "fetched page"
                );
                page
            }
            Err(e) => {
                warn!(%mode, token = token.short(), error = %e, "fetch failed, retrying same continuation");
                Page::self_loop(token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_loop_page_points_back() {
        let token = ContinuationToken::new("abc");
        let page = Page::self_loop(&token);
        assert!(page.failed);
        assert!(page.batches.is_empty());
        assert_eq!(page.continuations.next, Some(token));
        assert_eq!(page.max_offset_ms(), None);
    }

    #[test]
    fn test_max_offset() {
        let page = Page {
            batches: vec![
                EventBatch::replay(1000, vec![]),
                EventBatch::live(vec![]),
                EventBatch::replay(2500, vec![]),
            ],
            ..Page::default()
        };
        assert_eq!(page.max_offset_ms(), Some(2500));
    }

    #[test]
    fn test_endpoint_urls() {
        let client = ContinuationClient::new(ClientConfig {
            origin: "http://127.0.0.1:9".into(),
            api_key: Some("KEY".into()),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint(FeedMode::Live),
            "http://127.0.0.1:9/youtubei/v1/live_chat/get_live_chat?prettyPrint=false&key=KEY"
        );
        assert!(client.endpoint(FeedMode::Replay).contains("get_live_chat_replay"));
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_self_loop() {
        // Port 9 (discard) is closed on test hosts; connection is refused fast.
        let client = ContinuationClient::new(ClientConfig {
            origin: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        })
        .unwrap();
        let token = ContinuationToken::new("tok");
        let page = client.fetch_page(FeedMode::Live, &token, None).await;
        assert!(page.failed);
        assert_eq!(page.continuations.next, Some(token));
    }
}
