//! Client for YouTube's internal "innertube" JSON API.
//!
//! The HTTP layer only ever talks to the [`MetadataClient`] trait so handlers
//! can be exercised with an in-memory fake. [`InnertubeClient`] is the real
//! implementation: a blocking `ureq` agent driven from `spawn_blocking`, with
//! a session (client version + visitor data) captured once at startup.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metadata::{BasicVideoInfo, ChannelHandle, ChannelHome, CommentData, SearchCandidate};
use crate::resolver::VideoId;

mod parse;

pub const INNERTUBE_API_BASE: &str = "https://www.youtube.com/youtubei/v1";
const HOMEPAGE_URL: &str = "https://www.youtube.com/";
const CLIENT_NAME: &str = "WEB";
// Numeric id of the WEB client, sent alongside the version header.
const CLIENT_NAME_ID: &str = "1";
pub const FALLBACK_CLIENT_VERSION: &str = "2.20250101.00.00";
// Search filter restricting results to channels.
const CHANNEL_SEARCH_PARAMS: &str = "EgIQAg%3D%3D";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_REGION: &str = "US";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("could not decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },
    #[error("{0}")]
    Missing(String),
    #[error("blocking request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The capabilities the API server needs from a metadata source. Image lists
/// in the returned records are ordered largest first.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// An unavailable video yields an empty record, not an error.
    async fn fetch_basic_video_info(&self, video: &VideoId) -> Result<BasicVideoInfo, ClientError>;

    /// Looks a channel up by browse id. Vanity strings are accepted but only
    /// succeed when the platform happens to treat them as a browse id.
    async fn fetch_channel(&self, id_or_vanity: &str) -> Result<ChannelHandle, ClientError>;

    async fn fetch_channel_home(&self, channel: &ChannelHandle)
    -> Result<ChannelHome, ClientError>;

    /// Channel-only search.
    async fn search_channels(&self, query: &str) -> Result<Vec<SearchCandidate>, ClientError>;

    /// First page of top-level comments. An empty list means the video has no
    /// comment section (or it is disabled).
    async fn fetch_comments(&self, video: &VideoId) -> Result<Vec<CommentData>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnertubeSettings {
    pub language: String,
    pub region: String,
    pub request_timeout: Duration,
}

impl Default for InnertubeSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            region: DEFAULT_REGION.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    client_version: String,
    visitor_data: Option<String>,
}

#[derive(Clone)]
pub struct InnertubeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    agent: ureq::Agent,
    settings: InnertubeSettings,
    session: Session,
}

impl InnertubeClient {
    /// Opens a session by scraping the client version and visitor data from
    /// the YouTube homepage. Fails only when the homepage itself is
    /// unreachable.
    pub async fn create(settings: InnertubeSettings) -> Result<Self, ClientError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build();

        let bootstrap_agent = agent.clone();
        let language = settings.language.clone();
        let session =
            tokio::task::spawn_blocking(move || open_session(&bootstrap_agent, &language))
                .await??;
        info!(
            client_version = %session.client_version,
            has_visitor_data = session.visitor_data.is_some(),
            "innertube session ready"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                agent,
                settings,
                session,
            }),
        })
    }

    async fn call(&self, endpoint: &'static str, body: Value) -> Result<Value, ClientError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.post(endpoint, body)).await?
    }
}

impl ClientInner {
    fn context(&self) -> Value {
        let mut client = json!({
            "clientName": CLIENT_NAME,
            "clientVersion": self.session.client_version,
            "hl": self.settings.language,
            "gl": self.settings.region,
        });
        if let Some(visitor_data) = &self.session.visitor_data {
            client["visitorData"] = Value::String(visitor_data.clone());
        }
        json!({ "client": client })
    }

    fn post(&self, endpoint: &str, mut body: Value) -> Result<Value, ClientError> {
        body["context"] = self.context();
        let url = format!("{INNERTUBE_API_BASE}/{endpoint}?prettyPrint=false");
        debug!(%endpoint, "innertube request");

        let mut request = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .set("X-Youtube-Client-Name", CLIENT_NAME_ID)
            .set("X-Youtube-Client-Version", &self.session.client_version);
        if let Some(visitor_data) = &self.session.visitor_data {
            request = request.set("X-Goog-Visitor-Id", visitor_data);
        }

        let response = request
            .send_json(body)
            .map_err(|err| request_error(endpoint, err))?;
        response
            .into_json::<Value>()
            .map_err(|err| ClientError::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            })
    }
}

fn request_error(endpoint: &str, err: ureq::Error) -> ClientError {
    match err {
        ureq::Error::Status(status, _) => ClientError::Status {
            endpoint: endpoint.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => ClientError::Transport {
            endpoint: endpoint.to_string(),
            message: transport.to_string(),
        },
    }
}

fn open_session(agent: &ureq::Agent, language: &str) -> Result<Session, ClientError> {
    let html = agent
        .get(HOMEPAGE_URL)
        .set("Accept-Language", language)
        // Skips the EU consent interstitial.
        .set("Cookie", "CONSENT=YES+1")
        .call()
        .map_err(|err| request_error("homepage", err))?
        .into_string()
        .map_err(|err| ClientError::Decode {
            endpoint: "homepage".to_string(),
            message: err.to_string(),
        })?;

    let (client_version, visitor_data) = parse::session_tokens(&html);
    let client_version = client_version.unwrap_or_else(|| {
        warn!("homepage did not expose a client version; using the built-in fallback");
        FALLBACK_CLIENT_VERSION.to_string()
    });
    Ok(Session {
        client_version,
        visitor_data,
    })
}

#[async_trait]
impl MetadataClient for InnertubeClient {
    async fn fetch_basic_video_info(&self, video: &VideoId) -> Result<BasicVideoInfo, ClientError> {
        let response = self
            .call("player", json!({ "videoId": video.as_str() }))
            .await?;
        Ok(parse::basic_video_info(&response))
    }

    async fn fetch_channel(&self, id_or_vanity: &str) -> Result<ChannelHandle, ClientError> {
        let response = self
            .call("browse", json!({ "browseId": id_or_vanity }))
            .await?;
        parse::channel_handle(&response, id_or_vanity)
    }

    async fn fetch_channel_home(
        &self,
        channel: &ChannelHandle,
    ) -> Result<ChannelHome, ClientError> {
        let response = self
            .call("browse", json!({ "browseId": channel.id }))
            .await?;
        Ok(parse::channel_home(&response))
    }

    async fn search_channels(&self, query: &str) -> Result<Vec<SearchCandidate>, ClientError> {
        let response = self
            .call(
                "search",
                json!({ "query": query, "params": CHANNEL_SEARCH_PARAMS }),
            )
            .await?;
        Ok(parse::search_candidates(&response))
    }

    async fn fetch_comments(&self, video: &VideoId) -> Result<Vec<CommentData>, ClientError> {
        let watch = self
            .call("next", json!({ "videoId": video.as_str() }))
            .await?;
        let Some(token) = parse::comments_continuation(&watch) else {
            debug!(video = %video, "no comment section in watch-next response");
            return Ok(Vec::new());
        };
        let page = self
            .call("next", json!({ "continuation": token }))
            .await?;
        Ok(parse::comments(&page))
    }
}
