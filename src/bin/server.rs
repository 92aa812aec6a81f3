#![forbid(unsafe_code)]

//! Axum API server behind the yttoolbox frontend.
//!
//! Every endpoint takes a YouTube URL in the `url` query parameter, resolves
//! it to a video or channel, asks the metadata client for the data and
//! answers with a small flat JSON object. Nothing is cached or stored; each
//! request starts from scratch.
//!
//! Errors are deliberately generic towards the client. The detail of what
//! went wrong upstream only ends up in the server log.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yttoolbox::config::{SettingsOverrides, resolve_settings};
use yttoolbox::innertube::{ClientError, InnertubeClient, InnertubeSettings, MetadataClient};
use yttoolbox::metadata::{ChannelHandle, Thumbnail, sort_thumbnails_by_area};
use yttoolbox::resolver::{
    ResolveError, VideoId, classify_channel_url, extract_video_id, resolve_channel_id,
};

const MAX_CHANNEL_URL_LEN: usize = 500;

const URL_REQUIRED: &str = "YouTube URL is required";
const VALID_URL_REQUIRED: &str = "Valid YouTube URL is required";
const INVALID_VIDEO_URL: &str = "Invalid YouTube URL";
const INVALID_CHANNEL_URL: &str = "Invalid YouTube channel URL";
const INVALID_URL_FORMAT: &str = "Invalid YouTube URL format";
const URL_TOO_LONG: &str = "URL too long";
const NO_BANNER_MESSAGE: &str = "No banner image found for this channel";
const PFP_NOT_FOUND: &str = "Profile picture not found";
const NOT_READY: &str = "Metadata client is still initializing";

const TITLE_FAILED: &str = "Failed to extract video info";
const THUMBNAILS_FAILED: &str = "Failed to fetch thumbnails";
const BANNER_FAILED: &str = "Failed to fetch channel banner";
const PFP_FAILED: &str = "Failed to fetch profile picture";
const COMMENTS_FAILED: &str = "Failed to fetch comments";

const UNTITLED_VIDEO: &str = "Untitled Video";
const NO_DESCRIPTION: &str = "No description available";
const UNKNOWN_AUTHOR: &str = "Unknown author";
const NO_COMMENT_TEXT: &str = "No text";
const UNKNOWN_TIME: &str = "Unknown time";

#[derive(Debug, Parser)]
#[command(name = "server", about = "REST proxy for YouTube video and channel metadata")]
struct ServerArgs {
    /// Address to listen on (YTTOOLBOX_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (YTTOOLBOX_PORT, then PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Env file with additional settings.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

impl ServerArgs {
    fn into_overrides(self) -> SettingsOverrides {
        SettingsOverrides {
            host: self.host,
            port: self.port,
            env_path: self.env_file,
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/YTTOOLBOX_HOST")
}

/// Holds the metadata client once its session is open. Requests that arrive
/// earlier see an empty slot and get a 503.
#[derive(Clone, Default)]
struct ClientSlot {
    inner: Arc<RwLock<Option<Arc<dyn MetadataClient>>>>,
}

impl ClientSlot {
    fn install(&self, client: Arc<dyn MetadataClient>) {
        *self.inner.write() = Some(client);
    }

    fn get(&self) -> Option<Arc<dyn MetadataClient>> {
        self.inner.read().clone()
    }
}

#[derive(Clone, Default)]
struct AppState {
    client: ClientSlot,
}

impl AppState {
    fn client(&self) -> ApiResult<Arc<dyn MetadataClient>> {
        self.client
            .get()
            .ok_or_else(|| ApiError::unavailable(NOT_READY))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Logs the upstream cause and hands back the endpoint's generic 500.
fn upstream_failure(endpoint: &'static str, message: &'static str) -> impl FnOnce(ClientError) -> ApiError {
    move |err| {
        error!(endpoint, error = %err, "metadata client call failed");
        ApiError::internal(message)
    }
}

#[derive(Debug, Default, Deserialize)]
struct VideoQuery {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelQuery {
    #[serde(alias = "channelUrl")]
    url: Option<String>,
}

fn required_param(
    value: Result<Option<String>, QueryRejection>,
    missing: &'static str,
) -> ApiResult<String> {
    let value = value.map_err(|rejection| {
        warn!(error = %rejection, "rejected query string");
        ApiError::bad_request(missing)
    })?;
    value
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::bad_request(missing))
}

fn video_param(query: Result<Query<VideoQuery>, QueryRejection>) -> ApiResult<VideoId> {
    let url = required_param(query.map(|Query(q)| q.url), URL_REQUIRED)?;
    extract_video_id(&url).ok_or_else(|| ApiError::bad_request(INVALID_VIDEO_URL))
}

fn channel_param(
    query: Result<Query<ChannelQuery>, QueryRejection>,
    missing: &'static str,
) -> ApiResult<String> {
    required_param(query.map(|Query(q)| q.url), missing)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitleResponse {
    title: String,
    description: String,
    duration: String,
    view_count: String,
    like_count: String,
    thumbnail: Option<String>,
}

#[derive(Debug, Serialize)]
struct ThumbnailsResponse {
    thumbnails: Vec<Thumbnail>,
    title: String,
}

#[derive(Debug, Serialize)]
struct BannerResponse {
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ImageResponse {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentItem {
    author: String,
    text: String,
    likes: String,
    replies: u64,
    published_time: String,
}

#[derive(Debug, Serialize)]
struct CommentsResponse {
    comments: Vec<CommentItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "yttoolbox=info,server=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = resolve_settings(ServerArgs::parse().into_overrides())?;
    let host = parse_host_arg(&settings.host)?;
    let addr = SocketAddr::new(host, settings.port);

    let state = AppState::default();
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(%addr, "API server listening");

    tokio::spawn(initialize_client(
        state.client.clone(),
        settings.innertube.clone(),
        settings.init_retry,
    ));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/title", get(video_title))
        .route("/api/thumbnail", get(video_thumbnails))
        .route("/api/banner", get(channel_banner))
        .route("/api/pfp", get(channel_avatar))
        .route("/api/comments", get(video_comments))
        .fallback(endpoint_not_found)
        .with_state(state)
}

/// Opens the innertube session, retrying until it succeeds. Request paths
/// never retry; only this startup step does.
async fn initialize_client(slot: ClientSlot, settings: InnertubeSettings, retry: Duration) {
    loop {
        match InnertubeClient::create(settings.clone()).await {
            Ok(client) => {
                slot.install(Arc::new(client));
                info!("metadata client ready");
                return;
            }
            Err(err) => {
                error!(
                    error = %err,
                    retry_secs = retry.as_secs(),
                    "could not open innertube session"
                );
                tokio::time::sleep(retry).await;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "YouTube Toolbox API Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/api/title": "Extract video title, description, and metadata",
            "/api/banner": "Download channel banner images",
            "/api/thumbnail": "Download video thumbnails",
            "/api/pfp": "Download channel profile pictures",
            "/api/comments": "Extract video comments",
        },
        "usage": "Add ?url=<youtube_url> parameter to any endpoint",
    }))
}

async fn endpoint_not_found() -> ApiError {
    ApiError::not_found("Endpoint not found")
}

async fn video_title(
    State(state): State<AppState>,
    query: Result<Query<VideoQuery>, QueryRejection>,
) -> ApiResult<Json<TitleResponse>> {
    let video = video_param(query)?;
    let client = state.client()?;
    let info = client
        .fetch_basic_video_info(&video)
        .await
        .map_err(upstream_failure("title", TITLE_FAILED))?;

    let count = |value: Option<u64>| value.unwrap_or(0).to_string();
    Ok(Json(TitleResponse {
        title: info.title.unwrap_or_else(|| UNTITLED_VIDEO.to_string()),
        description: info
            .description
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        duration: count(info.duration_seconds),
        view_count: count(info.view_count),
        like_count: count(info.like_count),
        thumbnail: largest_image(info.thumbnails),
    }))
}

async fn video_thumbnails(
    State(state): State<AppState>,
    query: Result<Query<VideoQuery>, QueryRejection>,
) -> ApiResult<Json<ThumbnailsResponse>> {
    let video = video_param(query)?;
    let client = state.client()?;
    let info = client
        .fetch_basic_video_info(&video)
        .await
        .map_err(upstream_failure("thumbnail", THUMBNAILS_FAILED))?;

    let mut thumbnails = info.thumbnails;
    sort_thumbnails_by_area(&mut thumbnails);
    Ok(Json(ThumbnailsResponse {
        thumbnails,
        title: info.title.unwrap_or_else(|| UNTITLED_VIDEO.to_string()),
    }))
}

/// Classifies `url`, resolves it to a channel id and fetches the channel.
///
/// Unknown shapes, unresolvable videos and failed channel fetches all end up
/// as the same 400; only a failing video lookup is reported as a 500.
async fn lookup_channel(
    client: &dyn MetadataClient,
    url: &str,
    endpoint: &'static str,
    failure: &'static str,
) -> ApiResult<ChannelHandle> {
    let reference =
        classify_channel_url(url).map_err(|_| ApiError::bad_request(INVALID_CHANNEL_URL))?;
    let channel_id = match resolve_channel_id(client, &reference).await {
        Ok(id) => id,
        Err(ResolveError::Unresolved) => {
            warn!(endpoint, "channel url could not be resolved");
            return Err(ApiError::bad_request(INVALID_CHANNEL_URL));
        }
        Err(ResolveError::Upstream(err)) => return Err(upstream_failure(endpoint, failure)(err)),
    };

    let channel = client.fetch_channel(&channel_id).await.map_err(|err| {
        warn!(endpoint, %channel_id, error = %err, "channel lookup failed");
        ApiError::bad_request(INVALID_CHANNEL_URL)
    })?;
    debug!(
        endpoint,
        channel_id = %channel.id,
        title = channel.metadata.title.as_deref().unwrap_or_default(),
        "channel resolved"
    );
    Ok(channel)
}

fn largest_image(mut images: Vec<Thumbnail>) -> Option<String> {
    sort_thumbnails_by_area(&mut images);
    images.into_iter().next().map(|image| image.url)
}

async fn channel_banner(
    State(state): State<AppState>,
    query: Result<Query<ChannelQuery>, QueryRejection>,
) -> ApiResult<Json<BannerResponse>> {
    let url = channel_param(query, VALID_URL_REQUIRED)?;
    if url.chars().count() > MAX_CHANNEL_URL_LEN {
        return Err(ApiError::bad_request(URL_TOO_LONG));
    }
    if !url.starts_with("http") || !url.contains("youtube.com") {
        return Err(ApiError::bad_request(INVALID_URL_FORMAT));
    }

    let client = state.client()?;
    let channel = lookup_channel(client.as_ref(), &url, "banner", BANNER_FAILED).await?;

    // A missing home tab is treated like a channel without a banner.
    let banner = match client.fetch_channel_home(&channel).await {
        Ok(home) => largest_image(home.banner),
        Err(err) => {
            warn!(channel_id = %channel.id, error = %err, "channel home lookup failed");
            None
        }
    };

    Ok(Json(match banner {
        Some(url) => BannerResponse {
            url: Some(url),
            message: None,
        },
        None => BannerResponse {
            url: None,
            message: Some(NO_BANNER_MESSAGE),
        },
    }))
}

async fn channel_avatar(
    State(state): State<AppState>,
    query: Result<Query<ChannelQuery>, QueryRejection>,
) -> ApiResult<Json<ImageResponse>> {
    let url = channel_param(query, URL_REQUIRED)?;
    let client = state.client()?;
    let channel = lookup_channel(client.as_ref(), &url, "pfp", PFP_FAILED).await?;

    let url =
        largest_image(channel.metadata.avatar).ok_or_else(|| ApiError::not_found(PFP_NOT_FOUND))?;
    Ok(Json(ImageResponse { url }))
}

async fn video_comments(
    State(state): State<AppState>,
    query: Result<Query<VideoQuery>, QueryRejection>,
) -> ApiResult<Json<CommentsResponse>> {
    let video = video_param(query)?;
    let client = state.client()?;
    let comments = client
        .fetch_comments(&video)
        .await
        .map_err(upstream_failure("comments", COMMENTS_FAILED))?;

    let comments = comments
        .into_iter()
        .map(|comment| CommentItem {
            author: comment.author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            text: comment.text.unwrap_or_else(|| NO_COMMENT_TEXT.to_string()),
            likes: comment.vote_count.unwrap_or_else(|| "0".to_string()),
            replies: comment.reply_count.unwrap_or(0),
            published_time: comment
                .published_time
                .unwrap_or_else(|| UNKNOWN_TIME.to_string()),
        })
        .collect();
    Ok(Json(CommentsResponse { comments }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::Uri;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yttoolbox::metadata::{
        BasicVideoInfo, ChannelHome, ChannelMetadata, CommentData, SearchCandidate,
    };

    const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1s";

    #[derive(Default)]
    struct FakeClient {
        video: Option<BasicVideoInfo>,
        channels: HashMap<String, ChannelHandle>,
        home: Option<ChannelHome>,
        search: Option<Vec<SearchCandidate>>,
        comments: Option<Vec<CommentData>>,
        searches: AtomicUsize,
    }

    fn offline(endpoint: &str) -> ClientError {
        ClientError::Transport {
            endpoint: endpoint.into(),
            message: "offline".into(),
        }
    }

    #[async_trait]
    impl MetadataClient for FakeClient {
        async fn fetch_basic_video_info(
            &self,
            _video: &VideoId,
        ) -> Result<BasicVideoInfo, ClientError> {
            self.video.clone().ok_or_else(|| offline("player"))
        }

        async fn fetch_channel(&self, id: &str) -> Result<ChannelHandle, ClientError> {
            self.channels
                .get(id)
                .cloned()
                .ok_or_else(|| ClientError::Missing(format!("no channel {id}")))
        }

        async fn fetch_channel_home(
            &self,
            _channel: &ChannelHandle,
        ) -> Result<ChannelHome, ClientError> {
            self.home.clone().ok_or_else(|| offline("browse"))
        }

        async fn search_channels(&self, _query: &str) -> Result<Vec<SearchCandidate>, ClientError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.search.clone().ok_or_else(|| offline("search"))
        }

        async fn fetch_comments(&self, _video: &VideoId) -> Result<Vec<CommentData>, ClientError> {
            self.comments.clone().ok_or_else(|| offline("next"))
        }
    }

    fn state_with(client: FakeClient) -> (AppState, Arc<FakeClient>) {
        let client = Arc::new(client);
        let state = AppState::default();
        state.client.install(client.clone());
        (state, client)
    }

    fn thumb(width: u32, height: u32) -> Thumbnail {
        Thumbnail {
            url: format!("https://i.ytimg.com/{width}x{height}.jpg"),
            width,
            height,
        }
    }

    fn channel(id: &str, avatar: Vec<Thumbnail>) -> ChannelHandle {
        ChannelHandle {
            id: id.into(),
            metadata: ChannelMetadata {
                title: Some("Channel".into()),
                avatar,
            },
        }
    }

    fn with_channel(mut client: FakeClient, handle: ChannelHandle) -> FakeClient {
        client.channels.insert(handle.id.clone(), handle);
        client
    }

    fn video_query(url: Option<&str>) -> Result<Query<VideoQuery>, QueryRejection> {
        Ok(Query(VideoQuery {
            url: url.map(str::to_string),
        }))
    }

    fn channel_query(url: Option<&str>) -> Result<Query<ChannelQuery>, QueryRejection> {
        Ok(Query(ChannelQuery {
            url: url.map(str::to_string),
        }))
    }

    async fn into_parts<T: IntoResponse>(result: T) -> (StatusCode, Value) {
        let response = result.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn args_parse_overrides() {
        let args = ServerArgs::try_parse_from([
            "server",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--env-file",
            "/etc/yttoolbox.env",
        ])
        .unwrap();
        let overrides = args.into_overrides();
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.port, Some(8080));
        assert_eq!(overrides.env_path, Some(PathBuf::from("/etc/yttoolbox.env")));
    }

    #[test]
    fn args_reject_bad_port() {
        assert!(ServerArgs::try_parse_from(["server", "--port", "http"]).is_err());
    }

    #[test]
    fn host_must_be_an_ip_address() {
        assert!(parse_host_arg("127.0.0.1").is_ok());
        assert!(parse_host_arg("::").is_ok());
        assert!(parse_host_arg("localhost").is_err());
    }

    #[test]
    fn channel_query_accepts_channel_url_alias() {
        let uri: Uri = "http://localhost/api/pfp?channelUrl=https%3A%2F%2Fwww.youtube.com%2F%40x"
            .parse()
            .unwrap();
        let Query(query) = Query::<ChannelQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(query.url.as_deref(), Some("https://www.youtube.com/@x"));
    }

    #[tokio::test]
    async fn missing_url_is_rejected_on_every_endpoint() {
        let state = AppState::default();
        let responses = vec![
            into_parts(video_title(State(state.clone()), video_query(None)).await).await,
            into_parts(video_thumbnails(State(state.clone()), video_query(None)).await).await,
            into_parts(channel_banner(State(state.clone()), channel_query(None)).await).await,
            into_parts(channel_avatar(State(state.clone()), channel_query(None)).await).await,
            into_parts(video_comments(State(state.clone()), video_query(Some("  "))).await).await,
        ];
        for (status, body) in responses {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn malformed_video_url_is_rejected() {
        let (state, _) = state_with(FakeClient::default());
        let (status, body) = into_parts(
            video_title(State(state), video_query(Some("https://youtu.be/short"))).await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], INVALID_VIDEO_URL);
    }

    #[tokio::test]
    async fn requests_before_client_ready_get_503() {
        let state = AppState::default();
        let (status, body) =
            into_parts(video_title(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], NOT_READY);
    }

    #[tokio::test]
    async fn title_maps_video_info() {
        let (state, _) = state_with(FakeClient {
            video: Some(BasicVideoInfo {
                title: Some("A title".into()),
                description: None,
                duration_seconds: Some(213),
                view_count: Some(1000),
                like_count: None,
                thumbnails: vec![thumb(120, 90), thumb(1280, 720)],
                channel_id: Some("UCx".into()),
                author: Some("Author".into()),
            }),
            ..FakeClient::default()
        });
        let (status, body) =
            into_parts(video_title(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "A title");
        assert_eq!(body["description"], NO_DESCRIPTION);
        assert_eq!(body["duration"], "213");
        assert_eq!(body["viewCount"], "1000");
        assert_eq!(body["likeCount"], "0");
        assert_eq!(body["thumbnail"], "https://i.ytimg.com/1280x720.jpg");
    }

    #[tokio::test]
    async fn title_without_thumbnails_returns_null() {
        let (state, _) = state_with(FakeClient {
            video: Some(BasicVideoInfo::default()),
            ..FakeClient::default()
        });
        let (_, body) =
            into_parts(video_title(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(body["title"], UNTITLED_VIDEO);
        assert!(body["thumbnail"].is_null());
    }

    #[tokio::test]
    async fn title_upstream_failure_is_generic_500() {
        let (state, _) = state_with(FakeClient::default());
        let (status, body) =
            into_parts(video_title(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "error": TITLE_FAILED }));
    }

    #[tokio::test]
    async fn thumbnails_are_sorted_by_area() {
        let (state, _) = state_with(FakeClient {
            video: Some(BasicVideoInfo {
                title: Some("Sorted".into()),
                thumbnails: vec![thumb(120, 90), thumb(1280, 720), thumb(640, 480)],
                ..BasicVideoInfo::default()
            }),
            ..FakeClient::default()
        });
        let (status, body) = into_parts(
            video_thumbnails(State(state), video_query(Some("https://youtu.be/dQw4w9WgXcQ")))
                .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Sorted");
        let widths: Vec<u64> = body["thumbnails"]
            .as_array()
            .unwrap()
            .iter()
            .map(|thumb| thumb["width"].as_u64().unwrap())
            .collect();
        assert_eq!(widths, vec![1280, 640, 120]);
    }

    #[tokio::test]
    async fn thumbnails_failure_is_500() {
        let (state, _) = state_with(FakeClient::default());
        let (status, body) =
            into_parts(video_thumbnails(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], THUMBNAILS_FAILED);
    }

    #[tokio::test]
    async fn banner_rejects_long_and_foreign_urls() {
        let (state, _) = state_with(FakeClient::default());
        let long = format!("https://www.youtube.com/@{}", "a".repeat(MAX_CHANNEL_URL_LEN));
        let (status, body) =
            into_parts(channel_banner(State(state.clone()), channel_query(Some(&long))).await)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], URL_TOO_LONG);

        for url in ["www.youtube.com/@someone", "https://example.com/@someone"] {
            let (status, body) =
                into_parts(channel_banner(State(state.clone()), channel_query(Some(url))).await)
                    .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], INVALID_URL_FORMAT);
        }
    }

    #[tokio::test]
    async fn banner_for_direct_channel_id() {
        let client = with_channel(
            FakeClient {
                home: Some(ChannelHome {
                    banner: vec![thumb(1060, 175), thumb(2560, 424)],
                }),
                ..FakeClient::default()
            },
            channel("UCdirect", vec![]),
        );
        let (state, client) = state_with(client);
        let (status, body) = into_parts(
            channel_banner(
                State(state),
                channel_query(Some("https://www.youtube.com/channel/UCdirect")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "url": "https://i.ytimg.com/2560x424.jpg" }));
        assert_eq!(client.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn banner_missing_returns_null_with_message() {
        let client = with_channel(
            FakeClient {
                home: Some(ChannelHome::default()),
                ..FakeClient::default()
            },
            channel("UCplain", vec![]),
        );
        let (state, _) = state_with(client);
        let (status, body) = into_parts(
            channel_banner(
                State(state),
                channel_query(Some("https://www.youtube.com/channel/UCplain")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].is_null());
        assert_eq!(body["message"], NO_BANNER_MESSAGE);
    }

    #[tokio::test]
    async fn banner_home_failure_is_treated_as_missing_banner() {
        let (state, _) = state_with(with_channel(FakeClient::default(), channel("UCx", vec![])));
        let (status, body) = into_parts(
            channel_banner(
                State(state),
                channel_query(Some("https://www.youtube.com/channel/UCx")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].is_null());
    }

    #[tokio::test]
    async fn banner_resolves_handles_through_search() {
        let client = with_channel(
            FakeClient {
                search: Some(vec![
                    SearchCandidate {
                        author_name: Some("Someone Else".into()),
                        canonical_base_path: None,
                        browse_id: Some("UCother".into()),
                    },
                    SearchCandidate {
                        author_name: Some("Handle".into()),
                        canonical_base_path: Some("/@handle".into()),
                        browse_id: Some("UChandle".into()),
                    },
                ]),
                home: Some(ChannelHome {
                    banner: vec![thumb(1060, 175)],
                }),
                ..FakeClient::default()
            },
            channel("UChandle", vec![]),
        );
        let (state, client) = state_with(client);
        let (status, body) = into_parts(
            channel_banner(
                State(state),
                channel_query(Some("https://www.youtube.com/@handle/featured")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://i.ytimg.com/1060x175.jpg");
        assert_eq!(client.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn banner_failed_channel_fetch_is_invalid_channel() {
        // Search fails, the raw handle is tried as an id and the fetch fails.
        let (state, _) = state_with(FakeClient::default());
        let (status, body) = into_parts(
            channel_banner(
                State(state),
                channel_query(Some("https://www.youtube.com/@ghost")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], INVALID_CHANNEL_URL);
    }

    #[tokio::test]
    async fn banner_unknown_shape_is_invalid_channel() {
        let (state, _) = state_with(FakeClient::default());
        let (status, body) = into_parts(
            channel_banner(
                State(state),
                channel_query(Some("https://www.youtube.com/feed/trending")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], INVALID_CHANNEL_URL);
    }

    #[tokio::test]
    async fn banner_video_lookup_failure_is_500() {
        let (state, _) = state_with(FakeClient::default());
        let (status, body) =
            into_parts(channel_banner(State(state), channel_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], BANNER_FAILED);
    }

    #[tokio::test]
    async fn pfp_uses_uploader_of_video_urls() {
        let client = with_channel(
            FakeClient {
                video: Some(BasicVideoInfo {
                    channel_id: Some("UCuploader".into()),
                    ..BasicVideoInfo::default()
                }),
                ..FakeClient::default()
            },
            channel("UCuploader", vec![thumb(88, 88), thumb(176, 176), thumb(900, 900)]),
        );
        let (state, _) = state_with(client);
        let (status, body) = into_parts(
            channel_avatar(State(state), channel_query(Some("https://youtu.be/dQw4w9WgXcQ")))
                .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "url": "https://i.ytimg.com/900x900.jpg" }));
    }

    #[tokio::test]
    async fn unavailable_video_is_not_a_channel() {
        let (state, _) = state_with(FakeClient {
            video: Some(BasicVideoInfo::default()),
            ..FakeClient::default()
        });
        let (status, body) =
            into_parts(channel_banner(State(state.clone()), channel_query(Some(VIDEO_URL))).await)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], INVALID_CHANNEL_URL);

        let (status, _) =
            into_parts(channel_avatar(State(state), channel_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pfp_without_avatar_is_404() {
        let (state, _) = state_with(with_channel(
            FakeClient::default(),
            channel("UCbare", vec![]),
        ));
        let (status, body) = into_parts(
            channel_avatar(
                State(state),
                channel_query(Some("https://www.youtube.com/channel/UCbare")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], PFP_NOT_FOUND);
    }

    #[tokio::test]
    async fn pfp_legacy_custom_name_uses_first_candidate() {
        let client = with_channel(
            FakeClient {
                search: Some(vec![SearchCandidate {
                    author_name: Some("Legacy".into()),
                    canonical_base_path: Some("/c/SomethingElse".into()),
                    browse_id: Some("UClegacy".into()),
                }]),
                ..FakeClient::default()
            },
            channel("UClegacy", vec![thumb(176, 176)]),
        );
        let (state, _) = state_with(client);
        let (status, body) = into_parts(
            channel_avatar(
                State(state),
                channel_query(Some("https://www.youtube.com/c/LegacyName")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://i.ytimg.com/176x176.jpg");
    }

    #[tokio::test]
    async fn comments_are_mapped_with_defaults() {
        let (state, _) = state_with(FakeClient {
            comments: Some(vec![
                CommentData {
                    author: Some("@viewer".into()),
                    text: Some("Nice".into()),
                    vote_count: Some("1.2K".into()),
                    reply_count: Some(3),
                    published_time: Some("2 days ago".into()),
                },
                CommentData::default(),
            ]),
            ..FakeClient::default()
        });
        let (status, body) =
            into_parts(video_comments(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["comments"][0],
            serde_json::json!({
                "author": "@viewer",
                "text": "Nice",
                "likes": "1.2K",
                "replies": 3,
                "publishedTime": "2 days ago",
            })
        );
        assert_eq!(body["comments"][1]["author"], UNKNOWN_AUTHOR);
        assert_eq!(body["comments"][1]["text"], NO_COMMENT_TEXT);
        assert_eq!(body["comments"][1]["likes"], "0");
        assert_eq!(body["comments"][1]["publishedTime"], UNKNOWN_TIME);
    }

    #[tokio::test]
    async fn comments_empty_and_failure() {
        let (state, _) = state_with(FakeClient {
            comments: Some(Vec::new()),
            ..FakeClient::default()
        });
        let (status, body) =
            into_parts(video_comments(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "comments": [] }));

        let (state, _) = state_with(FakeClient::default());
        let (status, body) =
            into_parts(video_comments(State(state), video_query(Some(VIDEO_URL))).await).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], COMMENTS_FAILED);
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let Json(body) = index().await;
        assert!(body["endpoints"]["/api/title"].is_string());
        assert!(body["endpoints"]["/api/comments"].is_string());
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let (status, body) = into_parts(endpoint_not_found().await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
    }
}
