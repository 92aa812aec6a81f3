//! Maps user-supplied YouTube URLs to video ids and channel ids.
//!
//! Video URLs are recognised by a single pattern; channel URLs come in four
//! shapes (`/@handle`, `/channel/ID`, `/c/name`, `/user/name`) and a video URL
//! may stand in for its uploader. Vanity names have no direct lookup, so they
//! go through a channel search and an ordered tie-break, see [`disambiguate`].

use std::{fmt, sync::LazyLock};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::innertube::{ClientError, MetadataClient};
use crate::metadata::SearchCandidate;

pub const VIDEO_ID_LEN: usize = 11;

// The greedy prefix makes the last marker in the string win.
static VIDEO_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*(youtu\.be/|v/|u/\w/|embed/|watch\?v=|&v=)([^#&?]*).*")
        .expect("video url regex should compile")
});

/// An 11 character video id from the `[A-Za-z0-9_-]` alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub fn parse(candidate: &str) -> Option<Self> {
        let well_formed = candidate.len() == VIDEO_ID_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the video id from any of the known video URL shapes. Segments
/// that are not exactly a well-formed id yield `None`.
pub fn extract_video_id(input: &str) -> Option<VideoId> {
    let captures = VIDEO_URL_REGEX.captures(input)?;
    VideoId::parse(captures.get(2)?.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VanityKind {
    Handle,
    CustomName,
    Username,
}

/// A human-chosen channel alias that still needs to be turned into a
/// browse id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanityName {
    pub kind: VanityKind,
    pub name: String,
}

impl VanityName {
    /// The canonical base path a search result must carry to be an exact hit.
    pub fn expected_path(&self) -> String {
        match self.kind {
            VanityKind::Handle => format!("/@{}", self.name),
            VanityKind::CustomName => format!("/c/{}", self.name),
            VanityKind::Username => format!("/user/{}", self.name),
        }
    }

    pub fn search_query(&self) -> String {
        match self.kind {
            VanityKind::Handle => format!("@{}", self.name),
            VanityKind::CustomName | VanityKind::Username => self.name.clone(),
        }
    }

    /// Author-name matching only applies to handles; legacy names rarely
    /// equal the displayed channel title.
    fn matches_author(&self, author: &str) -> bool {
        self.kind == VanityKind::Handle
            && (author.to_lowercase() == self.name.to_lowercase()
                || author == format!("@{}", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelReference {
    /// Already a browse id; no lookup needed.
    ById(String),
    Vanity(VanityName),
    /// The channel is whoever uploaded this video.
    ByVideo(VideoId),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("url does not reference a channel")]
    Unresolved,
    #[error(transparent)]
    Upstream(#[from] ClientError),
}

fn path_token<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let (_, rest) = url.split_once(marker)?;
    let token = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (!token.is_empty()).then_some(token)
}

/// Classifies a channel URL. Precedence: `/@`, `/channel/`, `/c/`, `/user/`,
/// then a plain video URL.
pub fn classify_channel_url(url: &str) -> Result<ChannelReference, ResolveError> {
    let vanity = |kind, name: &str| {
        ChannelReference::Vanity(VanityName {
            kind,
            name: name.to_string(),
        })
    };

    if url.contains("/@") {
        return path_token(url, "/@")
            .map(|handle| vanity(VanityKind::Handle, handle))
            .ok_or(ResolveError::Unresolved);
    }
    if url.contains("/channel/") {
        return path_token(url, "/channel/")
            .map(|id| ChannelReference::ById(id.to_string()))
            .ok_or(ResolveError::Unresolved);
    }
    if url.contains("/c/") {
        return path_token(url, "/c/")
            .map(|name| vanity(VanityKind::CustomName, name))
            .ok_or(ResolveError::Unresolved);
    }
    if url.contains("/user/") {
        return path_token(url, "/user/")
            .map(|name| vanity(VanityKind::Username, name))
            .ok_or(ResolveError::Unresolved);
    }
    extract_video_id(url)
        .map(ChannelReference::ByVideo)
        .ok_or(ResolveError::Unresolved)
}

/// How a vanity name was turned into a channel id. Variants are listed in
/// the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    ExactPathMatch(String),
    ExactNameMatch(String),
    FirstCandidate(String),
    /// Search failed or found nothing usable; the raw name is passed through
    /// and the channel fetch decides whether it was a valid guess.
    RawFallback(String),
}

impl Resolution {
    pub fn channel_id(&self) -> &str {
        match self {
            Self::ExactPathMatch(id)
            | Self::ExactNameMatch(id)
            | Self::FirstCandidate(id)
            | Self::RawFallback(id) => id,
        }
    }

    pub fn into_channel_id(self) -> String {
        match self {
            Self::ExactPathMatch(id)
            | Self::ExactNameMatch(id)
            | Self::FirstCandidate(id)
            | Self::RawFallback(id) => id,
        }
    }

    fn tier(&self) -> &'static str {
        match self {
            Self::ExactPathMatch(_) => "exact_path",
            Self::ExactNameMatch(_) => "exact_name",
            Self::FirstCandidate(_) => "first_candidate",
            Self::RawFallback(_) => "raw_fallback",
        }
    }
}

fn exact_path_match(vanity: &VanityName, candidates: &[SearchCandidate]) -> Option<Resolution> {
    let expected = vanity.expected_path();
    candidates
        .iter()
        .filter(|candidate| candidate.canonical_base_path.as_deref() == Some(expected.as_str()))
        .find_map(SearchCandidate::usable_browse_id)
        .map(|id| Resolution::ExactPathMatch(id.to_string()))
}

fn exact_name_match(vanity: &VanityName, candidates: &[SearchCandidate]) -> Option<Resolution> {
    candidates
        .iter()
        .filter(|candidate| {
            candidate
                .author_name
                .as_deref()
                .is_some_and(|author| vanity.matches_author(author))
        })
        .find_map(SearchCandidate::usable_browse_id)
        .map(|id| Resolution::ExactNameMatch(id.to_string()))
}

fn first_candidate(_vanity: &VanityName, candidates: &[SearchCandidate]) -> Option<Resolution> {
    candidates
        .iter()
        .find_map(SearchCandidate::usable_browse_id)
        .map(|id| Resolution::FirstCandidate(id.to_string()))
}

type Step = fn(&VanityName, &[SearchCandidate]) -> Option<Resolution>;

const STEPS: [Step; 3] = [exact_path_match, exact_name_match, first_candidate];

/// Picks a channel id for `vanity` from a search outcome. Never fails: the
/// last resort is [`Resolution::RawFallback`].
pub fn disambiguate(
    vanity: &VanityName,
    search: Result<Vec<SearchCandidate>, ClientError>,
) -> Resolution {
    let candidates = match search {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(name = %vanity.name, error = %err, "channel search failed; using raw name");
            return Resolution::RawFallback(vanity.name.clone());
        }
    };

    STEPS
        .iter()
        .find_map(|step| step(vanity, &candidates))
        .unwrap_or_else(|| Resolution::RawFallback(vanity.name.clone()))
}

pub async fn resolve_vanity(client: &dyn MetadataClient, vanity: &VanityName) -> Resolution {
    let search = client.search_channels(&vanity.search_query()).await;
    let resolution = disambiguate(vanity, search);
    debug!(
        name = %vanity.name,
        tier = resolution.tier(),
        channel_id = resolution.channel_id(),
        "resolved vanity name"
    );
    resolution
}

/// Turns a classified reference into the id handed to `fetch_channel`.
pub async fn resolve_channel_id(
    client: &dyn MetadataClient,
    reference: &ChannelReference,
) -> Result<String, ResolveError> {
    match reference {
        ChannelReference::ById(id) => Ok(id.clone()),
        ChannelReference::Vanity(vanity) => {
            Ok(resolve_vanity(client, vanity).await.into_channel_id())
        }
        ChannelReference::ByVideo(video) => {
            let info = client.fetch_basic_video_info(video).await?;
            debug!(
                video = %video,
                author = info.author.as_deref().unwrap_or_default(),
                channel_id = info.channel_id.as_deref().unwrap_or_default(),
                "looked up video uploader"
            );
            info.channel_id.ok_or(ResolveError::Unresolved)
        }
    }
}
