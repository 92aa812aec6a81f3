//! Lenient extraction of the handful of fields we need from innertube
//! responses. Renderer layouts shift often, so everything here walks
//! `serde_json::Value` by pointer and treats absent data as `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::ClientError;
use crate::metadata::{
    BasicVideoInfo, ChannelHandle, ChannelHome, ChannelMetadata, CommentData, SearchCandidate,
    Thumbnail, sort_thumbnails_by_area,
};

static CLIENT_VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_CLIENT_VERSION"\s*:\s*"([^"]+)""#)
        .expect("client version regex should compile")
});
static VISITOR_DATA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""VISITOR_DATA"\s*:\s*"([^"]+)""#).expect("visitor data regex should compile")
});

const COMMENT_SECTION_ID: &str = "comment-item-section";
const COMMENT_PANEL_ID: &str = "engagement-panel-comments-section";

/// Pulls `(client_version, visitor_data)` out of the homepage's ytcfg blob.
pub(super) fn session_tokens(html: &str) -> (Option<String>, Option<String>) {
    let capture = |regex: &Regex| {
        regex
            .captures(html)
            .map(|captures| captures[1].to_string())
            .filter(|value| !value.is_empty())
    };
    (capture(&CLIENT_VERSION_REGEX), capture(&VISITOR_DATA_REGEX))
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    str_at(value, pointer).map(str::to_string)
}

/// Renders any of the text shapes innertube uses: `simpleText`, `runs`, the
/// view-model `content`, or a bare string.
fn text(value: &Value) -> Option<String> {
    let rendered = if let Some(plain) = value.as_str() {
        plain.to_string()
    } else if let Some(simple) = value.get("simpleText").and_then(Value::as_str) {
        simple.to_string()
    } else if let Some(runs) = value.get("runs").and_then(Value::as_array) {
        runs.iter()
            .filter_map(|run| run.get("text").and_then(Value::as_str))
            .collect::<String>()
    } else if let Some(content) = value.get("content").and_then(Value::as_str) {
        content.to_string()
    } else {
        return None;
    };
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(text)
}

/// Parses plain or comma-grouped integers, either as JSON numbers or strings.
fn count(value: &Value) -> Option<u64> {
    if let Some(number) = value.as_u64() {
        return Some(number);
    }
    let raw = value.as_str()?.trim();
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn count_at(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer).and_then(count)
}

fn dimension(value: &Value, key: &str) -> u32 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn absolute_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

/// Image lists arrive smallest first; they are returned largest first.
fn thumbnails_at(value: &Value, pointer: &str) -> Vec<Thumbnail> {
    let Some(entries) = value.pointer(pointer).and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut thumbnails: Vec<Thumbnail> = entries
        .iter()
        .filter_map(|entry| {
            let url = entry.get("url").and_then(Value::as_str)?.trim();
            if url.is_empty() {
                return None;
            }
            Some(Thumbnail {
                url: absolute_url(url),
                width: dimension(entry, "width"),
                height: dimension(entry, "height"),
            })
        })
        .collect();
    sort_thumbnails_by_area(&mut thumbnails);
    thumbnails
}

/// Unavailable videos come back without `videoDetails`; they map to an empty
/// record rather than an error.
pub(super) fn basic_video_info(player: &Value) -> BasicVideoInfo {
    let Some(details) = player.get("videoDetails") else {
        return BasicVideoInfo::default();
    };

    BasicVideoInfo {
        title: string_at(details, "/title"),
        description: string_at(details, "/shortDescription"),
        duration_seconds: count_at(details, "/lengthSeconds"),
        view_count: count_at(details, "/viewCount"),
        like_count: count_at(player, "/microformat/playerMicroformatRenderer/likeCount"),
        thumbnails: thumbnails_at(details, "/thumbnail/thumbnails"),
        channel_id: string_at(details, "/channelId"),
        author: string_at(details, "/author"),
    }
}

pub(super) fn channel_handle(browse: &Value, requested: &str) -> Result<ChannelHandle, ClientError> {
    let metadata = browse
        .pointer("/metadata/channelMetadataRenderer")
        .ok_or_else(|| {
            ClientError::Missing(format!("no channel metadata returned for {requested}"))
        })?;

    Ok(ChannelHandle {
        id: string_at(metadata, "/externalId").unwrap_or_else(|| requested.to_string()),
        metadata: ChannelMetadata {
            title: string_at(metadata, "/title"),
            avatar: thumbnails_at(metadata, "/avatar/thumbnails"),
        },
    })
}

pub(super) fn channel_home(browse: &Value) -> ChannelHome {
    let modern = thumbnails_at(
        browse,
        "/header/pageHeaderRenderer/content/pageHeaderViewModel/banner/imageBannerViewModel/image/sources",
    );
    let banner = if modern.is_empty() {
        thumbnails_at(browse, "/header/c4TabbedHeaderRenderer/banner/thumbnails")
    } else {
        modern
    };
    ChannelHome { banner }
}

pub(super) fn search_candidates(search: &Value) -> Vec<SearchCandidate> {
    let Some(sections) = search
        .pointer("/contents/twoColumnSearchResultsRenderer/primaryContents/sectionListRenderer/contents")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    sections
        .iter()
        .filter_map(|section| {
            section
                .pointer("/itemSectionRenderer/contents")
                .and_then(Value::as_array)
        })
        .flatten()
        .filter_map(|item| item.get("channelRenderer"))
        .map(|channel| SearchCandidate {
            author_name: text_at(channel, "/title"),
            canonical_base_path: string_at(
                channel,
                "/navigationEndpoint/browseEndpoint/canonicalBaseUrl",
            ),
            browse_id: string_at(channel, "/navigationEndpoint/browseEndpoint/browseId")
                .or_else(|| string_at(channel, "/channelId")),
        })
        .collect()
}

fn continuation_token(item: &Value) -> Option<String> {
    string_at(
        item,
        "/continuationItemRenderer/continuationEndpoint/continuationCommand/token",
    )
}

/// Finds the token that loads the first comment page of a watch-next
/// response.
pub(super) fn comments_continuation(next: &Value) -> Option<String> {
    let from_results = next
        .pointer("/contents/twoColumnWatchNextResults/results/results/contents")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("itemSectionRenderer"))
        .filter(|section| str_at(section, "/sectionIdentifier") == Some(COMMENT_SECTION_ID))
        .filter_map(|section| section.get("contents").and_then(Value::as_array))
        .flatten()
        .find_map(continuation_token);
    if from_results.is_some() {
        return from_results;
    }

    next.get("engagementPanels")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|panel| panel.get("engagementPanelSectionListRenderer"))
        .filter(|panel| str_at(panel, "/panelIdentifier") == Some(COMMENT_PANEL_ID))
        .filter_map(|panel| {
            panel
                .pointer("/content/sectionListRenderer/contents")
                .and_then(Value::as_array)
        })
        .flatten()
        .filter_map(|section| {
            section
                .pointer("/itemSectionRenderer/contents")
                .and_then(Value::as_array)
        })
        .flatten()
        .find_map(continuation_token)
}

/// Extracts top-level comments from a comment continuation page. Newer pages
/// ship comments as entity mutations; older ones as `commentRenderer`s.
pub(super) fn comments(page: &Value) -> Vec<CommentData> {
    let entities: Vec<CommentData> = page
        .pointer("/frameworkUpdates/entityBatchUpdate/mutations")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|mutation| mutation.pointer("/payload/commentEntityPayload"))
        .map(|payload| CommentData {
            author: string_at(payload, "/author/displayName"),
            text: string_at(payload, "/properties/content/content"),
            vote_count: string_at(payload, "/toolbar/likeCountNotliked"),
            reply_count: count_at(payload, "/toolbar/replyCount"),
            published_time: string_at(payload, "/properties/publishedTime"),
        })
        .collect();
    if !entities.is_empty() {
        return entities;
    }

    page.get("onResponseReceivedEndpoints")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|endpoint| {
            endpoint
                .pointer("/reloadContinuationItemsCommand/continuationItems")
                .or_else(|| endpoint.pointer("/appendContinuationItemsAction/continuationItems"))
                .and_then(Value::as_array)
        })
        .flatten()
        .filter_map(|item| item.pointer("/commentThreadRenderer/comment/commentRenderer"))
        .map(|renderer| CommentData {
            author: text_at(renderer, "/authorText"),
            text: text_at(renderer, "/contentText"),
            vote_count: text_at(renderer, "/voteCount"),
            reply_count: count_at(renderer, "/replyCount"),
            published_time: text_at(renderer, "/publishedTimeText"),
        })
        .collect()
}
