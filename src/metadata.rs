//! Metadata records exchanged between the resolver, the innertube client and
//! the HTTP layer.
//!
//! Most fields are optional because the platform omits them freely; the HTTP
//! layer decides which defaults a client gets to see.

use serde::{Deserialize, Serialize};

/// A single image rendition (thumbnail, banner or avatar).
///
/// Missing dimensions are stored as `0` so area comparisons stay total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl Thumbnail {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Orders renditions from the largest pixel area to the smallest. Ties keep
/// their original relative order.
pub fn sort_thumbnails_by_area(thumbnails: &mut [Thumbnail]) {
    thumbnails.sort_by(|a, b| b.area().cmp(&a.area()));
}

/// What the `player` endpoint tells us about a single video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicVideoInfo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: Option<u64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub thumbnails: Vec<Thumbnail>,
    pub channel_id: Option<String>,
    pub author: Option<String>,
}

/// Channel-level metadata available right after the channel lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMetadata {
    pub title: Option<String>,
    pub avatar: Vec<Thumbnail>,
}

/// Result of looking a channel up by id (or by a vanity guess).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
    pub metadata: ChannelMetadata,
}

/// The channel's home tab; only the banner matters to us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelHome {
    pub banner: Vec<Thumbnail>,
}

/// One entry of a channel search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCandidate {
    pub author_name: Option<String>,
    pub canonical_base_path: Option<String>,
    pub browse_id: Option<String>,
}

impl SearchCandidate {
    /// The browse id, ignoring blank values.
    pub fn usable_browse_id(&self) -> Option<&str> {
        self.browse_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// A top-level comment as returned by the watch-next feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentData {
    pub author: Option<String>,
    pub text: Option<String>,
    /// Display form of the like count (e.g. `1.2K`).
    pub vote_count: Option<String>,
    pub reply_count: Option<u64>,
    pub published_time: Option<String>,
}
