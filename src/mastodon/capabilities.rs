// Destination capabilities: the limits a post has to fit into.
//
// Read once per run from the instance document. Every field is optional in
// the wild (older servers, forks, v1 vs v2 documents), so each limit is
// extracted on its own and falls back to a conservative default.

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_MAX_CHARS: usize = 500;
pub const DEFAULT_MAX_ATTACHMENTS: usize = 4;
pub const DEFAULT_IMAGE_SIZE_LIMIT: u64 = 10 * 1024 * 1024;
pub const DEFAULT_VIDEO_SIZE_LIMIT: u64 = 40 * 1024 * 1024;
pub const DEFAULT_CHARS_PER_URL: usize = 23;
pub const DEFAULT_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationCapabilities {
    pub max_chars: usize,
    pub max_attachments: usize,
    /// Bytes.
    pub image_size_limit: u64,
    /// Bytes.
    pub video_size_limit: u64,
    /// Characters each URL counts for, whatever its real length.
    pub chars_per_url: usize,
    pub accepted_mime_types: Vec<String>,
}

impl Default for DestinationCapabilities {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
            image_size_limit: DEFAULT_IMAGE_SIZE_LIMIT,
            video_size_limit: DEFAULT_VIDEO_SIZE_LIMIT,
            chars_per_url: DEFAULT_CHARS_PER_URL,
            accepted_mime_types: DEFAULT_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl DestinationCapabilities {
    /// Build capabilities from an instance document (`/api/v2/instance` or
    /// `/api/v1/instance`).
    pub fn from_instance_json(body: &str) -> Result<Self> {
        let doc: InstanceDocument =
            serde_json::from_str(body).context("Failed to parse instance document")?;
        Ok(Self::from_document(&doc))
    }

    fn from_document(doc: &InstanceDocument) -> Self {
        let defaults = Self::default();
        let statuses = doc.configuration.as_ref().and_then(|c| c.statuses.as_ref());
        let media = doc
            .configuration
            .as_ref()
            .and_then(|c| c.media_attachments.as_ref());

        let max_chars = statuses
            .and_then(|s| s.max_characters)
            .or(doc.max_toot_chars)
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_chars);

        let accepted_mime_types = media
            .and_then(|m| m.supported_mime_types.clone())
            .filter(|types| !types.is_empty())
            .unwrap_or(defaults.accepted_mime_types);

        Self {
            max_chars,
            max_attachments: statuses
                .and_then(|s| s.max_media_attachments)
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_attachments),
            image_size_limit: media
                .and_then(|m| m.image_size_limit)
                .filter(|&n| n > 0)
                .unwrap_or(defaults.image_size_limit),
            video_size_limit: media
                .and_then(|m| m.video_size_limit)
                .filter(|&n| n > 0)
                .unwrap_or(defaults.video_size_limit),
            chars_per_url: statuses
                .and_then(|s| s.characters_reserved_per_url)
                .filter(|&n| n > 0)
                .unwrap_or(defaults.chars_per_url),
            accepted_mime_types,
        }
    }

    pub fn accepts_mime(&self, mime_type: &str) -> bool {
        // Servers send "image/jpeg; charset=..." only rarely, but strip it anyway.
        let bare = mime_type.split(';').next().unwrap_or_default().trim();
        self.accepted_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(bare))
    }
}

// -- Serde types for the instance document --

#[derive(Debug, Default, Deserialize)]
struct InstanceDocument {
    #[serde(default)]
    configuration: Option<InstanceConfiguration>,
    /// Pleroma and glitch-soc put the text limit here.
    #[serde(default)]
    max_toot_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct InstanceConfiguration {
    #[serde(default)]
    statuses: Option<StatusLimits>,
    #[serde(default)]
    media_attachments: Option<MediaLimits>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusLimits {
    max_characters: Option<usize>,
    max_media_attachments: Option<usize>,
    characters_reserved_per_url: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaLimits {
    supported_mime_types: Option<Vec<String>>,
    image_size_limit: Option<u64>,
    video_size_limit: Option<u64>,
}
