// Media handling: turning links in a source post into uploadable files.
//
// `redirect` resolves shortened links, `classify` decides what a link points
// at, `fetch` downloads CDN photos and `video` downloads and shrinks videos.
// Everything here is best effort: a failure means "no attachment", never an
// aborted post.

pub mod classify;
pub mod fetch;
pub mod redirect;
pub mod video;

use thiserror::Error;

use crate::mastodon::DestinationCapabilities;

pub use classify::{classify, LinkKind};
pub use fetch::{fetch_cdn_photo, HttpPhotoSource, PhotoSource};
pub use redirect::{resolve, HeadProbe, HttpHeadProbe};
pub use video::{ExternalTools, Transcoder, VideoTools};

/// A downloaded file waiting to be uploaded. Dropped right after the upload
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub origin: String,
}

impl MediaAsset {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaRejection {
    #[error("unsupported media type {0}")]
    UnsupportedType(String),
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("file is empty")]
    Empty,
}

/// Check an asset against what the destination accepts.
pub fn validate(
    asset: &MediaAsset,
    caps: &DestinationCapabilities,
    category: MediaCategory,
) -> Result<(), MediaRejection> {
    if asset.is_empty() {
        return Err(MediaRejection::Empty);
    }
    if !caps.accepts_mime(&asset.mime_type) {
        return Err(MediaRejection::UnsupportedType(asset.mime_type.clone()));
    }

    let limit = match category {
        MediaCategory::Image => caps.image_size_limit,
        MediaCategory::Video => caps.video_size_limit,
    };
    if asset.len() > limit {
        return Err(MediaRejection::TooLarge {
            size: asset.len(),
            limit,
        });
    }

    Ok(())
}
