// Destination errors and their classification.
//
// Mastodon does not return machine-readable error codes for the failures the
// publisher recovers from, only an English description. `classify` is the
// single place that looks at those phrases; everything downstream works with
// `ErrorCategory`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    /// The server answered with a non-success status.
    #[error("destination returned {status}: {description}")]
    Api { status: u16, description: String },
    /// The request never produced a usable response.
    #[error("request to destination failed: {0}")]
    Transport(String),
}

impl DestinationError {
    pub fn api(status: u16, description: impl Into<String>) -> Self {
        Self::Api {
            status,
            description: description.into(),
        }
    }
}

impl From<reqwest::Error> for DestinationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// What went wrong, as far as the retry logic cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Attached media is still being processed server-side.
    MediaProcessing,
    /// 5xx from the server or a gateway in front of it.
    ServerError,
    /// Images and a video in the same post.
    MixedMedia,
    /// More attachments than the server allows.
    TooManyAttachments,
    /// Text over the server's character limit.
    TextTooLong,
    /// The post being replied to no longer exists.
    InvalidReplyTarget,
    Unknown,
}

const MEDIA_PROCESSING: &str = "try again in a moment";
const MIXED_MEDIA: &str = "cannot attach a video to a post that already contains images";
const TOO_MANY_ATTACHMENTS: &str = "cannot attach more than";
const TEXT_TOO_LONG: &str = "text character limit of";
const INVALID_REPLY_TARGET: &str = "the post you are trying to reply";

pub fn classify(err: &DestinationError) -> ErrorCategory {
    let (status, description) = match err {
        DestinationError::Api {
            status,
            description,
        } => (*status, description.to_lowercase()),
        DestinationError::Transport(_) => return ErrorCategory::Unknown,
    };

    match status {
        422 if description.contains(MEDIA_PROCESSING) => ErrorCategory::MediaProcessing,
        422 if description.contains(MIXED_MEDIA) => ErrorCategory::MixedMedia,
        422 if description.contains(TOO_MANY_ATTACHMENTS) => ErrorCategory::TooManyAttachments,
        422 if description.contains(TEXT_TOO_LONG) => ErrorCategory::TextTooLong,
        404 if description.contains(INVALID_REPLY_TARGET) => ErrorCategory::InvalidReplyTarget,
        500 | 502 | 503 | 504 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}
