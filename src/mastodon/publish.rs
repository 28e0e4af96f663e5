// Publication state machine.
//
// A status post either succeeds, gets retried (possibly with a mutated
// request), finishes with a skip outcome, or aborts. `next_transition` is the
// pure decision step; `publish` drives it against a real destination.
//
// One attempt counter is shared by every error category: a post that first
// hits a media-processing delay and then a reply-target error has used up
// two attempts, not one per category.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::error::{classify, DestinationError, ErrorCategory};
use super::traits::{Destination, StatusRequest};
use crate::db::{Outcome, SkipReason};
use crate::retry::{with_retry, RetryPolicy};

pub const DEFAULT_VISIBILITY: &str = "unlisted";

/// Retry budget per error category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPolicy {
    pub media_processing: RetryPolicy,
    pub server_error: RetryPolicy,
    pub mixed_media: RetryPolicy,
    pub too_many_attachments: RetryPolicy,
    pub invalid_reply_target: RetryPolicy,
    pub unknown: RetryPolicy,
    /// Retries for the media upload call (server errors only).
    pub media_upload: RetryPolicy,
    /// Wait before the status post whenever media is attached.
    pub media_settle: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            media_processing: RetryPolicy::new(10, Duration::from_secs(10)),
            server_error: RetryPolicy::new(5, Duration::from_secs(10)),
            mixed_media: RetryPolicy::new(2, Duration::from_secs(1)),
            too_many_attachments: RetryPolicy::unbounded(Duration::from_secs(1)),
            invalid_reply_target: RetryPolicy::new(2, Duration::from_secs(1)),
            unknown: RetryPolicy::new(5, Duration::from_secs(10)),
            media_upload: RetryPolicy::new(10, Duration::from_secs(10)),
            media_settle: Duration::from_secs(5),
        }
    }
}

/// State threaded through the retry loop of a single status post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationAttempt {
    pub text: String,
    pub reply_to: Option<i64>,
    pub photo_ids: Vec<String>,
    pub video_ids: Vec<String>,
    /// What the next request attaches. Starts as photos then videos.
    pub media_ids: Vec<String>,
    /// Failed attempts so far.
    pub attempts: u32,
    pub visibility: String,
    pub idempotency_key: Option<String>,
}

impl PublicationAttempt {
    pub fn new(
        text: String,
        reply_to: Option<i64>,
        photo_ids: Vec<String>,
        video_ids: Vec<String>,
    ) -> Self {
        let media_ids = photo_ids.iter().chain(video_ids.iter()).cloned().collect();
        Self {
            text,
            reply_to,
            photo_ids,
            video_ids,
            media_ids,
            attempts: 0,
            visibility: DEFAULT_VISIBILITY.to_string(),
            idempotency_key: None,
        }
    }

    pub fn with_visibility(mut self, visibility: &str) -> Self {
        self.visibility = visibility.to_string();
        self
    }

    pub fn with_idempotency_key(mut self, key: String) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn request(&self) -> StatusRequest {
        StatusRequest {
            status: self.text.clone(),
            in_reply_to_id: self.reply_to,
            media_ids: self.media_ids.clone(),
            sensitive: false,
            visibility: self.visibility.clone(),
            idempotency_key: self.idempotency_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Try again after `after`, with whatever the transition changed.
    Retry { after: Duration },
    /// Stop without an error and record this outcome.
    Finish(Outcome),
    /// Give up; nothing should be recorded.
    Abort(String),
}

/// Decide what to do after a failed status post, mutating the attempt for
/// the next request.
pub fn next_transition(
    attempt: &mut PublicationAttempt,
    category: ErrorCategory,
    policy: &PublishPolicy,
) -> Transition {
    attempt.attempts += 1;
    let attempts = attempt.attempts;

    let bounded = |policy: &RetryPolicy, reason: &str| {
        if policy.allows_another(attempts) {
            Transition::Retry {
                after: policy.backoff,
            }
        } else {
            Transition::Abort(format!("{reason} after {attempts} attempts"))
        }
    };

    match category {
        ErrorCategory::MediaProcessing => {
            bounded(&policy.media_processing, "Media took too long to process")
        }
        ErrorCategory::ServerError => bounded(&policy.server_error, "Destination kept failing"),
        ErrorCategory::MixedMedia => {
            let transition = bounded(&policy.mixed_media, "Unexpected mixed images and videos");
            if matches!(transition, Transition::Retry { .. }) {
                attempt.media_ids = attempt.video_ids.clone();
            }
            transition
        }
        ErrorCategory::TooManyAttachments => {
            if attempt.media_ids.pop().is_none() {
                return Transition::Abort("Too many attachments with none attached".to_string());
            }
            bounded(&policy.too_many_attachments, "Too many attachments")
        }
        ErrorCategory::TextTooLong => Transition::Finish(Outcome::Skipped(SkipReason::TooLong)),
        ErrorCategory::InvalidReplyTarget => {
            let transition = bounded(&policy.invalid_reply_target, "Unexpected reply target error");
            if matches!(transition, Transition::Retry { .. }) {
                attempt.reply_to = None;
            }
            transition
        }
        ErrorCategory::Unknown => bounded(&policy.unknown, "Unknown destination error"),
    }
}

/// Post `attempt` to `dest`, recovering from the failures the destination is
/// known to produce.
///
/// Returns the outcome to record. An error means the post was abandoned and
/// must not be recorded.
pub async fn publish(
    dest: &dyn Destination,
    mut attempt: PublicationAttempt,
    policy: &PublishPolicy,
) -> Result<Outcome> {
    if !attempt.media_ids.is_empty() {
        debug!(
            media = attempt.media_ids.len(),
            "Waiting for media to settle before posting"
        );
        tokio::time::sleep(policy.media_settle).await;
    }

    loop {
        let err = match dest.post_status(&attempt.request()).await {
            Ok(id) => return Ok(Outcome::Posted(id)),
            Err(err) => err,
        };

        let category = classify(&err);
        match next_transition(&mut attempt, category, policy) {
            Transition::Retry { after } => {
                warn!(
                    category = ?category,
                    attempt = attempt.attempts,
                    error = %err,
                    "Status post failed, retrying in {}s",
                    after.as_secs()
                );
                tokio::time::sleep(after).await;
            }
            Transition::Finish(outcome) => {
                info!(category = ?category, error = %err, "Status post rejected for good");
                return Ok(outcome);
            }
            Transition::Abort(reason) => {
                anyhow::bail!("{reason}: {err}");
            }
        }
    }
}

/// Upload one media file, retrying gateway and server errors.
pub async fn upload_media(
    dest: &dyn Destination,
    data: &[u8],
    mime_type: &str,
    policy: &PublishPolicy,
) -> Result<String, DestinationError> {
    with_retry(
        &policy.media_upload,
        |e: &DestinationError| classify(e) == ErrorCategory::ServerError,
        || dest.upload_media(data, mime_type),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(photos: &[&str], videos: &[&str]) -> PublicationAttempt {
        PublicationAttempt::new(
            "hello".into(),
            Some(500),
            photos.iter().map(|s| s.to_string()).collect(),
            videos.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_media_ids_start_with_photos_then_videos() {
        let a = attempt(&["p1", "p2"], &["v1"]);
        assert_eq!(a.media_ids, vec!["p1", "p2", "v1"]);
        assert_eq!(a.request().visibility, "unlisted");
        assert!(!a.request().sensitive);
    }

    #[test]
    fn test_media_processing_retries_ten_times() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&["p1"], &[]);
        for _ in 0..9 {
            assert_eq!(
                next_transition(&mut a, ErrorCategory::MediaProcessing, &policy),
                Transition::Retry {
                    after: Duration::from_secs(10)
                }
            );
        }
        assert!(matches!(
            next_transition(&mut a, ErrorCategory::MediaProcessing, &policy),
            Transition::Abort(_)
        ));
    }

    #[test]
    fn test_mixed_media_keeps_only_videos() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&["p1", "p2"], &["v1"]);
        assert_eq!(
            next_transition(&mut a, ErrorCategory::MixedMedia, &policy),
            Transition::Retry {
                after: Duration::from_secs(1)
            }
        );
        assert_eq!(a.media_ids, vec!["v1"]);
        assert!(matches!(
            next_transition(&mut a, ErrorCategory::MixedMedia, &policy),
            Transition::Abort(_)
        ));
    }

    #[test]
    fn test_too_many_attachments_strictly_shrinks() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&["p1", "p2", "p3"], &[]);
        let mut previous = a.media_ids.len();
        while !a.media_ids.is_empty() {
            let t = next_transition(&mut a, ErrorCategory::TooManyAttachments, &policy);
            assert!(matches!(t, Transition::Retry { .. }));
            assert!(a.media_ids.len() < previous);
            previous = a.media_ids.len();
        }
        assert!(matches!(
            next_transition(&mut a, ErrorCategory::TooManyAttachments, &policy),
            Transition::Abort(_)
        ));
    }

    #[test]
    fn test_text_too_long_finishes_with_sentinel() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&[], &[]);
        assert_eq!(
            next_transition(&mut a, ErrorCategory::TextTooLong, &policy),
            Transition::Finish(Outcome::Skipped(SkipReason::TooLong))
        );
    }

    #[test]
    fn test_invalid_reply_target_clears_reply() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&[], &[]);
        assert!(matches!(
            next_transition(&mut a, ErrorCategory::InvalidReplyTarget, &policy),
            Transition::Retry { .. }
        ));
        assert_eq!(a.reply_to, None);
    }

    #[test]
    fn test_attempt_counter_is_shared_across_categories() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&[], &[]);
        // First failure is a server error; the reply-target budget of two
        // is then exhausted by the second failure.
        assert!(matches!(
            next_transition(&mut a, ErrorCategory::ServerError, &policy),
            Transition::Retry { .. }
        ));
        assert!(matches!(
            next_transition(&mut a, ErrorCategory::InvalidReplyTarget, &policy),
            Transition::Abort(_)
        ));
        assert_eq!(a.reply_to, Some(500));
    }

    #[test]
    fn test_unknown_errors_abort_after_five() {
        let policy = PublishPolicy::default();
        let mut a = attempt(&[], &[]);
        let transitions: Vec<_> = (0..5)
            .map(|_| next_transition(&mut a, ErrorCategory::Unknown, &policy))
            .collect();
        assert!(transitions[..4]
            .iter()
            .all(|t| matches!(t, Transition::Retry { .. })));
        assert!(matches!(transitions[4], Transition::Abort(_)));
    }
}
