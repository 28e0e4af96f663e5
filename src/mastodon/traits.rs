// Destination trait: the two write calls the publisher needs.
//
// The real implementation is `MastodonClient`; tests plug in a scripted fake
// that answers with canned errors to drive the publication state machine.

use async_trait::async_trait;

use super::error::DestinationError;

/// Everything sent with one status-post call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub status: String,
    pub in_reply_to_id: Option<i64>,
    pub media_ids: Vec<String>,
    pub sensitive: bool,
    pub visibility: String,
    /// Sent as the `Idempotency-Key` header when present.
    pub idempotency_key: Option<String>,
}

#[async_trait]
pub trait Destination: Send + Sync {
    /// Upload one media file, returning the server's media id.
    async fn upload_media(&self, data: &[u8], mime_type: &str) -> Result<String, DestinationError>;

    /// Publish a status, returning the new post's id.
    async fn post_status(&self, request: &StatusRequest) -> Result<i64, DestinationError>;
}
