// Batch loop: republish one scraped batch, oldest post first.
//
// Posts are handled strictly one at a time: a later post may reply to an
// earlier one, and the reply target is read back from the ledger. A post is
// recorded only once its fate is settled; any error leaves it unrecorded so
// the next run tries again.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn, Instrument};

use super::attach::{collect_links, LinkHandler};
use crate::db::{Ledger, LedgerKey, Outcome, SkipReason};
use crate::feed::{FeedSource, SourcePost};
use crate::mastodon::{publish, Destination, DestinationCapabilities, PublicationAttempt, PublishPolicy};
use crate::media::{HeadProbe, PhotoSource, Transcoder};
use crate::rewrite::{self, QuoteSource, RewriteContext};

/// Counts of what happened to each post of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub posted: usize,
    pub skipped: usize,
    pub already_seen: usize,
    pub out_of_window: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.posted + self.skipped + self.already_seen + self.out_of_window + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostResult {
    AlreadySeen,
    OutOfWindow,
    Recorded(Outcome),
}

/// Per-run knobs that aren't collaborators.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Ignore posts older than this. `None` disables the window.
    pub max_age: Option<chrono::Duration>,
    /// Largest video to upload, in bytes.
    pub video_budget: u64,
    pub mirror_host: String,
    pub visibility: String,
    pub policy: PublishPolicy,
}

pub struct Bridge {
    pub feed: Arc<dyn FeedSource>,
    pub destination: Arc<dyn Destination>,
    pub ledger: Arc<dyn Ledger>,
    pub probe: Arc<dyn HeadProbe>,
    pub photos: Arc<dyn PhotoSource>,
    pub transcoder: Transcoder,
    pub caps: DestinationCapabilities,
    pub rewrite: RewriteContext,
    pub key: LedgerKey,
    pub options: BridgeOptions,
}

impl Bridge {
    /// Process a batch. Never fails as a whole: per-post errors are logged
    /// and counted.
    pub async fn run(&self, mut posts: Vec<SourcePost>) -> RunSummary {
        let span = tracing::info_span!("bridge", account = %self.key.source_account);
        async move {
            posts.sort_by_key(|p| p.id);
            let mut summary = RunSummary::default();

            for post in &posts {
                match self.process(post).await {
                    Ok(PostResult::AlreadySeen) => summary.already_seen += 1,
                    Ok(PostResult::OutOfWindow) => {
                        info!(post_id = post.id, "Outside lookback window");
                        summary.out_of_window += 1;
                    }
                    Ok(PostResult::Recorded(Outcome::Posted(toot_id))) => {
                        info!(post_id = post.id, toot_id = toot_id, "Posted");
                        summary.posted += 1;
                    }
                    Ok(PostResult::Recorded(Outcome::Skipped(reason))) => {
                        info!(post_id = post.id, reason = %reason, "Skipped");
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        warn!(post_id = post.id, error = %e, "Post abandoned, will retry next run");
                        summary.failed += 1;
                    }
                }
            }

            info!(
                posted = summary.posted,
                skipped = summary.skipped,
                already_seen = summary.already_seen,
                failed = summary.failed,
                "Done"
            );
            summary
        }
        .instrument(span)
        .await
    }

    async fn process(&self, post: &SourcePost) -> Result<PostResult> {
        if self.ledger.seen(post.id, &self.key).await? {
            return Ok(PostResult::AlreadySeen);
        }

        if let (Some(max_age), Some(created)) = (self.options.max_age, post.created_at_utc()) {
            if Utc::now() - created > max_age {
                return Ok(PostResult::OutOfWindow);
            }
        }

        let outcome = match self.compose(post).await {
            Err(reason) => Outcome::Skipped(reason),
            Ok((text, photo_ids, video_ids)) => {
                let reply_to = match post.conversation_id.as_deref() {
                    Some(conversation) => self.ledger.last_reply_target(conversation, &self.key).await?,
                    None => None,
                };
                if let Some(reply_to) = reply_to {
                    info!(post_id = post.id, reply_to = reply_to, "Posting as a reply");
                }

                let attempt = PublicationAttempt::new(text, reply_to, photo_ids, video_ids)
                    .with_visibility(&self.options.visibility)
                    .with_idempotency_key(self.idempotency_key(post.id));
                publish(self.destination.as_ref(), attempt, &self.options.policy).await?
            }
        };

        self.ledger
            .record(post.id, post.conversation_id.as_deref(), outcome, &self.key)
            .await?;
        Ok(PostResult::Recorded(outcome))
    }

    /// Build the final text and upload media. `Err` is an intentional skip.
    async fn compose(
        &self,
        post: &SourcePost,
    ) -> Result<(String, Vec<String>, Vec<String>), SkipReason> {
        let screened = rewrite::screen(post, &self.rewrite)?;

        let quote = match post.quote_url.as_deref() {
            Some(url) => Some(self.fetch_quote(url).await),
            None => None,
        };
        let framed = rewrite::frame_quote(&screened, quote.as_ref(), &self.rewrite)?;

        let quoted_photos = quote.as_ref().map(QuoteSource::photos).unwrap_or_default();
        let links = collect_links(&framed, &post.photos, quoted_photos, self.rewrite.patterns());

        let handler = LinkHandler {
            probe: self.probe.as_ref(),
            photos: self.photos.as_ref(),
            transcoder: &self.transcoder,
            destination: self.destination.as_ref(),
            caps: &self.caps,
            policy: &self.options.policy,
            mirror_host: &self.options.mirror_host,
            video_budget: self.options.video_budget,
        };
        let attached = handler.attach_links(framed, links).await;

        Ok((
            rewrite::finish(&attached.text, &self.rewrite),
            attached.photo_ids,
            attached.video_ids,
        ))
    }

    async fn fetch_quote(&self, url: &str) -> QuoteSource {
        info!(url = url, "Fetching quoted post");
        match self.feed.fetch_post(url).await {
            Ok(quoted) => match quoted.post {
                Some(post) => QuoteSource::Fetched {
                    username: quoted.username,
                    url: url.to_string(),
                    text: post.text,
                    photos: post.photos,
                },
                None => {
                    warn!(url = url, "Failed to fetch quoted post");
                    QuoteSource::Unavailable {
                        username: quoted.username,
                        url: url.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!(url = url, error = %e, "Invalid quote url");
                QuoteSource::Unparseable {
                    url: url.to_string(),
                }
            }
        }
    }

    /// Stable per destination identity and source post, so a retried or
    /// re-run post maps to the same key.
    fn idempotency_key(&self, post_id: i64) -> String {
        format!(
            "tootbridge-{}-{}-{}-{post_id}",
            self.key.source_account, self.key.dest_login, self.key.dest_instance
        )
    }
}
