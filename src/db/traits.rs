// Ledger trait: async interface over the idempotency and thread ledger.
//
// The batch loop only talks to `dyn Ledger`, so tests can swap in an
// in-memory SQLite file and the storage engine stays out of the pipeline.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{LedgerKey, LedgerStats, Outcome};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether this source post already has a recorded fate for `key`.
    async fn seen(&self, post_id: i64, key: &LedgerKey) -> Result<bool>;

    /// Record a post's settled outcome. Returns `false` if a row for the
    /// same key already existed (nothing is overwritten).
    async fn record(
        &self,
        post_id: i64,
        conversation_id: Option<&str>,
        outcome: Outcome,
        key: &LedgerKey,
    ) -> Result<bool>;

    /// The destination post a new post in `conversation_id` should reply to.
    async fn last_reply_target(&self, conversation_id: &str, key: &LedgerKey)
        -> Result<Option<i64>>;

    /// Per-outcome totals for the status display.
    async fn stats(&self, key: &LedgerKey) -> Result<LedgerStats>;
}
