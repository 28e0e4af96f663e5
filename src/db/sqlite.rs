// SqliteLedger: rusqlite backend implementing the Ledger trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// Each statement autocommits, so a recorded outcome is durable before the
// next post is looked at.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{LedgerKey, LedgerStats, Outcome};
use super::traits::Ledger;

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn seen(&self, post_id: i64, key: &LedgerKey) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::is_recorded(&conn, post_id, key)
    }

    async fn record(
        &self,
        post_id: i64,
        conversation_id: Option<&str>,
        outcome: Outcome,
        key: &LedgerKey,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::insert_record(&conn, post_id, conversation_id, outcome.ledger_id(), key)
    }

    async fn last_reply_target(
        &self,
        conversation_id: &str,
        key: &LedgerKey,
    ) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        super::queries::last_reply_target(&conn, conversation_id, key)
    }

    async fn stats(&self, key: &LedgerKey) -> Result<LedgerStats> {
        let conn = self.conn.lock().await;
        super::queries::ledger_stats(&conn, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SkipReason;
    use crate::db::schema::create_tables;

    fn test_ledger() -> SqliteLedger {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteLedger::new(conn)
    }

    fn key() -> LedgerKey {
        LedgerKey::new("someone", "bot", "example.social")
    }

    #[tokio::test]
    async fn test_trait_record_then_seen() {
        let ledger = test_ledger();
        assert!(!ledger.seen(42, &key()).await.unwrap());
        assert!(ledger
            .record(42, Some("42"), Outcome::Posted(500), &key())
            .await
            .unwrap());
        assert!(ledger.seen(42, &key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_trait_second_record_is_ignored() {
        let ledger = test_ledger();
        ledger
            .record(42, None, Outcome::Skipped(SkipReason::Reply), &key())
            .await
            .unwrap();
        let again = ledger
            .record(42, None, Outcome::Posted(500), &key())
            .await
            .unwrap();
        assert!(!again);

        let stats = ledger.stats(&key()).await.unwrap();
        assert_eq!(stats.posted, 0);
        assert_eq!(stats.skipped, vec![(SkipReason::Reply, 1)]);
    }

    #[tokio::test]
    async fn test_trait_thread_resolution() {
        let ledger = test_ledger();
        ledger
            .record(1, Some("conv"), Outcome::Posted(500), &key())
            .await
            .unwrap();
        assert_eq!(
            ledger.last_reply_target("conv", &key()).await.unwrap(),
            Some(500)
        );
    }
}
