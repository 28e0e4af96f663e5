// Ledger queries: the only place SQL touches the `tweets` table.
//
// Id columns are TEXT for compatibility with older ledgers, so ids are bound
// as strings and read back through CAST(... AS INTEGER).

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{LedgerKey, LedgerStats, ProcessedRecord, SkipReason};

/// Whether a source post already has a ledger row for this destination.
pub fn is_recorded(conn: &Connection, post_id: i64, key: &LedgerKey) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM tweets
            WHERE tweet_id = ?1 AND twitter_account = ?2
              AND mastodon_login = ?3 AND mastodon_instance = ?4
         )",
        params![
            post_id.to_string(),
            key.source_account,
            key.dest_login,
            key.dest_instance
        ],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Append a ledger row unless one already exists for the same key.
///
/// Returns `false` when an earlier row won; the ledger is never updated in
/// place.
pub fn insert_record(
    conn: &Connection,
    post_id: i64,
    conversation_id: Option<&str>,
    outcome_id: i64,
    key: &LedgerKey,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO tweets (tweet_id, tweet_conversation_id, toot_id, twitter_account,
                             mastodon_login, mastodon_instance, recorded_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, datetime('now')
         WHERE NOT EXISTS (
            SELECT 1 FROM tweets
            WHERE tweet_id = ?1 AND twitter_account = ?4
              AND mastodon_login = ?5 AND mastodon_instance = ?6
         )",
        params![
            post_id.to_string(),
            conversation_id,
            outcome_id.to_string(),
            key.source_account,
            key.dest_login,
            key.dest_instance,
        ],
    )?;
    Ok(inserted == 1)
}

/// The most recently recorded real destination post in a conversation.
pub fn last_reply_target(
    conn: &Connection,
    conversation_id: &str,
    key: &LedgerKey,
) -> Result<Option<i64>> {
    let target = conn
        .query_row(
            "SELECT CAST(toot_id AS INTEGER) FROM tweets
             WHERE tweet_conversation_id = ?1 AND twitter_account = ?2
               AND mastodon_login = ?3 AND mastodon_instance = ?4
               AND CAST(toot_id AS INTEGER) > 0
             ORDER BY rowid DESC
             LIMIT 1",
            params![
                conversation_id,
                key.source_account,
                key.dest_login,
                key.dest_instance
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(target)
}

/// The most recently written row for a destination identity.
pub fn latest_record(conn: &Connection, key: &LedgerKey) -> Result<Option<ProcessedRecord>> {
    let record = conn
        .query_row(
            "SELECT CAST(tweet_id AS INTEGER), tweet_conversation_id,
                    CAST(toot_id AS INTEGER), recorded_at
             FROM tweets
             WHERE twitter_account = ?1 AND mastodon_login = ?2 AND mastodon_instance = ?3
             ORDER BY rowid DESC
             LIMIT 1",
            params![key.source_account, key.dest_login, key.dest_instance],
            |row| {
                Ok(ProcessedRecord {
                    post_id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    outcome_id: row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Count rows per outcome kind for a destination identity.
pub fn ledger_stats(conn: &Connection, key: &LedgerKey) -> Result<LedgerStats> {
    let mut stmt = conn.prepare(
        "SELECT CASE WHEN CAST(toot_id AS INTEGER) > 0 THEN 1
                     ELSE CAST(toot_id AS INTEGER) END AS kind,
                COUNT(*)
         FROM tweets
         WHERE twitter_account = ?1 AND mastodon_login = ?2 AND mastodon_instance = ?3
         GROUP BY kind",
    )?;

    let rows = stmt
        .query_map(
            params![key.source_account, key.dest_login, key.dest_instance],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stats = LedgerStats::default();
    for (kind, count) in rows {
        let count = count.max(0) as u64;
        if kind == 1 {
            stats.posted += count;
        } else if let Some(reason) = SkipReason::from_sentinel(kind) {
            stats.skipped.push((reason, count));
        } else {
            stats.unrecognized += count;
        }
    }
    stats
        .skipped
        .sort_by_key(|(reason, _)| std::cmp::Reverse(reason.sentinel()));
    stats.latest = latest_record(conn, key)?;

    Ok(stats)
}
