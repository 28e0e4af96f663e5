// Database schema: table creation and migrations.
//
// The `tweets` table predates this crate: ledgers written by older versions
// use a different column set, and their id columns are TEXT. New tables are
// created with the same column types so both kinds of file read the same
// way. Additive changes are tracked in a `schema_version` table, one
// migration function per version.

use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Column set of the very first ledger layout.
const LEGACY_COLUMNS: [&str; 5] = ["tweet", "toot", "twitter", "mastodon", "instance"];

/// Create all tables if they don't exist yet, then bring the schema up to
/// date.
///
/// This is idempotent and safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    let columns = table_columns(conn, "tweets")?;

    if columns.is_empty() {
        info!("Configuring new ledger");
        conn.execute_batch(
            "
            CREATE TABLE tweets (
                tweet_id TEXT,               -- source post id
                tweet_conversation_id TEXT,  -- source conversation id (nullable)
                toot_id TEXT,                -- destination post id, or a negative skip sentinel
                twitter_account TEXT,
                mastodon_login TEXT,
                mastodon_instance TEXT
            );
            ",
        )
        .context("Failed to create tweets table")?;
    } else if is_legacy_layout(&columns) {
        info!("Updating legacy ledger layout");
        migrate_legacy_layout(conn)?;
    }

    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )
    .context("Failed to create schema_version table")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: record when each row was written. Older rows stay NULL.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE tweets ADD COLUMN recorded_at TEXT;")
    })?;

    // Migration v3: lookup indexes for the dedup key and thread resolution.
    run_migration(conn, 3, |c| {
        c.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS idx_tweets_key
                ON tweets(tweet_id, twitter_account, mastodon_login, mastodon_instance);
            CREATE INDEX IF NOT EXISTS idx_tweets_conversation
                ON tweets(tweet_conversation_id, twitter_account, mastodon_login, mastodon_instance);
            ",
        )
    })?;

    Ok(())
}

fn is_legacy_layout(columns: &[String]) -> bool {
    let found: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let legacy: HashSet<&str> = LEGACY_COLUMNS.into_iter().collect();
    found == legacy
}

/// Rename the first-generation columns in place and add the conversation
/// column. Runs inside a savepoint so a half-renamed table is never left
/// behind.
fn migrate_legacy_layout(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        SAVEPOINT alter_tweets_table;
        ALTER TABLE tweets RENAME COLUMN tweet TO tweet_id;
        ALTER TABLE tweets RENAME COLUMN toot TO toot_id;
        ALTER TABLE tweets RENAME COLUMN twitter TO twitter_account;
        ALTER TABLE tweets RENAME COLUMN mastodon TO mastodon_login;
        ALTER TABLE tweets RENAME COLUMN instance TO mastodon_instance;
        ALTER TABLE tweets ADD COLUMN tweet_conversation_id TEXT;
        RELEASE SAVEPOINT alter_tweets_table;
        ",
    )
    .map_err(|e| {
        // Leave the file exactly as it was.
        let _ = conn.execute_batch(
            "ROLLBACK TO SAVEPOINT alter_tweets_table; RELEASE SAVEPOINT alter_tweets_table;",
        );
        e
    })
    .context("Legacy ledger migration failed")
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// List a table's column names (empty if the table doesn't exist).
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Count the number of tables in the database.
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
