// Data models: Rust structs that map to ledger rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

/// Why a source post was intentionally not published.
///
/// Each reason is persisted as its own negative sentinel in the `toot_id`
/// column so a later run never re-evaluates a decision that cannot change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The source post is a reply to someone.
    Reply,
    /// The text does not fit the destination, either before rewriting or
    /// as judged by the destination itself.
    TooLong,
    /// A truncated `RT @user:` post whose full text is lost.
    BogusRetweet,
    /// Retweet attribution would push the text over the limit.
    RetweetTooLong,
    /// Even the reduced quote block does not fit.
    QuoteTooLong,
}

impl SkipReason {
    pub const ALL: [SkipReason; 5] = [
        SkipReason::Reply,
        SkipReason::TooLong,
        SkipReason::BogusRetweet,
        SkipReason::RetweetTooLong,
        SkipReason::QuoteTooLong,
    ];

    /// The value stored in place of a destination post id.
    pub const fn sentinel(self) -> i64 {
        match self {
            SkipReason::Reply => -1,
            SkipReason::TooLong => -2,
            SkipReason::BogusRetweet => -3,
            SkipReason::RetweetTooLong => -4,
            SkipReason::QuoteTooLong => -5,
        }
    }

    pub fn from_sentinel(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.sentinel() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Reply => "reply",
            SkipReason::TooLong => "too long",
            SkipReason::BogusRetweet => "bogus retweet",
            SkipReason::RetweetTooLong => "retweet too long",
            SkipReason::QuoteTooLong => "quote too long",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The settled fate of one source post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Published; carries the destination post id.
    Posted(i64),
    /// Intentionally not published.
    Skipped(SkipReason),
}

impl Outcome {
    /// The integer written to the ledger's `toot_id` column.
    pub fn ledger_id(&self) -> i64 {
        match self {
            Outcome::Posted(id) => *id,
            Outcome::Skipped(reason) => reason.sentinel(),
        }
    }

    /// Decode a stored `toot_id`. Zero and unknown negatives decode to `None`.
    pub fn from_ledger_id(value: i64) -> Option<Self> {
        if value > 0 {
            Some(Outcome::Posted(value))
        } else {
            SkipReason::from_sentinel(value).map(Outcome::Skipped)
        }
    }
}

/// The destination identity half of the ledger key. Combined with a source
/// post id it identifies exactly one ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerKey {
    pub source_account: String,
    pub dest_login: String,
    pub dest_instance: String,
}

impl LedgerKey {
    pub fn new(source_account: &str, dest_login: &str, dest_instance: &str) -> Self {
        Self {
            source_account: source_account.to_string(),
            dest_login: dest_login.to_string(),
            dest_instance: dest_instance.to_string(),
        }
    }
}

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub post_id: i64,
    pub conversation_id: Option<String>,
    /// Raw `toot_id` value; see `Outcome::from_ledger_id`.
    pub outcome_id: i64,
    /// Absent on rows written before the `recorded_at` migration.
    pub recorded_at: Option<String>,
}

impl ProcessedRecord {
    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::from_ledger_id(self.outcome_id)
    }
}

/// Aggregate view of one destination identity's ledger rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerStats {
    pub posted: u64,
    pub skipped: Vec<(SkipReason, u64)>,
    /// Rows whose `toot_id` is neither positive nor a known sentinel.
    pub unrecognized: u64,
    pub latest: Option<ProcessedRecord>,
}

impl LedgerStats {
    pub fn total(&self) -> u64 {
        self.posted + self.unrecognized + self.skipped.iter().map(|(_, n)| n).sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct_and_negative() {
        let mut seen = std::collections::HashSet::new();
        for reason in SkipReason::ALL {
            assert!(reason.sentinel() < 0);
            assert!(seen.insert(reason.sentinel()));
        }
    }

    #[test]
    fn test_reply_and_too_long_keep_historic_values() {
        // Older ledgers already hold -1 for replies and -2 for over-long posts.
        assert_eq!(SkipReason::Reply.sentinel(), -1);
        assert_eq!(SkipReason::TooLong.sentinel(), -2);
    }

    #[test]
    fn test_outcome_ledger_id_roundtrip() {
        assert_eq!(Outcome::from_ledger_id(500), Some(Outcome::Posted(500)));
        for reason in SkipReason::ALL {
            let outcome = Outcome::Skipped(reason);
            assert_eq!(Outcome::from_ledger_id(outcome.ledger_id()), Some(outcome));
        }
    }

    #[test]
    fn test_outcome_unknown_values() {
        assert_eq!(Outcome::from_ledger_id(0), None);
        assert_eq!(Outcome::from_ledger_id(-99), None);
    }

    #[test]
    fn test_stats_total() {
        let stats = LedgerStats {
            posted: 3,
            skipped: vec![(SkipReason::Reply, 2), (SkipReason::TooLong, 1)],
            unrecognized: 1,
            latest: None,
        };
        assert_eq!(stats.total(), 7);
    }
}
