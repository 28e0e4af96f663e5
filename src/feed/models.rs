// Source post model: one scraped tweet as emitted by the scraper's JSON
// output. Field names follow the scraper's keys; everything except the id,
// author and text is optional because older scraper versions omit them.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One scraped unit. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePost {
    pub id: i64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub conversation_id: Option<String>,
    /// Author handle, without the leading `@`.
    pub username: String,
    /// Raw text, still HTML-escaped.
    #[serde(rename = "tweet")]
    pub text: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quote_url: Option<String>,
    /// Accounts this post replies to; non-empty means it is a reply.
    #[serde(default)]
    pub reply_to: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub link: Option<String>,
}

impl SourcePost {
    pub fn is_reply(&self) -> bool {
        !self.reply_to.is_empty()
    }

    /// Creation time, when the scraper's timestamp can be understood.
    ///
    /// Accepts epoch seconds or milliseconds, and `YYYY-MM-DD HH:MM:SS`
    /// optionally followed by a zone name (read as UTC).
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();

        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            let value: i64 = raw.parse().ok()?;
            // Anything past the year 5000 in seconds is really milliseconds.
            return if value > 100_000_000_000 {
                Utc.timestamp_millis_opt(value).single()
            } else {
                Utc.timestamp_opt(value, 0).single()
            };
        }

        let stamp = raw.get(..19)?;
        NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Accept a JSON string or number; empty strings and null become `None`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
