// Feed source: the external scraper that turns a Twitter account into
// structured posts.
//
// The scraper runs as a subprocess writing one JSON object per line into a
// scratch file inside the account directory. We read that file, parse each
// line, and delete it again whether or not parsing succeeded.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::models::SourcePost;

/// A quoted post resolved from its URL.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotedPost {
    pub username: String,
    pub post_id: i64,
    /// `None` when the scraper could not produce the post.
    pub post: Option<SourcePost>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the account's most recent posts, newest first, at most `limit`.
    async fn fetch_timeline(&self, account: &str, limit: usize) -> Result<Vec<SourcePost>>;

    /// Resolve a post URL into the post it points at.
    ///
    /// Errors only when the URL itself is not a post URL; a scraper failure
    /// yields `QuotedPost { post: None, .. }`.
    async fn fetch_post(&self, url: &str) -> Result<QuotedPost>;
}

/// Split `https://twitter.com/<user>/status/<id>` into its user and id.
pub fn parse_post_url(url: &str) -> Result<(String, i64)> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid post url \"{url}\""))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("invalid scheme \"{}\"", parsed.scheme());
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [user, _, id] if !user.is_empty() => {
            let id: i64 = id
                .parse()
                .with_context(|| format!("invalid post id \"{id}\""))?;
            Ok((user.to_string(), id))
        }
        _ => anyhow::bail!("invalid path \"{}\"", parsed.path()),
    }
}

/// Parse the scraper's line-delimited JSON output.
pub fn parse_json_lines(raw: &str) -> Result<Vec<SourcePost>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Failed to parse scraped post on line {}", i + 1))
        })
        .collect()
}

/// Whether a scraped post is really the one a URL asked for.
fn matches_request(post: &SourcePost, post_id: i64, url: &str) -> bool {
    let id_str = post_id.to_string();
    post.id == post_id
        || post.conversation_id.as_deref() == Some(id_str.as_str())
        || post
            .link
            .as_deref()
            .is_some_and(|link| link.eq_ignore_ascii_case(url))
}

/// `FeedSource` backed by the twint command-line scraper.
pub struct TwintScraper {
    program: String,
    work_dir: PathBuf,
}

impl TwintScraper {
    pub fn new(program: &str, work_dir: &Path) -> Self {
        Self {
            program: program.to_string(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Run the scraper with `args`, writing its JSON output to `output`, and
    /// return the parsed posts. The output file never outlives this call.
    async fn scrape(&self, args: &[String], output: &Path) -> Result<Vec<SourcePost>> {
        remove_quietly(output);

        let result = Command::new(&self.program)
            .args(args)
            .arg("--json")
            .arg("-o")
            .arg(output)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program));

        let parsed = match result {
            Ok(out) if out.status.success() => tokio::fs::read_to_string(output)
                .await
                .with_context(|| format!("Failed to read {}", output.display()))
                .and_then(|raw| parse_json_lines(&raw)),
            Ok(out) => Err(anyhow::anyhow!(
                "{} exited with {}: {}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => Err(e),
        };

        remove_quietly(output);
        parsed
    }
}

#[async_trait]
impl FeedSource for TwintScraper {
    async fn fetch_timeline(&self, account: &str, limit: usize) -> Result<Vec<SourcePost>> {
        let output = self.work_dir.join("tweets.sjson");
        let args = vec![
            "-u".to_string(),
            account.to_string(),
            "-tl".to_string(),
            "--full-text".to_string(),
            "--limit".to_string(),
            limit.to_string(),
        ];

        let mut posts = self
            .scrape(&args, &output)
            .await
            .with_context(|| format!("Failed to fetch tweets for {account}"))?;
        posts.truncate(limit);

        info!(count = posts.len(), account = account, "Fetched tweets");
        Ok(posts)
    }

    async fn fetch_post(&self, url: &str) -> Result<QuotedPost> {
        let (username, post_id) = parse_post_url(url)?;
        let output = self.work_dir.join(format!("{username}_{post_id}.sjson"));
        let args = vec![
            "-u".to_string(),
            username.clone(),
            "-s".to_string(),
            single_post_query(post_id),
            "--full-text".to_string(),
            "--limit".to_string(),
            "1".to_string(),
        ];

        let post = match self.scrape(&args, &output).await {
            Ok(posts) => posts
                .into_iter()
                .next()
                .filter(|p| matches_request(p, post_id, url)),
            Err(e) => {
                debug!(url = url, error = %e, "Quoted post scrape failed");
                None
            }
        };

        Ok(QuotedPost {
            username,
            post_id,
            post,
        })
    }
}

/// twint search selecting exactly one post id.
fn single_post_query(post_id: i64) -> String {
    format!("since_id:{} and max_id:{post_id}", post_id.saturating_sub(1))
}

/// Delete leftover scratch files (`tweets.*json`) from an earlier run.
pub fn clear_scratch_files(work_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let entries = match std::fs::read_dir(work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", work_dir.display()))
        }
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("tweets.") && name.ends_with("json") {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed += 1;
        }
    }

    Ok(removed)
}

fn remove_quietly(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: i64, conversation: Option<&str>, link: Option<&str>) -> SourcePost {
        SourcePost {
            id,
            conversation_id: conversation.map(str::to_string),
            username: "other".into(),
            text: "quoted".into(),
            photos: vec![],
            quote_url: None,
            reply_to: vec![],
            created_at: None,
            link: link.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_post_url() {
        let (user, id) = parse_post_url("https://twitter.com/other/status/1592000000000000000").unwrap();
        assert_eq!(user, "other");
        assert_eq!(id, 1592000000000000000);
    }

    #[test]
    fn test_parse_post_url_rejects_bad_scheme() {
        let err = parse_post_url("ftp://twitter.com/other/status/1").unwrap_err();
        assert!(err.to_string().contains("invalid scheme"));
    }

    #[test]
    fn test_parse_post_url_rejects_bad_path() {
        assert!(parse_post_url("https://twitter.com/other").is_err());
        assert!(parse_post_url("https://twitter.com/other/status/abc").is_err());
        assert!(parse_post_url("https://twitter.com/a/b/c/d").is_err());
    }

    #[test]
    fn test_parse_json_lines_skips_blank_lines() {
        let raw = "{\"id\": 1, \"username\": \"a\", \"tweet\": \"x\"}\n\n{\"id\": 2, \"username\": \"a\", \"tweet\": \"y\"}\n";
        let posts = parse_json_lines(raw).unwrap();
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_parse_json_lines_reports_bad_line() {
        let raw = "{\"id\": 1, \"username\": \"a\", \"tweet\": \"x\"}\nnot json\n";
        let err = parse_json_lines(raw).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_matches_request() {
        let url = "https://twitter.com/other/status/10";
        assert!(matches_request(&post(10, None, None), 10, url));
        assert!(matches_request(&post(11, Some("10"), None), 10, url));
        assert!(matches_request(
            &post(11, None, Some("https://Twitter.com/other/status/10")),
            10,
            url
        ));
        assert!(!matches_request(&post(11, Some("9"), None), 10, url));
    }

    #[test]
    fn test_clear_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tweets.sjson"), "x").unwrap();
        std::fs::write(dir.path().join("tweets.json"), "x").unwrap();
        std::fs::write(dir.path().join("tootbot.db"), "x").unwrap();

        assert_eq!(clear_scratch_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("tootbot.db").exists());
    }

    #[tokio::test]
    async fn test_missing_scraper_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = TwintScraper::new("tootbridge-no-such-scraper", dir.path());
        assert!(scraper.fetch_timeline("someone", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_scraper_yields_unavailable_quote() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = TwintScraper::new("tootbridge-no-such-scraper", dir.path());
        let quoted = scraper
            .fetch_post("https://twitter.com/other/status/10")
            .await
            .unwrap();
        assert_eq!(quoted.username, "other");
        assert!(quoted.post.is_none());
    }

    #[test]
    fn test_single_post_query() {
        assert_eq!(single_post_query(77), "since_id:76 and max_id:77");
        assert_eq!(
            single_post_query(i64::MIN),
            format!("since_id:{} and max_id:{}", i64::MIN, i64::MIN)
        );
    }
}
