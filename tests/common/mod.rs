// Shared fakes for integration tests: every external collaborator replaced
// by an in-memory double. Nothing here touches the network or spawns a
// process.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;

use tootbridge::db::schema::create_tables;
use tootbridge::db::{LedgerKey, SqliteLedger};
use tootbridge::feed::{FeedSource, QuotedPost, SourcePost};
use tootbridge::mastodon::{
    Destination, DestinationCapabilities, DestinationError, PublishPolicy, StatusRequest,
};
use tootbridge::media::fetch::FetchedBody;
use tootbridge::media::redirect::{HeadResponse, ProbeError};
use tootbridge::media::video::EncodeJob;
use tootbridge::media::{HeadProbe, PhotoSource, Transcoder, VideoTools};
use tootbridge::pipeline::{Bridge, BridgeOptions};
use tootbridge::rewrite::{RewriteContext, TextBudget};

pub const ACCOUNT: &str = "someone";

pub fn key() -> LedgerKey {
    LedgerKey::new(ACCOUNT, "bot", "example.social")
}

pub fn ledger() -> Arc<SqliteLedger> {
    let conn = Connection::open_in_memory().unwrap();
    create_tables(&conn).unwrap();
    Arc::new(SqliteLedger::new(conn))
}

pub fn post(id: i64, username: &str, text: &str) -> SourcePost {
    SourcePost {
        id,
        conversation_id: Some(id.to_string()),
        username: username.into(),
        text: text.into(),
        photos: vec![],
        quote_url: None,
        reply_to: vec![],
        created_at: None,
        link: None,
    }
}

// ============================================================
// Destination
// ============================================================

/// Records every call. Status posts consume scripted responses first and
/// then succeed with increasing ids starting at 1000.
#[derive(Default)]
pub struct FakeDestination {
    pub statuses: Mutex<Vec<StatusRequest>>,
    pub uploads: Mutex<Vec<(usize, String)>>,
    pub scripted: Mutex<VecDeque<Result<i64, DestinationError>>>,
    next_id: Mutex<i64>,
}

impl FakeDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        })
    }

    pub fn scripted(responses: Vec<Result<i64, DestinationError>>) -> Arc<Self> {
        let dest = Self::new();
        *dest.scripted.lock().unwrap() = responses.into();
        dest
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn last_status(&self) -> Option<StatusRequest> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn upload_media(&self, data: &[u8], mime_type: &str) -> Result<String, DestinationError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((data.len(), mime_type.to_string()));
        Ok(format!("media-{}", uploads.len()))
    }

    async fn post_status(&self, request: &StatusRequest) -> Result<i64, DestinationError> {
        self.statuses.lock().unwrap().push(request.clone());
        if let Some(response) = self.scripted.lock().unwrap().pop_front() {
            return response;
        }
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        Ok(id)
    }
}

// ============================================================
// Feed
// ============================================================

/// Knows a fixed set of quotable posts by URL.
#[derive(Default)]
pub struct FakeFeed {
    pub quotes: HashMap<String, QuotedPost>,
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch_timeline(&self, _account: &str, _limit: usize) -> Result<Vec<SourcePost>> {
        Ok(vec![])
    }

    async fn fetch_post(&self, url: &str) -> Result<QuotedPost> {
        self.quotes
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown quote url {url}"))
    }
}

// ============================================================
// Media collaborators
// ============================================================

/// Every URL is final.
pub struct NoRedirects;

#[async_trait]
impl HeadProbe for NoRedirects {
    async fn head(&self, _url: &str) -> Result<HeadResponse, ProbeError> {
        Ok(HeadResponse {
            status: 200,
            location: None,
        })
    }
}

/// Redirects listed URLs once, everything else is final.
pub struct MapRedirects(pub HashMap<String, String>);

#[async_trait]
impl HeadProbe for MapRedirects {
    async fn head(&self, url: &str) -> Result<HeadResponse, ProbeError> {
        Ok(match self.0.get(url) {
            Some(target) => HeadResponse {
                status: 301,
                location: Some(target.clone()),
            },
            None => HeadResponse {
                status: 200,
                location: None,
            },
        })
    }
}

/// Serves a small JPEG for every URL.
pub struct JpegPhotos;

#[async_trait]
impl PhotoSource for JpegPhotos {
    async fn get(&self, _url: &str) -> Result<FetchedBody> {
        Ok(FetchedBody {
            data: vec![0xff, 0xd8, 0xff, 0xe0],
            content_type: Some("image/jpeg".into()),
        })
    }
}

/// Serves the same body for every URL.
pub struct ServedPhoto(pub FetchedBody);

#[async_trait]
impl PhotoSource for ServedPhoto {
    async fn get(&self, _url: &str) -> Result<FetchedBody> {
        Ok(self.0.clone())
    }
}

/// Video tools that can't download anything.
pub struct NoVideo;

#[async_trait]
impl VideoTools for NoVideo {
    async fn download(&self, url: &str, _dest: &Path, _size_hint_mb: u64) -> Result<()> {
        anyhow::bail!("no video at {url}")
    }

    async fn probe_duration(&self, _path: &Path) -> Result<f64> {
        anyhow::bail!("no video")
    }

    async fn probe_audio_bitrate(&self, _path: &Path) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn encode(&self, _job: &EncodeJob) -> Result<()> {
        anyhow::bail!("no video")
    }
}

/// Downloads a 1 KiB clip that already fits any budget.
pub struct FakeVideo;

pub const FAKE_VIDEO_LEN: usize = 1024;

#[async_trait]
impl VideoTools for FakeVideo {
    async fn download(&self, _url: &str, dest: &Path, _size_hint_mb: u64) -> Result<()> {
        std::fs::write(dest, vec![0u8; FAKE_VIDEO_LEN])?;
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> Result<f64> {
        Ok(10.0)
    }

    async fn probe_audio_bitrate(&self, _path: &Path) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn encode(&self, _job: &EncodeJob) -> Result<()> {
        anyhow::bail!("clip should not need re-encoding")
    }
}

// ============================================================
// Bridge assembly
// ============================================================

pub struct Harness {
    pub bridge: Bridge,
    pub destination: Arc<FakeDestination>,
    pub ledger: Arc<SqliteLedger>,
    _work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn work_dir(&self) -> &Path {
        self._work_dir.path()
    }
}

pub fn harness(destination: Arc<FakeDestination>) -> Harness {
    harness_with(destination, ledger(), FakeFeed::default(), Arc::new(NoRedirects), None)
}

pub fn harness_with(
    destination: Arc<FakeDestination>,
    ledger: Arc<SqliteLedger>,
    feed: FakeFeed,
    probe: Arc<dyn HeadProbe>,
    footer: Option<&str>,
) -> Harness {
    let work_dir = tempfile::tempdir().unwrap();
    let caps = DestinationCapabilities::default();
    let rewrite = RewriteContext::new(
        ACCOUNT,
        TextBudget::from_capabilities(&caps),
        "nitter.net",
        footer,
    )
    .unwrap();

    let bridge = Bridge {
        feed: Arc::new(feed),
        destination: destination.clone(),
        ledger: ledger.clone(),
        probe,
        photos: Arc::new(JpegPhotos),
        transcoder: Transcoder::new(Arc::new(NoVideo), work_dir.path()),
        caps: caps.clone(),
        rewrite,
        key: key(),
        options: BridgeOptions {
            max_age: None,
            video_budget: caps.video_size_limit,
            mirror_host: "nitter.net".into(),
            visibility: "unlisted".into(),
            policy: PublishPolicy::default(),
        },
    };

    Harness {
        bridge,
        destination,
        ledger,
        _work_dir: work_dir,
    }
}
