// CDN photo fetcher.
//
// Photos are requested through the mirror host first and from the CDN
// directly only if that fails. Either way a failure is logged and the photo
// is simply not attached.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::MediaAsset;

const CDN_PREFIX: &str = "https://pbs.twimg.com/";

/// A downloaded body and its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// GET `url`. Non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<FetchedBody>;
}

pub struct HttpPhotoSource {
    client: Client,
}

impl HttpPhotoSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tootbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PhotoSource for HttpPhotoSource {
    async fn get(&self, url: &str) -> Result<FetchedBody> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("{url} returned {}", response.status());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;

        Ok(FetchedBody {
            data: data.to_vec(),
            content_type,
        })
    }
}

/// The mirror's copy of a CDN URL, at original resolution.
pub fn mirror_url(url: &str, mirror_host: &str) -> Option<String> {
    url.strip_prefix(CDN_PREFIX)
        .map(|rest| format!("https://{mirror_host}/pic/orig/{rest}"))
}

/// Download a CDN photo, via the mirror when possible.
pub async fn fetch_cdn_photo(
    source: &dyn PhotoSource,
    url: &str,
    mirror_host: &str,
) -> Option<MediaAsset> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(mirrored) = mirror_url(url, mirror_host) {
        candidates.push(mirrored);
    }
    candidates.push(url.to_string());

    for candidate in candidates {
        match source.get(&candidate).await {
            Ok(body) => {
                debug!(url = %candidate, bytes = body.data.len(), "Fetched photo");
                let mime_type = body
                    .content_type
                    .unwrap_or_else(|| guess_mime(url));
                return Some(MediaAsset {
                    data: body.data,
                    mime_type,
                    origin: url.to_string(),
                });
            }
            Err(e) => warn!(url = %candidate, error = %e, "Failed to download photo"),
        }
    }

    None
}

/// Media type from the URL's file extension, for servers that don't send
/// a content type.
fn guess_mime(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
