// Redirect resolver: follow shortened links to where they really go.
//
// Only 301 and 302 count as redirects. The resolver never fails: anything
// unexpected just stops the walk at the last URL that was reached.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

const MAX_REDIRECTS: usize = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// One redirect-less HEAD request.
#[async_trait]
pub trait HeadProbe: Send + Sync {
    async fn head(&self, url: &str) -> Result<HeadResponse, ProbeError>;
}

pub struct HttpHeadProbe {
    client: Client,
}

impl HttpHeadProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("Failed to build redirect probe client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HeadProbe for HttpHeadProbe {
    async fn head(&self, url: &str) -> Result<HeadResponse, ProbeError> {
        let response = self.client.head(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Other(e.to_string())
            }
        })?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HeadResponse {
            status: response.status().as_u16(),
            location,
        })
    }
}

/// Follow `url`'s redirect chain and return the final URL.
///
/// A timeout on an `https` URL is retried once over plain `http`; the URL
/// returned stays the `https` one unless the insecure probe redirects.
pub async fn resolve(probe: &dyn HeadProbe, url: &str) -> String {
    let mut current = url.to_string();
    let mut tried_insecure = false;

    for _ in 0..MAX_REDIRECTS {
        let response = match probe.head(&current).await {
            Ok(response) => response,
            Err(ProbeError::Timeout) if !tried_insecure && current.starts_with("https://") => {
                tried_insecure = true;
                let insecure = format!("http://{}", &current["https://".len()..]);
                debug!(url = %current, "Redirect probe timed out, retrying over http");
                match probe.head(&insecure).await {
                    Ok(response) => response,
                    Err(_) => return current,
                }
            }
            Err(e) => {
                debug!(url = %current, error = %e, "Redirect probe failed");
                return current;
            }
        };

        if !matches!(response.status, 301 | 302) {
            return current;
        }

        match response.location {
            Some(location) if !location.is_empty() => {
                current = join_location(&current, &location);
            }
            _ => return current,
        }
    }

    current
}

/// Apply a `Location` header to the URL that produced it.
///
/// Targets without a scheme replace everything after the last `/` of the
/// current URL.
fn join_location(current: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }

    let after_scheme = current.find("://").map(|i| i + 3).unwrap_or(0);
    let prefix = match current[after_scheme..].rfind('/') {
        Some(i) => &current[..after_scheme + i],
        None => current,
    };
    format!("{prefix}{location}")
}
