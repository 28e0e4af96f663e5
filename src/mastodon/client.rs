// Mastodon REST client: bearer-token auth over reqwest.
//
// Covers the handful of endpoints the bridge touches: credential check,
// instance document, media upload and status post. The access token comes
// from the command line; registering an application is out of scope.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::capabilities::DestinationCapabilities;
use super::error::DestinationError;
use super::traits::{Destination, StatusRequest};

pub struct MastodonClient {
    client: Client,
    base_url: String,
    access_token: String,
}

/// The logged-in account, as returned by `verify_credentials`.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
}

impl MastodonClient {
    /// `instance` may be a bare host (`mastodon.social`) or a full base URL.
    pub fn new(instance: &str, access_token: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tootbridge/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: instance_base_url(instance),
            access_token: access_token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check the access token by fetching the account it belongs to.
    pub async fn verify_credentials(&self) -> Result<Account> {
        let url = format!("{}/api/v1/accounts/verify_credentials", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Credential check against {} returned {status}: {body}", self.base_url);
        }

        response
            .json::<Account>()
            .await
            .context("Failed to parse verify_credentials response")
    }

    /// Fetch the instance limits, trying the v2 document first.
    pub async fn capabilities(&self) -> Result<DestinationCapabilities> {
        match self.instance_document("v2").await {
            Ok(body) => DestinationCapabilities::from_instance_json(&body),
            Err(e) => {
                debug!(error = %e, "v2 instance document unavailable, trying v1");
                let body = self.instance_document("v1").await?;
                DestinationCapabilities::from_instance_json(&body)
            }
        }
    }

    /// Like `capabilities`, but never fails: falls back to the defaults.
    pub async fn discover_capabilities(&self) -> DestinationCapabilities {
        match self.capabilities().await {
            Ok(caps) => caps,
            Err(e) => {
                warn!(error = %e, "Could not read instance limits, using defaults");
                DestinationCapabilities::default()
            }
        }
    }

    async fn instance_document(&self, version: &str) -> Result<String> {
        let url = format!("{}/api/{version}/instance", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("{url} returned {}", response.status());
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {url}"))
    }
}

#[async_trait]
impl Destination for MastodonClient {
    async fn upload_media(&self, data: &[u8], mime_type: &str) -> Result<String, DestinationError> {
        let part = Part::bytes(data.to_vec())
            .file_name(upload_file_name(mime_type))
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);

        debug!(bytes = data.len(), mime_type = mime_type, "Uploading media");

        let response = self
            .client
            .post(format!("{}/api/v2/media", self.base_url))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;

        let created: CreatedEntity = parse_success(response).await?;
        Ok(created.id)
    }

    async fn post_status(&self, request: &StatusRequest) -> Result<i64, DestinationError> {
        let mut body = json!({
            "status": request.status,
            "sensitive": request.sensitive,
            "visibility": request.visibility,
        });
        if let Some(reply_to) = request.in_reply_to_id {
            body["in_reply_to_id"] = json!(reply_to.to_string());
        }
        if !request.media_ids.is_empty() {
            body["media_ids"] = json!(request.media_ids);
        }

        let mut builder = self
            .client
            .post(format!("{}/api/v1/statuses", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await?;
        let created: CreatedEntity = parse_success(response).await?;

        created
            .id
            .parse::<i64>()
            .ok()
            .filter(|&id| id > 0)
            .ok_or_else(|| {
                DestinationError::Transport(format!("unexpected status id \"{}\"", created.id))
            })
    }
}

/// Turn a non-success response into `DestinationError::Api`, using the
/// server's `error` field as the description when there is one.
async fn parse_success(response: Response) -> Result<CreatedEntity, DestinationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<CreatedEntity>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let description = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    Err(DestinationError::api(
        status.as_u16(),
        format!(
            "{} {}",
            status.canonical_reason().unwrap_or_default(),
            description
        )
        .trim()
        .to_string(),
    ))
}

fn instance_base_url(instance: &str) -> String {
    let trimmed = instance.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn upload_file_name(mime_type: &str) -> String {
    let extension = mime_guess::get_mime_extensions_str(mime_type)
        .and_then(|extensions| extensions.first())
        .copied()
        .unwrap_or("bin");
    format!("media.{extension}")
}

// -- Serde types for Mastodon responses --

#[derive(Deserialize)]
struct CreatedEntity {
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}
