// Link handling: resolve every link in a post, upload what can be attached
// and rewrite the text around it.
//
// Handled media links disappear from the text (in both their original and
// resolved forms); everything else is replaced by its resolved form. Photo
// page links are always removed: the photos themselves come through the
// post's photo list.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::mastodon::{upload_media, Destination, DestinationCapabilities, PublishPolicy};
use crate::media::{
    classify, fetch_cdn_photo, resolve, validate, HeadProbe, LinkKind, MediaAsset, MediaCategory,
    PhotoSource, Transcoder,
};
use crate::rewrite::Patterns;

/// The post text after link handling, plus the uploaded media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    pub text: String,
    pub photo_ids: Vec<String>,
    pub video_ids: Vec<String>,
}

impl Attachments {
    pub fn media_count(&self) -> usize {
        self.photo_ids.len() + self.video_ids.len()
    }
}

/// Everything link handling needs to reach.
pub struct LinkHandler<'a> {
    pub probe: &'a dyn HeadProbe,
    pub photos: &'a dyn PhotoSource,
    pub transcoder: &'a Transcoder,
    pub destination: &'a dyn Destination,
    pub caps: &'a DestinationCapabilities,
    pub policy: &'a PublishPolicy,
    pub mirror_host: &'a str,
    /// Largest video to upload, in bytes.
    pub video_budget: u64,
}

/// Links in the text, then the post's photos, then the quoted post's photos.
pub fn collect_links(
    text: &str,
    post_photos: &[String],
    quoted_photos: &[String],
    patterns: &Patterns,
) -> Vec<String> {
    patterns
        .link
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .chain(post_photos.iter().cloned())
        .chain(quoted_photos.iter().cloned())
        .collect()
}

fn strip(text: &str, link: &str, resolved: &str) -> String {
    text.replace(link, "").replace(resolved, "")
}

impl LinkHandler<'_> {
    pub async fn attach_links(&self, text: String, links: Vec<String>) -> Attachments {
        let mut out = Attachments {
            text,
            ..Default::default()
        };
        let mut handled: HashSet<String> = HashSet::new();

        for link in links {
            let resolved = resolve(self.probe, &link).await;
            if !handled.insert(resolved.clone()) {
                continue;
            }

            let kind = classify(&link, &resolved);
            let has_room = out.media_count() < self.caps.max_attachments;
            debug!(link = %link, resolved = %resolved, kind = ?kind, "Handling link");

            match kind {
                LinkKind::PhotoPage | LinkKind::VideoPage => {
                    if kind == LinkKind::PhotoPage {
                        out.text = strip(&out.text, &link, &resolved);
                    }
                    if has_room {
                        if let Some(id) = self.attach_video(&resolved).await {
                            out.video_ids.push(id);
                            out.text = strip(&out.text, &link, &resolved);
                            continue;
                        }
                    }
                }
                LinkKind::VideoThumbnail => {
                    debug!(link = %link, "Skipping video thumbnail");
                    continue;
                }
                LinkKind::CdnPhoto => {
                    if has_room {
                        if let Some(id) = self.attach_photo(&link).await {
                            out.photo_ids.push(id);
                            out.text = strip(&out.text, &link, &resolved);
                            continue;
                        }
                    }
                }
                LinkKind::Generic => {}
            }

            if !has_room && kind != LinkKind::Generic {
                info!(link = %link, "Attachment limit reached, keeping link");
            }
            out.text = out.text.replace(&link, &resolved);
        }

        out
    }

    async fn attach_video(&self, url: &str) -> Option<String> {
        let data = match self.transcoder.fetch_and_fit(url, self.video_budget).await {
            Ok(data) => data,
            Err(e) => {
                warn!(url = url, error = %e, "Cannot fetch video");
                return None;
            }
        };

        let asset = MediaAsset {
            data,
            mime_type: "video/mp4".to_string(),
            origin: url.to_string(),
        };
        self.upload(asset, MediaCategory::Video).await
    }

    async fn attach_photo(&self, url: &str) -> Option<String> {
        let asset = fetch_cdn_photo(self.photos, url, self.mirror_host).await?;
        self.upload(asset, MediaCategory::Image).await
    }

    async fn upload(&self, asset: MediaAsset, category: MediaCategory) -> Option<String> {
        let byte_limit = match category {
            MediaCategory::Image => self.caps.image_size_limit,
            MediaCategory::Video => self.caps.video_size_limit.min(self.video_budget),
        };
        let limits = DestinationCapabilities {
            image_size_limit: byte_limit,
            video_size_limit: byte_limit,
            ..self.caps.clone()
        };
        if let Err(reason) = validate(&asset, &limits, category) {
            warn!(url = %asset.origin, reason = %reason, "Media rejected");
            return None;
        }

        match upload_media(self.destination, &asset.data, &asset.mime_type, self.policy).await {
            Ok(id) => {
                info!(url = %asset.origin, media_id = %id, "Uploaded media");
                Some(id)
            }
            Err(e) => {
                warn!(url = %asset.origin, error = %e, "Cannot upload media");
                None
            }
        }
    }
}
