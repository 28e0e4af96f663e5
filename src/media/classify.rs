// Link classification.

use url::Url;

const CDN_HOST: &str = "pbs.twimg.com";
const PAGE_HOSTS: [&str; 4] = ["twitter.com", "www.twitter.com", "mobile.twitter.com", "x.com"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A post's photo viewer. Animated gifs live here too, so it is
    /// attempted as a video.
    PhotoPage,
    VideoPage,
    /// A direct image on the media CDN.
    CdnPhoto,
    /// A video's preview image on the CDN; the video itself is attached
    /// through its page link.
    VideoThumbnail,
    Generic,
}

impl LinkKind {
    /// Whether the link should go to the video downloader.
    pub fn is_page(self) -> bool {
        matches!(self, Self::PhotoPage | Self::VideoPage)
    }
}

/// Classify a link by its resolved form, falling back to the original for
/// the CDN check (CDN links are never shortened, but resolution may fail).
pub fn classify(original: &str, resolved: &str) -> LinkKind {
    if let Some(url) = parse(resolved) {
        if is_page_host(&url) {
            let path = url.path();
            if path.contains("/photo/") {
                return LinkKind::PhotoPage;
            }
            if path.contains("/video/") {
                return LinkKind::VideoPage;
            }
        }
    }

    for candidate in [resolved, original] {
        if let Some(url) = parse(candidate) {
            if url.host_str() == Some(CDN_HOST) {
                return if url.path().contains("/tweet_video_thumb/") {
                    LinkKind::VideoThumbnail
                } else {
                    LinkKind::CdnPhoto
                };
            }
        }
    }

    LinkKind::Generic
}

fn parse(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
}

fn is_page_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| PAGE_HOSTS.iter().any(|h| host.eq_ignore_ascii_case(h)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_and_video_pages() {
        assert_eq!(
            classify(
                "https://t.co/abc",
                "https://twitter.com/someone/status/1/photo/1"
            ),
            LinkKind::PhotoPage
        );
        assert_eq!(
            classify(
                "https://t.co/abc",
                "https://twitter.com/someone/status/1/video/1"
            ),
            LinkKind::VideoPage
        );
        assert!(LinkKind::PhotoPage.is_page());
        assert!(!LinkKind::CdnPhoto.is_page());
    }

    #[test]
    fn test_page_markers_need_the_platform_host() {
        assert_eq!(
            classify(
                "https://t.co/abc",
                "https://example.com/gallery/photo/1"
            ),
            LinkKind::Generic
        );
    }

    #[test]
    fn test_cdn_photo() {
        let url = "https://pbs.twimg.com/media/FhXyz.jpg";
        assert_eq!(classify(url, url), LinkKind::CdnPhoto);
    }

    #[test]
    fn test_video_thumbnail() {
        let url = "https://pbs.twimg.com/tweet_video_thumb/FhXyz.jpg";
        assert_eq!(classify(url, url), LinkKind::VideoThumbnail);
    }

    #[test]
    fn test_cdn_checked_on_original_when_resolution_differs() {
        assert_eq!(
            classify(
                "https://pbs.twimg.com/media/FhXyz.jpg",
                "not a url"
            ),
            LinkKind::CdnPhoto
        );
    }

    #[test]
    fn test_generic() {
        assert_eq!(
            classify("https://t.co/abc", "https://example.com/article"),
            LinkKind::Generic
        );
    }
}
