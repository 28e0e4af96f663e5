// Finishing transforms, applied in order after links are handled.
//
// Each transform returns the new text, or `None` when it has nothing to do.
// The reducer in `finish` keeps a result only if it still fits the budget.

use anyhow::{Context, Result};
use regex_lite::{NoExpand, Regex};
use tracing::debug;

use super::RewriteContext;

pub const SOURCE_HOST: &str = "twitter.com";
pub const TRACKING_QUERY: &str = "?utm_medium=Social&utm_source=Mastodon";

/// Compiled patterns shared by the rewrite steps.
#[derive(Debug, Clone)]
pub struct Patterns {
    pub bogus_retweet: Regex,
    pub handle: Regex,
    pub tracking: Regex,
    pub link: Regex,
}

impl Patterns {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            bogus_retweet: Regex::new(r"(?is)^(RT\s+@([^:]+):\s)")
                .context("Failed to compile retweet pattern")?,
            handle: Regex::new(r"(^|[^a-zA-Z0-9_@])(@[a-zA-Z0-9_]{1,15})($|[^a-zA-Z0-9_@])")
                .context("Failed to compile handle pattern")?,
            tracking: Regex::new(r"\?utm[^\n]*$").context("Failed to compile tracking pattern")?,
            link: Regex::new(r"https?://[^\s\x{a0}]+").context("Failed to compile link pattern")?,
        })
    }
}

pub type Transform = fn(&str, &RewriteContext) -> Option<String>;

/// Finishing steps in the order they run.
pub const FINISHING: [(&str, Transform); 4] = [
    ("mirror host", substitute_host),
    ("handles", rewrite_handles),
    ("tracking", normalize_tracking),
    ("footer", append_footer),
];

/// Run every finishing step, dropping any that would break the budget, then
/// hard-truncate as a last resort.
pub fn finish(text: &str, ctx: &RewriteContext) -> String {
    let text = FINISHING
        .iter()
        .fold(text.to_string(), |current, (name, transform)| {
            match transform(&current, ctx) {
                Some(next) if ctx.budget.fits(&next) => next,
                Some(_) => {
                    debug!(transform = *name, "Transform would exceed the length cap, skipped");
                    current
                }
                None => current,
            }
        });

    ctx.budget.truncate(&text)
}

/// Point links to the source platform at the mirror instead.
pub fn substitute_host(text: &str, ctx: &RewriteContext) -> Option<String> {
    let from = format!("/{SOURCE_HOST}/");
    text.contains(&from)
        .then(|| text.replace(&from, &format!("/{}/", ctx.mirror_host)))
}

/// Turn bare `@handle` mentions into `@handle@twitter.com`.
///
/// The separator on each side is part of the match, so two handles
/// separated by a single space need two passes; hence the loop.
pub fn rewrite_handles(text: &str, ctx: &RewriteContext) -> Option<String> {
    let pattern = &ctx.patterns().handle;
    let mut current = text.to_string();

    while let Some(caps) = pattern.captures(&current) {
        let (Some(separator), Some(handle)) = (caps.get(1), caps.get(2)) else {
            break;
        };
        current = format!(
            "{}{}@{SOURCE_HOST}{}",
            &current[..separator.end()],
            handle.as_str(),
            &current[handle.end()..]
        );
    }

    (current != text).then_some(current)
}

/// Replace a trailing `?utm...` query with a fixed one.
pub fn normalize_tracking(text: &str, ctx: &RewriteContext) -> Option<String> {
    let pattern = &ctx.patterns().tracking;
    pattern
        .is_match(text)
        .then(|| pattern.replace(text, NoExpand(TRACKING_QUERY)).into_owned())
}

pub fn append_footer(text: &str, ctx: &RewriteContext) -> Option<String> {
    ctx.footer
        .as_deref()
        .filter(|footer| !footer.is_empty())
        .map(|footer| format!("{text}\n{footer}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::TextBudget;

    fn ctx(max_chars: usize, footer: Option<&str>) -> RewriteContext {
        RewriteContext::new("someone", TextBudget::new(max_chars, 23), "nitter.net", footer).unwrap()
    }

    #[test]
    fn test_substitute_host() {
        let c = ctx(500, None);
        assert_eq!(
            substitute_host("see https://twitter.com/a/status/1", &c).as_deref(),
            Some("see https://nitter.net/a/status/1")
        );
        assert_eq!(substitute_host("no links", &c), None);
    }

    #[test]
    fn test_rewrite_handles() {
        let c = ctx(500, None);
        assert_eq!(
            rewrite_handles("hi @alice @bob!", &c).as_deref(),
            Some("hi @alice@twitter.com @bob@twitter.com!")
        );
    }

    #[test]
    fn test_rewrite_handles_leaves_remote_and_email() {
        let c = ctx(500, None);
        assert_eq!(rewrite_handles("ping @carol@example.social", &c), None);
        assert_eq!(rewrite_handles("mail dave@example.com", &c), None);
    }

    #[test]
    fn test_rewrite_handles_at_start_and_end() {
        let c = ctx(500, None);
        assert_eq!(
            rewrite_handles("@alice", &c).as_deref(),
            Some("@alice@twitter.com")
        );
    }

    #[test]
    fn test_normalize_tracking() {
        let c = ctx(500, None);
        assert_eq!(
            normalize_tracking("read https://example.com/a?utm_source=twitter&utm_campaign=x", &c)
                .as_deref(),
            Some("read https://example.com/a?utm_medium=Social&utm_source=Mastodon")
        );
        assert_eq!(normalize_tracking("https://example.com/a?id=1", &c), None);
    }

    #[test]
    fn test_footer() {
        assert_eq!(
            append_footer("text", &ctx(500, Some("#bot"))).as_deref(),
            Some("text\n#bot")
        );
        assert_eq!(append_footer("text", &ctx(500, None)), None);
        assert_eq!(append_footer("text", &ctx(500, Some(""))), None);
    }

    #[test]
    fn test_finish_skips_transforms_over_cap() {
        // Footer would push past the cap; everything else fits.
        let c = ctx(12, Some("#a-long-footer"));
        assert_eq!(finish("hello world", &c), "hello world");
    }

    #[test]
    fn test_finish_applies_all_within_cap() {
        let c = ctx(500, Some("#bot"));
        assert_eq!(
            finish("hi @alice https://twitter.com/a", &c),
            "hi @alice@twitter.com https://nitter.net/a\n#bot"
        );
    }

    #[test]
    fn test_finish_truncates_as_last_resort() {
        let c = ctx(5, None);
        assert_eq!(finish("abcdefgh", &c), "abcd…");
    }
}
