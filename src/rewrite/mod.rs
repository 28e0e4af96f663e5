// Content rewriter: turning a scraped post into destination text.
//
// Rewriting happens in three stages around the I/O-heavy link handling:
// `screen` decides whether the post is published at all and frames
// retweets, `frame_quote` appends the quoted post, and `finish` applies the
// cosmetic transforms after links have been resolved. Every stage keeps the
// text within the destination's length budget.

pub mod entities;
pub mod measure;
pub mod transforms;

use anyhow::Result;

use crate::db::SkipReason;
use crate::feed::SourcePost;

pub use entities::html_unescape;
pub use measure::TextBudget;
pub use transforms::{finish, Patterns, SOURCE_HOST};

const QUOTE_SEPARATOR: &str = "\n\n———\n🔄 ";

/// Per-run settings shared by every rewrite step.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// The feed owner; posts by anyone else are retweets.
    pub source_account: String,
    pub budget: TextBudget,
    pub mirror_host: String,
    pub footer: Option<String>,
    patterns: Patterns,
}

impl RewriteContext {
    pub fn new(
        source_account: &str,
        budget: TextBudget,
        mirror_host: &str,
        footer: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            source_account: source_account.to_string(),
            budget,
            mirror_host: mirror_host.to_string(),
            footer: footer.map(str::to_string),
            patterns: Patterns::compile()?,
        })
    }

    pub fn patterns(&self) -> &Patterns {
        &self.patterns
    }
}

/// A post that passed screening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screened {
    pub text: String,
    /// Who wrote the content; differs from the feed owner for retweets.
    pub author: String,
}

/// What could be learned about a quoted post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteSource {
    /// The quote URL is not a post URL.
    Unparseable { url: String },
    /// The URL names a post that could not be fetched.
    Unavailable { username: String, url: String },
    Fetched {
        username: String,
        url: String,
        /// Raw, still escaped.
        text: String,
        photos: Vec<String>,
    },
}

impl QuoteSource {
    pub fn photos(&self) -> &[String] {
        match self {
            Self::Fetched { photos, .. } => photos,
            _ => &[],
        }
    }
}

fn attribution(username: &str) -> String {
    format!("@{username}@{SOURCE_HOST}")
}

/// Decide whether a post gets published and frame retweets.
///
/// Checks run in order: raw length, reply, bogus retweet, retweet framing.
pub fn screen(post: &SourcePost, ctx: &RewriteContext) -> Result<Screened, SkipReason> {
    let mut text = html_unescape(&post.text);
    let mut author = post.username.clone();

    if !ctx.budget.fits(&text) {
        return Err(SkipReason::TooLong);
    }

    if post.is_reply() {
        return Err(SkipReason::Reply);
    }

    // Old-style retweets arrive as "RT @user: text", cut short with an
    // ellipsis when they didn't fit. Those can't be recovered.
    let retweet_prefix = ctx
        .patterns()
        .bogus_retweet
        .captures(&text)
        .and_then(|caps| Some((caps.get(1)?.end(), caps.get(2)?.as_str().trim().to_string())));

    if let Some((body_start, user)) = retweet_prefix {
        let body = text[body_start..].to_string();
        if body.trim_end().ends_with(measure::ELLIPSIS) {
            return Err(SkipReason::BogusRetweet);
        }
        author = user;
        text = body;
    }

    if !author.eq_ignore_ascii_case(&ctx.source_account) {
        text = format!("🔄 {}\n\n{}", attribution(&author), text);
        if !ctx.budget.fits(&text) {
            return Err(SkipReason::RetweetTooLong);
        }
    }

    Ok(Screened { text, author })
}

/// Append the quoted post, falling back to just its URL when the full text
/// doesn't fit.
pub fn frame_quote(
    screened: &Screened,
    quote: Option<&QuoteSource>,
    ctx: &RewriteContext,
) -> Result<String, SkipReason> {
    let Some(quote) = quote else {
        return Ok(screened.text.clone());
    };

    let with_block = |block: &str| format!("{}{QUOTE_SEPARATOR}{block}", screened.text);

    let mut candidates = Vec::with_capacity(2);
    match quote {
        QuoteSource::Unparseable { url } => candidates.push(with_block(url)),
        QuoteSource::Unavailable { username, url } => {
            candidates.push(with_block(&format!("{}\n\n{url}", attribution(username))))
        }
        QuoteSource::Fetched {
            username,
            url,
            text,
            ..
        } => {
            let header = attribution(username);
            candidates.push(with_block(&format!("{header}\n\n{}", html_unescape(text))));
            candidates.push(with_block(&format!("{header}\n\n{url}")));
        }
    }

    candidates
        .into_iter()
        .find(|candidate| ctx.budget.fits(candidate))
        .ok_or(SkipReason::QuoteTooLong)
}
