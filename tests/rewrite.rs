// Rewrite pipeline tests: whatever goes in, what comes out of `finish`
// fits the destination's length cap.

mod common;

use common::{post, ACCOUNT};
use tootbridge::db::SkipReason;
use tootbridge::rewrite::{finish, frame_quote, screen, QuoteSource, RewriteContext, TextBudget};

fn ctx(max_chars: usize, footer: Option<&str>) -> RewriteContext {
    RewriteContext::new(ACCOUNT, TextBudget::new(max_chars, 23), "nitter.net", footer).unwrap()
}

/// Texts that stress every finishing step: mentions, source-host links,
/// tracking queries and multi-byte characters.
fn samples() -> Vec<String> {
    let mut out = vec![];
    for n in [0, 1, 10, 60, 120, 200] {
        out.push("@a ".repeat(n));
        out.push("see https://twitter.com/x/status/1 ".repeat(n / 10 + 1) + &"é".repeat(n));
        out.push(format!("{}https://example.com/p?utm_source=feed", "word ".repeat(n)));
        out.push("🔄".repeat(n * 2));
    }
    out
}

#[test]
fn finished_text_always_fits() {
    for max_chars in [50, 140, 500] {
        let ctx = ctx(max_chars, Some("#bridge #mirror"));
        for text in samples() {
            let finished = finish(&text, &ctx);
            assert!(
                ctx.budget.fits(&finished),
                "cap {max_chars}: {} > {max_chars} for {text:?}",
                ctx.budget.length(&finished)
            );
        }
    }
}

#[test]
fn screened_and_framed_text_fits_or_is_skipped() {
    let ctx = ctx(140, None);
    let quote = QuoteSource::Fetched {
        username: "other".into(),
        url: "https://twitter.com/other/status/9".into(),
        text: "q".repeat(200),
        photos: vec![],
    };

    for author in [ACCOUNT, "other"] {
        for text in samples() {
            let source = post(1, author, &text);
            let framed = screen(&source, &ctx)
                .and_then(|screened| frame_quote(&screened, Some(&quote), &ctx));
            match framed {
                Ok(framed) => assert!(ctx.budget.fits(&framed), "{framed:?}"),
                Err(reason) => assert!(matches!(
                    reason,
                    SkipReason::TooLong | SkipReason::RetweetTooLong | SkipReason::QuoteTooLong
                )),
            }
        }
    }
}

#[test]
fn transforms_apply_when_there_is_room() {
    let ctx = ctx(500, Some("#bridge"));
    let finished = finish(
        "hi @friend https://twitter.com/friend/status/1?utm_source=x",
        &ctx,
    );
    assert_eq!(
        finished,
        "hi @friend@twitter.com https://nitter.net/friend/status/1?utm_medium=Social&utm_source=Mastodon\n#bridge"
    );
}

#[test]
fn footer_is_dropped_rather_than_truncating() {
    let ctx = ctx(20, Some("a long footer here"));
    assert_eq!(finish("twelve chars", &ctx), "twelve chars");
}
