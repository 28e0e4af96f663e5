use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use tootbridge::config::Config;
use tootbridge::db::{self, LedgerKey, SqliteLedger};
use tootbridge::feed::{scraper::clear_scratch_files, FeedSource, TwintScraper};
use tootbridge::mastodon::{MastodonClient, PublishPolicy};
use tootbridge::media::{ExternalTools, HttpHeadProbe, HttpPhotoSource, Transcoder};
use tootbridge::pipeline::{Bridge, BridgeOptions, RunSummary};
use tootbridge::rewrite::{RewriteContext, TextBudget};

/// Tootbridge: republish a Twitter feed onto a Mastodon instance.
///
/// Each run fetches the latest posts of one account, rewrites them for the
/// destination, re-hosts their media and records what happened so the next
/// run never posts the same thing twice.
#[derive(Parser)]
#[command(name = "tootbridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Republish the latest posts of a source account
    Run {
        /// Source account to republish (without the @)
        source_account: String,

        /// Login of the destination account
        dest_login: String,

        /// Access token for the destination account
        access_token: String,

        /// Destination instance (e.g. mastodon.social)
        instance: String,

        /// Ignore posts older than this many days (0 disables the window)
        #[arg(default_value = "1")]
        max_days: u32,

        /// Text appended to every post
        footer: Option<String>,

        /// Seconds to wait before fetching the feed
        #[arg(default_value = "0")]
        delay: u64,
    },

    /// Show what has been republished for one identity
    Status {
        /// Source account
        source_account: String,

        /// Login of the destination account
        dest_login: String,

        /// Destination instance
        instance: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tootbridge=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source_account,
            dest_login,
            access_token,
            instance,
            max_days,
            footer,
            delay,
        } => {
            let config = Config::load()?;
            let summary = run(
                &config,
                &source_account,
                &dest_login,
                &access_token,
                &instance,
                max_days,
                footer.as_deref(),
                delay,
            )
            .await?;
            print_summary(&source_account, &summary);
        }

        Commands::Status {
            source_account,
            dest_login,
            instance,
        } => {
            let config = Config::load()?;
            let db_path = config.account_dir(&source_account).join(db::LEDGER_FILE);
            let conn = db::open(&db_path)?;
            let ledger = SqliteLedger::new(conn);
            let key = LedgerKey::new(&source_account, &dest_login, &instance);
            tootbridge::status::show(&ledger, &key, &db_path).await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run(
    config: &Config,
    source_account: &str,
    dest_login: &str,
    access_token: &str,
    instance: &str,
    max_days: u32,
    footer: Option<&str>,
    delay: u64,
) -> Result<RunSummary> {
    let work_dir = config.ensure_account_dir(source_account)?;
    let conn = db::initialize(&work_dir.join(db::LEDGER_FILE))?;
    let ledger = Arc::new(SqliteLedger::new(conn));

    let client = MastodonClient::new(instance, access_token)?;
    let account = client
        .verify_credentials()
        .await
        .with_context(|| format!("Cannot log in to {instance} as {dest_login}"))?;
    info!(account = %account.acct, instance = instance, "Logged in");

    let caps = client.discover_capabilities().await;
    let removed = clear_scratch_files(&work_dir)?;
    if removed > 0 {
        info!(removed = removed, "Removed stale scratch files");
    }

    if delay > 0 {
        info!(seconds = delay, "Waiting before fetching the feed");
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }

    let feed = Arc::new(TwintScraper::new(&config.scraper, &work_dir));
    let posts = feed
        .fetch_timeline(source_account, config.batch_size)
        .await
        .with_context(|| format!("Cannot fetch the timeline of {source_account}"))?;
    info!(count = posts.len(), "Fetched posts");

    let tools = ExternalTools::new(&config.downloader, &config.ffmpeg, &config.ffprobe);
    let rewrite = RewriteContext::new(
        source_account,
        TextBudget::from_capabilities(&caps),
        &config.mirror_host,
        footer,
    )?;

    let options = BridgeOptions {
        max_age: (max_days > 0).then(|| chrono::Duration::days(i64::from(max_days))),
        video_budget: caps.video_size_limit.min(config.max_video_bytes()),
        mirror_host: config.mirror_host.clone(),
        visibility: config.visibility.clone(),
        policy: PublishPolicy::default(),
    };

    let bridge = Bridge {
        feed,
        destination: Arc::new(client),
        ledger,
        probe: Arc::new(HttpHeadProbe::new()?),
        photos: Arc::new(HttpPhotoSource::new()?),
        transcoder: Transcoder::new(Arc::new(tools), &work_dir),
        caps,
        rewrite,
        key: LedgerKey::new(source_account, dest_login, instance),
        options,
    };

    Ok(bridge.run(posts).await)
}

fn print_summary(source_account: &str, summary: &RunSummary) {
    println!(
        "\n{} {} post(s) from @{}",
        "Handled".bold(),
        summary.total(),
        source_account
    );
    println!("  {:<14} {}", "posted", summary.posted.to_string().green());
    println!("  {:<14} {}", "skipped", summary.skipped.to_string().yellow());
    println!("  {:<14} {}", "already seen", summary.already_seen);
    println!("  {:<14} {}", "too old", summary.out_of_window);
    if summary.failed > 0 {
        println!(
            "  {:<14} {}",
            "failed",
            summary.failed.to_string().red()
        );
    }
}
