//! CLI entry point for mediafetch.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mediafetch_core::{
    AdmissionController, CredentialStore, Database, DownloadTask, FsSink, LofterSession,
    LogNotifier, MediaKind, Platform, ProgressMap, RecordStore, ResolvedItem, RetrySupervisor,
    Scheduler, SessionId, Settings, SettingsHandle, SystemProbe, TransferEngine, TwitterSession,
    build_default_resolver_registry,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let settings = SettingsHandle::new(Settings {
        max_concurrent_downloads: usize::from(args.concurrency),
        max_retries: u32::from(args.max_retries),
        inter_page_delay: Duration::from_secs(args.page_delay),
        notifications_enabled: !args.no_notifications,
        wifi_only: args.wifi_only,
        download_dir: args.output.clone(),
    });

    let credentials = credentials_from_env();

    let registry = build_default_resolver_registry(settings.clone());
    let Some(platform) = registry.detect_platform(&args.link) else {
        bail!("unsupported link: {}", args.link);
    };
    info!(platform = %platform, link = %args.link, "resolving");

    // Archive crawls honor the time window and tag flags; other platforms
    // go through the plain resolve path.
    let items = if platform == Platform::Lofter {
        resolve_archive(&args, &settings, &credentials).await?
    } else {
        registry
            .resolve(&args.link, &credentials)
            .await
            .with_context(|| format!("failed to resolve {}", args.link))?
    };

    if items.is_empty() {
        info!("nothing to download");
        return Ok(());
    }

    let tasks = build_tasks(&items, platform, &args.output, &credentials);
    info!(items = items.len(), tasks = tasks.len(), "resolved");

    let db_dir = args.output.join(".mediafetch");
    tokio::fs::create_dir_all(&db_dir)
        .await
        .with_context(|| format!("cannot create {}", db_dir.display()))?;
    let db = Database::new(&db_dir.join("records.db")).await?;
    let records = RecordStore::new(db.clone());

    let progress = ProgressMap::new();
    let engine = TransferEngine::new(Arc::new(FsSink::new()));
    let supervisor = RetrySupervisor::new(
        engine,
        records.clone(),
        Arc::new(LogNotifier),
        settings.clone(),
        progress.clone(),
    );
    let scheduler = Scheduler::new(
        AdmissionController::new(settings.clone()),
        supervisor,
        records,
        Box::new(SystemProbe),
        settings,
    );

    let total = tasks.len() as u64;
    for task in tasks {
        scheduler
            .submit(task)
            .await
            .context("task refused at submission")?;
    }

    run_with_progress(&scheduler, total, args.quiet).await;

    let failed = scheduler.failed_count();
    if failed > 0 {
        warn!(failed, "some downloads failed terminally");
        db.close().await;
        std::process::exit(1);
    }

    info!(total, "all downloads finished");
    db.close().await;
    Ok(())
}

/// Drives the scheduler to quiescence, showing an indicatif bar unless quiet.
async fn run_with_progress(scheduler: &Scheduler, total: u64, quiet: bool) {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
        {
            bar.set_style(style);
        }
        bar
    };

    let join = scheduler.join();
    tokio::pin!(join);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            () = &mut join => break,
            _ = ticker.tick() => {
                let in_flight = (scheduler.active_count() + scheduler.pending_count()) as u64;
                bar.set_position(total.saturating_sub(in_flight));
                bar.set_message(format!(
                    "{} active, {} pending",
                    scheduler.active_count(),
                    scheduler.pending_count()
                ));
            }
        }
    }

    bar.set_position(total);
    bar.finish_with_message("done");
}

/// Runs the Lofter archive crawl with the CLI's window and tag flags.
async fn resolve_archive(
    args: &Args,
    settings: &SettingsHandle,
    credentials: &CredentialStore,
) -> Result<Vec<ResolvedItem>> {
    use mediafetch_core::resolver::{ArchiveFilter, LofterResolver};

    let session = credentials
        .lofter()
        .context("no valid lofter credentials; set MEDIAFETCH_LOFTER_KEY/VALUE")?;

    let filter = ArchiveFilter {
        start_time: parse_time(args.since.as_deref())?,
        end_time: parse_time(args.until.as_deref())?,
        target_tags: args.tags.clone(),
        save_untagged: args.save_untagged,
    };

    let resolver = LofterResolver::new(settings.clone())?;
    let outcome = resolver.crawl_archive(&args.link, &session, &filter).await;
    if let Some(error) = outcome.error {
        if outcome.items.is_empty() {
            return Err(error.into());
        }
        warn!(error = %error, items = outcome.items.len(), "archive crawl ended early");
    }
    Ok(outcome.items)
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value else { return Ok(None) };
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("not an RFC 3339 time: {value}"))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Builds one task per media URL, numbered per item.
fn build_tasks(
    items: &[ResolvedItem],
    platform: Platform,
    output: &Path,
    credentials: &CredentialStore,
) -> Vec<DownloadTask> {
    let cookies = platform_cookies(platform, credentials);
    let mut tasks = Vec::new();

    for item in items {
        let stem = if item.author.is_empty() {
            item.title.clone()
        } else {
            format!("{}_{}", item.author, item.title)
        };
        let dest = output.join(platform.as_str());

        for (n, url) in item.videos.iter().enumerate() {
            let name = format!("{stem}_{}.{}", n + 1, extension_of(url, MediaKind::Video));
            tasks.push(
                DownloadTask::new(url.clone(), platform, MediaKind::Video, dest.clone(), name)
                    .with_cookies(cookies.clone()),
            );
        }
        for (n, url) in item.photos.iter().enumerate() {
            let name = format!("{stem}_{}.{}", n + 1, extension_of(url, MediaKind::Photo));
            tasks.push(
                DownloadTask::new(url.clone(), platform, MediaKind::Photo, dest.clone(), name)
                    .with_cookies(cookies.clone()),
            );
        }
        for doc in &item.documents {
            let first_page = doc
                .page_urls
                .first()
                .cloned()
                .unwrap_or_else(|| document_placeholder(&doc.name));
            tasks.push(
                DownloadTask::new(
                    first_page,
                    platform,
                    MediaKind::Document,
                    dest.clone(),
                    doc.name.clone(),
                )
                .with_cookies(cookies.clone())
                .with_document_pages(doc.page_urls.clone()),
            );
        }
    }

    tasks
}

// Document sources always carry pages; this keeps the task URL non-empty
// even for a malformed item so the error surfaces at transfer time.
fn document_placeholder(name: &str) -> String {
    format!("about:blank#{name}")
}

fn extension_of(url: &str, kind: MediaKind) -> String {
    let fallback = match kind {
        MediaKind::Video => "mp4",
        MediaKind::Photo => "jpg",
        MediaKind::Document => "pdf",
    };
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()?
                .next_back()?
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_string())
        })
        .filter(|ext| !ext.is_empty() && ext.len() <= 4 && ext.chars().all(char::is_alphanumeric))
        .unwrap_or_else(|| fallback.to_string())
}

fn platform_cookies(platform: Platform, credentials: &CredentialStore) -> Vec<(String, String)> {
    match platform {
        Platform::Twitter => credentials
            .twitter()
            .map(|s| s.cookies())
            .unwrap_or_default(),
        Platform::Lofter => credentials
            .lofter()
            .map(|s| s.cookies())
            .unwrap_or_default(),
        Platform::Pixiv => session_cookie(credentials, platform, "PHPSESSID"),
        Platform::Weibo => session_cookie(credentials, platform, "SUB"),
        Platform::Kuaikan => session_cookie(credentials, platform, "session_id"),
    }
}

fn session_cookie(
    credentials: &CredentialStore,
    platform: Platform,
    name: &str,
) -> Vec<(String, String)> {
    credentials
        .session_id(platform)
        .map(|s| vec![(name.to_string(), s.0)])
        .unwrap_or_default()
}

/// Loads session credentials from `MEDIAFETCH_*` environment variables.
///
/// Acquisition and renewal are external; absent variables simply leave that
/// platform unauthenticated.
fn credentials_from_env() -> CredentialStore {
    let store = CredentialStore::new();

    if let (Ok(csrf), Ok(auth)) = (
        std::env::var("MEDIAFETCH_TWITTER_CSRF"),
        std::env::var("MEDIAFETCH_TWITTER_AUTH_TOKEN"),
    ) {
        let user_id = std::env::var("MEDIAFETCH_TWITTER_USER_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        store.set_twitter(TwitterSession {
            csrf_token: csrf,
            auth_token: auth,
            user_id,
        });
    }

    if let (Ok(key), Ok(value)) = (
        std::env::var("MEDIAFETCH_LOFTER_KEY"),
        std::env::var("MEDIAFETCH_LOFTER_VALUE"),
    ) {
        let expires_at = std::env::var("MEDIAFETCH_LOFTER_EXPIRES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(|| Utc::now() + chrono::Duration::days(1));
        store.set_lofter(LofterSession {
            login_key: key,
            login_value: value,
            expires_at,
        });
    }

    for (platform, var) in [
        (Platform::Pixiv, "MEDIAFETCH_PIXIV_SESSION"),
        (Platform::Weibo, "MEDIAFETCH_WEIBO_SESSION"),
        (Platform::Kuaikan, "MEDIAFETCH_KUAIKAN_SESSION"),
    ] {
        if let Ok(value) = std::env::var(var) {
            store.set_session_id(platform, SessionId(value));
        }
    }

    store
}
