//! Queue watch bot binary.
//! Loads configuration, restores state, then runs the scheduler until the process is stopped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use queue_watch_bot::{
    api::{self, StatusHandle},
    clock::SystemClock,
    commands::spawn_command_listener,
    config::BotConfig,
    feed::{FeedFetcher, HttpFeed},
    metrics::Metrics,
    notify::{discord::DiscordClient, ChatPlatform},
    persist::{CursorFile, HistoryFile},
    scheduler::Scheduler,
    throttle::Throttle,
};

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("queue_watch_bot=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = BotConfig::load().context("loading configuration")?;
    tracing::info!(
        server = %cfg.server_name,
        guild = %cfg.guild_id,
        channel = %cfg.output_channel_id,
        token_len = cfg.discord_token.expose().len(),
        "configuration loaded"
    );

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let status = StatusHandle::default();
    if let Some(addr) = &cfg.status_addr {
        let router = api::router(status.clone(), metrics.as_ref());
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding status server on {addr}"))?;
        tracing::info!(%addr, "status server listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "status server stopped");
            }
        });
    }

    let chat: Arc<dyn ChatPlatform> = Arc::new(
        DiscordClient::new(cfg.discord_token.expose().to_string())
            .with_timeout(cfg.chat_timeout_secs)
            .with_retries(cfg.chat_max_retries),
    );
    let fetcher = FeedFetcher::hydrate(
        Box::new(HttpFeed::new(cfg.api_url.clone()).with_timeout(cfg.feed_timeout_secs)),
        HistoryFile::new(&cfg.history_path),
    )
    .await;
    let throttle = Throttle::hydrate(cfg.notify_policy(), CursorFile::new(&cfg.cursor_path)).await;

    let (tx, rx) = mpsc::channel(16);
    let _listener = spawn_command_listener(
        chat.clone(),
        cfg.output_channel_id.clone(),
        Duration::from_secs(cfg.command_poll_secs),
        tx,
    );

    let scheduler = Scheduler::new(
        cfg.scheduler_settings(),
        chat,
        fetcher,
        throttle,
        Arc::new(SystemClock),
        status,
    );
    scheduler.run(rx).await.context("scheduler stopped")?;
    Ok(())
}
