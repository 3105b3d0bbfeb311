//! Fetch the feed once and print what the bot would post. Touches neither Discord nor the cursor file.

use anyhow::bail;
use chrono::Utc;
use queue_watch_bot::{
    config::BotConfig,
    feed::{FeedFetcher, HttpFeed},
    freshness::classify,
    notify::{render_status, room_label},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = BotConfig::load_unvalidated()?;
    if cfg.api_url.trim().is_empty() {
        bail!("API_URL is not set");
    }

    let mut fetcher = FeedFetcher::in_memory(Box::new(
        HttpFeed::new(cfg.api_url.clone()).with_timeout(cfg.feed_timeout_secs),
    ));
    let now = Utc::now();
    let batch = match fetcher.fetch().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "fetch failed");
            Vec::new()
        }
    };
    let latest = batch.last();
    let c = classify(latest, now, cfg.stale_after());
    let msg = render_status(c, latest, now, &cfg.render_context());

    println!("samples:        {}", batch.len());
    println!("classification: {c}");
    println!("label:          {}", room_label(c, latest));
    println!("title:          {}", msg.title);
    println!("description:    {}", msg.description);
    println!("color:          #{:06X}", msg.color);
    if let Some(footer) = &msg.footer {
        println!("footer:         {footer}");
    }
    Ok(())
}
