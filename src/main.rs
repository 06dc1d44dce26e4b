use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use farmstay::clock::SystemClock;
use farmstay::config::Config;
use farmstay::engine::BookingEngine;
use farmstay::listing::InMemoryListings;
use farmstay::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    farmstay::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let listings = match &config.listings_file {
        Some(path) => InMemoryListings::from_json_file(path)?,
        None => InMemoryListings::new(),
    };
    let listing_count = listings.len();

    let engine = Arc::new(BookingEngine::new(
        config.journal_path(),
        Arc::new(listings),
        Arc::new(SystemClock),
    )?);

    info!("farmstay booking engine started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  listings: {listing_count}");
    info!("  bookings: {}", engine.booking_count());
    info!("  sweep_interval: {}s", config.sweep_interval.as_secs());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let sweeper = tokio::spawn(reaper::run_sweeper(engine.clone(), config.sweep_interval));
    let compactor = tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received, stopping background tasks");
    sweeper.abort();
    compactor.abort();

    // Leave a compact journal behind so the next start replays quickly.
    match tokio::time::timeout(Duration::from_secs(10), engine.compact_journal()).await {
        Ok(Ok(())) => info!("final journal compaction done"),
        Ok(Err(e)) => tracing::warn!("final compaction failed: {e}"),
        Err(_) => tracing::warn!("final compaction timed out"),
    }

    info!("farmstay stopped");
    Ok(())
}
