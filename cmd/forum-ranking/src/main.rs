//! # forum-ranking
//!
//! Hosts the periodic batch rescore. Vote application is a library call made
//! by the API layer; this process only owns the timer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use configs::{LogSettings, Settings};
use domains::{CollectionKind, DocumentRepo, SystemClock};
use services::{
    run_rescore_loop, RescoreConfig, RescoreService, RetryPolicy, ScoreModel, ScoreParams,
};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings.log);

    let model = ScoreModel::new(ScoreParams {
        time_decay_factor: settings.scoring.time_decay_factor,
        bias_hours: settings.scoring.bias_hours,
        frontpage_bonus: settings.scoring.frontpage_bonus,
        curated_bonus: settings.scoring.curated_bonus,
    })
    .context("invalid scoring settings")?;

    let collections = settings
        .rescore
        .collections
        .iter()
        .map(|c| c.parse::<CollectionKind>())
        .collect::<Result<Vec<_>, _>>()?;

    let documents = document_store(&settings).await?;
    let rescorer = Arc::new(RescoreService::new(
        documents,
        Arc::new(SystemClock),
        model,
        rescore_config(&settings),
    ));

    if settings.rescore.run_once {
        for collection in collections {
            let report = rescorer.batch_update_score(collection).await?;
            info!(?report, "single rescore pass complete");
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_rescore_loop(
        rescorer,
        collections,
        Duration::from_secs(settings.rescore.interval_secs),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    // The loop also stops if every receiver is gone, so a send error is harmless
    let _ = shutdown_tx.send(true);

    let ticks = scheduler.await.context("rescore scheduler panicked")?;
    info!(ticks, "forum-ranking stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));

    if log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn rescore_config(settings: &Settings) -> RescoreConfig {
    RescoreConfig {
        inactivity_threshold: TimeDelta::days(settings.rescore.inactivity_days),
        max_documents: settings.rescore.max_documents,
        time_budget: Duration::from_millis(settings.rescore.time_budget_ms),
        force_update: settings.rescore.force_update,
        retry: RetryPolicy {
            max_attempts: settings.voting.max_attempts,
            initial_backoff: Duration::from_millis(settings.voting.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.voting.max_backoff_ms),
            backoff_multiplier: 2.0,
        },
    }
}

#[cfg(feature = "db-postgres")]
async fn document_store(settings: &Settings) -> anyhow::Result<Arc<dyn DocumentRepo>> {
    use secrecy::ExposeSecret;
    use storage_adapters::PgStore;

    let db = settings
        .database
        .as_ref()
        .context("the db-postgres build needs a [database] section")?;
    let store = PgStore::connect(db.url.expose_secret(), db.max_connections).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "db-postgres"))]
async fn document_store(_settings: &Settings) -> anyhow::Result<Arc<dyn DocumentRepo>> {
    use storage_adapters::MemoryStore;

    tracing::warn!("built without db-postgres: rescoring an empty in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}
