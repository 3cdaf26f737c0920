use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};

use liftlog::{HttpBackend, SessionController, SettingsStore, SqliteDraftStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("liftlog starting up...");

    let data_dir = std::env::var("LIFTLOG_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let backend_settings = settings.backend();

    let store = SqliteDraftStore::new(data_dir.join("liftlog.sqlite3"))?;

    // Drop drafts left behind by sessions that never finalized.
    {
        use liftlog::DraftStore;
        let pruned = store.prune_stale(Utc::now()).await?;
        if pruned > 0 {
            warn!("Discarded {pruned} stale workout draft(s)");
        }
    }

    let backend = HttpBackend::new(backend_settings.base_url, backend_settings.api_token)?;
    let (controller, mut events) = SessionController::new(Arc::new(backend), Arc::new(store));

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("session event: {event:?}");
        }
    });

    match controller.open_active().await? {
        Some(session) => info!(
            "Resumed active workout {} ({} exercises, {} sets)",
            session.id,
            session.exercises.len(),
            session.set_count()
        ),
        None => info!("No active workout session"),
    }

    Ok(())
}
