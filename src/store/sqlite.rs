use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

use crate::models::{DraftExercise, LocalDraft, DRAFT_TTL_HOURS};

use super::DraftStore;

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS drafts (
    workout_id   TEXT PRIMARY KEY,
    payload      TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
";

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to draft store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join draft store thread: {join_err:?}");
            }
        }
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        anyhow::bail!(
            "draft store version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    tx.execute_batch(SCHEMA_V1)
        .context("failed to create drafts table")?;
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

/// SQLite-backed [`DraftStore`]. All access happens on a dedicated worker
/// thread owning the connection; callers submit closures over a channel and
/// await the reply. Writes have hit disk by the time a call returns.
#[derive(Clone)]
pub struct SqliteDraftStore {
    inner: Arc<StoreInner>,
    db_path: Arc<PathBuf>,
}

impl SqliteDraftStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create draft store directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("liftlog-drafts".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open draft store database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run draft store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Draft store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Draft store thread shutting down");
            })
            .with_context(|| "failed to spawn draft store worker thread")?;

        ready_rx
            .recv()
            .context("draft store worker exited before signaling readiness")??;

        info!("Draft store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Draft store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to draft store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("draft store thread terminated unexpectedly"))?
    }
}

#[async_trait]
impl DraftStore for SqliteDraftStore {
    async fn load(&self, workout_id: &str) -> Result<Option<LocalDraft>> {
        let workout_id = workout_id.to_string();
        self.execute(move |conn| {
            let row = conn
                .query_row(
                    "SELECT payload, last_updated FROM drafts WHERE workout_id = ?1",
                    params![workout_id],
                    |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    },
                )
                .optional()
                .with_context(|| "failed to load draft")?;

            match row {
                Some((payload, last_updated)) => {
                    let exercises: Vec<DraftExercise> = serde_json::from_str(&payload)
                        .with_context(|| "failed to decode draft payload")?;
                    Ok(Some(LocalDraft {
                        workout_id,
                        last_updated: parse_datetime(&last_updated)?,
                        exercises,
                    }))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(&self, draft: &LocalDraft) -> Result<()> {
        let record = draft.clone();
        self.execute(move |conn| {
            let payload = serde_json::to_string(&record.exercises)
                .with_context(|| "failed to encode draft payload")?;
            conn.execute(
                "INSERT INTO drafts (workout_id, payload, last_updated)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(workout_id) DO UPDATE SET
                     payload = excluded.payload,
                     last_updated = excluded.last_updated",
                params![record.workout_id, payload, record.last_updated.to_rfc3339()],
            )
            .with_context(|| "failed to save draft")?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, workout_id: &str) -> Result<()> {
        let workout_id = workout_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM drafts WHERE workout_id = ?1",
                params![workout_id],
            )
            .with_context(|| "failed to delete draft")?;
            Ok(())
        })
        .await
    }

    async fn prune_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - Duration::hours(DRAFT_TTL_HOURS)).to_rfc3339();
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM drafts WHERE last_updated < ?1",
                    params![cutoff],
                )
                .with_context(|| "failed to prune stale drafts")?;
            Ok(removed)
        })
        .await
    }
}
