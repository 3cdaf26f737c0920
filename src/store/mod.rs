use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::LocalDraft;

mod memory;
mod sqlite;

pub use memory::MemoryDraftStore;
pub use sqlite::SqliteDraftStore;

/// Durable storage for workout drafts, keyed by workout id. Injected into
/// the session controller so tests can substitute an in-memory fake.
///
/// `save` overwrites the whole draft; there are no partial writes.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, workout_id: &str) -> Result<Option<LocalDraft>>;

    async fn save(&self, draft: &LocalDraft) -> Result<()>;

    async fn clear(&self, workout_id: &str) -> Result<()>;

    /// Delete every draft whose `last_updated` is past the staleness
    /// horizon. Returns the number of drafts removed.
    async fn prune_stale(&self, now: DateTime<Utc>) -> Result<usize>;
}
