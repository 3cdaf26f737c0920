use std::{collections::HashMap, sync::RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{LocalDraft, DRAFT_TTL_HOURS};

use super::DraftStore;

/// In-memory [`DraftStore`] for tests and short-lived embeddings. Same
/// overwrite-wholesale semantics as the SQLite store, no durability.
#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: RwLock<HashMap<String, LocalDraft>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn load(&self, workout_id: &str) -> Result<Option<LocalDraft>> {
        Ok(self.drafts.read().unwrap().get(workout_id).cloned())
    }

    async fn save(&self, draft: &LocalDraft) -> Result<()> {
        self.drafts
            .write()
            .unwrap()
            .insert(draft.workout_id.clone(), draft.clone());
        Ok(())
    }

    async fn clear(&self, workout_id: &str) -> Result<()> {
        self.drafts.write().unwrap().remove(workout_id);
        Ok(())
    }

    async fn prune_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::hours(DRAFT_TTL_HOURS);
        let mut guard = self.drafts.write().unwrap();
        let before = guard.len();
        guard.retain(|_, draft| draft.last_updated >= cutoff);
        Ok(before - guard.len())
    }
}
