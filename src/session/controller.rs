use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::{
    backend::WorkoutBackend,
    error::{Result, SessionError},
    models::{LocalDraft, SetUpdate, WorkoutSession, WorkoutSet, WorkoutStatus},
    store::DraftStore,
};

use super::{events::SessionEvent, reconcile::reconcile};

/// Owns the in-memory active workout session and drives the sync protocol:
/// optimistic per-set edits persisted to the draft store before they are
/// forwarded to the backend, and a full draft flush before a session is
/// marked complete.
///
/// Cheap to clone; clones share the same state, store and backend.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<Option<WorkoutSession>>>,
    store: Arc<dyn DraftStore>,
    backend: Arc<dyn WorkoutBackend>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn WorkoutBackend>,
        store: Arc<dyn DraftStore>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            state: Arc::new(Mutex::new(None)),
            store,
            backend,
            events,
        };
        (controller, receiver)
    }

    /// Snapshot of the currently loaded session, if any.
    pub async fn session(&self) -> Option<WorkoutSession> {
        self.state.lock().await.clone()
    }

    /// Fetch the active workout from the backend and load it, reconciled
    /// against any fresh local draft. `None` when no workout is active.
    pub async fn open_active(&self) -> Result<Option<WorkoutSession>> {
        match self
            .backend
            .fetch_active()
            .await
            .map_err(SessionError::Backend)?
        {
            Some(fetched) => Ok(Some(self.adopt(fetched).await?)),
            None => Ok(None),
        }
    }

    /// Fetch one workout by id and load it, reconciled against any fresh
    /// local draft.
    pub async fn open(&self, workout_id: &str) -> Result<WorkoutSession> {
        let fetched = self
            .backend
            .fetch_workout(workout_id)
            .await
            .map_err(SessionError::Backend)?;
        self.adopt(fetched).await
    }

    /// Apply a partial update to one set.
    ///
    /// The in-memory session is mutated and the full draft is persisted
    /// before this returns, so a crash immediately afterwards cannot lose
    /// the edit. The backend PATCH runs as a detached task; its failure
    /// does not roll the edit back but is reported on the event channel
    /// and followed by a refresh-from-server.
    pub async fn apply_update(&self, set_id: &str, update: SetUpdate) -> Result<()> {
        let (workout_id, payload, draft) = {
            let mut guard = self.state.lock().await;
            let session = guard.as_mut().ok_or(SessionError::NoSession)?;
            let set = session
                .find_set_mut(set_id)
                .ok_or_else(|| SessionError::SetNotFound(set_id.to_string()))?;

            if let Some(reps) = update.actual_reps {
                set.actual_reps = Some(reps);
            }
            if let Some(weight) = update.actual_weight {
                set.actual_weight = Some(weight);
            }
            if let Some(note) = &update.note {
                set.note = Some(note.clone());
            }
            if let Some(done) = update.completed {
                set.completed = done;
            }

            // A set marked completed always ships its recorded reps and
            // weight, even when the caller only sent the flag.
            let mut payload = update;
            if payload.completed == Some(true) {
                payload.actual_reps = set.actual_reps;
                payload.actual_weight = set.actual_weight;
            }

            let draft = LocalDraft::from_session(session, Utc::now());
            (session.id.clone(), payload, draft)
        };

        self.store
            .save(&draft)
            .await
            .map_err(SessionError::Storage)?;

        self.spawn_set_update(workout_id, set_id.to_string(), payload);
        Ok(())
    }

    /// Create a new set on the backend and mirror it into the loaded
    /// session and draft. Awaited, not optimistic.
    pub async fn add_set(&self, workout_exercise_id: &str) -> Result<WorkoutSet> {
        let created = self
            .backend
            .add_set(workout_exercise_id)
            .await
            .map_err(SessionError::Backend)?;

        let draft = {
            let mut guard = self.state.lock().await;
            let session = guard.as_mut().ok_or(SessionError::NoSession)?;
            match session
                .exercises
                .iter_mut()
                .find(|exercise| exercise.id == workout_exercise_id)
            {
                Some(exercise) => exercise.sets.push(created.clone()),
                None => warn!(
                    "backend created set {} for exercise {workout_exercise_id} not present locally",
                    created.id
                ),
            }
            LocalDraft::from_session(session, Utc::now())
        };

        self.store
            .save(&draft)
            .await
            .map_err(SessionError::Storage)?;
        Ok(created)
    }

    /// Delete a set on the backend and drop it from the loaded session and
    /// draft. Awaited, not optimistic.
    pub async fn remove_set(&self, set_id: &str) -> Result<()> {
        self.backend
            .delete_set(set_id)
            .await
            .map_err(SessionError::Backend)?;

        let draft = {
            let mut guard = self.state.lock().await;
            let session = guard.as_mut().ok_or(SessionError::NoSession)?;
            for exercise in &mut session.exercises {
                exercise.sets.retain(|set| set.id != set_id);
            }
            LocalDraft::from_session(session, Utc::now())
        };

        self.store
            .save(&draft)
            .await
            .map_err(SessionError::Storage)?;
        Ok(())
    }

    /// Flush the persisted draft to the backend, then seal the session.
    ///
    /// The draft is read back from storage rather than from memory so the
    /// most recently persisted values win even if the two diverged. Every
    /// per-set flush is allowed to settle before the completion call is
    /// issued; individual flush failures are reported but do not abort the
    /// batch. The draft is only discarded once the completion call
    /// succeeds, so a failed finalize can be retried wholesale.
    pub async fn finalize(&self, workout_id: &str) -> Result<()> {
        let draft = self
            .store
            .load(workout_id)
            .await
            .map_err(SessionError::Storage)?;

        if let Some(draft) = &draft {
            let flushes: Vec<_> = draft
                .all_sets()
                .map(|set| {
                    let backend = Arc::clone(&self.backend);
                    let set_id = set.set_id.clone();
                    let payload = SetUpdate {
                        actual_reps: set.actual_reps,
                        actual_weight: set.actual_weight,
                        completed: Some(set.completed),
                        note: set.note.clone(),
                    };
                    async move {
                        let result = backend.update_set(&set_id, &payload).await;
                        (set_id, result)
                    }
                })
                .collect();

            for (set_id, result) in join_all(flushes).await {
                if let Err(err) = result {
                    warn!("flush of set {set_id} failed: {err:#}");
                    self.emit(SessionEvent::FlushItemFailed {
                        set_id,
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        self.backend
            .complete_workout(workout_id)
            .await
            .map_err(|err| SessionError::Finalize {
                workout_id: workout_id.to_string(),
                source: err,
            })?;

        // The session is sealed; a leftover draft would only go stale, so
        // a failed delete is logged rather than returned.
        if let Err(err) = self.store.clear(workout_id).await {
            error!("failed to discard draft for {workout_id}: {err:#}");
        }

        {
            let mut guard = self.state.lock().await;
            if let Some(session) = guard.as_mut() {
                if session.id == workout_id {
                    session.status = WorkoutStatus::Completed;
                    session.completed_at = Some(Utc::now());
                }
            }
        }

        info!("workout {workout_id} completed");
        self.emit(SessionEvent::SessionCompleted {
            workout_id: workout_id.to_string(),
        });
        Ok(())
    }

    /// Install a fetched snapshot as the loaded session, merged with any
    /// fresh draft. Stale or mismatched drafts are discarded, not merged.
    async fn adopt(&self, fetched: WorkoutSession) -> Result<WorkoutSession> {
        let workout_id = fetched.id.clone();
        let draft = match self
            .store
            .load(&workout_id)
            .await
            .map_err(SessionError::Storage)?
        {
            Some(draft) if draft.is_stale(Utc::now()) || !draft.matches(&workout_id) => {
                warn!("discarding stale draft for workout {workout_id}");
                if let Err(err) = self.store.clear(&draft.workout_id).await {
                    error!("failed to discard stale draft: {err:#}");
                }
                None
            }
            other => other,
        };

        let merged = reconcile(fetched, draft.as_ref());

        let mut guard = self.state.lock().await;
        *guard = Some(merged.clone());
        Ok(merged)
    }

    fn spawn_set_update(&self, workout_id: String, set_id: String, payload: SetUpdate) {
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(err) = controller.backend.update_set(&set_id, &payload).await {
                warn!("set update for {set_id} failed: {err:#}");
                controller.emit(SessionEvent::SetUpdateFailed {
                    set_id,
                    message: format!("{err:#}"),
                });
                controller.refresh(&workout_id).await;
            }
        });
    }

    /// Re-fetch the session and reconcile it against the current draft.
    /// Used to resolve divergence after a failed optimistic update; does
    /// not cancel other in-flight updates.
    async fn refresh(&self, workout_id: &str) {
        match self.backend.fetch_workout(workout_id).await {
            Ok(fetched) => match self.adopt(fetched).await {
                Ok(_) => self.emit(SessionEvent::SessionRefreshed {
                    workout_id: workout_id.to_string(),
                }),
                Err(err) => error!("failed to reload workout {workout_id}: {err}"),
            },
            Err(err) => error!("refresh of workout {workout_id} failed: {err:#}"),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            warn!("session event receiver dropped");
        }
    }
}
