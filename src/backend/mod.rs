use anyhow::Result;
use async_trait::async_trait;

use crate::models::{SetUpdate, WorkoutSession, WorkoutSet};

mod http;

pub use http::HttpBackend;

/// The REST contract the session engine consumes. The production
/// implementation is [`HttpBackend`]; tests inject fakes to control
/// failures and timing.
#[async_trait]
pub trait WorkoutBackend: Send + Sync {
    /// GET /workouts/active. `None` when the server reports no content.
    async fn fetch_active(&self) -> Result<Option<WorkoutSession>>;

    /// GET /workouts/{id}.
    async fn fetch_workout(&self, workout_id: &str) -> Result<WorkoutSession>;

    /// PATCH /workout-sets/{id}. Carries only the fields present in
    /// `update`; used both for optimistic edits and the finalize flush.
    async fn update_set(&self, set_id: &str, update: &SetUpdate) -> Result<()>;

    /// POST /workout-exercises/{id}/sets. Returns the created set.
    async fn add_set(&self, workout_exercise_id: &str) -> Result<WorkoutSet>;

    /// DELETE /workout-sets/{id}.
    async fn delete_set(&self, set_id: &str) -> Result<()>;

    /// POST /workouts/{id}/complete.
    async fn complete_workout(&self, workout_id: &str) -> Result<()>;
}
