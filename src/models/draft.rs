use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::workout::WorkoutSession;

/// Drafts older than this are assumed orphaned and are discarded on load.
pub const DRAFT_TTL_HOURS: i64 = 24;

/// Client-local durable snapshot of the mutable fields of an in-progress
/// workout. Overwritten wholesale on every edit, read once at session open
/// to reconcile with the server snapshot, deleted after a successful
/// finalize. The server never sees this record directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalDraft {
    pub workout_id: String,
    pub last_updated: DateTime<Utc>,
    pub exercises: Vec<DraftExercise>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftExercise {
    pub exercise_id: String,
    pub sets: Vec<DraftSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftSet {
    pub set_id: String,
    pub actual_reps: Option<u32>,
    pub actual_weight: Option<f64>,
    pub completed: bool,
    pub note: Option<String>,
}

impl LocalDraft {
    /// Snapshot every mutable field of every set in the session.
    pub fn from_session(session: &WorkoutSession, now: DateTime<Utc>) -> Self {
        let exercises = session
            .exercises
            .iter()
            .map(|exercise| DraftExercise {
                exercise_id: exercise.exercise_id.clone(),
                sets: exercise
                    .sets
                    .iter()
                    .map(|set| DraftSet {
                        set_id: set.id.clone(),
                        actual_reps: set.actual_reps,
                        actual_weight: set.actual_weight,
                        completed: set.completed,
                        note: set.note.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            workout_id: session.id.clone(),
            last_updated: now,
            exercises,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > Duration::hours(DRAFT_TTL_HOURS)
    }

    pub fn matches(&self, workout_id: &str) -> bool {
        self.workout_id == workout_id
    }

    pub fn all_sets(&self) -> impl Iterator<Item = &DraftSet> {
        self.exercises.iter().flat_map(|exercise| exercise.sets.iter())
    }

    /// Lookup table by set id, used by the reconciler.
    pub fn set_index(&self) -> HashMap<&str, &DraftSet> {
        self.all_sets()
            .map(|set| (set.set_id.as_str(), set))
            .collect()
    }
}
