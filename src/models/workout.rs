use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkoutStatus {
    Active,
    Completed,
    Cancelled,
}

impl WorkoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutStatus::Active => "Active",
            WorkoutStatus::Completed => "Completed",
            WorkoutStatus::Cancelled => "Cancelled",
        }
    }
}

/// Server-authoritative snapshot of one workout being performed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    pub id: String,
    pub plan_id: String,
    pub status: WorkoutStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exercises: Vec<WorkoutExercise>,
}

impl WorkoutSession {
    pub fn find_set(&self, set_id: &str) -> Option<&WorkoutSet> {
        self.exercises
            .iter()
            .flat_map(|exercise| exercise.sets.iter())
            .find(|set| set.id == set_id)
    }

    pub fn find_set_mut(&mut self, set_id: &str) -> Option<&mut WorkoutSet> {
        self.exercises
            .iter_mut()
            .flat_map(|exercise| exercise.sets.iter_mut())
            .find(|set| set.id == set_id)
    }

    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|exercise| exercise.sets.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    pub id: String,
    /// Catalog exercise this entry was created from.
    pub exercise_id: String,
    pub sets: Vec<WorkoutSet>,
}

/// One logged set. `planned_*` are frozen once the session starts; only the
/// `actual_*`, `completed` and `note` fields are ever mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSet {
    pub id: String,
    pub planned_reps: u32,
    pub planned_weight: Option<f64>,
    pub actual_reps: Option<u32>,
    pub actual_weight: Option<f64>,
    pub completed: bool,
    pub note: Option<String>,
    pub order_index: u32,
}

/// Partial update to one set, mirroring the backend's PATCH body. Absent
/// fields are left untouched and are omitted from the serialized request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_reps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SetUpdate {
    pub fn is_empty(&self) -> bool {
        self.actual_reps.is_none()
            && self.actual_weight.is_none()
            && self.completed.is_none()
            && self.note.is_none()
    }
}
