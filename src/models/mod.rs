pub mod draft;
pub mod workout;

pub use draft::{DraftExercise, DraftSet, LocalDraft, DRAFT_TTL_HOURS};
pub use workout::{SetUpdate, WorkoutExercise, WorkoutSession, WorkoutSet, WorkoutStatus};
