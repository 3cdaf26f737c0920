pub mod backend;
pub mod error;
pub mod models;
pub mod session;
pub mod settings;
pub mod store;

pub use backend::{HttpBackend, WorkoutBackend};
pub use error::SessionError;
pub use models::{
    DraftExercise, DraftSet, LocalDraft, SetUpdate, WorkoutExercise, WorkoutSession, WorkoutSet,
    WorkoutStatus,
};
pub use session::{reconcile, SessionController, SessionEvent};
pub use settings::{BackendSettings, SettingsStore};
pub use store::{DraftStore, MemoryDraftStore, SqliteDraftStore};
