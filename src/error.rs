use thiserror::Error;

/// Errors surfaced by the session engine. Storage and backend failures keep
/// their underlying cause attached; the caller decides how to present them.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No workout session has been opened yet.
    #[error("no workout session is loaded")]
    NoSession,

    /// A mutation targeted a set id that is not part of the loaded session.
    /// Nothing was changed and nothing was sent to the backend.
    #[error("set {0} not found in the active session")]
    SetNotFound(String),

    /// Reading or writing the local draft store failed.
    #[error("draft storage failed: {0}")]
    Storage(#[source] anyhow::Error),

    /// A backend request on the caller's critical path failed.
    #[error("backend request failed: {0}")]
    Backend(#[source] anyhow::Error),

    /// The final "mark completed" call failed. The local draft is left in
    /// place so the whole finalize flow can be retried.
    #[error("completing workout {workout_id} failed: {source}")]
    Finalize {
        workout_id: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
