use serde::Serialize;

/// Notifications the engine pushes to its embedding layer over the event
/// channel. These are the engine's only way to report failures of detached
/// work; the embedding layer renders them as user-facing messages.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    /// A fire-and-forget set update did not reach the backend. The
    /// optimistic in-memory value was kept; a refresh follows.
    SetUpdateFailed { set_id: String, message: String },

    /// The in-memory session was replaced by a fresh server snapshot
    /// reconciled against the local draft.
    SessionRefreshed { workout_id: String },

    /// One per-set flush during finalize failed. The batch continued.
    FlushItemFailed { set_id: String, message: String },

    /// The session was sealed on the backend and the draft discarded.
    SessionCompleted { workout_id: String },
}
