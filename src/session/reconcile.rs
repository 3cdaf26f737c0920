use crate::models::{LocalDraft, WorkoutSession};

/// Merge a server-fetched session snapshot with a local draft for the same
/// workout.
///
/// The draft exists only to survive a refresh or navigation mid-edit, so a
/// null draft field means "untouched since the last server sync" and the
/// server value wins. `completed` defaults deterministically and is taken
/// from the draft unconditionally. Identity, ordering and the `planned_*`
/// fields always come from the server snapshot; draft entries for set ids
/// the server no longer knows are ignored.
pub fn reconcile(mut server: WorkoutSession, draft: Option<&LocalDraft>) -> WorkoutSession {
    let Some(draft) = draft else {
        return server;
    };

    let index = draft.set_index();
    for exercise in &mut server.exercises {
        for set in &mut exercise.sets {
            let Some(entry) = index.get(set.id.as_str()) else {
                continue;
            };

            if entry.actual_reps.is_some() {
                set.actual_reps = entry.actual_reps;
            }
            if entry.actual_weight.is_some() {
                set.actual_weight = entry.actual_weight;
            }
            if entry.note.is_some() {
                set.note = entry.note.clone();
            }
            set.completed = entry.completed;
        }
    }

    server
}
