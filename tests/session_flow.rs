use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use liftlog::{
    DraftStore, LocalDraft, MemoryDraftStore, SessionController, SessionError, SessionEvent,
    SetUpdate, WorkoutBackend, WorkoutExercise, WorkoutSession, WorkoutSet, WorkoutStatus,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Fetch(String),
    UpdateSet { set_id: String, payload: SetUpdate },
    DeleteSet(String),
    Complete(String),
}

/// Scriptable backend: serves a fixed server snapshot, records every call
/// in settle order, and can fail or delay individual requests.
#[derive(Default)]
struct MockBackend {
    server_session: Mutex<Option<WorkoutSession>>,
    calls: Mutex<Vec<Call>>,
    failing_sets: Mutex<HashSet<String>>,
    delayed_sets_ms: Mutex<HashMap<String, u64>>,
    fail_complete: Mutex<bool>,
}

impl MockBackend {
    fn with_session(session: WorkoutSession) -> Arc<Self> {
        let backend = Self::default();
        *backend.server_session.lock().unwrap() = Some(session);
        Arc::new(backend)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_set(&self, set_id: &str) {
        self.failing_sets.lock().unwrap().insert(set_id.to_string());
    }

    fn delay_set(&self, set_id: &str, ms: u64) {
        self.delayed_sets_ms
            .lock()
            .unwrap()
            .insert(set_id.to_string(), ms);
    }

    fn set_fail_complete(&self, fail: bool) {
        *self.fail_complete.lock().unwrap() = fail;
    }

    fn update_payloads_for(&self, set_id: &str) -> Vec<SetUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UpdateSet { set_id: id, payload } if id == set_id => Some(payload),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl WorkoutBackend for MockBackend {
    async fn fetch_active(&self) -> Result<Option<WorkoutSession>> {
        Ok(self.server_session.lock().unwrap().clone())
    }

    async fn fetch_workout(&self, workout_id: &str) -> Result<WorkoutSession> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Fetch(workout_id.to_string()));
        match self.server_session.lock().unwrap().clone() {
            Some(session) => Ok(session),
            None => bail!("no session on server"),
        }
    }

    async fn update_set(&self, set_id: &str, update: &SetUpdate) -> Result<()> {
        let delay = self
            .delayed_sets_ms
            .lock()
            .unwrap()
            .get(set_id)
            .copied();
        if let Some(ms) = delay {
            sleep(Duration::from_millis(ms)).await;
        }

        let fails = self.failing_sets.lock().unwrap().contains(set_id);
        self.calls.lock().unwrap().push(Call::UpdateSet {
            set_id: set_id.to_string(),
            payload: update.clone(),
        });
        if fails {
            bail!("simulated update failure for {set_id}");
        }
        Ok(())
    }

    async fn add_set(&self, _workout_exercise_id: &str) -> Result<WorkoutSet> {
        Ok(WorkoutSet {
            id: Uuid::new_v4().to_string(),
            planned_reps: 10,
            planned_weight: None,
            actual_reps: None,
            actual_weight: None,
            completed: false,
            note: None,
            order_index: 99,
        })
    }

    async fn delete_set(&self, set_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::DeleteSet(set_id.to_string()));
        Ok(())
    }

    async fn complete_workout(&self, workout_id: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Complete(workout_id.to_string()));
        if *self.fail_complete.lock().unwrap() {
            bail!("simulated completion failure");
        }
        Ok(())
    }
}

fn set(id: &str, order_index: u32) -> WorkoutSet {
    WorkoutSet {
        id: id.into(),
        planned_reps: 8,
        planned_weight: Some(60.0),
        actual_reps: None,
        actual_weight: None,
        completed: false,
        note: None,
        order_index,
    }
}

fn session(workout_id: &str, sets: Vec<WorkoutSet>) -> WorkoutSession {
    WorkoutSession {
        id: workout_id.into(),
        plan_id: "plan-1".into(),
        status: WorkoutStatus::Active,
        started_at: Utc::now(),
        completed_at: None,
        exercises: vec![WorkoutExercise {
            id: "we1".into(),
            exercise_id: "bench-press".into(),
            sets,
        }],
    }
}

async fn recv_event(
    receiver: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> SessionEvent {
    timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

#[tokio::test]
async fn draft_is_persisted_before_the_network_settles() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    backend.delay_set("s1", 200);
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, _events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    controller
        .apply_update(
            "s1",
            SetUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The PATCH is still in flight, but the draft already has the edit.
    let draft = store.load("w1").await.unwrap().expect("draft missing");
    let index = draft.set_index();
    assert!(index["s1"].completed);
    assert!(backend.update_payloads_for("s1").is_empty());
}

#[tokio::test]
async fn unknown_set_is_rejected_without_side_effects() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, _events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    let before = controller.session().await.unwrap();

    let err = controller
        .apply_update(
            "nope",
            SetUpdate {
                actual_reps: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SetNotFound(id) if id == "nope"));

    assert_eq!(controller.session().await.unwrap(), before);
    assert!(store.load("w1").await.unwrap().is_none());
    assert!(backend.update_payloads_for("nope").is_empty());
}

#[tokio::test]
async fn completing_a_set_ships_its_recorded_reps_and_weight() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, _events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    controller
        .apply_update(
            "s1",
            SetUpdate {
                actual_reps: Some(7),
                actual_weight: Some(57.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    controller
        .apply_update(
            "s1",
            SetUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let payloads = loop {
        let payloads = backend.update_payloads_for("s1");
        if payloads.len() == 2 {
            break payloads;
        }
        sleep(Duration::from_millis(10)).await;
    };

    let completion = payloads
        .iter()
        .find(|payload| payload.completed == Some(true))
        .expect("completion payload missing");
    assert_eq!(completion.actual_reps, Some(7));
    assert_eq!(completion.actual_weight, Some(57.5));
}

#[tokio::test]
async fn failed_update_keeps_the_edit_and_triggers_a_refresh() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    backend.fail_set("s1");
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, mut events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    controller
        .apply_update(
            "s1",
            SetUpdate {
                actual_reps: Some(11),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    match recv_event(&mut events).await {
        SessionEvent::SetUpdateFailed { set_id, .. } => assert_eq!(set_id, "s1"),
        other => panic!("expected SetUpdateFailed, got {other:?}"),
    }
    match recv_event(&mut events).await {
        SessionEvent::SessionRefreshed { workout_id } => assert_eq!(workout_id, "w1"),
        other => panic!("expected SessionRefreshed, got {other:?}"),
    }

    // No rollback: the refreshed session reconciles the server snapshot
    // against the draft, so the optimistic value survives.
    let current = controller.session().await.unwrap();
    assert_eq!(current.find_set("s1").unwrap().actual_reps, Some(11));
    assert!(backend
        .calls()
        .contains(&Call::Fetch("w1".to_string())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn finalize_waits_for_every_flush_to_settle() {
    let backend = MockBackend::with_session(session(
        "w1",
        vec![set("s1", 0), set("s2", 1), set("s3", 2)],
    ));
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, mut events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    for set_id in ["s1", "s2", "s3"] {
        controller
            .apply_update(
                set_id,
                SetUpdate {
                    actual_reps: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    // Let the optimistic updates drain so the flush calls are unambiguous.
    loop {
        let updates = backend
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::UpdateSet { .. }))
            .count();
        if updates == 3 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let baseline = backend.calls().len();

    // One slow, failing flush must not let the completion call jump ahead.
    backend.delay_set("s2", 150);
    backend.fail_set("s2");

    controller.finalize("w1").await.unwrap();

    let calls = backend.calls()[baseline..].to_vec();
    let complete_pos = calls
        .iter()
        .position(|call| matches!(call, Call::Complete(_)))
        .expect("completion call missing");
    let update_positions: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, Call::UpdateSet { .. }))
        .map(|(pos, _)| pos)
        .collect();
    assert_eq!(update_positions.len(), 3, "full draft must be flushed");
    assert!(
        update_positions.iter().all(|pos| *pos < complete_pos),
        "completion must not be issued before every flush settled: {calls:?}"
    );

    // The failed flush item was reported but did not abort the batch.
    match recv_event(&mut events).await {
        SessionEvent::FlushItemFailed { set_id, .. } => assert_eq!(set_id, "s2"),
        other => panic!("expected FlushItemFailed, got {other:?}"),
    }
    match recv_event(&mut events).await {
        SessionEvent::SessionCompleted { workout_id } => assert_eq!(workout_id, "w1"),
        other => panic!("expected SessionCompleted, got {other:?}"),
    }

    assert!(store.load("w1").await.unwrap().is_none());
}

#[tokio::test]
async fn finalize_flushes_full_records_from_storage() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, _events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    controller
        .apply_update(
            "s1",
            SetUpdate {
                actual_reps: Some(6),
                actual_weight: Some(62.5),
                note: Some("paused rep".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Let the optimistic update settle so the flush payload is the last one.
    while backend.update_payloads_for("s1").is_empty() {
        sleep(Duration::from_millis(10)).await;
    }
    let baseline = backend.update_payloads_for("s1").len();
    controller.finalize("w1").await.unwrap();

    let payloads = backend.update_payloads_for("s1");
    let flush = payloads.last().unwrap();
    assert!(payloads.len() > baseline);
    // Full resync record, not a diff: every mutable field is present.
    assert_eq!(flush.actual_reps, Some(6));
    assert_eq!(flush.actual_weight, Some(62.5));
    assert_eq!(flush.completed, Some(false));
    assert_eq!(flush.note.as_deref(), Some("paused rep"));
}

#[tokio::test]
async fn failed_finalize_preserves_the_draft_for_retry() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    backend.set_fail_complete(true);
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, _events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    controller
        .apply_update(
            "s1",
            SetUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = controller.finalize("w1").await.unwrap_err();
    assert!(matches!(err, SessionError::Finalize { .. }));
    assert!(
        store.load("w1").await.unwrap().is_some(),
        "draft must survive a failed finalize"
    );

    // The retry re-runs the same flush and succeeds.
    backend.set_fail_complete(false);
    controller.finalize("w1").await.unwrap();
    assert!(store.load("w1").await.unwrap().is_none());
    assert_eq!(
        controller.session().await.unwrap().status,
        WorkoutStatus::Completed
    );
}

#[tokio::test]
async fn stale_draft_is_discarded_on_open() {
    let server = session("w1", vec![set("s1", 0)]);
    let backend = MockBackend::with_session(server.clone());
    let store = Arc::new(MemoryDraftStore::new());

    let mut edited = server.clone();
    edited.find_set_mut("s1").unwrap().actual_reps = Some(12);
    let stale = LocalDraft::from_session(&edited, Utc::now() - ChronoDuration::hours(25));
    store.save(&stale).await.unwrap();

    let (controller, _events) = SessionController::new(backend, store.clone());
    let opened = controller.open("w1").await.unwrap();

    assert_eq!(opened.find_set("s1").unwrap().actual_reps, None);
    assert!(
        store.load("w1").await.unwrap().is_none(),
        "stale draft should be cleared, not merged"
    );
}

#[tokio::test]
async fn fresh_draft_is_merged_on_open() {
    let server = session("w1", vec![set("s1", 0)]);
    let backend = MockBackend::with_session(server.clone());
    let store = Arc::new(MemoryDraftStore::new());

    let mut edited = server.clone();
    edited.find_set_mut("s1").unwrap().actual_reps = Some(12);
    edited.find_set_mut("s1").unwrap().completed = true;
    let draft = LocalDraft::from_session(&edited, Utc::now());
    store.save(&draft).await.unwrap();

    let (controller, _events) = SessionController::new(backend, store);
    let opened = controller.open("w1").await.unwrap();

    let merged = opened.find_set("s1").unwrap();
    assert_eq!(merged.actual_reps, Some(12));
    assert!(merged.completed);
}

#[tokio::test]
async fn set_management_keeps_the_draft_in_step() {
    let backend = MockBackend::with_session(session("w1", vec![set("s1", 0)]));
    let store = Arc::new(MemoryDraftStore::new());
    let (controller, _events) = SessionController::new(backend.clone(), store.clone());

    controller.open("w1").await.unwrap();
    let created = controller.add_set("we1").await.unwrap();

    let draft = store.load("w1").await.unwrap().unwrap();
    assert!(draft.all_sets().any(|entry| entry.set_id == created.id));

    controller.remove_set(&created.id).await.unwrap();
    let draft = store.load("w1").await.unwrap().unwrap();
    assert!(draft.all_sets().all(|entry| entry.set_id != created.id));
    assert!(backend.calls().contains(&Call::DeleteSet(created.id)));
}
