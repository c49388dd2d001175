use serde_json::{Map, Value};
use stateflow::engine::{WorkflowEngine, WorkflowError};
use stateflow::events::{RecordingNotificationSink, TransitionEventKind};
use stateflow::expression::PathExpressionEvaluator;
use stateflow::definition::WorkflowDefinition;
use stateflow::security::StaticSecurityContext;
use stateflow::shared::{Actor, Subject};
use stateflow::status::{MemoryStatusStore, StatusStore};
use std::sync::Arc;

fn sample_definition() -> WorkflowDefinition {
    WorkflowDefinition::from_yaml(
        r#"
id: publication
state_var: state
initial_state: private
states:
  private:
    transitions: [publish, touch, break_out, ghost]
  published:
    transitions: [retract]
transitions:
  publish:
    new_state: published
    guard: {roles: [Owner]}
    variable_exprs:
      comments: kwargs.comment
  retract:
    new_state: private
    guard: {roles: [Owner]}
  touch:
    guard: {roles: [Owner]}
    variable_exprs:
      comments: kwargs.comment
  break_out:
    new_state: missing
    guard: {roles: [Owner]}
  ghost:
    trigger: automatic
    guard: {expr: "false"}
variables:
  comments:
    for_status: true
    update_always: true
    default_value: ""
"#,
    )
    .expect("definition")
}

struct Harness {
    engine: WorkflowEngine,
    store: Arc<MemoryStatusStore>,
    sink: Arc<RecordingNotificationSink>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStatusStore::new());
    let sink = Arc::new(RecordingNotificationSink::new());
    let security = StaticSecurityContext::new().grant_role("alice", "Owner");
    let engine = WorkflowEngine::new(
        sample_definition(),
        store.clone(),
        Arc::new(security),
        Arc::new(PathExpressionEvaluator::new()),
    )
    .with_notifications(sink.clone());
    Harness {
        engine,
        store,
        sink,
    }
}

fn stored_status(harness: &Harness, subject: &Subject) -> Option<stateflow::status::Status> {
    harness
        .store
        .get(&harness.engine.definition().id, &subject.id)
        .expect("store read")
}

#[test]
fn execution_module_do_action_moves_subject_and_persists_status() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");

    let outcome = harness
        .engine
        .do_action_for(&subject, "publish", &actor, "ship it", Map::new())
        .expect("publish");
    assert_eq!(outcome.state.as_str(), "published");
    assert_eq!(outcome.subject, subject);
    assert!(!outcome.relocated);
    assert!(!outcome.removed);

    let status = stored_status(&harness, &subject).expect("status");
    assert_eq!(status.get("state"), Some(&Value::String("published".into())));
    assert_eq!(status.get("comments"), Some(&Value::String("ship it".into())));
}

#[test]
fn execution_module_unknown_action_is_not_authorized() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");

    let err = harness
        .engine
        .do_action_for(&subject, "vanish", &actor, "", Map::new())
        .expect_err("must fail");
    assert!(matches!(err, WorkflowError::NotAuthorized { .. }));
}

#[test]
fn execution_module_unreachable_action_is_not_authorized() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");

    // `retract` exists but is only reachable from `published`.
    let err = harness
        .engine
        .do_action_for(&subject, "retract", &actor, "", Map::new())
        .expect_err("must fail");
    assert!(matches!(err, WorkflowError::NotAuthorized { .. }));
}

#[test]
fn execution_module_automatic_transition_cannot_be_requested() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");

    let err = harness
        .engine
        .do_action_for(&subject, "ghost", &actor, "", Map::new())
        .expect_err("must fail");
    assert!(matches!(err, WorkflowError::NotAuthorized { .. }));
}

#[test]
fn execution_module_guard_rejection_leaves_status_untouched() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let owner = Actor::new("alice");
    harness.engine.notify_created(&subject, &owner).expect("created");
    let before = stored_status(&harness, &subject);
    let events_before = harness.sink.events().len();

    let stranger = Actor::new("mallory");
    let err = harness
        .engine
        .do_action_for(&subject, "publish", &stranger, "", Map::new())
        .expect_err("must fail");
    assert!(matches!(err, WorkflowError::NotAuthorized { .. }));
    assert_eq!(stored_status(&harness, &subject), before);
    // Rejection happens before the before-event fires.
    assert_eq!(harness.sink.events().len(), events_before);
}

#[test]
fn execution_module_undefined_destination_state_fails() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");

    let err = harness
        .engine
        .do_action_for(&subject, "break_out", &actor, "", Map::new())
        .expect_err("must fail");
    match err {
        WorkflowError::UndefinedState { state_id, .. } => assert_eq!(state_id, "missing"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn execution_module_empty_destination_loops_in_place() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");

    let outcome = harness
        .engine
        .do_action_for(&subject, "touch", &actor, "still here", Map::new())
        .expect("touch");
    assert_eq!(outcome.state.as_str(), "private");

    let status = stored_status(&harness, &subject).expect("status");
    assert_eq!(status.get("state"), Some(&Value::String("private".into())));
    assert_eq!(
        status.get("comments"),
        Some(&Value::String("still here".into()))
    );
}

#[test]
fn execution_module_fires_before_and_after_events_in_order() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    harness.engine.notify_created(&subject, &actor).expect("created");
    let creation_events = harness.sink.events();
    assert_eq!(creation_events.len(), 2);
    assert_eq!(creation_events[0].kind, TransitionEventKind::Before);
    assert_eq!(creation_events[0].transition, None);
    assert!(creation_events[0].status.is_empty());
    assert_eq!(creation_events[1].kind, TransitionEventKind::After);
    assert_eq!(
        creation_events[1].status.get("state"),
        Some(&Value::String("private".into()))
    );

    harness
        .engine
        .do_action_for(&subject, "publish", &actor, "go", Map::new())
        .expect("publish");
    let events = harness.sink.events();
    assert_eq!(events.len(), 4);

    let before = &events[2];
    assert_eq!(before.kind, TransitionEventKind::Before);
    assert_eq!(before.old_state.as_str(), "private");
    assert_eq!(before.new_state.as_str(), "published");
    assert_eq!(
        before.transition.as_ref().map(|t| t.as_str()),
        Some("publish")
    );
    // The before event sees the former status.
    assert_eq!(
        before.status.get("state"),
        Some(&Value::String("private".into()))
    );
    assert_eq!(
        before.kwargs.get("comment"),
        Some(&Value::String("go".into()))
    );

    let after = &events[3];
    assert_eq!(after.kind, TransitionEventKind::After);
    assert_eq!(
        after.status.get("state"),
        Some(&Value::String("published".into()))
    );
    assert_eq!(after.status.get("comments"), Some(&Value::String("go".into())));
}

#[test]
fn execution_module_is_action_supported_tracks_reachability_and_guard() {
    let harness = harness();
    let subject = Subject::new("doc-1");
    let owner = Actor::new("alice");
    let stranger = Actor::new("mallory");
    harness.engine.notify_created(&subject, &owner).expect("created");

    let kwargs = Map::new();
    assert!(harness
        .engine
        .is_action_supported(&subject, "publish", &owner, &kwargs)
        .expect("supported"));
    assert!(!harness
        .engine
        .is_action_supported(&subject, "publish", &stranger, &kwargs)
        .expect("supported"));
    assert!(!harness
        .engine
        .is_action_supported(&subject, "retract", &owner, &kwargs)
        .expect("supported"));
    assert!(!harness
        .engine
        .is_action_supported(&subject, "ghost", &owner, &kwargs)
        .expect("supported"));
}

#[test]
fn execution_module_writes_engine_log_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStatusStore::new());
    let security = StaticSecurityContext::new().grant_role("alice", "Owner");
    let engine = WorkflowEngine::new(
        sample_definition(),
        store,
        Arc::new(security),
        Arc::new(PathExpressionEvaluator::new()),
    )
    .with_log_root(dir.path());

    let subject = Subject::new("doc-log");
    let actor = Actor::new("alice");
    engine.notify_created(&subject, &actor).expect("created");
    engine
        .do_action_for(&subject, "publish", &actor, "", Map::new())
        .expect("publish");

    let log = std::fs::read_to_string(dir.path().join("logs/engine.log")).expect("log file");
    assert!(log.contains("subject=doc-log decision=notify_created workflow=publication"));
    assert!(log.contains("subject=doc-log decision=do_action action=publish state=private"));
    assert!(log.contains(
        "subject=doc-log decision=execute transition=publish old_state=private new_state=published"
    ));
}

#[test]
fn execution_module_missing_status_resolves_to_initial_state() {
    let harness = harness();
    let subject = Subject::new("never-created");
    let actor = Actor::new("alice");

    // No notify_created: the engine falls back to the initial state and
    // the action still works.
    let outcome = harness
        .engine
        .do_action_for(&subject, "publish", &actor, "", Map::new())
        .expect("publish");
    assert_eq!(outcome.state.as_str(), "published");
}
