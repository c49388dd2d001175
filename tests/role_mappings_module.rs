use serde_json::Map;
use stateflow::acl::{MemoryRoleMapper, RoleMapper};
use stateflow::definition::WorkflowDefinition;
use stateflow::engine::WorkflowEngine;
use stateflow::expression::PathExpressionEvaluator;
use stateflow::security::StaticSecurityContext;
use stateflow::shared::{Actor, Subject};
use stateflow::status::MemoryStatusStore;
use std::sync::Arc;

fn sample_definition() -> WorkflowDefinition {
    WorkflowDefinition::from_yaml(
        r#"
id: publication
initial_state: private
permissions: [view]
groups: [editors]
managed_roles: [Reviewer, Publisher]
states:
  private:
    transitions: [publish]
    permission_roles:
      view: {roles: [Owner], acquired: false}
    group_roles:
      editors: [Reviewer]
  published:
    transitions: [retract]
    permission_roles:
      view: {roles: [Owner, Member], acquired: true}
transitions:
  publish:
    new_state: published
  retract:
    new_state: private
"#,
    )
    .expect("definition")
}

fn engine_with_mapper() -> (WorkflowEngine, Arc<MemoryRoleMapper>) {
    let mapper = Arc::new(MemoryRoleMapper::new());
    let engine = WorkflowEngine::new(
        sample_definition(),
        Arc::new(MemoryStatusStore::new()),
        Arc::new(StaticSecurityContext::new()),
        Arc::new(PathExpressionEvaluator::new()),
    )
    .with_role_mapper(mapper.clone());
    (engine, mapper)
}

#[test]
fn role_mappings_module_transition_applies_state_assignments() {
    let (engine, mapper) = engine_with_mapper();
    let subject = Subject::new("doc-1");
    let actor = Actor::new("alice");
    engine.notify_created(&subject, &actor).expect("created");

    let view = mapper.permission_roles(&subject, "view").expect("mapped");
    assert_eq!(view.roles, vec!["Owner".to_string()]);
    assert!(!view.acquired);

    engine
        .do_action_for(&subject, "publish", &actor, "", Map::new())
        .expect("publish");
    let view = mapper.permission_roles(&subject, "view").expect("mapped");
    assert_eq!(view.roles, vec!["Owner".to_string(), "Member".to_string()]);
    assert!(view.acquired);
}

#[test]
fn role_mappings_module_rewrite_is_avoided_when_nothing_changed() {
    let (engine, _mapper) = engine_with_mapper();
    let subject = Subject::new("doc-2");
    let actor = Actor::new("alice");
    engine.notify_created(&subject, &actor).expect("created");

    // First refresh after creation finds everything already in place.
    assert!(!engine.update_role_mappings_for(&subject).expect("refresh"));

    engine
        .do_action_for(&subject, "publish", &actor, "", Map::new())
        .expect("publish");
    assert!(!engine.update_role_mappings_for(&subject).expect("refresh"));
}

#[test]
fn role_mappings_module_group_merge_preserves_unmanaged_roles() {
    let (engine, mapper) = engine_with_mapper();
    let subject = Subject::new("doc-3");
    let actor = Actor::new("alice");

    // A role outside managed_roles granted by someone else must survive
    // every remap this workflow performs.
    mapper.set_group_roles(&subject, "editors", vec!["SiteAdmin".to_string()]);

    engine.notify_created(&subject, &actor).expect("created");
    let mut roles = mapper.group_roles(&subject, "editors");
    roles.sort();
    assert_eq!(roles, vec!["Reviewer".to_string(), "SiteAdmin".to_string()]);

    // `published` grants no group roles: the managed Reviewer role is
    // revoked, the unmanaged one stays.
    engine
        .do_action_for(&subject, "publish", &actor, "", Map::new())
        .expect("publish");
    assert_eq!(
        mapper.group_roles(&subject, "editors"),
        vec!["SiteAdmin".to_string()]
    );
}

#[test]
fn role_mappings_module_revoking_last_managed_role_drops_entry() {
    let (engine, mapper) = engine_with_mapper();
    let subject = Subject::new("doc-4");
    let actor = Actor::new("alice");
    engine.notify_created(&subject, &actor).expect("created");
    assert_eq!(
        mapper.group_roles(&subject, "editors"),
        vec!["Reviewer".to_string()]
    );

    // `published` grants nothing and Reviewer was the only role left:
    // the group's mapping entry disappears entirely.
    engine
        .do_action_for(&subject, "publish", &actor, "", Map::new())
        .expect("publish");
    assert!(mapper.group_roles(&subject, "editors").is_empty());
}
