use serde_json::{Map, Value};
use stateflow::definition::WorkflowDefinition;
use stateflow::engine::{WorkflowEngine, WorklistSearch, WorklistSearchError};
use stateflow::expression::PathExpressionEvaluator;
use stateflow::security::StaticSecurityContext;
use stateflow::shared::ids::WorkflowId;
use stateflow::shared::{Actor, Subject};
use stateflow::status::MemoryStatusStore;
use std::collections::BTreeMap;
use std::sync::Arc;

fn sample_definition() -> WorkflowDefinition {
    WorkflowDefinition::from_yaml(
        r#"
id: publication
initial_state: private
states:
  private:
    transitions: [submit, publish, cleanup, unnamed]
  pending: {}
  published: {}
transitions:
  submit:
    new_state: pending
    action: {name: Submit, url: "{{base_url}}/submit", icon: submit.png}
  publish:
    new_state: published
    guard: {roles: [Reviewer]}
    action: {name: Publish, url: "{{base_url}}/publish"}
  cleanup:
    trigger: automatic
    guard: {expr: "false"}
    action: {name: Cleanup}
  unnamed:
    new_state: pending
worklists:
  reviewer_queue:
    guard: {roles: [Reviewer]}
    var_matches:
      state: [pending]
    action: {name: "Pending ({{count}})", url: "{{base_url}}/queue", category: global}
  empty_queue:
    var_matches:
      state: [rejected]
    action: {name: "Rejected ({{count}})", category: global}
  my_items:
    var_matches:
      owner: {expr: actor}
    action: {name: "Mine ({{count}})", category: global}
  static_link:
    action: {name: All items, url: "{{base_url}}/all", category: global}
"#,
    )
    .expect("definition")
}

struct StateCountSearch;

impl WorklistSearch for StateCountSearch {
    fn match_count(
        &self,
        _workflow_id: &WorkflowId,
        criteria: &BTreeMap<String, Vec<Value>>,
    ) -> Result<usize, WorklistSearchError> {
        if let Some(state) = criteria
            .get("state")
            .and_then(|values| values.first())
            .and_then(Value::as_str)
        {
            return Ok(if state == "pending" { 3 } else { 0 });
        }
        // The expression-valued match resolves to the requesting actor.
        match criteria
            .get("owner")
            .and_then(|values| values.first())
            .and_then(Value::as_str)
        {
            Some("rita") => Ok(1),
            _ => Ok(0),
        }
    }
}

fn engine_for(actor_role: Option<(&str, &str)>) -> WorkflowEngine {
    let mut security = StaticSecurityContext::new();
    if let Some((actor, role)) = actor_role {
        security = security.grant_role(actor, role);
    }
    WorkflowEngine::new(
        sample_definition(),
        Arc::new(MemoryStatusStore::new()),
        Arc::new(security),
        Arc::new(PathExpressionEvaluator::new()),
    )
    .with_worklist_search(Arc::new(StateCountSearch))
}

fn placeholders() -> Map<String, Value> {
    let mut values = Map::new();
    values.insert(
        "base_url".to_string(),
        Value::String("https://portal.example".to_string()),
    );
    values
}

#[test]
fn actions_module_lists_guarded_named_user_transitions_in_id_order() {
    let engine = engine_for(Some(("rita", "Reviewer")));
    let subject = Subject::new("doc-1");
    let actor = Actor::new("rita");
    engine.notify_created(&subject, &actor).expect("created");

    let actions = engine
        .list_object_actions(&subject, &actor, &placeholders())
        .expect("actions");
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    // `cleanup` is automatic, `unnamed` has no action box; the rest sort
    // by transition id.
    assert_eq!(ids, vec!["publish", "submit"]);
    assert_eq!(actions[0].name, "Publish");
    assert_eq!(actions[0].url, "https://portal.example/publish");
    assert_eq!(actions[1].icon, "submit.png");
    assert_eq!(actions[1].category, "workflow");
}

#[test]
fn actions_module_guard_rejected_transitions_are_hidden() {
    let engine = engine_for(None);
    let subject = Subject::new("doc-2");
    let actor = Actor::new("nobody");
    engine.notify_created(&subject, &actor).expect("created");

    let actions = engine
        .list_object_actions(&subject, &actor, &placeholders())
        .expect("actions");
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["submit"]);
}

#[test]
fn actions_module_worklists_report_counts_and_skip_empty_results() {
    let engine = engine_for(Some(("rita", "Reviewer")));
    let portal = Subject::new("portal");
    let actor = Actor::new("rita");

    let actions = engine
        .list_global_actions(&portal, &actor, &placeholders())
        .expect("worklists");
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    // `empty_queue` matches nothing and disappears; `static_link` has no
    // match keys and is always shown; `my_items` resolved its expression
    // match to the requesting actor.
    assert_eq!(ids, vec!["my_items", "reviewer_queue", "static_link"]);
    assert_eq!(actions[0].name, "Mine (1)");
    assert_eq!(actions[1].name, "Pending (3)");
    assert_eq!(actions[1].url, "https://portal.example/queue");
    assert_eq!(actions[1].category, "global");
    assert_eq!(actions[2].name, "All items");
}

#[test]
fn actions_module_worklist_guard_filters_viewers() {
    let engine = engine_for(None);
    let portal = Subject::new("portal");
    let actor = Actor::new("nobody");

    let actions = engine
        .list_global_actions(&portal, &actor, &placeholders())
        .expect("worklists");
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["static_link"]);
}

#[test]
fn actions_module_worklists_without_search_are_treated_as_empty() {
    let security = StaticSecurityContext::new().grant_role("rita", "Reviewer");
    let engine = WorkflowEngine::new(
        sample_definition(),
        Arc::new(MemoryStatusStore::new()),
        Arc::new(security),
        Arc::new(PathExpressionEvaluator::new()),
    );
    let portal = Subject::new("portal");
    let actor = Actor::new("rita");

    let actions = engine
        .list_global_actions(&portal, &actor, &placeholders())
        .expect("worklists");
    let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["static_link"]);
}
