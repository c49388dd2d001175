use super::{WorkflowEngine, WorkflowError};
use crate::definition::{ActionBox, GuardContext, TriggerKind, WorklistDef, WorklistMatch};
use crate::expression::{evaluate, StateChangeScope};
use crate::shared::ids::WorkflowId;
use crate::shared::template::render_with_values;
use crate::shared::{Actor, Subject};
use crate::status::Status;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One entry for a presentation layer's actions box, with placeholders
/// already rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub icon: String,
    pub category: String,
}

#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct WorklistSearchError {
    pub reason: String,
}

/// Query seam for worklists. Given plain variable→accepted-values
/// criteria (matched against catalog exports), returns how many subjects
/// qualify. The execution of the query is entirely the embedder's
/// business.
pub trait WorklistSearch: Send + Sync {
    fn match_count(
        &self,
        workflow_id: &WorkflowId,
        criteria: &BTreeMap<String, Vec<Value>>,
    ) -> Result<usize, WorklistSearchError>;
}

impl WorkflowEngine {
    /// User-actionable transitions out of the subject's current state:
    /// user-triggered, named, guard-accepted, ordered by transition id.
    pub fn list_object_actions(
        &self,
        subject: &Subject,
        actor: &Actor,
        placeholders: &Map<String, Value>,
    ) -> Result<Vec<ActionInfo>, WorkflowError> {
        let status = self.status_of(subject)?;
        let state_id = self.current_state_id(&status);
        let Some(state) = self.definition().state(state_id.as_str()) else {
            return Ok(Vec::new());
        };
        let kwargs = Map::new();
        let mut res = Vec::new();
        for (tid, tdef) in self.definition().outgoing_transitions(state) {
            if tdef.trigger != TriggerKind::UserAction {
                continue;
            }
            let Some(action) = &tdef.action else {
                continue;
            };
            if action.name.is_empty() {
                continue;
            }
            if !self.check_transition_guard(tdef, subject, actor, &status, &kwargs)? {
                continue;
            }
            res.push(render_action_info(tid.as_str(), action, placeholders)?);
        }
        res.sort_by(|a: &ActionInfo, b: &ActionInfo| a.id.cmp(&b.id));
        Ok(res)
    }

    /// Globally visible worklists: guard-accepted, and — when a worklist
    /// declares match criteria — non-empty under the worklist search,
    /// with the match count exposed to the `{{count}}` placeholder.
    /// Worklists with criteria but no configured search are treated as
    /// empty and skipped.
    pub fn list_global_actions(
        &self,
        context_subject: &Subject,
        actor: &Actor,
        placeholders: &Map<String, Value>,
    ) -> Result<Vec<ActionInfo>, WorkflowError> {
        let status = Status::new();
        let kwargs = Map::new();
        let mut res = Vec::new();
        for (wid, worklist) in &self.definition().worklists {
            let Some(action) = &worklist.action else {
                continue;
            };
            if action.name.is_empty() {
                continue;
            }
            if let Some(guard) = &worklist.guard {
                let ctx = GuardContext {
                    workflow: self.definition(),
                    security: self.security.as_ref(),
                    evaluator: self.evaluator.as_ref(),
                    actor,
                    subject: context_subject,
                    status: &status,
                    kwargs: &kwargs,
                };
                if !guard.check(&ctx)? {
                    continue;
                }
            }
            let mut values = placeholders.clone();
            if !worklist.var_matches.is_empty() {
                let Some(search) = &self.worklist_search else {
                    continue;
                };
                let criteria =
                    self.resolve_worklist_criteria(worklist, context_subject, actor)?;
                let count = search
                    .match_count(&self.definition().id, &criteria)
                    .map_err(|err| WorkflowError::WorklistSearch {
                        worklist_id: wid.to_string(),
                        reason: err.to_string(),
                    })?;
                if count == 0 {
                    continue;
                }
                values.insert("count".to_string(), Value::from(count));
            }
            res.push(render_action_info(wid.as_str(), action, &values)?);
        }
        Ok(res)
    }

    /// Turns a worklist's match configuration into plain criteria for the
    /// search seam. Expression matches resolve against the caller's
    /// context subject; a scalar result becomes a one-element list.
    fn resolve_worklist_criteria(
        &self,
        worklist: &WorklistDef,
        context_subject: &Subject,
        actor: &Actor,
    ) -> Result<BTreeMap<String, Vec<Value>>, WorkflowError> {
        let status = Status::new();
        let kwargs = Map::new();
        let mut criteria = BTreeMap::new();
        for (key, var_match) in &worklist.var_matches {
            let values = match var_match {
                WorklistMatch::Values(values) => values
                    .iter()
                    .map(|value| Value::String(value.clone()))
                    .collect(),
                WorklistMatch::Expr { expr } => {
                    let mut scope =
                        StateChangeScope::new(context_subject, self.definition(), &status, &kwargs);
                    scope.actor = Some(actor);
                    match evaluate(self.evaluator.as_ref(), expr, &scope)? {
                        Value::Array(items) => items,
                        scalar => vec![scalar],
                    }
                }
            };
            criteria.insert(key.clone(), values);
        }
        Ok(criteria)
    }
}

fn render_action_info(
    id: &str,
    action: &ActionBox,
    values: &Map<String, Value>,
) -> Result<ActionInfo, WorkflowError> {
    let render = |template: &str| -> Result<String, WorkflowError> {
        if template.is_empty() {
            return Ok(String::new());
        }
        render_with_values(template, values).map_err(|reason| WorkflowError::ActionRender {
            template: template.to_string(),
            reason,
        })
    };
    Ok(ActionInfo {
        id: id.to_string(),
        name: render(&action.name)?,
        url: render(&action.url)?,
        icon: render(&action.icon)?,
        category: action.category.clone(),
    })
}
