use crate::definition::WorkflowDefinition;
use crate::expression::{evaluate, value_truthy, ExpressionError, ExpressionEvaluator};
use crate::expression::StateChangeScope;
use crate::security::SecurityContext;
use crate::shared::{Actor, Subject};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role whose holders satisfy every guard when the workflow enables the
/// manager bypass.
pub const MANAGER_ROLE: &str = "Manager";

/// Composite predicate gating transitions, worklists, variable reads and
/// subject creation. Present clauses are ANDed; within one clause any
/// single match suffices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Guard {
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub expr: Option<String>,
}

/// Everything a guard check needs, threaded as one argument.
pub struct GuardContext<'a> {
    pub workflow: &'a WorkflowDefinition,
    pub security: &'a dyn SecurityContext,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub actor: &'a Actor,
    pub subject: &'a Subject,
    pub status: &'a Status,
    pub kwargs: &'a Map<String, Value>,
}

impl Guard {
    /// Evaluates the guard, short-circuiting on the first failing clause.
    /// A guard with no clauses always passes.
    pub fn check(&self, ctx: &GuardContext<'_>) -> Result<bool, ExpressionError> {
        if ctx.workflow.manager_bypass
            && ctx
                .security
                .actor_has_role(ctx.actor, ctx.subject, MANAGER_ROLE)
        {
            return Ok(true);
        }
        if !self.permissions.is_empty()
            && !self.permissions.iter().any(|permission| {
                ctx.security
                    .actor_has_permission(ctx.actor, ctx.subject, permission)
            })
        {
            return Ok(false);
        }
        if !self.roles.is_empty()
            && !self
                .roles
                .iter()
                .any(|role| ctx.security.actor_has_role(ctx.actor, ctx.subject, role))
        {
            return Ok(false);
        }
        if !self.groups.is_empty() {
            let member_of = ctx.security.actor_groups(ctx.actor, ctx.subject);
            if !self.groups.iter().any(|group| member_of.contains(group)) {
                return Ok(false);
            }
        }
        if let Some(expr) = &self.expr {
            let mut scope =
                StateChangeScope::new(ctx.subject, ctx.workflow, ctx.status, ctx.kwargs);
            scope.actor = Some(ctx.actor);
            let result = evaluate(ctx.evaluator, expr, &scope)?;
            if !value_truthy(&result) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn has_clauses(&self) -> bool {
        !self.permissions.is_empty()
            || !self.roles.is_empty()
            || !self.groups.is_empty()
            || self.expr.is_some()
    }

    /// Plain-text rendering of the guard's clauses for presentation
    /// layers.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.permissions.is_empty() {
            parts.push(format!(
                "requires permission: {}",
                name_union(&self.permissions)
            ));
        }
        if !self.roles.is_empty() {
            parts.push(format!("requires role: {}", name_union(&self.roles)));
        }
        if !self.groups.is_empty() {
            parts.push(format!("requires group: {}", name_union(&self.groups)));
        }
        if let Some(expr) = &self.expr {
            parts.push(format!("requires expr: {expr}"));
        }
        parts.join("; ")
    }
}

fn name_union(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} or {second}"),
        _ => {
            let mut rendered: Vec<String> = names.to_vec();
            if let Some(last) = rendered.last_mut() {
                *last = format!("or {last}");
            }
            rendered.join("; ")
        }
    }
}
