use super::{ActionOutcome, WorkflowEngine, WorkflowError};
use crate::definition::{StateDef, TransitionDef, TriggerKind};
use crate::events::{TransitionEvent, TransitionEventKind};
use crate::expression::{evaluate, StateChangeScope};
use crate::scripting::ScriptOutcome;
use crate::shared::ids::{StateId, TransitionId};
use crate::shared::{Actor, Subject};
use crate::status::Status;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What one `execute_transition` call did. `Removed` carries the last
/// state that still holds: the pre-transition state when the before
/// script removed the subject (nothing was persisted), the destination
/// state when the after script did (status was already written).
pub(crate) enum ExecutedTransition {
    Landed {
        state_id: StateId,
        relocated: Option<Subject>,
    },
    Removed {
        last_state: StateId,
    },
}

/// The states and transition one execution runs against; spares the
/// scope-building sites a long argument list.
struct TransitionFrame<'a> {
    old_state_id: &'a StateId,
    old_state: Option<&'a StateDef>,
    new_state_id: &'a StateId,
    new_state: &'a StateDef,
    transition: Option<(&'a TransitionId, &'a TransitionDef)>,
}

impl<'a> TransitionFrame<'a> {
    fn scope<'b>(
        &self,
        engine: &'b WorkflowEngine,
        subject: &'b Subject,
        actor: &'b Actor,
        status: &'b Status,
        kwargs: &'b Map<String, Value>,
    ) -> StateChangeScope<'b>
    where
        'a: 'b,
    {
        let mut scope = StateChangeScope::new(subject, engine.definition(), status, kwargs);
        scope.actor = Some(actor);
        scope.old_state_id = Some(self.old_state_id);
        scope.old_state = self.old_state;
        scope.new_state_id = Some(self.new_state_id);
        scope.new_state = Some(self.new_state);
        if let Some((tid, tdef)) = self.transition {
            scope.transition_id = Some(tid);
            scope.transition = Some(tdef);
        }
        scope
    }
}

impl WorkflowEngine {
    /// Executes one transition (or the creation pseudo-transition when
    /// `transition` is none), then chains automatic transitions until no
    /// guard passes. There is deliberately no cycle detection: a
    /// definition whose automatic guards form a satisfiable cycle is a
    /// configuration error, not something the engine papers over.
    pub(crate) fn change_state_of(
        &self,
        subject: &Subject,
        transition: Option<(&TransitionId, &TransitionDef)>,
        actor: &Actor,
        kwargs: &Map<String, Value>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let mut current = subject.clone();
        let mut relocated = false;
        let mut next = transition;
        loop {
            match self.execute_transition(&current, next, actor, kwargs)? {
                ExecutedTransition::Removed { last_state } => {
                    return Ok(ActionOutcome {
                        state: last_state,
                        subject: current,
                        relocated,
                        removed: true,
                    });
                }
                ExecutedTransition::Landed {
                    state_id,
                    relocated: moved,
                } => {
                    let state_id = match moved {
                        Some(new_subject) => {
                            // Chaining resumes from wherever the relocated
                            // reference's stored status says it is.
                            current = new_subject;
                            relocated = true;
                            let status = self.status_of(&current)?;
                            self.current_state_id(&status)
                        }
                        None => state_id,
                    };
                    let Some(state) = self.definition().state(state_id.as_str()) else {
                        return Ok(ActionOutcome {
                            state: state_id,
                            subject: current,
                            relocated,
                            removed: false,
                        });
                    };
                    match self.find_automatic_transition(&current, state, actor)? {
                        Some(automatic) => {
                            self.log(format!(
                                "subject={} decision=chain transition={} state={}",
                                current.id, automatic.0, state_id
                            ))?;
                            next = Some(automatic);
                        }
                        None => {
                            return Ok(ActionOutcome {
                                state: state_id,
                                subject: current,
                                relocated,
                                removed: false,
                            });
                        }
                    }
                }
            }
        }
    }

    /// First automatic transition out of `state`, in declared order,
    /// whose guard passes. Guard checks here run with empty kwargs; only
    /// the user-requested transition sees the caller's arguments.
    fn find_automatic_transition<'a>(
        &'a self,
        subject: &Subject,
        state: &'a StateDef,
        actor: &Actor,
    ) -> Result<Option<(&'a TransitionId, &'a TransitionDef)>, WorkflowError> {
        let status = self.status_of(subject)?;
        let kwargs = Map::new();
        for (tid, tdef) in self.definition().outgoing_transitions(state) {
            if tdef.trigger != TriggerKind::Automatic {
                continue;
            }
            if self.check_transition_guard(tdef, subject, actor, &status, &kwargs)? {
                return Ok(Some((tid, tdef)));
            }
        }
        Ok(None)
    }

    /// Puts the subject in a new state: before event, before script,
    /// variable resolution, one atomic status write, role remap, after
    /// script, after event. Once the status write happens nothing is
    /// rolled back by later failures.
    fn execute_transition(
        &self,
        subject: &Subject,
        transition: Option<(&TransitionId, &TransitionDef)>,
        actor: &Actor,
        kwargs: &Map<String, Value>,
    ) -> Result<ExecutedTransition, WorkflowError> {
        let stored = self.status_of(subject)?;
        let old_state_id = self.current_state_id(&stored);
        let (new_state_id, former_status) = match transition {
            None => (self.definition().initial_state.clone(), Status::new()),
            Some((_, tdef)) => (
                tdef.new_state
                    .clone()
                    .unwrap_or_else(|| old_state_id.clone()),
                stored,
            ),
        };
        let Some(new_state) = self.definition().state(new_state_id.as_str()) else {
            return Err(WorkflowError::UndefinedState {
                subject_id: subject.id.clone(),
                state_id: new_state_id.to_string(),
            });
        };
        let frame = TransitionFrame {
            old_state_id: &old_state_id,
            old_state: self.definition().state(old_state_id.as_str()),
            new_state_id: &new_state_id,
            new_state,
            transition,
        };

        // Fired ahead of any mutation, so a listener veto via panic/abort
        // leaves the subject untouched.
        self.notifications.publish(&TransitionEvent {
            kind: TransitionEventKind::Before,
            workflow_id: self.definition().id.clone(),
            subject_id: subject.id.clone(),
            old_state: old_state_id.clone(),
            new_state: new_state_id.clone(),
            transition: transition.map(|(tid, _)| tid.clone()),
            status: former_status.clone(),
            kwargs: kwargs.clone(),
        });

        let mut current = subject.clone();
        let mut relocated: Option<Subject> = None;
        if let Some((_, tdef)) = transition {
            if let Some(script_id) = &tdef.before_script {
                let outcome = {
                    let scope = frame.scope(self, &current, actor, &former_status, kwargs);
                    self.scripts.run(script_id, &scope)?
                };
                match outcome {
                    ScriptOutcome::Continue => {}
                    ScriptOutcome::Relocated(new_subject) => {
                        // The rest of this execution, variable resolution
                        // included, runs against the relocated reference.
                        relocated = Some(new_subject.clone());
                        current = new_subject;
                    }
                    ScriptOutcome::Removed => {
                        return Ok(ExecutedTransition::Removed {
                            last_state: old_state_id,
                        });
                    }
                }
            }
        }

        let mut new_status = {
            let scope = frame.scope(self, &current, actor, &former_status, kwargs);
            self.resolve_status_variables(&scope, transition, new_state)?
        };
        // The state variable is set last and unconditionally; it is never
        // subject to the precedence rules above.
        new_status.insert(
            self.definition().state_var.clone(),
            Value::String(new_state_id.to_string()),
        );

        self.status_store
            .set(&self.definition().id, &current.id, &new_status)?;
        self.log(format!(
            "subject={} decision=execute transition={} old_state={} new_state={}",
            current.id,
            transition.map(|(tid, _)| tid.as_str()).unwrap_or("created"),
            old_state_id,
            new_state_id
        ))?;

        self.apply_role_mappings(&current, new_state);

        if let Some((_, tdef)) = transition {
            if let Some(script_id) = &tdef.after_script {
                let outcome = {
                    let scope = frame.scope(self, &current, actor, &new_status, kwargs);
                    self.scripts.run(script_id, &scope)?
                };
                match outcome {
                    ScriptOutcome::Continue => {}
                    // An after-script signal cuts this execution short; the
                    // after event for it never fires.
                    ScriptOutcome::Relocated(new_subject) => {
                        return Ok(ExecutedTransition::Landed {
                            state_id: new_state_id,
                            relocated: Some(new_subject),
                        });
                    }
                    ScriptOutcome::Removed => {
                        return Ok(ExecutedTransition::Removed {
                            last_state: new_state_id,
                        });
                    }
                }
            }
        }

        self.notifications.publish(&TransitionEvent {
            kind: TransitionEventKind::After,
            workflow_id: self.definition().id.clone(),
            subject_id: current.id.clone(),
            old_state: old_state_id.clone(),
            new_state: new_state_id.clone(),
            transition: transition.map(|(tid, _)| tid.clone()),
            status: new_status,
            kwargs: kwargs.clone(),
        });

        Ok(ExecutedTransition::Landed {
            state_id: new_state_id,
            relocated,
        })
    }

    /// Resolves every `for_status` variable for one execution. First
    /// match wins: new-state fixed value, transition expression,
    /// preserved prior value (`update_always` off), default expression,
    /// static default. Expressions see the pre-transition status through
    /// the scope.
    fn resolve_status_variables(
        &self,
        scope: &StateChangeScope<'_>,
        transition: Option<(&TransitionId, &TransitionDef)>,
        new_state: &StateDef,
    ) -> Result<Status, WorkflowError> {
        let empty_exprs = BTreeMap::new();
        let transition_exprs = transition
            .map(|(_, tdef)| &tdef.variable_exprs)
            .unwrap_or(&empty_exprs);
        let former_status = scope.status;
        let mut status = Status::new();
        for (id, variable) in &self.definition().variables {
            if !variable.for_status {
                continue;
            }
            let preserved = if variable.update_always {
                None
            } else {
                former_status.get(id.as_str())
            };
            let mut expr: Option<&str> = None;
            let mut value = Value::Null;
            if let Some(fixed) = new_state.variable_values.get(id.as_str()) {
                value = fixed.clone();
            } else if let Some(text) = transition_exprs.get(id.as_str()) {
                expr = Some(text);
            } else if let Some(prior) = preserved {
                value = prior.clone();
            } else if let Some(text) = &variable.default_expr {
                expr = Some(text);
            } else {
                value = variable.default_value.clone();
            }
            if let Some(text) = expr {
                value = evaluate(self.evaluator.as_ref(), text, scope)?;
            }
            status.insert(id.to_string(), value);
        }
        Ok(status)
    }

    /// Recomputes the subject's permission-role and group-role mappings
    /// against its current state. Public entry point for embedders that
    /// need to refresh mappings outside a transition (e.g. after changing
    /// the definition).
    pub fn update_role_mappings_for(&self, subject: &Subject) -> Result<bool, WorkflowError> {
        let status = self.status_of(subject)?;
        let state_id = self.current_state_id(&status);
        let Some(state) = self.definition().state(state_id.as_str()) else {
            return Ok(false);
        };
        Ok(self.apply_role_mappings(subject, state))
    }

    /// Applies the state's role assignments through the role mapper,
    /// writing only entries that actually differ. Returns whether
    /// anything changed, which upstream caches key off.
    pub(crate) fn apply_role_mappings(&self, subject: &Subject, state: &StateDef) -> bool {
        let mut changed = false;
        for permission in &self.definition().permissions {
            let target = state.permission_assignment(permission);
            let current = self.role_mapper.permission_roles(subject, permission);
            if current.as_ref() != Some(&target) {
                self.role_mapper
                    .set_permission_roles(subject, permission, target);
                changed = true;
            }
        }
        let groups_managed = !self.definition().groups.is_empty()
            && self
                .definition()
                .managed_roles
                .as_ref()
                .map(|roles| !roles.is_empty())
                .unwrap_or(true);
        if !groups_managed {
            return changed;
        }
        for group in &self.definition().groups {
            let granted = state.group_assignment(group);
            let current = self.role_mapper.group_roles(subject, group);
            if current.is_empty() {
                if granted.is_empty() {
                    continue;
                }
                self.role_mapper
                    .set_group_roles(subject, group, granted.clone());
                changed = true;
                continue;
            }
            // Only managed roles are granted or revoked; roles assigned to
            // the group outside this workflow's scope survive the remap.
            let managed = self.definition().managed_roles_for(&current, &granted);
            let mut roles = current.clone();
            let mut group_changed = false;
            for role in &managed {
                let should_hold = granted.contains(role);
                let holds = roles.contains(role);
                if should_hold && !holds {
                    roles.push(role.clone());
                    group_changed = true;
                } else if !should_hold && holds {
                    roles.retain(|r| r != role);
                    group_changed = true;
                }
            }
            if group_changed {
                self.role_mapper.set_group_roles(subject, group, roles);
                changed = true;
            }
        }
        changed
    }
}
