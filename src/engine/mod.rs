use crate::acl::{NullRoleMapper, RoleMapper};
use crate::definition::{GuardContext, TransitionDef, TriggerKind, WorkflowDefinition};
use crate::events::{NotificationSink, NullNotificationSink};
use crate::expression::{evaluate, ExpressionEvaluator, StateChangeScope};
use crate::scripting::{NoScriptRunner, ScriptRunner};
use crate::security::SecurityContext;
use crate::shared::ids::StateId;
use crate::shared::logging::{append_engine_log_line, engine_log_path};
use crate::shared::{Actor, Subject};
use crate::status::{Status, StatusStore};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

pub mod actions;
pub mod error;

mod execute;

pub use actions::{ActionInfo, WorklistSearch, WorklistSearchError};
pub use error::WorkflowError;

/// Result of a user action or creation notification, covering the full
/// automatic-transition chain. Relocation and removal are reported here
/// as data, not as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Last state the chain landed in (the pre-transition state when a
    /// before-script removed the subject before anything was persisted).
    pub state: StateId,
    /// The subject reference after any script relocations.
    pub subject: Subject,
    pub relocated: bool,
    pub removed: bool,
}

/// The transition execution engine. Holds the workflow definition and
/// explicit references to every collaborator; nothing is discovered via
/// ambient context.
#[derive(Clone)]
pub struct WorkflowEngine {
    definition: Arc<WorkflowDefinition>,
    status_store: Arc<dyn StatusStore>,
    security: Arc<dyn SecurityContext>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    scripts: Arc<dyn ScriptRunner>,
    notifications: Arc<dyn NotificationSink>,
    role_mapper: Arc<dyn RoleMapper>,
    worklist_search: Option<Arc<dyn WorklistSearch>>,
    log_root: Option<PathBuf>,
}

impl WorkflowEngine {
    pub fn new(
        definition: WorkflowDefinition,
        status_store: Arc<dyn StatusStore>,
        security: Arc<dyn SecurityContext>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            status_store,
            security,
            evaluator,
            scripts: Arc::new(NoScriptRunner),
            notifications: Arc::new(NullNotificationSink),
            role_mapper: Arc::new(NullRoleMapper),
            worklist_search: None,
            log_root: None,
        }
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_role_mapper(mut self, role_mapper: Arc<dyn RoleMapper>) -> Self {
        self.role_mapper = role_mapper;
        self
    }

    pub fn with_worklist_search(mut self, worklist_search: Arc<dyn WorklistSearch>) -> Self {
        self.worklist_search = Some(worklist_search);
        self
    }

    pub fn with_log_root(mut self, log_root: impl Into<PathBuf>) -> Self {
        self.log_root = Some(log_root.into());
        self
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Places a freshly created subject into the workflow: initial state,
    /// default variable values, then automatic chaining. Relocation or
    /// removal reported by scripts is discarded; creation notification
    /// never fails for a subject that vanished along the way.
    pub fn notify_created(&self, subject: &Subject, actor: &Actor) -> Result<(), WorkflowError> {
        self.log(format!(
            "subject={} decision=notify_created workflow={}",
            subject.id, self.definition.id
        ))?;
        let _ = self.change_state_of(subject, None, actor, &Map::new())?;
        Ok(())
    }

    /// Executes a user-requested transition, then chains automatic
    /// transitions until none applies. `comment` lands in kwargs under
    /// `"comment"` before guard evaluation.
    pub fn do_action_for(
        &self,
        subject: &Subject,
        action: &str,
        actor: &Actor,
        comment: &str,
        kwargs: Map<String, Value>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let mut kwargs = kwargs;
        kwargs.insert(
            "comment".to_string(),
            Value::String(comment.to_string()),
        );
        let status = self.status_of(subject)?;
        let state_id = self.current_state_id(&status);
        let state = self.definition.state(state_id.as_str()).ok_or_else(|| {
            WorkflowError::UndefinedState {
                subject_id: subject.id.clone(),
                state_id: state_id.to_string(),
            }
        })?;
        let not_authorized = || WorkflowError::NotAuthorized {
            action_id: action.to_string(),
            subject_id: subject.id.clone(),
        };
        if !state.transitions.iter().any(|tid| tid.as_str() == action) {
            return Err(not_authorized());
        }
        let transition = self
            .definition
            .transitions
            .get_key_value(action)
            .ok_or_else(not_authorized)?;
        if transition.1.trigger != TriggerKind::UserAction {
            return Err(not_authorized());
        }
        if !self.check_transition_guard(transition.1, subject, actor, &status, &kwargs)? {
            return Err(not_authorized());
        }
        self.log(format!(
            "subject={} decision=do_action action={} state={}",
            subject.id, action, state_id
        ))?;
        self.change_state_of(subject, Some(transition), actor, &kwargs)
    }

    /// True iff the action is a user transition reachable from the current
    /// state whose guard accepts the actor.
    pub fn is_action_supported(
        &self,
        subject: &Subject,
        action: &str,
        actor: &Actor,
        kwargs: &Map<String, Value>,
    ) -> Result<bool, WorkflowError> {
        let status = self.status_of(subject)?;
        let state_id = self.current_state_id(&status);
        let Some(state) = self.definition.state(state_id.as_str()) else {
            return Ok(false);
        };
        if !state.transitions.iter().any(|tid| tid.as_str() == action) {
            return Ok(false);
        }
        let Some(transition) = self.definition.transition(action) else {
            return Ok(false);
        };
        if transition.trigger != TriggerKind::UserAction {
            return Ok(false);
        }
        self.check_transition_guard(transition, subject, actor, &status, kwargs)
    }

    pub fn is_info_supported(&self, name: &str) -> bool {
        name == self.definition.state_var || self.definition.variable(name).is_some()
    }

    /// Reads one variable for a subject. The state variable resolves to
    /// the current state id; other variables go through their info guard,
    /// then the stored value, then the default expression or value.
    pub fn get_info_for(
        &self,
        subject: &Subject,
        actor: &Actor,
        name: &str,
        default: Value,
    ) -> Result<Value, WorkflowError> {
        let status = self.status_of(subject)?;
        if name == self.definition.state_var {
            return Ok(Value::String(self.current_state_id(&status).to_string()));
        }
        let variable = self.definition.variable(name).ok_or_else(|| {
            WorkflowError::UnknownVariable {
                name: name.to_string(),
            }
        })?;
        let kwargs = Map::new();
        if let Some(guard) = &variable.info_guard {
            let ctx = GuardContext {
                workflow: &self.definition,
                security: self.security.as_ref(),
                evaluator: self.evaluator.as_ref(),
                actor,
                subject,
                status: &status,
                kwargs: &kwargs,
            };
            if !guard.check(&ctx)? {
                return Ok(default);
            }
        }
        if let Some(value) = status.get(name) {
            return Ok(value.clone());
        }
        if let Some(expr) = &variable.default_expr {
            let mut scope = StateChangeScope::new(subject, &self.definition, &status, &kwargs);
            scope.actor = Some(actor);
            return Ok(evaluate(self.evaluator.as_ref(), expr, &scope)?);
        }
        Ok(variable.default_value.clone())
    }

    /// May a new subject enter this workflow? Delegates to the creation
    /// guard; no guard means yes.
    pub fn allow_create(&self, container: &Subject, actor: &Actor) -> Result<bool, WorkflowError> {
        let Some(guard) = &self.definition.creation_guard else {
            return Ok(true);
        };
        let status = Status::new();
        let kwargs = Map::new();
        let ctx = GuardContext {
            workflow: &self.definition,
            security: self.security.as_ref(),
            evaluator: self.evaluator.as_ref(),
            actor,
            subject: container,
            status: &status,
            kwargs: &kwargs,
        };
        Ok(guard.check(&ctx)?)
    }

    /// Catalog export: every `for_catalog` variable plus the state
    /// variable, resolved from status or defaults. This is what worklist
    /// queries match against.
    pub fn catalog_variables_for(
        &self,
        subject: &Subject,
    ) -> Result<BTreeMap<String, Value>, WorkflowError> {
        let status = self.status_of(subject)?;
        let kwargs = Map::new();
        let mut res = BTreeMap::new();
        for (id, variable) in &self.definition.variables {
            if !variable.for_catalog {
                continue;
            }
            let value = if let Some(value) = status.get(id.as_str()) {
                value.clone()
            } else if let Some(expr) = &variable.default_expr {
                let scope = StateChangeScope::new(subject, &self.definition, &status, &kwargs);
                evaluate(self.evaluator.as_ref(), expr, &scope)?
            } else {
                variable.default_value.clone()
            };
            res.insert(id.to_string(), value);
        }
        let state = status
            .get(&self.definition.state_var)
            .cloned()
            .unwrap_or_else(|| Value::String(self.definition.initial_state.to_string()));
        res.insert(self.definition.state_var.clone(), state);
        Ok(res)
    }

    /// The subject's current state id: the stored value when it names a
    /// known state, otherwise the initial state.
    pub fn current_state_of(&self, subject: &Subject) -> Result<StateId, WorkflowError> {
        let status = self.status_of(subject)?;
        Ok(self.current_state_id(&status))
    }

    pub(crate) fn status_of(&self, subject: &Subject) -> Result<Status, WorkflowError> {
        Ok(self
            .status_store
            .get(&self.definition.id, &subject.id)?
            .unwrap_or_default())
    }

    pub(crate) fn current_state_id(&self, status: &Status) -> StateId {
        let stored = status
            .get(&self.definition.state_var)
            .and_then(Value::as_str);
        match stored {
            Some(id) => match self.definition.states.get_key_value(id) {
                Some((state_id, _)) => state_id.clone(),
                None => self.definition.initial_state.clone(),
            },
            None => self.definition.initial_state.clone(),
        }
    }

    pub(crate) fn check_transition_guard(
        &self,
        transition: &TransitionDef,
        subject: &Subject,
        actor: &Actor,
        status: &Status,
        kwargs: &Map<String, Value>,
    ) -> Result<bool, WorkflowError> {
        let Some(guard) = &transition.guard else {
            return Ok(true);
        };
        let ctx = GuardContext {
            workflow: &self.definition,
            security: self.security.as_ref(),
            evaluator: self.evaluator.as_ref(),
            actor,
            subject,
            status,
            kwargs,
        };
        Ok(guard.check(&ctx)?)
    }

    pub(crate) fn log(&self, line: String) -> Result<(), WorkflowError> {
        let Some(root) = &self.log_root else {
            return Ok(());
        };
        append_engine_log_line(root, &line).map_err(|source| WorkflowError::Log {
            path: engine_log_path(root).display().to_string(),
            source,
        })
    }
}
