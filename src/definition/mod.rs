use crate::shared::ids::{validate_identifier_value, StateId, TransitionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub mod guard;
pub mod state;
pub mod transition;
pub mod variable;
pub mod worklist;

pub use guard::{Guard, GuardContext, MANAGER_ROLE};
pub use state::{RoleAssignment, StateDef};
pub use transition::{ActionBox, TransitionDef, TriggerKind};
pub use variable::VariableDef;
pub use worklist::{WorklistDef, WorklistMatch};

use crate::shared::ids::{VariableId, WorklistId};

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to parse workflow definition: {0}")]
    Parse(String),
    #[error("initial state `{state_id}` is not a defined state")]
    UnknownInitialState { state_id: String },
    #[error("invalid state variable name: {0}")]
    InvalidStateVariable(String),
    #[error("state variable `{name}` collides with a variable id")]
    StateVariableCollision { name: String },
}

fn default_state_var() -> String {
    "state".to_string()
}

/// Declarative workflow definition: the state machine plus the variable,
/// worklist and access-control configuration the engine executes against.
/// Owns every nested definition; nothing here is shared between
/// workflows.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Name of the status field that holds the current state id.
    #[serde(default = "default_state_var")]
    pub state_var: String,
    pub initial_state: StateId,
    #[serde(default)]
    pub states: BTreeMap<StateId, StateDef>,
    #[serde(default)]
    pub transitions: BTreeMap<TransitionId, TransitionDef>,
    #[serde(default)]
    pub variables: BTreeMap<VariableId, VariableDef>,
    #[serde(default)]
    pub worklists: BTreeMap<WorklistId, WorklistDef>,
    /// Permissions whose role assignments this workflow manages.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Groups whose role assignments this workflow manages.
    #[serde(default)]
    pub groups: BTreeSet<String>,
    /// Roles this workflow may grant and revoke. Absent means every role
    /// referenced by the definition is managed.
    #[serde(default)]
    pub managed_roles: Option<BTreeSet<String>>,
    /// Vetoes placement of new subjects into this workflow.
    #[serde(default)]
    pub creation_guard: Option<Guard>,
    /// When set, holders of the Manager role satisfy every guard.
    #[serde(default)]
    pub manager_bypass: bool,
}

impl WorkflowDefinition {
    pub fn from_yaml(raw: &str) -> Result<Self, DefinitionError> {
        let definition: Self =
            serde_yaml::from_str(raw).map_err(|err| DefinitionError::Parse(err.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_json(raw: &str) -> Result<Self, DefinitionError> {
        let definition: Self =
            serde_json::from_str(raw).map_err(|err| DefinitionError::Parse(err.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        validate_identifier_value("state variable", &self.state_var)
            .map_err(DefinitionError::InvalidStateVariable)?;
        if self.variables.contains_key(self.state_var.as_str()) {
            return Err(DefinitionError::StateVariableCollision {
                name: self.state_var.clone(),
            });
        }
        if !self.states.contains_key(self.initial_state.as_str()) {
            return Err(DefinitionError::UnknownInitialState {
                state_id: self.initial_state.to_string(),
            });
        }
        Ok(())
    }

    pub fn state(&self, id: &str) -> Option<&StateDef> {
        self.states.get(id)
    }

    pub fn transition(&self, id: &str) -> Option<&TransitionDef> {
        self.transitions.get(id)
    }

    pub fn variable(&self, id: &str) -> Option<&VariableDef> {
        self.variables.get(id)
    }

    pub fn worklist(&self, id: &str) -> Option<&WorklistDef> {
        self.worklists.get(id)
    }

    /// A state's outgoing transitions in declared order, with ids that
    /// name no known transition filtered out.
    pub fn outgoing_transitions<'a>(
        &'a self,
        state: &'a StateDef,
    ) -> impl Iterator<Item = (&'a TransitionId, &'a TransitionDef)> {
        state
            .transitions
            .iter()
            .filter_map(|tid| self.transitions.get_key_value(tid.as_str()))
    }

    /// Roles this workflow manages for one group remap: the configured
    /// managed set, or — when none is configured — every role the remap
    /// itself touches.
    pub fn managed_roles_for(&self, current: &[String], granted: &[String]) -> Vec<String> {
        match &self.managed_roles {
            Some(managed) => managed.iter().cloned().collect(),
            None => {
                let mut all: BTreeSet<String> = current.iter().cloned().collect();
                all.extend(granted.iter().cloned());
                all.into_iter().collect()
            }
        }
    }
}
