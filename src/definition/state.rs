use crate::shared::ids::{TransitionId, VariableId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Roles granted for one managed permission while a subject sits in a
/// state. `acquired` controls whether the subject also inherits the
/// permission's roles from its container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoleAssignment {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub acquired: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StateDef {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Outgoing transition ids, in declared order. Ids that name no known
    /// transition are tolerated and filtered at read time.
    #[serde(default)]
    pub transitions: Vec<TransitionId>,
    #[serde(default)]
    pub permission_roles: BTreeMap<String, RoleAssignment>,
    #[serde(default)]
    pub group_roles: BTreeMap<String, Vec<String>>,
    /// Fixed variable values for this state. Overrides transition
    /// expressions unconditionally.
    #[serde(default)]
    pub variable_values: BTreeMap<VariableId, Value>,
}

impl StateDef {
    pub fn permission_assignment(&self, permission: &str) -> RoleAssignment {
        self.permission_roles
            .get(permission)
            .cloned()
            .unwrap_or_default()
    }

    pub fn group_assignment(&self, group: &str) -> Vec<String> {
        self.group_roles.get(group).cloned().unwrap_or_default()
    }
}
