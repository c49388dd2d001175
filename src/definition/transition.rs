use crate::definition::guard::Guard;
use crate::shared::ids::{ScriptId, StateId, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Automatic,
    UserAction,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::UserAction => "user_action",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "automatic" => Ok(Self::Automatic),
            "user_action" => Ok(Self::UserAction),
            _ => Err("trigger must be one of: automatic, user_action".to_string()),
        }
    }
}

impl Default for TriggerKind {
    fn default() -> Self {
        Self::UserAction
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Presentation metadata for a transition or worklist. Carried through to
/// action listings unchanged apart from placeholder rendering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionBox {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_action_category")]
    pub category: String,
}

impl Default for ActionBox {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            icon: String::new(),
            category: default_action_category(),
        }
    }
}

fn default_action_category() -> String {
    "workflow".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransitionDef {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Destination state. Absent means the transition loops in place.
    #[serde(default)]
    pub new_state: Option<StateId>,
    #[serde(default)]
    pub trigger: TriggerKind,
    #[serde(default)]
    pub guard: Option<Guard>,
    /// Runs before status is computed; may relocate or remove the subject.
    #[serde(default)]
    pub before_script: Option<ScriptId>,
    /// Runs after status is persisted and roles are remapped.
    #[serde(default)]
    pub after_script: Option<ScriptId>,
    /// Per-variable assignment expressions, evaluated against the
    /// pre-transition status.
    #[serde(default)]
    pub variable_exprs: BTreeMap<VariableId, String>,
    #[serde(default)]
    pub action: Option<ActionBox>,
}
