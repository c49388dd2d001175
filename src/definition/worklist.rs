use crate::definition::guard::Guard;
use crate::definition::transition::ActionBox;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Match criterion for one catalog variable: either a fixed list of
/// accepted values or an expression resolved at request time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WorklistMatch {
    Values(Vec<String>),
    Expr { expr: String },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorklistDef {
    #[serde(default)]
    pub description: String,
    /// Keys are catalog variable ids; the state variable name is allowed
    /// too, which is how most worklists select by state.
    #[serde(default)]
    pub var_matches: BTreeMap<String, WorklistMatch>,
    #[serde(default)]
    pub guard: Option<Guard>,
    #[serde(default)]
    pub action: Option<ActionBox>,
}

impl WorklistDef {
    pub fn match_keys(&self) -> Vec<&str> {
        self.var_matches.keys().map(String::as_str).collect()
    }

    pub fn var_match(&self, id: &str) -> Option<&WorklistMatch> {
        self.var_matches.get(id)
    }
}
