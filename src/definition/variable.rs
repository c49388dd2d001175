use crate::definition::guard::Guard;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VariableDef {
    #[serde(default)]
    pub description: String,
    /// Exposed to external indexing via the catalog export.
    #[serde(default = "default_true")]
    pub for_catalog: bool,
    /// Persisted in every status record.
    #[serde(default = "default_true")]
    pub for_status: bool,
    /// When false, a value already present in the former status survives a
    /// transition unless a state or transition override applies.
    #[serde(default = "default_true")]
    pub update_always: bool,
    #[serde(default)]
    pub default_value: Value,
    /// Overrides `default_value` when present.
    #[serde(default)]
    pub default_expr: Option<String>,
    /// Gates read access through `get_info_for`.
    #[serde(default)]
    pub info_guard: Option<Guard>,
}

impl Default for VariableDef {
    fn default() -> Self {
        Self {
            description: String::new(),
            for_catalog: true,
            for_status: true,
            update_always: true,
            default_value: Value::Null,
            default_expr: None,
            info_guard: None,
        }
    }
}

fn default_true() -> bool {
    true
}
