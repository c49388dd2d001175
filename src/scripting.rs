use crate::expression::StateChangeScope;
use crate::shared::ids::ScriptId;
use crate::shared::Subject;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a side-effect script did to the subject. Relocation and removal
/// are ordinary return values here, consumed by the engine's chaining
/// loop rather than thrown through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Continue,
    Relocated(Subject),
    Removed,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script `{script_id}` is not registered")]
    Unknown { script_id: String },
    #[error("script `{script_id}` failed: {reason}")]
    Failed { script_id: String, reason: String },
    #[error("no script runner configured but transition names script `{script_id}`")]
    NoRunner { script_id: String },
}

/// Script seam. Before-scripts run against the former status,
/// after-scripts against the freshly persisted one.
pub trait ScriptRunner: Send + Sync {
    fn run(
        &self,
        script_id: &ScriptId,
        scope: &StateChangeScope<'_>,
    ) -> Result<ScriptOutcome, ScriptError>;
}

/// Default runner: rejects any script reference. Engines built without
/// `with_scripts` fail loudly instead of skipping configured scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScriptRunner;

impl ScriptRunner for NoScriptRunner {
    fn run(
        &self,
        script_id: &ScriptId,
        _scope: &StateChangeScope<'_>,
    ) -> Result<ScriptOutcome, ScriptError> {
        Err(ScriptError::NoRunner {
            script_id: script_id.to_string(),
        })
    }
}

type ScriptFn = dyn Fn(&StateChangeScope<'_>) -> Result<ScriptOutcome, ScriptError> + Send + Sync;

/// Closure registry keyed by script id.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    scripts: BTreeMap<ScriptId, Arc<ScriptFn>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, script_id: ScriptId, script: F) -> Self
    where
        F: Fn(&StateChangeScope<'_>) -> Result<ScriptOutcome, ScriptError> + Send + Sync + 'static,
    {
        self.scripts.insert(script_id, Arc::new(script));
        self
    }
}

impl ScriptRunner for ScriptRegistry {
    fn run(
        &self,
        script_id: &ScriptId,
        scope: &StateChangeScope<'_>,
    ) -> Result<ScriptOutcome, ScriptError> {
        let script = self
            .scripts
            .get(script_id)
            .ok_or_else(|| ScriptError::Unknown {
                script_id: script_id.to_string(),
            })?;
        script(scope)
    }
}
