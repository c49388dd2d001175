use crate::definition::DefinitionError;
use crate::expression::ExpressionError;
use crate::scripting::ScriptError;
use crate::status::StatusStoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The current or destination state id resolves to no known state.
    /// Fatal to the transition attempt.
    #[error("subject `{subject_id}` cannot resolve state `{state_id}`")]
    UndefinedState {
        subject_id: String,
        state_id: String,
    },
    /// The requested action is unreachable, unknown, not user-triggered,
    /// or guard-rejected. Raised before any mutation.
    #[error("action `{action_id}` is not authorized for subject `{subject_id}`")]
    NotAuthorized {
        action_id: String,
        subject_id: String,
    },
    #[error("variable `{name}` is not defined by this workflow")]
    UnknownVariable { name: String },
    #[error("action box rendering failed for `{template}`: {reason}")]
    ActionRender { template: String, reason: String },
    #[error("worklist `{worklist_id}` search failed: {reason}")]
    WorklistSearch {
        worklist_id: String,
        reason: String,
    },
    #[error("expression failed: {0}")]
    Expression(#[from] ExpressionError),
    #[error("script failed: {0}")]
    Script(#[from] ScriptError),
    #[error("status store failed: {0}")]
    StatusStore(#[from] StatusStoreError),
    #[error("definition error: {0}")]
    Definition(String),
    #[error("engine log write failed at {path}: {source}")]
    Log {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<DefinitionError> for WorkflowError {
    fn from(value: DefinitionError) -> Self {
        Self::Definition(value.to_string())
    }
}
