use crate::definition::{StateDef, TransitionDef, WorkflowDefinition};
use crate::shared::ids::{StateId, TransitionId};
use crate::shared::{Actor, Subject};
use crate::status::Status;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cell::OnceCell;

#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression compile failed for `{text}`: {reason}")]
    Compile { text: String, reason: String },
    #[error("expression evaluation failed for `{text}`: {reason}")]
    Eval { text: String, reason: String },
}

/// Read-only bindings handed to expression evaluation and scripts.
///
/// The status and kwargs snapshots belong to the engine; expressions see
/// them by reference and cannot mutate them. The timestamp is computed on
/// first access and stable for the lifetime of the scope.
pub struct StateChangeScope<'a> {
    pub subject: &'a Subject,
    pub workflow: &'a WorkflowDefinition,
    pub actor: Option<&'a Actor>,
    pub old_state_id: Option<&'a StateId>,
    pub old_state: Option<&'a StateDef>,
    pub new_state_id: Option<&'a StateId>,
    pub new_state: Option<&'a StateDef>,
    pub transition_id: Option<&'a TransitionId>,
    pub transition: Option<&'a TransitionDef>,
    pub status: &'a Status,
    pub kwargs: &'a Map<String, Value>,
    now: OnceCell<DateTime<Utc>>,
}

impl<'a> StateChangeScope<'a> {
    pub fn new(
        subject: &'a Subject,
        workflow: &'a WorkflowDefinition,
        status: &'a Status,
        kwargs: &'a Map<String, Value>,
    ) -> Self {
        Self {
            subject,
            workflow,
            actor: None,
            old_state_id: None,
            old_state: None,
            new_state_id: None,
            new_state: None,
            transition_id: None,
            transition: None,
            status,
            kwargs,
            now: OnceCell::new(),
        }
    }

    /// Current timestamp, memoized per scope so repeated reads within one
    /// evaluation agree.
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.get_or_init(Utc::now)
    }

    /// Resolves a dotted binding path against the scope. Unknown roots are
    /// an error for the caller to surface; a missing nested key is null.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        let rest: Vec<&str> = segments.collect();
        match root {
            "subject" => Some(match rest.as_slice() {
                [] | ["id"] => Value::String(self.subject.id.clone()),
                ["container"] => optional_string(self.subject.container.as_deref()),
                _ => Value::Null,
            }),
            "status" => Some(match rest.as_slice() {
                [] => Value::Object(Map::from_iter(
                    self.status.iter().map(|(k, v)| (k.clone(), v.clone())),
                )),
                [key] => self.status.get(*key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            "kwargs" => Some(match rest.as_slice() {
                [] => Value::Object(self.kwargs.clone()),
                [key] => self.kwargs.get(*key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            "container" | "workflow" | "actor" | "transition" | "old_state" | "new_state"
            | "now" => {
                if !rest.is_empty() {
                    // Scalar roots have no nested keys.
                    return Some(Value::Null);
                }
                Some(match root {
                    "container" => optional_string(self.subject.container.as_deref()),
                    "workflow" => Value::String(self.workflow.id.to_string()),
                    "actor" => optional_string(self.actor.map(Actor::id)),
                    "transition" => optional_string(self.transition_id.map(TransitionId::as_str)),
                    "old_state" => optional_string(self.old_state_id.map(StateId::as_str)),
                    "new_state" => optional_string(self.new_state_id.map(StateId::as_str)),
                    _ => Value::String(self.now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                })
            }
            _ => None,
        }
    }
}

fn optional_string(value: Option<&str>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

pub trait CompiledExpression: Send + Sync {
    fn eval(&self, scope: &StateChangeScope<'_>) -> Result<Value, ExpressionError>;
}

/// Expression seam. Compilation and evaluation semantics belong entirely
/// to the embedding application; the engine treats the pair as an opaque
/// pure function.
pub trait ExpressionEvaluator: Send + Sync {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError>;
}

pub fn evaluate(
    evaluator: &dyn ExpressionEvaluator,
    text: &str,
    scope: &StateChangeScope<'_>,
) -> Result<Value, ExpressionError> {
    evaluator.compile(text)?.eval(scope)
}

/// Truthiness for guard expressions: null, false, zero, and empty
/// strings/collections all fail the guard.
pub fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

/// Built-in evaluator for the common case: literals, dotted binding
/// paths, and `|` alternation where the first non-null alternative wins.
///
/// `kwargs.comment | ''` reads the `comment` keyword argument and falls
/// back to the empty string when absent.
#[derive(Debug, Clone, Default)]
pub struct PathExpressionEvaluator;

impl PathExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }
}

enum ParsedTerm {
    Literal(Value),
    Path(String),
}

struct ParsedExpression {
    text: String,
    alternatives: Vec<ParsedTerm>,
}

fn parse_term(raw: &str, text: &str) -> Result<ParsedTerm, ExpressionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExpressionError::Compile {
            text: text.to_string(),
            reason: "empty expression term".to_string(),
        });
    }
    if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
    {
        return Ok(ParsedTerm::Literal(Value::String(
            raw[1..raw.len() - 1].to_string(),
        )));
    }
    match raw {
        "true" => return Ok(ParsedTerm::Literal(Value::Bool(true))),
        "false" => return Ok(ParsedTerm::Literal(Value::Bool(false))),
        "null" | "nothing" => return Ok(ParsedTerm::Literal(Value::Null)),
        _ => {}
    }
    if let Ok(number) = serde_json::from_str::<Value>(raw) {
        if number.is_number() {
            return Ok(ParsedTerm::Literal(number));
        }
    }
    Ok(ParsedTerm::Path(raw.to_string()))
}

impl CompiledExpression for ParsedExpression {
    fn eval(&self, scope: &StateChangeScope<'_>) -> Result<Value, ExpressionError> {
        let mut result = Value::Null;
        for term in &self.alternatives {
            result = match term {
                ParsedTerm::Literal(value) => value.clone(),
                ParsedTerm::Path(path) => {
                    scope.lookup(path).ok_or_else(|| ExpressionError::Eval {
                        text: self.text.clone(),
                        reason: format!("unknown binding `{path}`"),
                    })?
                }
            };
            if !result.is_null() {
                break;
            }
        }
        Ok(result)
    }
}

impl ExpressionEvaluator for PathExpressionEvaluator {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledExpression>, ExpressionError> {
        let alternatives = text
            .split('|')
            .map(|term| parse_term(term, text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(ParsedExpression {
            text: text.to_string(),
            alternatives,
        }))
    }
}
