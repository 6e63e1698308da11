//! Gatekeeper for untrusted plan data.
//!
//! Only action-kind well-formedness is checked here. Per-action arguments
//! (a `click` without `selector`, a `navigate` without `url`) pass through and
//! surface as step errors when the plan runs.

use serde_json::Value;
use thiserror::Error;

/// Every action tag a plan may use, aliases included.
pub const RECOGNIZED_ACTIONS: &[&str] = &[
    "navigate",
    "open_url",
    "goto",
    "click",
    "fill",
    "type",
    "read_text",
    "wait",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanRejection {
    #[error("plan is not a list: {0}")]
    NotAList(String),

    #[error("step {index} is not an object: {raw}")]
    NotAnObject { index: usize, raw: String },

    #[error("missing action key in step {index}: {raw}")]
    MissingAction { index: usize, raw: String },

    #[error("invalid action '{action}' in step {index}: {raw}")]
    InvalidAction {
        index: usize,
        action: String,
        raw: String,
    },
}

/// Check a candidate plan, stopping at the first violation.
///
/// Step numbers in diagnostics are 1-based.
pub fn check(plan: &Value) -> Result<(), PlanRejection> {
    let Some(steps) = plan.as_array() else {
        return Err(PlanRejection::NotAList(plan.to_string()));
    };

    for (i, step) in steps.iter().enumerate() {
        let index = i + 1;
        let Some(fields) = step.as_object() else {
            return Err(PlanRejection::NotAnObject {
                index,
                raw: step.to_string(),
            });
        };

        let action = match fields.get("action") {
            Some(action) if !is_falsy(action) => action,
            _ => {
                return Err(PlanRejection::MissingAction {
                    index,
                    raw: step.to_string(),
                });
            }
        };

        match action.as_str() {
            Some(name) if RECOGNIZED_ACTIONS.contains(&name) => {}
            Some(name) => {
                return Err(PlanRejection::InvalidAction {
                    index,
                    action: name.to_string(),
                    raw: step.to_string(),
                });
            }
            None => {
                return Err(PlanRejection::InvalidAction {
                    index,
                    action: action.to_string(),
                    raw: step.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// `(accepted, diagnostic)` form of [`check`]; the diagnostic is `"ok"` on success.
pub fn validate(plan: &Value) -> (bool, String) {
    match check(plan) {
        Ok(()) => (true, "ok".to_string()),
        Err(rejection) => (false, rejection.to_string()),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
