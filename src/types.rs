use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate::{self, PlanRejection};

/// A single atomic step of a plan.
///
/// The `action` tag and the field names below are the wire schema that plan
/// producers (humans, files, the LLM planner) have to honor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    #[serde(alias = "open_url", alias = "goto")]
    Navigate { url: String },
    Click {
        selector: String,
        #[serde(default)]
        index: usize,
    },
    #[serde(alias = "type")]
    Fill {
        selector: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        index: usize,
    },
    ReadText {
        selector: String,
        #[serde(default)]
        index: usize,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seconds: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        milliseconds: Option<u64>,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Navigate { .. } => "navigate",
            Step::Click { .. } => "click",
            Step::Fill { .. } => "fill",
            Step::ReadText { .. } => "read_text",
            Step::Wait { .. } => "wait",
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate { url: url.into() }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        Step::Click {
            selector: selector.into(),
            index: 0,
        }
    }

    pub fn fill(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Step::Fill {
            selector: selector.into(),
            value: value.into(),
            index: 0,
        }
    }

    pub fn read_text(selector: impl Into<String>) -> Self {
        Step::ReadText {
            selector: selector.into(),
            index: 0,
        }
    }

    pub fn wait_seconds(seconds: f64) -> Self {
        Step::Wait {
            seconds: Some(seconds),
            milliseconds: None,
        }
    }
}

/// A step as it arrived from the producer, plus its typed form.
///
/// Arguments are only checked when the step is parsed; a step whose action is
/// recognized but whose arguments are unusable keeps the parse error and is
/// reported when the executor reaches it.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    raw: Value,
    parsed: Result<Step, String>,
}

impl PlannedStep {
    fn from_raw(raw: Value) -> Self {
        let parsed = serde_json::from_value::<Step>(raw.clone()).map_err(|e| e.to_string());
        Self { raw, parsed }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn step(&self) -> Result<&Step, &str> {
        self.parsed.as_ref().map_err(String::as_str)
    }
}

impl From<Step> for PlannedStep {
    fn from(step: Step) -> Self {
        let raw = serde_json::to_value(&step).unwrap_or(Value::Null);
        Self {
            raw,
            parsed: Ok(step),
        }
    }
}

/// An ordered, validated sequence of steps. Order is execution order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<PlannedStep>,
}

impl Plan {
    /// Gate untrusted plan data through the validator and keep it for execution.
    pub fn from_value(raw: Value) -> Result<Self, PlanRejection> {
        validate::check(&raw)?;
        let steps = match raw {
            Value::Array(items) => items.into_iter().map(PlannedStep::from_raw).collect(),
            _ => Vec::new(),
        };
        Ok(Self { steps })
    }

    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().map(PlannedStep::from).collect(),
        }
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.steps.iter().map(|s| s.raw.clone()).collect())
    }
}

/// Outcome of dispatching one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Expected failure the backend reported without faulting.
    Error { reason: String },
    /// Backend fault caught at the step boundary.
    Exception { error: String },
}

impl StepOutcome {
    pub fn ok() -> Self {
        StepOutcome::Ok { value: None }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        StepOutcome::Error {
            reason: reason.into(),
        }
    }

    pub fn exception(err: anyhow::Error) -> Self {
        StepOutcome::Exception {
            error: format!("{:#}", err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Ok { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            StepOutcome::Ok { .. } => "ok",
            StepOutcome::Error { .. } => "error",
            StepOutcome::Exception { .. } => "exception",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub step: Value,
}

impl StepResult {
    pub fn new(step: Value, outcome: StepOutcome) -> Self {
        Self { outcome, step }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.outcome {
            StepOutcome::Ok { value } => value.as_deref(),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            StepOutcome::Ok { .. } => None,
            StepOutcome::Error { reason } => Some(reason),
            StepOutcome::Exception { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    HaltedOnError,
    Completed,
}

/// Ordered results of one execution, at most one per planned step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    state: RunState,
    results: Vec<StepResult>,
}

impl ExecutionTrace {
    pub(crate) fn new(state: RunState, results: Vec<StepResult>) -> Self {
        Self { state, results }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// The result that halted the run, if any.
    pub fn failure(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| !r.outcome.is_ok())
    }

    /// Every value read by a `read_text` step, in plan order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(StepResult::value)
    }

    /// Success flag plus a one-line message for callers that only want that.
    pub fn summary(&self) -> (bool, String) {
        if let Some(failed) = self.failure() {
            let action = failed
                .step
                .get("action")
                .and_then(Value::as_str)
                .unwrap_or("?");
            return (
                false,
                format!(
                    "step {} ({}) {}: {}",
                    self.results.len(),
                    action,
                    failed.outcome.status(),
                    failed.reason().unwrap_or_default()
                ),
            );
        }

        let mut message = format!("completed {} steps", self.results.len());
        let values: Vec<&str> = self.values().collect();
        if !values.is_empty() {
            message.push_str(&format!("; read: {}", values.join(" | ")));
        }
        (true, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_map_onto_canonical_actions() {
        let open: Step = serde_json::from_value(json!({"action": "open_url", "url": "a"})).unwrap();
        let goto: Step = serde_json::from_value(json!({"action": "goto", "url": "a"})).unwrap();
        let typed: Step =
            serde_json::from_value(json!({"action": "type", "selector": "#q", "value": "rust"}))
                .unwrap();

        assert_eq!(open, Step::navigate("a"));
        assert_eq!(goto, Step::navigate("a"));
        assert_eq!(typed, Step::fill("#q", "rust"));
    }

    #[test]
    fn optional_fields_take_defaults() {
        let fill: Step =
            serde_json::from_value(json!({"action": "fill", "selector": "#q"})).unwrap();
        assert_eq!(fill, Step::fill("#q", ""));

        let wait: Step = serde_json::from_value(json!({"action": "wait"})).unwrap();
        assert_eq!(
            wait,
            Step::Wait {
                seconds: None,
                milliseconds: None
            }
        );
    }

    #[test]
    fn recognized_action_with_bad_arguments_is_kept_as_parse_error() {
        let plan = Plan::from_value(json!([{"action": "click"}])).unwrap();
        let err = plan.steps()[0].step().unwrap_err();
        assert!(err.contains("selector"), "{err}");
    }

    #[test]
    fn step_result_serializes_flat() {
        let result = StepResult::new(
            json!({"action": "read_text", "selector": ".price"}),
            StepOutcome::Ok {
                value: Some("$10".into()),
            },
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "status": "ok",
                "value": "$10",
                "step": {"action": "read_text", "selector": ".price"}
            })
        );

        let error = StepResult::new(json!({}), StepOutcome::error("missing"));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"status": "error", "reason": "missing", "step": {}})
        );
    }

    #[test]
    fn summary_names_the_failing_step() {
        let trace = ExecutionTrace::new(
            RunState::HaltedOnError,
            vec![
                StepResult::new(json!({"action": "navigate"}), StepOutcome::ok()),
                StepResult::new(
                    json!({"action": "click"}),
                    StepOutcome::error("element not found at index 3"),
                ),
            ],
        );
        let (success, message) = trace.summary();
        assert!(!success);
        assert_eq!(message, "step 2 (click) error: element not found at index 3");
    }
}
