use anyhow::{Result, anyhow};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::login::LoginForm;
use crate::types::{ExecutionTrace, Plan, Step};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = r##"You write browser automation plans. Reply with a JSON array ONLY, one object per step, executed in order.

Every object MUST have an "action" key with one of:
- {"action":"navigate","url":"https://..."}
- {"action":"click","selector":"#css-selector","index":0}
- {"action":"fill","selector":"#css-selector","value":"text to enter","index":0}
- {"action":"read_text","selector":".css-selector","index":0}
- {"action":"wait","seconds":1}
"open_url" and "goto" are accepted for "navigate", "type" for "fill".

Rules:
1. No markdown, no explanation, no code. Pure JSON.
2. "index" picks the n-th match (0-based) when a selector matches several elements; omit it for the first match.
3. Navigate before interacting with a page you are not on yet.
4. Execution stops at the first failing step."##;

/// Turns a free-text request into a candidate plan via an OpenAI-style chat API.
///
/// The output is untrusted: it still has to go through the validator.
pub struct Planner {
    client: Client,
    api_key: String,
    model: String,
    fallback: Plan,
}

impl Planner {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            fallback: fallback_plan(&LoginForm::default()),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY not set in environment"))?;
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(api_key, model))
    }

    /// Replace the plan returned by [`Planner::plan_or_fallback`] on failure.
    pub fn with_fallback(mut self, fallback: Plan) -> Self {
        self.fallback = fallback;
        self
    }

    pub async fn generate_plan(&self, request: &str) -> Result<Value> {
        info!(model = %self.model, "generating plan");
        let content = self.complete(format!("User request: {}", request)).await?;
        parse_plan_reply(&content)
    }

    /// Like [`Planner::generate_plan`], but any failure yields the fallback plan.
    pub async fn plan_or_fallback(&self, request: &str) -> Value {
        match self.generate_plan(request).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("planner failed, using fallback plan: {:#}", e);
                self.fallback.to_value()
            }
        }
    }

    /// Ask for a new plan after `trace` halted, showing the model what went wrong.
    pub async fn replan(
        &self,
        request: &str,
        previous: &Value,
        trace: &ExecutionTrace,
    ) -> Result<Value> {
        info!(model = %self.model, "replanning");
        let content = self.complete(replan_message(request, previous, trace)).await?;
        parse_plan_reply(&content)
    }

    async fn complete(&self, user_message: String) -> Result<String> {
        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": user_message},
                ],
                "temperature": 0.2,
            }))
            .send()
            .await?;

        let status = response.status();
        let json_resp: Value = response.json().await?;

        if !status.is_success() {
            let err_msg = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            return Err(anyhow!("OpenAI API error ({}): {}", status, err_msg));
        }

        let content = json_resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("No content in LLM response: {}", json_resp))?;

        debug!(reply = content, "LLM replied");
        Ok(content.to_string())
    }
}

/// Extract the JSON array from a model reply, tolerating markdown fences.
pub fn parse_plan_reply(content: &str) -> Result<Value> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let plan: Value = serde_json::from_str(cleaned)
        .map_err(|e| anyhow!("Failed to parse LLM response: {}", e))?;
    if !plan.is_array() {
        return Err(anyhow!("LLM did not return a list of steps."));
    }
    Ok(plan)
}

/// User message for a corrected plan: the request, the plan that ran and
/// how it ended.
pub fn replan_message(request: &str, previous: &Value, trace: &ExecutionTrace) -> String {
    let mut message = format!(
        "User request: {}\n\nThe previous plan was:\n{}\n\n",
        request, previous
    );
    match trace.failure() {
        Some(failed) => message.push_str(&format!(
            "It stopped at step {} ({}) with {}: {}\nWrite a corrected plan.",
            trace.len(),
            failed.step,
            failed.outcome.status(),
            failed.reason().unwrap_or_default()
        )),
        None => message.push_str(
            "It completed, but the request is not satisfied. Write a better plan.",
        ),
    }
    message
}

/// Plan used when the planner cannot produce one: open the form's page and submit it.
pub fn fallback_plan(form: &LoginForm) -> Plan {
    Plan::from_steps([
        Step::navigate(&form.entry_url),
        Step::wait_seconds(2.0),
        Step::click(&form.submit_selector),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunState, StepOutcome, StepResult};

    #[test]
    fn strips_markdown_fences() {
        let reply = "```json\n[{\"action\":\"click\",\"selector\":\"#a\"}]\n```";
        let plan = parse_plan_reply(reply).unwrap();
        assert_eq!(plan, json!([{"action": "click", "selector": "#a"}]));
    }

    #[test]
    fn object_reply_is_not_a_plan() {
        let err = parse_plan_reply(r#"{"action":"click"}"#).unwrap_err();
        assert!(err.to_string().contains("list of steps"));
    }

    #[test]
    fn prose_reply_fails_to_parse() {
        assert!(parse_plan_reply("Sure! Here is your plan.").is_err());
    }

    #[test]
    fn prompt_lists_every_recognized_action() {
        for action in crate::validate::RECOGNIZED_ACTIONS {
            assert!(
                SYSTEM_PROMPT.contains(&format!("\"{action}\"")),
                "prompt does not mention {action}"
            );
        }
    }

    #[test]
    fn fallback_plan_is_valid() {
        let plan = fallback_plan(&LoginForm::default()).to_value();
        assert_eq!(crate::validate::validate(&plan), (true, "ok".into()));
        assert_eq!(plan[0], json!({"action": "navigate", "url": "https://www.saucedemo.com/"}));
        assert_eq!(plan[1], json!({"action": "wait", "seconds": 2.0}));
        assert_eq!(plan[2]["selector"], "#login-button");
    }

    #[test]
    fn fallback_plan_follows_the_login_form() {
        let form = LoginForm {
            entry_url: "https://shop.test/login".into(),
            submit_selector: "button[type=submit]".into(),
            ..LoginForm::default()
        };
        let plan = fallback_plan(&form).to_value();
        assert_eq!(plan[0]["url"], "https://shop.test/login");
        assert_eq!(plan[2]["selector"], "button[type=submit]");
    }

    #[test]
    fn replan_message_carries_the_failing_step() {
        let previous = json!([
            {"action": "navigate", "url": "https://example.com"},
            {"action": "click", "selector": ".item", "index": 5},
        ]);
        let trace = ExecutionTrace::new(
            RunState::HaltedOnError,
            vec![
                StepResult::new(previous[0].clone(), StepOutcome::ok()),
                StepResult::new(
                    previous[1].clone(),
                    StepOutcome::error("element not found at index 5 for selector '.item'"),
                ),
            ],
        );

        let message = replan_message("open the sixth item", &previous, &trace);

        assert!(message.starts_with("User request: open the sixth item"));
        assert!(message.contains(&previous.to_string()));
        let failing = r#"step 2 ({"action":"click","index":5,"selector":".item"}) with error"#;
        assert!(message.contains(failing), "{message}");
        assert!(message.contains("element not found at index 5"));
        assert!(message.ends_with("Write a corrected plan."));
    }

    #[test]
    fn replan_message_after_a_completed_run() {
        let trace = ExecutionTrace::new(RunState::Completed, vec![]);
        let message = replan_message("find the price", &json!([]), &trace);
        assert!(message.contains("It completed, but the request is not satisfied"));
    }

    #[tokio::test]
    async fn unreachable_api_falls_back() {
        let fallback = Plan::from_steps([Step::navigate("https://fallback.test/")]);
        let mut planner =
            Planner::new("test-key", DEFAULT_MODEL).with_fallback(fallback.clone());
        planner.client = Client::builder()
            .proxy(reqwest::Proxy::all("http://127.0.0.1:9").unwrap())
            .build()
            .unwrap();
        let plan = planner.plan_or_fallback("log in").await;
        assert_eq!(plan, fallback.to_value());
    }
}
