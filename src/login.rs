//! Pre-baked login mini-plan built on top of [`execute`].

use std::time::Duration;

use crate::config::ExecutorConfig;
use crate::executor::execute;
use crate::page::Page;
use crate::types::{ExecutionTrace, Plan, Step};

/// A username/password form behind a submit control.
///
/// The default points at the public saucedemo.com demo shop and its published
/// demo account.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginForm {
    pub entry_url: String,
    pub username_selector: String,
    pub username: String,
    pub password_selector: String,
    pub password: String,
    pub submit_selector: String,
    pub settle: Duration,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            entry_url: "https://www.saucedemo.com/".to_string(),
            username_selector: "#user-name".to_string(),
            username: "standard_user".to_string(),
            password_selector: "#password".to_string(),
            password: "secret_sauce".to_string(),
            submit_selector: "#login-button".to_string(),
            settle: Duration::from_secs(2),
        }
    }
}

impl LoginForm {
    /// Default form with credentials taken from `LOGIN_USERNAME` / `LOGIN_PASSWORD`
    /// when set.
    pub fn from_env() -> Self {
        let mut form = Self::default();
        if let Ok(username) = std::env::var("LOGIN_USERNAME") {
            form.username = username;
        }
        if let Ok(password) = std::env::var("LOGIN_PASSWORD") {
            form.password = password;
        }
        form
    }
}

pub fn login_plan(form: &LoginForm) -> Plan {
    Plan::from_steps([
        Step::navigate(&form.entry_url),
        Step::fill(&form.username_selector, &form.username),
        Step::fill(&form.password_selector, &form.password),
        Step::click(&form.submit_selector),
        Step::Wait {
            seconds: None,
            milliseconds: Some(u64::try_from(form.settle.as_millis()).unwrap_or(u64::MAX)),
        },
    ])
}

pub fn login<P: Page>(page: &P, form: &LoginForm, config: &ExecutorConfig) -> ExecutionTrace {
    execute(&login_plan(form), page, config)
}
