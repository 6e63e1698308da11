//! HTTP trigger for plan runs: `POST /run-task`.

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::brain::Planner;
use crate::config::ExecutorConfig;
use crate::executor::execute;
use crate::login::{LoginForm, login};
use crate::page::PageSource;
use crate::product::run_product_task;
use crate::types::{ExecutionTrace, Plan};

pub struct AppState<S> {
    /// One run at a time owns the page; the lock is held until the run ends.
    pub session: Arc<Mutex<S>>,
    pub planner: Option<Planner>,
    pub config: ExecutorConfig,
    pub login_form: LoginForm,
}

impl<S> AppState<S> {
    pub fn new(session: S, config: ExecutorConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            planner: None,
            config,
            login_form: LoginForm::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub plan: Option<Value>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Log in, then look this product up in the inventory.
    #[serde(default)]
    pub product_keyword: Option<String>,
    /// Run the login mini-plan first.
    #[serde(default)]
    pub login: bool,
    /// Pause after every successful step, in milliseconds.
    #[serde(default)]
    pub delay: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
}

impl RunResponse {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            trace: None,
        }
    }
}

enum Job {
    Plan { plan: Plan, login: bool },
    Product { keyword: String },
}

pub fn router<S: PageSource>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/run-task", post(run_task_handler::<S>))
        .with_state(state)
}

pub async fn serve<S: PageSource>(bind: &str, state: Arc<AppState<S>>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "HTTP trigger listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn run_task_handler<S: PageSource>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RunRequest>,
) -> (StatusCode, Json<RunResponse>) {
    let mut config = state.config.clone();
    if let Some(ms) = request.delay {
        config = config.with_slow_mo(Duration::from_millis(ms));
    }

    let job = match job_for(&state, request).await {
        Ok(job) => job,
        Err(rejected) => return rejected,
    };

    // The owned guard moves into the blocking run, so the page stays locked
    // even if this request is dropped before the run finishes.
    let session = state.session.clone().lock_owned().await;
    let form = state.login_form.clone();

    let joined = tokio::task::spawn_blocking(move || {
        let page = session.page();
        match job {
            Job::Product { keyword } => {
                let report = run_product_task(&page, &form, &keyword, &config);
                RunResponse {
                    success: report.success,
                    message: report.message,
                    trace: report.trace,
                }
            }
            Job::Plan { plan, login: log_in } => {
                if log_in {
                    let trace = login(&page, &form, &config);
                    if !trace.is_success() {
                        let (_, message) = trace.summary();
                        return RunResponse {
                            success: false,
                            message: format!("login failed: {}", message),
                            trace: Some(trace),
                        };
                    }
                }
                let trace = execute(&plan, &page, &config);
                let (success, message) = trace.summary();
                RunResponse {
                    success,
                    message,
                    trace: Some(trace),
                }
            }
        }
    })
    .await;

    match joined {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            error!("plan run panicked: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RunResponse::failed(format!("plan run panicked: {}", e))),
            )
        }
    }
}

/// Turn the request into something runnable, or the response rejecting it.
/// Nothing here touches the page.
async fn job_for<S>(
    state: &AppState<S>,
    request: RunRequest,
) -> Result<Job, (StatusCode, Json<RunResponse>)> {
    if let Some(keyword) = request.product_keyword {
        return Ok(Job::Product { keyword });
    }

    let raw = match (request.plan, request.prompt) {
        (Some(plan), _) => plan,
        (None, Some(prompt)) => match &state.planner {
            Some(planner) => planner.plan_or_fallback(&prompt).await,
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(RunResponse::failed("no planner configured; send a plan")),
                ));
            }
        },
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(RunResponse::failed(
                    "request needs a plan, a prompt or a product_keyword",
                )),
            ));
        }
    };

    match Plan::from_value(raw) {
        Ok(plan) => Ok(Job::Plan {
            plan,
            login: request.login,
        }),
        Err(rejection) => {
            info!(%rejection, "rejected plan");
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(RunResponse::failed(rejection.to_string())),
            ))
        }
    }
}
