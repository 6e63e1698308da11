use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use plan_pilot::brain::{Planner, fallback_plan};
use plan_pilot::face::{self, AppState};
use plan_pilot::hands::{BrowserOptions, BrowserSession};
use plan_pilot::login::{LoginForm, login};
use plan_pilot::page::PageSource;
use plan_pilot::product::{ProductReport, run_product_task};
use plan_pilot::{ExecutionTrace, ExecutorConfig, Plan, execute, load_plan, save_trace, validate};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plan-pilot", version, about = "Validate and run browser action plans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a plan file without touching a browser
    Validate { plan: PathBuf },
    /// Execute a plan file
    Run {
        plan: PathBuf,
        #[command(flatten)]
        browser: BrowserArgs,
        /// Write the execution trace here as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ask the LLM for a plan, optionally executing it
    Plan {
        prompt: String,
        /// Run the plan after printing it
        #[arg(long = "execute")]
        run: bool,
        /// Ask for a corrected plan this many times after a failed run
        #[arg(long, default_value_t = 0)]
        replan: u32,
        #[command(flatten)]
        browser: BrowserArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Log in, then look a product up in the inventory by keyword
    Product {
        keyword: String,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Accept runs over HTTP (POST /run-task)
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[derive(Args, Clone)]
struct BrowserArgs {
    #[arg(long)]
    headless: bool,
    /// Attach to a running Chrome instead of launching one
    #[arg(long, env = "CHROME_DEBUG_URL")]
    attach: Option<String>,
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,
    /// Log in with the demo form before running the plan
    #[arg(long)]
    login: bool,
    /// Pause after every successful step
    #[arg(long)]
    slow_mo_ms: Option<u64>,
}

impl BrowserArgs {
    fn options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            attach_url: self.attach.clone(),
            chrome_path: self.chrome.clone(),
        }
    }

    fn executor_config(&self) -> Result<ExecutorConfig> {
        let config = ExecutorConfig::from_env()?;
        Ok(match self.slow_mo_ms {
            Some(ms) => config.with_slow_mo(Duration::from_millis(ms)),
            None => config,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { plan } => validate_file(&plan),
        Command::Run { plan, browser, out } => {
            let plan = load_plan(&plan)?;
            let trace = run_plan(plan, &browser).await?;
            report(&trace, out.as_deref())
        }
        Command::Plan {
            prompt,
            run,
            replan,
            browser,
            out,
        } => plan_command(&prompt, run, replan, &browser, out.as_deref()).await,
        Command::Product { keyword, browser } => {
            let report = product_command(keyword, &browser).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                bail!(report.message);
            }
            info!("{}", report.message);
            Ok(())
        }
        Command::Serve { bind, browser } => {
            let config = browser.executor_config()?;
            let session = launch(browser.options()).await?;
            let planner = match planner() {
                Ok(planner) => Some(planner),
                Err(e) => {
                    warn!("prompt runs disabled: {:#}", e);
                    None
                }
            };
            let mut state = AppState::new(session, config);
            state.planner = planner;
            state.login_form = LoginForm::from_env();
            let state = Arc::new(state);
            face::serve(&bind, state).await
        }
    }
}

/// Planner from the environment that falls back to opening the login form.
fn planner() -> Result<Planner> {
    Ok(Planner::from_env()?.with_fallback(fallback_plan(&LoginForm::from_env())))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn validate_file(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let raw: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let (accepted, diagnostic) = validate(&raw);
    println!("{}", diagnostic);
    if !accepted {
        bail!("plan rejected");
    }
    Ok(())
}

async fn plan_command(
    prompt: &str,
    run: bool,
    replan: u32,
    browser: &BrowserArgs,
    out: Option<&Path>,
) -> Result<()> {
    let planner = planner()?;
    let mut raw = planner.plan_or_fallback(prompt).await;
    println!("{}", serde_json::to_string_pretty(&raw)?);
    if !run {
        return Ok(());
    }

    let config = browser.executor_config()?;
    let session = launch(browser.options()).await?;
    if browser.login {
        login_first(&session, &config).await?;
    }

    let mut attempts = 0;
    loop {
        let plan = Plan::from_value(raw.clone())?;
        let trace = execute_on(&session, plan, config.clone()).await?;
        if trace.is_success() || attempts >= replan {
            return report(&trace, out);
        }

        attempts += 1;
        info!(attempt = attempts, "run failed, asking for a corrected plan");
        raw = planner.replan(prompt, &raw, &trace).await?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
    }
}

async fn run_plan(plan: Plan, browser: &BrowserArgs) -> Result<ExecutionTrace> {
    let config = browser.executor_config()?;
    let session = launch(browser.options()).await?;
    if browser.login {
        login_first(&session, &config).await?;
    }
    execute_on(&session, plan, config).await
}

async fn product_command(keyword: String, browser: &BrowserArgs) -> Result<ProductReport> {
    let config = browser.executor_config()?;
    let session = launch(browser.options()).await?;
    let page = session.page();
    let form = LoginForm::from_env();
    tokio::task::spawn_blocking(move || run_product_task(&page, &form, &keyword, &config))
        .await
        .map_err(|e| anyhow!("product search panicked: {}", e))
}

async fn launch(options: BrowserOptions) -> Result<BrowserSession> {
    tokio::task::spawn_blocking(move || BrowserSession::launch(&options))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {}", e))?
}

async fn login_first(session: &BrowserSession, config: &ExecutorConfig) -> Result<()> {
    let page = session.page();
    let config = config.clone();
    let form = LoginForm::from_env();
    let trace = tokio::task::spawn_blocking(move || login(&page, &form, &config))
        .await
        .map_err(|e| anyhow!("login panicked: {}", e))?;
    let (success, message) = trace.summary();
    if !success {
        bail!("login failed: {}", message);
    }
    info!("logged in");
    Ok(())
}

// Execute in a blocking context so we don't stall tokio
async fn execute_on(
    session: &BrowserSession,
    plan: Plan,
    config: ExecutorConfig,
) -> Result<ExecutionTrace> {
    let page = session.page();
    tokio::task::spawn_blocking(move || execute(&plan, &page, &config))
        .await
        .map_err(|e| anyhow!("plan run panicked: {}", e))
}

fn report(trace: &ExecutionTrace, out: Option<&Path>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(trace)?);
    if let Some(path) = out {
        save_trace(path, trace)?;
        info!(path = %path.display(), "trace written");
    }

    let (success, message) = trace.summary();
    if !success {
        bail!(message);
    }
    info!("{}", message);
    Ok(())
}
