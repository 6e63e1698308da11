pub mod brain;
pub mod config;
pub mod executor;
pub mod face;
pub mod hands;
pub mod login;
pub mod page;
pub mod product;
pub mod types;
pub mod validate;

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::Path;

pub use config::ExecutorConfig;
pub use executor::execute;
pub use page::Page;
pub use types::{ExecutionTrace, Plan, RunState, Step, StepOutcome, StepResult};
pub use validate::{PlanRejection, validate};

/// Read a plan from a JSON file and put it through the validator.
pub fn load_plan(path: impl AsRef<Path>) -> Result<Plan> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open plan file {}", path.display()))?;
    let reader = BufReader::new(file);
    let raw: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let plan =
        Plan::from_value(raw).with_context(|| format!("invalid plan in {}", path.display()))?;
    Ok(plan)
}

pub fn save_trace(path: impl AsRef<Path>, trace: &ExecutionTrace) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path.as_ref())?;

    serde_json::to_writer_pretty(file, trace)?;
    Ok(())
}
