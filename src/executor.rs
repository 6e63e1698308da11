use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::page::Page;
use crate::types::{ExecutionTrace, Plan, RunState, Step, StepOutcome, StepResult};

/// Walk `plan` once against `page`, stopping at the first step that does not
/// come back `ok`.
///
/// Never fails: backend faults become `exception` results in the trace. An
/// empty plan touches nothing on the page.
pub fn execute<P: Page>(plan: &Plan, page: &P, config: &ExecutorConfig) -> ExecutionTrace {
    let mut results = Vec::with_capacity(plan.len());
    if plan.is_empty() {
        return ExecutionTrace::new(RunState::Completed, results);
    }

    page.set_default_timeout(config.default_timeout);

    let mut state = RunState::Running;
    for (i, planned) in plan.steps().iter().enumerate() {
        let number = i + 1;
        let outcome = match planned.step() {
            Ok(step) => {
                info!(step = number, action = step.action(), "executing step");
                dispatch(step, page, config)
            }
            Err(detail) => StepOutcome::error(format!("malformed step: {detail}")),
        };

        let ok = outcome.is_ok();
        results.push(StepResult::new(planned.raw().clone(), outcome));

        if !ok {
            let failed = &results[results.len() - 1];
            warn!(
                step = number,
                status = failed.outcome.status(),
                reason = failed.reason().unwrap_or_default(),
                "halting plan"
            );
            state = RunState::HaltedOnError;
            break;
        }

        if !config.slow_mo.is_zero() {
            std::thread::sleep(config.slow_mo);
        }
    }

    if state == RunState::Running {
        state = RunState::Completed;
    }
    info!(state = ?state, attempted = results.len(), planned = plan.len(), "plan finished");
    ExecutionTrace::new(state, results)
}

fn dispatch<P: Page>(step: &Step, page: &P, config: &ExecutorConfig) -> StepOutcome {
    match step {
        Step::Navigate { url } => match page.navigate(url) {
            Ok(()) => StepOutcome::ok(),
            Err(e) => StepOutcome::exception(e),
        },
        Step::Click { selector, index } => on_element(page, selector, *index, config, |el| {
            page.element_click(el).map(|()| None)
        }),
        Step::Fill {
            selector,
            value,
            index,
        } => on_element(page, selector, *index, config, |el| {
            page.element_fill(el, value).map(|()| None)
        }),
        Step::ReadText { selector, index } => on_element(page, selector, *index, config, |el| {
            page.element_text(el).map(Some)
        }),
        Step::Wait {
            seconds,
            milliseconds,
        } => match wait_duration(*seconds, *milliseconds, config.default_wait) {
            Ok(delay) => {
                debug!(delay = ?delay, "sleeping");
                std::thread::sleep(delay);
                StepOutcome::ok()
            }
            Err(reason) => StepOutcome::error(reason),
        },
    }
}

/// Wait for `selector`, pick the `index`-th match and hand it to `act`.
fn on_element<'a, P: Page + 'a>(
    page: &'a P,
    selector: &str,
    index: usize,
    config: &ExecutorConfig,
    act: impl FnOnce(&P::Element<'a>) -> anyhow::Result<Option<String>>,
) -> StepOutcome {
    if let Err(e) = page.wait_for_selector(selector, config.element_timeout) {
        return StepOutcome::exception(e);
    }

    let mut matches = match page.query_all(selector) {
        Ok(matches) => matches,
        Err(e) => return StepOutcome::exception(e),
    };

    let count = matches.len();
    if index >= count {
        return StepOutcome::error(format!(
            "element not found at index {index} for selector '{selector}' ({count} matches)"
        ));
    }

    debug!(selector, index, count, "resolved element");
    let element = matches.swap_remove(index);
    match act(&element) {
        Ok(value) => StepOutcome::Ok { value },
        Err(e) => StepOutcome::exception(e),
    }
}

fn wait_duration(
    seconds: Option<f64>,
    milliseconds: Option<u64>,
    default: Duration,
) -> Result<Duration, String> {
    match (milliseconds, seconds) {
        (Some(ms), _) => Ok(Duration::from_millis(ms)),
        (None, Some(s)) => {
            Duration::try_from_secs_f64(s).map_err(|_| format!("invalid wait of {s} seconds"))
        }
        (None, None) => Ok(default),
    }
}
