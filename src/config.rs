use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Timing knobs threaded through one plan execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Bound on the element-presence wait before click/fill/read_text.
    pub element_timeout: Duration,
    /// Applied to the page once, before the first step runs.
    pub default_timeout: Duration,
    /// Delay of a `wait` step that gives neither `seconds` nor `milliseconds`.
    pub default_wait: Duration,
    /// Pause after every successful step, for watching a headed browser.
    pub slow_mo: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            element_timeout: DEFAULT_ELEMENT_TIMEOUT,
            default_timeout: DEFAULT_PAGE_TIMEOUT,
            default_wait: DEFAULT_WAIT,
            slow_mo: Duration::ZERO,
        }
    }
}

impl ExecutorConfig {
    /// Read overrides from `PLAN_*_MS` variables. Call `dotenvy::dotenv()` first
    /// to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| {
                        format!("{key} must be a whole number of milliseconds, got '{raw}'")
                    }),
                None => Ok(fallback),
            }
        };

        Ok(Self {
            element_timeout: millis("PLAN_ELEMENT_TIMEOUT_MS", defaults.element_timeout)?,
            default_timeout: millis("PLAN_DEFAULT_TIMEOUT_MS", defaults.default_timeout)?,
            default_wait: millis("PLAN_DEFAULT_WAIT_MS", defaults.default_wait)?,
            slow_mo: millis("PLAN_SLOW_MO_MS", defaults.slow_mo)?,
        })
    }

    pub fn with_slow_mo(mut self, slow_mo: Duration) -> Self {
        self.slow_mo = slow_mo;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_reference_values() {
        let config = ExecutorConfig::default();
        assert_eq!(config.element_timeout, Duration::from_secs(5));
        assert_eq!(config.default_timeout, Duration::from_secs(15));
        assert_eq!(config.default_wait, Duration::from_secs(1));
        assert_eq!(config.slow_mo, Duration::ZERO);
    }

    #[test]
    fn lookup_overrides_individual_values() {
        let vars = HashMap::from([
            ("PLAN_ELEMENT_TIMEOUT_MS", "250"),
            ("PLAN_SLOW_MO_MS", " 500 "),
        ]);
        let config =
            ExecutorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.element_timeout, Duration::from_millis(250));
        assert_eq!(config.slow_mo, Duration::from_millis(500));
        assert_eq!(config.default_timeout, DEFAULT_PAGE_TIMEOUT);
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let err = ExecutorConfig::from_lookup(|k| {
            (k == "PLAN_DEFAULT_WAIT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("PLAN_DEFAULT_WAIT_MS"));
    }
}
