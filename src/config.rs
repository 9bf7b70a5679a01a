use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_MAX_STEPS: usize = 15;
pub const DEFAULT_MIN_SUCCESSFUL_ACTIONS: usize = 2;
pub const DEFAULT_TYPE_TEXT: &str = "Test Project";
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Knobs for a capture run. Durations are time boxes the engine imposes on
/// driver primitives; the driver itself never times out on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub max_steps: usize,
    /// A `done` intent is only honored once this many actions have succeeded.
    pub min_successful_actions: usize,
    /// Used when a `type` intent arrives without text.
    pub default_type_text: String,
    pub tier_timeout: Duration,
    pub fill_timeout: Duration,
    pub navigation_timeout: Duration,
    pub change_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_pause: Duration,
    pub step_pause: Duration,
    pub idle_timeout: Duration,
    /// Upper bound on a single `wait` action.
    pub max_wait: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            min_successful_actions: DEFAULT_MIN_SUCCESSFUL_ACTIONS,
            default_type_text: DEFAULT_TYPE_TEXT.to_string(),
            tier_timeout: Duration::from_secs(3),
            fill_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
            change_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
            settle_pause: Duration::from_millis(500),
            step_pause: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(3),
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl CaptureConfig {
    /// Reads `MAX_STEPS`, `MIN_SUCCESSFUL_ACTIONS` and `DEFAULT_TYPE_TEXT`
    /// from the environment, falling back to defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("MAX_STEPS") {
            config.max_steps = parse_positive("MAX_STEPS", &raw)?;
        }
        if let Some(raw) = lookup("MIN_SUCCESSFUL_ACTIONS") {
            config.min_successful_actions = parse_positive("MIN_SUCCESSFUL_ACTIONS", &raw)?;
        }
        if let Some(text) = lookup("DEFAULT_TYPE_TEXT").filter(|t| !t.trim().is_empty()) {
            config.default_type_text = text;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_min_successful_actions(mut self, min: usize) -> Self {
        self.min_successful_actions = min;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::NotPositive {
                key: "MAX_STEPS",
                value: self.max_steps.to_string(),
            });
        }
        if self.min_successful_actions == 0 {
            return Err(ConfigError::NotPositive {
                key: "MIN_SUCCESSFUL_ACTIONS",
                value: self.min_successful_actions.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::NotPositive {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = CaptureConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.max_steps, 15);
        assert_eq!(config.default_type_text, "Test Project");
    }

    #[test]
    fn reads_overrides() {
        let config = CaptureConfig::from_lookup(|key| match key {
            "MAX_STEPS" => Some("8".to_string()),
            "MIN_SUCCESSFUL_ACTIONS" => Some(" 3 ".to_string()),
            "DEFAULT_TYPE_TEXT" => Some("Demo".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.max_steps, 8);
        assert_eq!(config.min_successful_actions, 3);
        assert_eq!(config.default_type_text, "Demo");
    }

    #[test]
    fn rejects_non_positive_counts() {
        for bad in ["0", "-1", "ten", ""] {
            let err = CaptureConfig::from_lookup(|key| {
                (key == "MAX_STEPS").then(|| bad.to_string())
            })
            .unwrap_err();
            assert!(matches!(err, ConfigError::NotPositive { key: "MAX_STEPS", .. }));
        }
        assert!(CaptureConfig::default().with_min_successful_actions(0).validate().is_err());
    }
}
