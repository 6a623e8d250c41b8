use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scorer::{CreditZone, ScoringRule};
use super::stage::PracticeMode;
use crate::config::{env_f64, env_i32, env_u32, env_u64};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Response windows. Timed items get a window graded by their current
/// session score; accuracy items get one long window with no yellow zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    /// Window while the item's score is zero or below.
    pub slow_window: Duration,
    /// Window at score 1.
    pub medium_window: Duration,
    /// Window at score 2 and above.
    pub fast_window: Duration,
    /// Fraction of a timed window that counts as green.
    pub green_ratio: f64,
    pub accuracy_window: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            slow_window: Duration::from_millis(6000),
            medium_window: Duration::from_millis(4500),
            fast_window: Duration::from_millis(3000),
            green_ratio: 2.0 / 3.0,
            accuracy_window: Duration::from_millis(10_000),
        }
    }
}

impl TimingConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            slow_window: env_duration_ms("FLUENCY_SLOW_WINDOW_MS", defaults.slow_window),
            medium_window: env_duration_ms("FLUENCY_MEDIUM_WINDOW_MS", defaults.medium_window),
            fast_window: env_duration_ms("FLUENCY_FAST_WINDOW_MS", defaults.fast_window),
            green_ratio: env_f64("FLUENCY_GREEN_RATIO", defaults.green_ratio),
            accuracy_window: env_duration_ms(
                "FLUENCY_ACCURACY_WINDOW_MS",
                defaults.accuracy_window,
            ),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.green_ratio > 0.0 && self.green_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "FLUENCY_GREEN_RATIO",
                format!("{} is outside (0, 1]", self.green_ratio),
            ));
        }
        if self.fast_window.is_zero() || self.accuracy_window.is_zero() {
            return Err(ConfigError::invalid("FLUENCY_*_WINDOW_MS", "windows must be non-zero"));
        }
        if !(self.slow_window >= self.medium_window && self.medium_window >= self.fast_window) {
            return Err(ConfigError::invalid(
                "FLUENCY_*_WINDOW_MS",
                "timed windows must shrink as the score grows",
            ));
        }
        Ok(())
    }
}

/// Retry policy for the progress write outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl OutboxConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_u32("PROGRESS_WRITE_MAX_ATTEMPTS", defaults.max_attempts),
            base_delay: env_duration_ms("PROGRESS_WRITE_BASE_DELAY_MS", defaults.base_delay),
            max_delay: env_duration_ms("PROGRESS_WRITE_MAX_DELAY_MS", defaults.max_delay),
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "PROGRESS_WRITE_MAX_ATTEMPTS",
                "at least one attempt is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub timing: TimingConfig,
    pub accuracy_rule: ScoringRule,
    pub timed_rule: ScoringRule,
    pub outbox: OutboxConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            accuracy_rule: ScoringRule::accuracy_default(),
            timed_rule: ScoringRule::timed_default(),
            outbox: OutboxConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            timing: TimingConfig::from_env(),
            accuracy_rule: rule_from_env("ACCURACY", ScoringRule::accuracy_default()),
            timed_rule: rule_from_env("TIMED", ScoringRule::timed_default()),
            outbox: OutboxConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.accuracy_rule.validate()?;
        self.timed_rule.validate()?;
        self.outbox.validate()
    }

    pub fn rule_for(&self, mode: PracticeMode) -> &ScoringRule {
        match mode {
            PracticeMode::Accuracy => &self.accuracy_rule,
            PracticeMode::Timed => &self.timed_rule,
        }
    }
}

fn rule_from_env(prefix: &str, defaults: ScoringRule) -> ScoringRule {
    let key = |name: &str| format!("FLUENCY_{prefix}_{name}");
    ScoringRule {
        threshold: env_i32(&key("THRESHOLD"), defaults.threshold),
        min: env_i32(&key("MIN_SCORE"), defaults.min),
        max: env_i32(&key("MAX_SCORE"), defaults.max),
        reward: env_i32(&key("REWARD"), defaults.reward),
        penalty: env_i32(&key("PENALTY"), defaults.penalty),
        credit: match std::env::var(key("CREDIT")).ok().as_deref() {
            Some("green") => CreditZone::GreenOnly,
            Some("window") => CreditZone::AnyInWindow,
            _ => defaults.credit,
        },
    }
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_u64(key, default.as_millis() as u64))
}
