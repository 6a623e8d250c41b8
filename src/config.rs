use crate::fluency::fact::Operation;
use crate::fluency::stage::FluencyStage;

/// Settings for the terminal drill binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub user_id: String,
    pub track_id: String,
    pub operation: Operation,
    pub max_operand: i64,
    /// Stage the demo store seeds every fact at.
    pub seed_stage: FluencyStage,
    pub stage_filter: Option<FluencyStage>,
    pub max_facts: Option<usize>,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let operation = match std::env::var("FLUENCY_OPERATION").ok().as_deref() {
            Some("subtraction") => Operation::Subtraction,
            Some("multiplication") => Operation::Multiplication,
            Some("division") => Operation::Division,
            _ => Operation::Addition,
        };

        let seed_stage = std::env::var("FLUENCY_SEED_STAGE")
            .ok()
            .as_deref()
            .and_then(FluencyStage::parse)
            .unwrap_or(FluencyStage::Fluency6Practice);

        let stage_filter = std::env::var("FLUENCY_STAGE")
            .ok()
            .as_deref()
            .and_then(FluencyStage::parse);

        // 0 drills every eligible fact
        let max_facts = Some(env_u64("FLUENCY_MAX_FACTS", 6) as usize).filter(|n| *n > 0);

        Self {
            log_level,
            user_id: std::env::var("FLUENCY_USER_ID").unwrap_or_else(|_| "local".to_string()),
            track_id: std::env::var("FLUENCY_TRACK_ID").unwrap_or_else(|_| "default".to_string()),
            operation,
            max_operand: env_i64("FLUENCY_MAX_OPERAND", 5).clamp(1, 12),
            seed_stage,
            stage_filter,
            max_facts,
        }
    }
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(default)
}
