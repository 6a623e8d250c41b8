//! Bounded per-item mastery score with asymmetric reward and penalty.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::config::ConfigError;
use super::fact::PermutationId;
use super::timer::Zone;

/// Which zones turn a correct answer into credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CreditZone {
    GreenOnly,
    AnyInWindow,
}

impl CreditZone {
    pub fn allows(&self, zone: Zone) -> bool {
        match self {
            Self::GreenOnly => zone == Zone::Green,
            Self::AnyInWindow => zone != Zone::Expired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRule {
    pub threshold: i32,
    pub min: i32,
    pub max: i32,
    pub reward: i32,
    pub penalty: i32,
    pub credit: CreditZone,
}

impl ScoringRule {
    pub fn accuracy_default() -> Self {
        Self {
            threshold: 2,
            min: -4,
            max: 2,
            reward: 1,
            penalty: 2,
            credit: CreditZone::AnyInWindow,
        }
    }

    pub fn timed_default() -> Self {
        Self {
            threshold: 3,
            min: -4,
            max: 3,
            reward: 1,
            penalty: 2,
            credit: CreditZone::GreenOnly,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            key: "scoring rule",
            reason,
        };
        if self.min > 0 || self.min > self.max {
            return Err(invalid(format!("bounds [{}, {}] must contain 0", self.min, self.max)));
        }
        if self.threshold <= 0 || self.threshold > self.max {
            return Err(invalid(format!(
                "threshold {} must be in (0, {}]",
                self.threshold, self.max
            )));
        }
        if self.reward <= 0 || self.penalty <= 0 {
            return Err(invalid("reward and penalty must be positive".to_string()));
        }
        Ok(())
    }

    pub fn clamp(&self, score: i32) -> i32 {
        score.clamp(self.min, self.max)
    }

    pub fn is_mastered(&self, score: i32) -> bool {
        score >= self.threshold
    }

    pub fn is_creditable(&self, attempt: &Attempt) -> bool {
        attempt.outcome == AttemptOutcome::Correct && self.credit.allows(attempt.zone)
    }

    /// New score for one attempt. Pure: no state, no persistence.
    pub fn apply(&self, old: i32, attempt: &Attempt) -> ScoreUpdate {
        let creditable = self.is_creditable(attempt);
        let delta = if creditable { self.reward } else { -self.penalty };
        let new = self.clamp(old.saturating_add(delta));
        ScoreUpdate {
            old,
            new,
            creditable,
            crossed: old < self.threshold && self.threshold <= new,
        }
    }
}

/// A submission after input parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerInput {
    Value(i64),
    Invalid,
}

impl AnswerInput {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(value) => Self::Value(value),
            Err(_) => Self::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptOutcome {
    Correct,
    Incorrect,
    /// Empty or non-numeric input.
    Invalid,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub outcome: AttemptOutcome,
    pub zone: Zone,
}

impl Attempt {
    /// Grades a submission. Anything arriving in the expired zone is a timeout.
    pub fn grade(input: AnswerInput, expected: i64, zone: Zone) -> Self {
        let outcome = match (zone, input) {
            (Zone::Expired, _) => AttemptOutcome::TimedOut,
            (_, AnswerInput::Invalid) => AttemptOutcome::Invalid,
            (_, AnswerInput::Value(v)) if v == expected => AttemptOutcome::Correct,
            (_, AnswerInput::Value(_)) => AttemptOutcome::Incorrect,
        };
        Self { outcome, zone }
    }

    pub fn timed_out() -> Self {
        Self {
            outcome: AttemptOutcome::TimedOut,
            zone: Zone::Expired,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.outcome == AttemptOutcome::Correct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    pub old: i32,
    pub new: i32,
    pub creditable: bool,
    /// `old < threshold <= new`.
    pub crossed: bool,
}

/// Session-scoped scores. Items never scored this session read as 0.
#[derive(Debug, Clone, Default)]
pub struct ScoreBoard {
    scores: HashMap<PermutationId, i32>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, id: &PermutationId) -> i32 {
        self.scores.get(id).copied().unwrap_or(0)
    }

    pub fn record_attempt(
        &mut self,
        id: &PermutationId,
        rule: &ScoringRule,
        attempt: &Attempt,
    ) -> ScoreUpdate {
        let update = rule.apply(self.score(id), attempt);
        self.scores.insert(id.clone(), update.new);
        update
    }
}
