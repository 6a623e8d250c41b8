pub mod config;
pub mod fact;
pub mod scheduler;
pub mod scorer;
pub mod session;
pub mod stage;
pub mod timer;
pub mod transition;

pub use config::{ConfigError, EngineConfig, OutboxConfig, TimingConfig};
pub use fact::{generate_permutations, Direction, Fact, FactId, Operation, Permutation, PermutationId};
pub use scheduler::{Next, SessionQueue};
pub use scorer::{AnswerInput, Attempt, AttemptOutcome, CreditZone, ScoreBoard, ScoreUpdate, ScoringRule};
pub use session::{
    AnswerFeedback, PracticeSession, PresentedItem, Presentation, SessionProgress, SessionSummary,
    SubmitOutcome, TickReport,
};
pub use stage::{FluencyStage, PracticeMode};
pub use timer::{ResponseTimer, TimerWindow, Zone};
pub use transition::{AdvanceRequest, StageTransitionController, TransitionDecision};

use crate::progress::PortError;

/// Learner input never produces one of these. Invariant violations mean a
/// programming or configuration defect and end the session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid fact {fact_id}: {reason}")]
    InvalidFact { fact_id: FactId, reason: String },
    #[error("session aborted, reload required")]
    SessionAborted,
    #[error("no eligible facts for user {user_id} on track {track_id}")]
    NoEligibleFacts { user_id: String, track_id: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Port(#[from] PortError),
}
