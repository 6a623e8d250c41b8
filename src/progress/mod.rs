//! Ports to the collaborators that own durable learner progress, plus the
//! outbox that drains stage advances to them.

pub mod memory;
pub mod outbox;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fluency::fact::FactId;
use crate::fluency::stage::FluencyStage;

pub use outbox::{
    LearnerNotices, OutboxHandle, OutboxWorker, ProgressNotice, ProgressOutbox, WriteStatus,
    WriteTicket,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("progress storage unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("unknown fact: {0}")]
    UnknownFact(FactId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactProgressRecord {
    pub status: FluencyStage,
    pub attempts: u32,
    pub correct: u32,
    pub time_spent_ms: u64,
    pub last_attempt_date: Option<DateTime<Utc>>,
}

impl FactProgressRecord {
    pub fn at(status: FluencyStage) -> Self {
        Self {
            status,
            attempts: 0,
            correct: 0,
            time_spent_ms: 0,
            last_attempt_date: None,
        }
    }
}

#[async_trait]
pub trait ProgressReadPort: Send + Sync {
    /// Stage of every fact the learner has on the track. Read once per session.
    async fn current_status(
        &self,
        user_id: &str,
        track_id: &str,
    ) -> Result<HashMap<FactId, FluencyStage>, PortError>;
}

#[async_trait]
pub trait ProgressWritePort: Send + Sync {
    /// Moves the fact to `new_status`. Must be idempotent: repeating the call
    /// with the same target never moves the fact past it.
    async fn advance_stage(
        &self,
        user_id: &str,
        fact_id: &FactId,
        new_status: FluencyStage,
    ) -> Result<(), PortError>;
}

/// Best-effort, de-duplicated log of coarse stage entries.
#[async_trait]
pub trait SessionActivityPort: Send + Sync {
    async fn record_stage_entry(
        &self,
        user_id: &str,
        stage: FluencyStage,
        tracked: Option<HashMap<FluencyStage, Vec<FactId>>>,
    ) -> Result<(), PortError>;
}
