//! In-memory progress and activity adapters. Used by the drill binary and
//! by tests; a real deployment points the ports at its own storage.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::{FactProgressRecord, PortError, ProgressReadPort, ProgressWritePort, SessionActivityPort};
use crate::fluency::fact::FactId;
use crate::fluency::session::SessionSummary;
use crate::fluency::stage::FluencyStage;

#[derive(Debug, Clone)]
struct StoredProgress {
    track_id: String,
    record: FactProgressRecord,
}

#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    users: Mutex<HashMap<String, HashMap<FactId, StoredProgress>>>,
    fail_remaining: AtomicU32,
    advance_calls: AtomicUsize,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, user_id: &str, track_id: &str, fact_id: FactId, status: FluencyStage) {
        self.users.lock().entry(user_id.to_string()).or_default().insert(
            fact_id,
            StoredProgress {
                track_id: track_id.to_string(),
                record: FactProgressRecord::at(status),
            },
        );
    }

    pub fn record(&self, user_id: &str, fact_id: &FactId) -> Option<FactProgressRecord> {
        self.users
            .lock()
            .get(user_id)
            .and_then(|facts| facts.get(fact_id))
            .map(|stored| stored.record.clone())
    }

    pub fn status(&self, user_id: &str, fact_id: &FactId) -> Option<FluencyStage> {
        self.record(user_id, fact_id).map(|record| record.status)
    }

    /// Makes the next `count` writes fail with `Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of `advance_stage` calls received, failed ones included.
    pub fn advance_calls(&self) -> usize {
        self.advance_calls.load(Ordering::SeqCst)
    }

    /// Folds a finished session's per-fact tallies into the stored records.
    pub fn apply_summary(&self, summary: &SessionSummary) {
        let mut users = self.users.lock();
        let Some(facts) = users.get_mut(&summary.user_id) else {
            return;
        };
        for (fact_id, tally) in &summary.tallies {
            if let Some(stored) = facts.get_mut(fact_id) {
                stored.record.attempts += tally.attempts;
                stored.record.correct += tally.correct;
                stored.record.time_spent_ms += tally.time_spent_ms;
                stored.record.last_attempt_date = Some(summary.ended_at);
            }
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProgressReadPort for InMemoryProgressStore {
    async fn current_status(
        &self,
        user_id: &str,
        track_id: &str,
    ) -> Result<HashMap<FactId, FluencyStage>, PortError> {
        let users = self.users.lock();
        Ok(users
            .get(user_id)
            .map(|facts| {
                facts
                    .iter()
                    .filter(|(_, stored)| stored.track_id == track_id)
                    .map(|(id, stored)| (id.clone(), stored.record.status))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProgressWritePort for InMemoryProgressStore {
    async fn advance_stage(
        &self,
        user_id: &str,
        fact_id: &FactId,
        new_status: FluencyStage,
    ) -> Result<(), PortError> {
        self.advance_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(PortError::Unavailable("injected failure".to_string()));
        }

        let mut users = self.users.lock();
        let stored = users
            .get_mut(user_id)
            .and_then(|facts| facts.get_mut(fact_id))
            .ok_or_else(|| PortError::UnknownFact(fact_id.clone()))?;

        if stored.record.status >= new_status {
            debug!(%fact_id, status = %stored.record.status, target = %new_status, "advance already applied");
            return Ok(());
        }
        stored.record.status = new_status;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEntry {
    pub user_id: String,
    pub stage: FluencyStage,
    pub tracked: Option<HashMap<FluencyStage, Vec<FactId>>>,
    pub recorded_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryActivityLog {
    seen: Mutex<HashSet<(String, FluencyStage)>>,
    entries: Mutex<Vec<StageEntry>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StageEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl SessionActivityPort for InMemoryActivityLog {
    async fn record_stage_entry(
        &self,
        user_id: &str,
        stage: FluencyStage,
        tracked: Option<HashMap<FluencyStage, Vec<FactId>>>,
    ) -> Result<(), PortError> {
        if !self.seen.lock().insert((user_id.to_string(), stage)) {
            return Ok(());
        }
        self.entries.lock().push(StageEntry {
            user_id: user_id.to_string(),
            stage,
            tracked,
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
