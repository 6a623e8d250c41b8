use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::fluency::{EngineConfig, EngineError, Fact, FactId, FluencyStage, PracticeSession};
use crate::progress::{
    OutboxHandle, OutboxWorker, ProgressOutbox, ProgressReadPort, ProgressWritePort,
    SessionActivityPort,
};

/// What a caller asks to drill.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub user_id: String,
    pub track_id: String,
    /// Catalog for the track; filtered down by the learner's stored stages.
    pub facts: Vec<Fact>,
    /// Only drill facts currently at this stage.
    pub stage_filter: Option<FluencyStage>,
    pub max_facts: Option<usize>,
}

/// Wires the ports and the outbox worker and hands out practice sessions.
pub struct FluencyEngine {
    config: EngineConfig,
    reader: Arc<dyn ProgressReadPort>,
    activity: Arc<dyn SessionActivityPort>,
    outbox: OutboxHandle,
    worker: OutboxWorker,
}

impl FluencyEngine {
    /// Must be called inside a tokio runtime; spawns the outbox worker.
    pub fn new(
        config: EngineConfig,
        reader: Arc<dyn ProgressReadPort>,
        writer: Arc<dyn ProgressWritePort>,
        activity: Arc<dyn SessionActivityPort>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let (outbox, worker) =
            ProgressOutbox::spawn(writer, Some(Arc::clone(&activity)), config.outbox.clone());
        Ok(Self {
            config,
            reader,
            activity,
            outbox,
            worker,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn outbox(&self) -> &OutboxHandle {
        &self.outbox
    }

    pub async fn start_session(&self, plan: SessionPlan) -> Result<PracticeSession<StdRng>, EngineError> {
        self.start_session_with_rng(plan, StdRng::from_os_rng()).await
    }

    pub async fn start_session_with_rng<R: Rng>(
        &self,
        plan: SessionPlan,
        rng: R,
    ) -> Result<PracticeSession<R>, EngineError> {
        let statuses = self
            .reader
            .current_status(&plan.user_id, &plan.track_id)
            .await?;

        let eligible = select_eligible(&plan, &statuses);
        if eligible.is_empty() {
            return Err(EngineError::NoEligibleFacts {
                user_id: plan.user_id,
                track_id: plan.track_id,
            });
        }

        self.record_stage_entries(&plan.user_id, &eligible).await;
        // statuses from the learner's earlier sessions were already shown
        let forgotten = self.outbox.forget_settled(&plan.user_id);
        if forgotten > 0 {
            debug!(user_id = %plan.user_id, forgotten, "cleared settled write statuses");
        }

        info!(
            user_id = %plan.user_id,
            track_id = %plan.track_id,
            eligible = eligible.len(),
            "building practice session"
        );
        PracticeSession::new(
            plan.user_id,
            plan.track_id,
            eligible,
            self.config.clone(),
            self.outbox.clone(),
            rng,
        )
    }

    /// Waits for every queued progress write to settle.
    pub async fn shutdown(self) {
        let outstanding = self.outbox.outstanding();
        if outstanding > 0 {
            info!(outstanding, "draining progress writes");
        }
        self.worker.shutdown().await;
    }

    async fn record_stage_entries(&self, user_id: &str, eligible: &[(Fact, FluencyStage)]) {
        let mut by_stage: BTreeMap<FluencyStage, Vec<FactId>> = BTreeMap::new();
        for (fact, stage) in eligible {
            by_stage.entry(*stage).or_default().push(fact.fact_id.clone());
        }
        for (stage, fact_ids) in by_stage {
            let tracked = HashMap::from([(stage, fact_ids)]);
            if let Err(err) = self
                .activity
                .record_stage_entry(user_id, stage, Some(tracked))
                .await
            {
                warn!(user_id, stage = %stage, error = %err, "stage entry not recorded");
            }
        }
    }
}

/// Facts the learner has at a drillable stage, in catalog order. Facts with
/// no stored progress count as not started and are skipped.
fn select_eligible(
    plan: &SessionPlan,
    statuses: &HashMap<FactId, FluencyStage>,
) -> Vec<(Fact, FluencyStage)> {
    let limit = plan.max_facts.unwrap_or(usize::MAX);
    plan.facts
        .iter()
        .filter_map(|fact| {
            let stage = *statuses.get(&fact.fact_id)?;
            let wanted = plan.stage_filter.map_or(true, |filter| filter == stage);
            (wanted && stage.is_practicable()).then(|| (fact.clone(), stage))
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluency::Operation;

    fn plan(facts: Vec<Fact>, stage_filter: Option<FluencyStage>) -> SessionPlan {
        SessionPlan {
            user_id: "u1".to_string(),
            track_id: "t1".to_string(),
            facts,
            stage_filter,
            max_facts: None,
        }
    }

    #[test]
    fn test_select_eligible_skips_undrillable_and_unknown() {
        let facts = Fact::track(Operation::Subtraction, 1);
        let statuses = HashMap::from([
            (facts[0].fact_id.clone(), FluencyStage::Fluency3Practice),
            (facts[1].fact_id.clone(), FluencyStage::Mastered),
            (facts[2].fact_id.clone(), FluencyStage::AccuracyPractice),
        ]);
        let eligible = select_eligible(&plan(facts.clone(), None), &statuses);
        assert_eq!(eligible.len(), 2);
        assert_eq!(eligible[0].0.fact_id, facts[0].fact_id);
        assert_eq!(eligible[1].1, FluencyStage::AccuracyPractice);

        let filtered = select_eligible(&plan(facts, Some(FluencyStage::AccuracyPractice)), &statuses);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_select_eligible_honors_max_facts() {
        let facts = Fact::track(Operation::Subtraction, 2);
        let statuses: HashMap<_, _> = facts
            .iter()
            .map(|f| (f.fact_id.clone(), FluencyStage::Learning))
            .collect();
        let mut p = plan(facts, None);
        p.max_facts = Some(3);
        assert_eq!(select_eligible(&p, &statuses).len(), 3);
    }
}
