//! One practice session: the single owner of session-scoped state.
//!
//! Created at session start, dropped at session end. Scores, the queue and
//! the live timer never outlive it; only stage advances leave through the
//! outbox.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::config::EngineConfig;
use super::fact::{Fact, FactId, Permutation, PermutationId};
use super::scheduler::{Next, SessionQueue};
use super::scorer::{AnswerInput, Attempt, ScoreBoard, ScoreUpdate};
use super::stage::{FluencyStage, PracticeMode};
use super::timer::{ResponseTimer, TimerWindow, Zone};
use super::transition::{AdvanceRequest, StageTransitionController, TransitionDecision};
use super::EngineError;
use crate::progress::{LearnerNotices, OutboxHandle, WriteStatus, WriteTicket};

#[derive(Debug, Clone)]
struct FactEntry {
    fact: Fact,
    /// Stage the fact was drilled at; fixed for the session.
    practice_stage: FluencyStage,
    /// Moves forward locally as soon as an advance fires.
    live_stage: FluencyStage,
    mode: PracticeMode,
}

#[derive(Debug)]
struct LiveItem {
    id: PermutationId,
    timer: ResponseTimer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Active,
    Complete,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedItem {
    pub item: Permutation,
    pub prompt: String,
    pub window: TimerWindow,
    pub score: i32,
    pub stage: FluencyStage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Item(PresentedItem),
    /// Every item reached threshold. Hand off to navigation.
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerFeedback {
    pub item: PermutationId,
    pub attempt: Attempt,
    pub expected: i64,
    pub update: ScoreUpdate,
    pub mastered: bool,
    pub transition: TransitionDecision,
    pub write: Option<WriteTicket>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Scored(AnswerFeedback),
    /// Nothing on screen to answer, e.g. a late submit after expiry.
    NoLiveItem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    Running { zone: Zone, remaining: Duration },
    /// The window ran out and the item was scored as a timeout.
    Expired(AnswerFeedback),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub total: usize,
    pub mastered: usize,
    pub pending: usize,
    pub displayed: bool,
    pub attempts: u32,
    pub correct: u32,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactTally {
    pub attempts: u32,
    pub correct: u32,
    pub time_spent_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user_id: String,
    pub track_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub completed: bool,
    pub attempts: u32,
    pub correct: u32,
    pub final_scores: BTreeMap<PermutationId, i32>,
    pub advanced: Vec<AdvanceRequest>,
    pub tallies: BTreeMap<FactId, FactTally>,
}

pub struct PracticeSession<R> {
    session_id: Uuid,
    user_id: String,
    track_id: String,
    started_at: DateTime<Utc>,
    config: EngineConfig,
    facts: HashMap<FactId, FactEntry>,
    items: HashMap<PermutationId, Permutation>,
    board: ScoreBoard,
    queue: SessionQueue<R>,
    live: Option<LiveItem>,
    status: SessionStatus,
    transitions: StageTransitionController,
    outbox: OutboxHandle,
    advanced: Vec<AdvanceRequest>,
    tallies: BTreeMap<FactId, FactTally>,
    attempts: u32,
    correct: u32,
}

impl<R: Rng> PracticeSession<R> {
    /// Builds a session over facts at their current stages. Every stage must
    /// be practicable and every fact id unique.
    pub fn new(
        user_id: impl Into<String>,
        track_id: impl Into<String>,
        facts: Vec<(Fact, FluencyStage)>,
        config: EngineConfig,
        outbox: OutboxHandle,
        rng: R,
    ) -> Result<Self, EngineError> {
        let user_id = user_id.into();
        let mut entries = HashMap::with_capacity(facts.len());
        let mut items = HashMap::new();
        let mut order = Vec::new();

        for (fact, stage) in facts {
            fact.validate()?;
            let mode = stage.practice_mode().ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "fact {} is at {stage}, which cannot be drilled",
                    fact.fact_id
                ))
            })?;
            for permutation in fact.permutations() {
                order.push(permutation.id.clone());
                items.insert(permutation.id.clone(), permutation);
            }
            let fact_id = fact.fact_id.clone();
            let entry = FactEntry {
                fact,
                practice_stage: stage,
                live_stage: stage,
                mode,
            };
            if entries.insert(fact_id.clone(), entry).is_some() {
                return Err(EngineError::InvariantViolation(format!(
                    "fact {fact_id} appears twice in one session"
                )));
            }
        }

        let session = Self {
            session_id: Uuid::new_v4(),
            transitions: StageTransitionController::new(user_id.clone()),
            user_id,
            track_id: track_id.into(),
            started_at: Utc::now(),
            config,
            facts: entries,
            items,
            board: ScoreBoard::new(),
            queue: SessionQueue::new(order, rng),
            live: None,
            status: SessionStatus::Active,
            outbox,
            advanced: Vec::new(),
            tallies: BTreeMap::new(),
            attempts: 0,
            correct: 0,
        };
        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            facts = session.facts.len(),
            items = session.items.len(),
            "practice session started"
        );
        Ok(session)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn current_item(&self) -> Option<&Permutation> {
        self.live.as_ref().and_then(|live| self.items.get(&live.id))
    }

    pub fn current_zone(&self, now: Instant) -> Option<Zone> {
        self.live.as_ref().map(|live| live.timer.classify(now))
    }

    pub fn score_by_item_id(&self) -> HashMap<PermutationId, i32> {
        self.items
            .keys()
            .map(|id| (id.clone(), self.board.score(id)))
            .collect()
    }

    /// The fact's stage as this session sees it, advances included.
    pub fn fact_stage(&self, fact_id: &FactId) -> Option<FluencyStage> {
        self.facts.get(fact_id).map(|entry| entry.live_stage)
    }

    /// Save status of this learner's advance for the fact, if one was made.
    pub fn write_status(&self, fact_id: &FactId) -> Option<WriteStatus> {
        self.outbox.status(&self.user_id, fact_id)
    }

    /// Save-failure notices for this session's learner.
    pub fn subscribe_notices(&self) -> LearnerNotices {
        self.outbox.subscribe_learner(self.user_id.clone())
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }

    pub fn is_aborted(&self) -> bool {
        self.status == SessionStatus::Aborted
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.queue.total(),
            mastered: self.queue.mastered_len(),
            pending: self.queue.pending_len(),
            displayed: self.queue.displayed().is_some(),
            attempts: self.attempts,
            correct: self.correct,
            complete: self.is_complete(),
        }
    }

    /// Cancels any live timer and presents the next item. Advancing past an
    /// unanswered item puts it back in the pool unscored.
    pub fn advance_to_next(&mut self, now: Instant) -> Result<Presentation, EngineError> {
        self.ensure_not_aborted()?;
        if self.status == SessionStatus::Complete {
            return Ok(Presentation::Complete);
        }

        if let Some(mut skipped) = self.live.take() {
            skipped.timer.cancel();
            debug!(session_id = %self.session_id, item = %skipped.id, "item skipped");
        }

        let result = self.present(now);
        self.guard(result)
    }

    /// Scores a raw submission against the live item. Empty or non-numeric
    /// input is scored as incorrect.
    pub fn submit_answer(&mut self, raw: &str, now: Instant) -> Result<SubmitOutcome, EngineError> {
        self.ensure_not_aborted()?;
        let Some(mut live) = self.live.take() else {
            debug!(session_id = %self.session_id, "submit with no live item ignored");
            return Ok(SubmitOutcome::NoLiveItem);
        };

        let zone = live.timer.classify(now);
        let elapsed = live.timer.elapsed(now).min(live.timer.window().duration);
        live.timer.cancel();

        let result = match self.items.get(&live.id) {
            Some(item) => {
                let attempt = Attempt::grade(AnswerInput::parse(raw), item.result, zone);
                self.score(live.id, attempt, elapsed)
            }
            None => Err(EngineError::InvariantViolation(format!(
                "live item {} is not part of this session",
                live.id
            ))),
        };
        self.guard(result).map(SubmitOutcome::Scored)
    }

    /// Timer heartbeat. Scores the live item as a timeout the first time its
    /// window is found expired.
    pub fn tick(&mut self, now: Instant) -> Result<TickReport, EngineError> {
        self.ensure_not_aborted()?;
        let (zone, remaining) = match self.live.as_mut() {
            Some(live) => {
                let zone = live.timer.tick(now);
                (zone, live.timer.remaining(now))
            }
            None => return Ok(TickReport::Idle),
        };
        if zone != Zone::Expired {
            return Ok(TickReport::Running { zone, remaining });
        }

        let Some(live) = self.live.take() else {
            return Ok(TickReport::Idle);
        };
        let elapsed = live.timer.window().duration;
        let result = self.score(live.id, Attempt::timed_out(), elapsed);
        self.guard(result).map(TickReport::Expired)
    }

    /// Ends the session. Outstanding writes keep draining in the outbox.
    pub fn finish(mut self) -> SessionSummary {
        if let Some(live) = self.live.as_mut() {
            live.timer.cancel();
        }
        let summary = SessionSummary {
            session_id: self.session_id,
            user_id: self.user_id.clone(),
            track_id: self.track_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            completed: self.is_complete(),
            attempts: self.attempts,
            correct: self.correct,
            final_scores: self.score_by_item_id().into_iter().collect(),
            advanced: std::mem::take(&mut self.advanced),
            tallies: std::mem::take(&mut self.tallies),
        };
        info!(
            session_id = %summary.session_id,
            user_id = %summary.user_id,
            completed = summary.completed,
            attempts = summary.attempts,
            advanced = summary.advanced.len(),
            outstanding_writes = self.outbox.outstanding(),
            "practice session finished"
        );
        summary
    }

    /// Leaves without a summary. Scores are discarded; nothing is persisted
    /// beyond advances already handed to the outbox.
    pub fn abandon(self) {
        info!(
            session_id = %self.session_id,
            user_id = %self.user_id,
            attempts = self.attempts,
            "practice session abandoned"
        );
    }

    fn present(&mut self, now: Instant) -> Result<Presentation, EngineError> {
        let id = match self.queue.next_item() {
            Next::Item(id) => id,
            Next::Complete => {
                self.status = SessionStatus::Complete;
                info!(
                    session_id = %self.session_id,
                    attempts = self.attempts,
                    "every item mastered, session complete"
                );
                return Ok(Presentation::Complete);
            }
        };

        let item = self.items.get(&id).cloned().ok_or_else(|| {
            EngineError::InvariantViolation(format!("scheduled unknown item {id}"))
        })?;
        let entry = self.facts.get(&id.fact_id).ok_or_else(|| {
            EngineError::InvariantViolation(format!("item {id} has no fact"))
        })?;

        let score = self.board.score(&id);
        let window = TimerWindow::for_item(entry.mode, score, &self.config.timing);
        let stage = entry.practice_stage;
        self.live = Some(LiveItem {
            id,
            timer: ResponseTimer::start(window, now),
        });

        Ok(Presentation::Item(PresentedItem {
            prompt: item.prompt(),
            item,
            window,
            score,
            stage,
        }))
    }

    fn score(
        &mut self,
        id: PermutationId,
        attempt: Attempt,
        elapsed: Duration,
    ) -> Result<AnswerFeedback, EngineError> {
        let entry = self.facts.get(&id.fact_id).ok_or_else(|| {
            EngineError::InvariantViolation(format!("scored item {id} has no fact"))
        })?;
        let expected = self
            .items
            .get(&id)
            .map(|item| item.result)
            .ok_or_else(|| EngineError::InvariantViolation(format!("scored unknown item {id}")))?;
        let rule = self.config.rule_for(entry.mode);
        let update = self.board.record_attempt(&id, rule, &attempt);

        let transition = self.transitions.on_score_change(
            &entry.fact,
            &id,
            update.new,
            update.old,
            rule.threshold,
            entry.practice_stage,
            &self.board,
        )?;

        self.attempts += 1;
        let tally = self.tallies.entry(id.fact_id.clone()).or_default();
        tally.attempts += 1;
        tally.time_spent_ms += elapsed.as_millis() as u64;
        if attempt.is_correct() {
            self.correct += 1;
            tally.correct += 1;
        }

        let write = match &transition {
            TransitionDecision::Advance(request) => {
                if let Some(entry) = self.facts.get_mut(&id.fact_id) {
                    entry.live_stage = request.to;
                }
                self.advanced.push(request.clone());
                Some(self.outbox.enqueue(request.clone()))
            }
            _ => None,
        };

        let mastered = update.crossed;
        self.queue.resolve(&id, mastered)?;

        debug!(
            session_id = %self.session_id,
            item = %id,
            outcome = ?attempt.outcome,
            zone = ?attempt.zone,
            score = update.new,
            mastered,
            "attempt scored"
        );

        Ok(AnswerFeedback {
            item: id,
            attempt,
            expected,
            update,
            mastered,
            transition,
            write,
            elapsed,
        })
    }

    fn ensure_not_aborted(&self) -> Result<(), EngineError> {
        if self.status == SessionStatus::Aborted {
            return Err(EngineError::SessionAborted);
        }
        Ok(())
    }

    fn guard<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(err) = &result {
            error!(session_id = %self.session_id, error = %err, "practice session aborted");
            self.status = SessionStatus::Aborted;
            if let Some(mut live) = self.live.take() {
                live.timer.cancel();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluency::fact::Operation;
    use crate::fluency::scorer::AttemptOutcome;
    use crate::progress::memory::InMemoryProgressStore;
    use crate::progress::ProgressOutbox;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value)
    }

    fn session(facts: Vec<(Fact, FluencyStage)>) -> PracticeSession<StdRng> {
        let store = Arc::new(InMemoryProgressStore::new());
        let (outbox, _worker) = ProgressOutbox::spawn(store, None, EngineConfig::default().outbox);
        PracticeSession::new("u1", "t1", facts, EngineConfig::default(), outbox, StdRng::seed_from_u64(9))
            .unwrap()
    }

    fn subtraction() -> Fact {
        Fact::new("sub-9-5", Operation::Subtraction, 9, 5, 4).unwrap()
    }

    #[tokio::test]
    async fn test_submit_without_live_item_is_ignored() {
        let mut s = session(vec![(subtraction(), FluencyStage::Fluency6Practice)]);
        let outcome = s.submit_answer("4", Instant::now()).unwrap();
        assert_eq!(outcome, SubmitOutcome::NoLiveItem);
        assert!(!s.is_aborted());
    }

    #[tokio::test]
    async fn test_non_numeric_input_scores_as_incorrect() {
        let mut s = session(vec![(subtraction(), FluencyStage::Fluency6Practice)]);
        let t0 = Instant::now();
        s.advance_to_next(t0).unwrap();
        let SubmitOutcome::Scored(feedback) = s.submit_answer("four", t0 + secs(1.0)).unwrap() else {
            panic!("expected a scored attempt");
        };
        assert_eq!(feedback.attempt.outcome, AttemptOutcome::Invalid);
        assert_eq!(feedback.update.new, -2);
    }

    #[tokio::test]
    async fn test_tick_scores_expiry_exactly_once() {
        let mut s = session(vec![(subtraction(), FluencyStage::Fluency6Practice)]);
        let t0 = Instant::now();
        s.advance_to_next(t0).unwrap();

        assert!(matches!(
            s.tick(t0 + secs(1.0)).unwrap(),
            TickReport::Running { zone: Zone::Green, .. }
        ));
        assert!(matches!(
            s.tick(t0 + secs(5.0)).unwrap(),
            TickReport::Running { zone: Zone::Yellow, .. }
        ));
        let TickReport::Expired(feedback) = s.tick(t0 + secs(6.0)).unwrap() else {
            panic!("expected expiry");
        };
        assert_eq!(feedback.attempt.outcome, AttemptOutcome::TimedOut);
        assert_eq!(s.tick(t0 + secs(7.0)).unwrap(), TickReport::Idle);
        assert_eq!(s.progress().attempts, 1);
    }

    #[tokio::test]
    async fn test_next_window_follows_score() {
        let mut s = session(vec![(subtraction(), FluencyStage::Fluency6Practice)]);
        let t0 = Instant::now();
        let mut windows = Vec::new();
        for _ in 0..3 {
            let Presentation::Item(shown) = s.advance_to_next(t0).unwrap() else {
                panic!("expected an item");
            };
            windows.push(shown.window.duration);
            s.submit_answer("4", t0 + secs(0.5)).unwrap();
        }
        assert_eq!(windows, vec![secs(6.0), secs(4.5), secs(3.0)]);
    }

    #[tokio::test]
    async fn test_accuracy_stage_credits_any_in_window_answer() {
        let mut s = session(vec![(subtraction(), FluencyStage::AccuracyPractice)]);
        let t0 = Instant::now();
        s.advance_to_next(t0).unwrap();
        let SubmitOutcome::Scored(first) = s.submit_answer("4", t0 + secs(8.0)).unwrap() else {
            panic!("expected a scored attempt");
        };
        assert!(first.update.creditable);
        s.advance_to_next(t0).unwrap();
        let SubmitOutcome::Scored(second) = s.submit_answer("4", t0 + secs(9.0)).unwrap() else {
            panic!("expected a scored attempt");
        };
        assert!(second.mastered);
        assert!(matches!(second.transition, TransitionDecision::Advance(_)));
        assert_eq!(
            s.fact_stage(&FactId::from("sub-9-5")),
            Some(FluencyStage::Fluency6Practice)
        );
        assert_eq!(s.advance_to_next(t0).unwrap(), Presentation::Complete);
    }

    #[tokio::test]
    async fn test_undrillable_stage_is_rejected() {
        let store = Arc::new(InMemoryProgressStore::new());
        let (outbox, _worker) = ProgressOutbox::spawn(store, None, EngineConfig::default().outbox);
        let result = PracticeSession::new(
            "u1",
            "t1",
            vec![(subtraction(), FluencyStage::Mastered)],
            EngineConfig::default(),
            outbox,
            StdRng::seed_from_u64(1),
        );
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_skip_does_not_score() {
        let mut s = session(vec![(subtraction(), FluencyStage::Fluency6Practice)]);
        let t0 = Instant::now();
        s.advance_to_next(t0).unwrap();
        s.advance_to_next(t0 + secs(1.0)).unwrap();
        assert_eq!(s.progress().attempts, 0);
        assert_eq!(s.score_by_item_id().values().copied().collect::<Vec<_>>(), vec![0]);
    }
}
