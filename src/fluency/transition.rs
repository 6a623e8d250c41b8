use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::fact::{Fact, FactId, PermutationId};
use super::scorer::ScoreBoard;
use super::stage::FluencyStage;
use super::EngineError;

/// Intent to move one fact one stage forward in durable progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    pub user_id: String,
    pub fact_id: FactId,
    pub from: FluencyStage,
    pub to: FluencyStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    /// The score did not cross the threshold on this attempt.
    NoChange,
    /// This direction crossed but the other one has not yet.
    AwaitingSibling { sibling: PermutationId },
    Advance(AdvanceRequest),
    /// The fact already advanced earlier in this session.
    AlreadyAdvanced,
    /// The fact sits at the last stage; nothing to advance to.
    TerminalStage,
}

/// Edge-triggered bridge from session scores to durable stage advances.
/// Holds the facts advanced this session so each advances at most once.
#[derive(Debug, Default)]
pub struct StageTransitionController {
    user_id: String,
    advanced: HashSet<FactId>,
}

impl StageTransitionController {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            advanced: HashSet::new(),
        }
    }

    pub fn has_advanced(&self, fact_id: &FactId) -> bool {
        self.advanced.contains(fact_id)
    }

    pub fn advanced_count(&self) -> usize {
        self.advanced.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_score_change(
        &mut self,
        fact: &Fact,
        item: &PermutationId,
        new_score: i32,
        old_score: i32,
        threshold: i32,
        current_stage: FluencyStage,
        board: &ScoreBoard,
    ) -> Result<TransitionDecision, EngineError> {
        if item.fact_id != fact.fact_id {
            return Err(EngineError::InvariantViolation(format!(
                "item {item} does not belong to fact {}",
                fact.fact_id
            )));
        }

        if !(old_score < threshold && threshold <= new_score) {
            return Ok(TransitionDecision::NoChange);
        }

        if self.advanced.contains(&fact.fact_id) {
            return Ok(TransitionDecision::AlreadyAdvanced);
        }

        if fact.is_commutative() {
            let sibling = item.sibling();
            let sibling_score = board.score(&sibling);
            if sibling_score < threshold {
                debug!(
                    fact_id = %fact.fact_id,
                    item = %item,
                    sibling = %sibling,
                    sibling_score,
                    "direction mastered, waiting on sibling"
                );
                return Ok(TransitionDecision::AwaitingSibling { sibling });
            }
        }

        let Some(next) = current_stage.next() else {
            return Ok(TransitionDecision::TerminalStage);
        };

        self.advanced.insert(fact.fact_id.clone());
        info!(
            user_id = %self.user_id,
            fact_id = %fact.fact_id,
            from = %current_stage,
            to = %next,
            "fact reached mastery threshold"
        );

        Ok(TransitionDecision::Advance(AdvanceRequest {
            user_id: self.user_id.clone(),
            fact_id: fact.fact_id.clone(),
            from: current_stage,
            to: next,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluency::fact::Operation;
    use crate::fluency::scorer::{Attempt, AttemptOutcome, ScoringRule};
    use crate::fluency::timer::Zone;

    const GREEN_CORRECT: Attempt = Attempt {
        outcome: AttemptOutcome::Correct,
        zone: Zone::Green,
    };

    fn drive(
        controller: &mut StageTransitionController,
        board: &mut ScoreBoard,
        fact: &Fact,
        item: &PermutationId,
    ) -> TransitionDecision {
        let rule = ScoringRule::timed_default();
        let update = board.record_attempt(item, &rule, &GREEN_CORRECT);
        controller
            .on_score_change(
                fact,
                item,
                update.new,
                update.old,
                rule.threshold,
                FluencyStage::Fluency6Practice,
                board,
            )
            .unwrap()
    }

    #[test]
    fn test_non_commutative_advances_on_crossing() {
        let fact = Fact::new("sub-9-5", Operation::Subtraction, 9, 5, 4).unwrap();
        let item = fact.permutations()[0].id.clone();
        let mut controller = StageTransitionController::new("u1");
        let mut board = ScoreBoard::new();

        assert_eq!(drive(&mut controller, &mut board, &fact, &item), TransitionDecision::NoChange);
        assert_eq!(drive(&mut controller, &mut board, &fact, &item), TransitionDecision::NoChange);
        match drive(&mut controller, &mut board, &fact, &item) {
            TransitionDecision::Advance(req) => {
                assert_eq!(req.from, FluencyStage::Fluency6Practice);
                assert_eq!(req.to, FluencyStage::Fluency3Practice);
                assert_eq!(req.user_id, "u1");
            }
            other => panic!("expected advance, got {other:?}"),
        }
        // held at the clamp ceiling: no further edge
        assert_eq!(drive(&mut controller, &mut board, &fact, &item), TransitionDecision::NoChange);
    }

    #[test]
    fn test_commutative_waits_for_both_directions_in_either_order() {
        let fact = Fact::new("add-3-4", Operation::Addition, 3, 4, 7).unwrap();
        let perms = fact.permutations();
        for (first, second) in [(0usize, 1usize), (1, 0)] {
            let mut controller = StageTransitionController::new("u1");
            let mut board = ScoreBoard::new();
            let a = &perms[first].id;
            let b = &perms[second].id;

            let mut decisions = Vec::new();
            for _ in 0..3 {
                decisions.push(drive(&mut controller, &mut board, &fact, a));
            }
            assert_eq!(
                decisions.last(),
                Some(&TransitionDecision::AwaitingSibling { sibling: b.clone() })
            );
            for _ in 0..2 {
                assert_eq!(drive(&mut controller, &mut board, &fact, b), TransitionDecision::NoChange);
            }
            assert!(matches!(
                drive(&mut controller, &mut board, &fact, b),
                TransitionDecision::Advance(_)
            ));
            assert_eq!(controller.advanced_count(), 1);
        }
    }

    #[test]
    fn test_interleaved_directions_fire_once() {
        let fact = Fact::new("add-3-4", Operation::Addition, 3, 4, 7).unwrap();
        let perms = fact.permutations();
        let mut controller = StageTransitionController::new("u1");
        let mut board = ScoreBoard::new();
        let mut advances = 0;
        for round in 0..6 {
            let item = &perms[round % 2].id;
            if let TransitionDecision::Advance(_) = drive(&mut controller, &mut board, &fact, item) {
                advances += 1;
                assert_eq!(round, 5);
            }
        }
        assert_eq!(advances, 1);
    }

    #[test]
    fn test_second_crossing_in_session_is_ignored() {
        let fact = Fact::new("sub-9-5", Operation::Subtraction, 9, 5, 4).unwrap();
        let item = fact.permutations()[0].id.clone();
        let mut controller = StageTransitionController::new("u1");
        let board = ScoreBoard::new();
        let first = controller
            .on_score_change(&fact, &item, 3, 2, 3, FluencyStage::Learning, &board)
            .unwrap();
        assert!(matches!(first, TransitionDecision::Advance(_)));
        let second = controller
            .on_score_change(&fact, &item, 3, 2, 3, FluencyStage::Learning, &board)
            .unwrap();
        assert_eq!(second, TransitionDecision::AlreadyAdvanced);
    }

    #[test]
    fn test_terminal_stage_does_not_advance() {
        let fact = Fact::new("sub-9-5", Operation::Subtraction, 9, 5, 4).unwrap();
        let item = fact.permutations()[0].id.clone();
        let mut controller = StageTransitionController::new("u1");
        let decision = controller
            .on_score_change(&fact, &item, 3, 2, 3, FluencyStage::Automatic, &ScoreBoard::new())
            .unwrap();
        assert_eq!(decision, TransitionDecision::TerminalStage);
        assert!(!controller.has_advanced(&fact.fact_id));
    }

    #[test]
    fn test_foreign_item_is_an_invariant_violation() {
        let fact = Fact::new("sub-9-5", Operation::Subtraction, 9, 5, 4).unwrap();
        let other = Fact::new("sub-8-5", Operation::Subtraction, 8, 5, 3).unwrap();
        let item = other.permutations()[0].id.clone();
        let mut controller = StageTransitionController::new("u1");
        let err = controller
            .on_score_change(&fact, &item, 1, 0, 3, FluencyStage::Learning, &ScoreBoard::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }
}
