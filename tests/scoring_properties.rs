//! Property tests for session scoring and scheduling.
//!
//! - Scores stay inside the rule's bounds for any attempt sequence
//! - `crossed` fires only on the attempt that reaches threshold from below
//! - Queue bookkeeping accounts for every item after any answer sequence

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use fact_fluency::fluency::{
    Attempt, AttemptOutcome, Direction, FactId, Next, PermutationId, ScoringRule, SessionQueue,
    Zone,
};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_zone() -> impl Strategy<Value = Zone> {
    prop_oneof![Just(Zone::Green), Just(Zone::Yellow), Just(Zone::Expired)]
}

fn arb_attempt() -> impl Strategy<Value = Attempt> {
    (
        prop_oneof![
            Just(AttemptOutcome::Correct),
            Just(AttemptOutcome::Incorrect),
            Just(AttemptOutcome::Invalid),
        ],
        arb_zone(),
    )
        .prop_map(|(outcome, zone)| match zone {
            Zone::Expired => Attempt::timed_out(),
            _ => Attempt { outcome, zone },
        })
}

fn arb_rule() -> impl Strategy<Value = ScoringRule> {
    prop_oneof![
        Just(ScoringRule::accuracy_default()),
        Just(ScoringRule::timed_default())
    ]
}

fn items(count: usize) -> Vec<PermutationId> {
    (0..count)
        .map(|i| PermutationId::new(FactId::new(format!("sub-{}-1", i + 1)), Direction::Forward))
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn score_stays_within_bounds(
        rule in arb_rule(),
        attempts in prop::collection::vec(arb_attempt(), 0..60),
    ) {
        let mut score = 0;
        for attempt in &attempts {
            let update = rule.apply(score, attempt);
            prop_assert_eq!(update.old, score);
            prop_assert!(update.new >= rule.min && update.new <= rule.max);
            if update.creditable {
                prop_assert!(update.new >= score);
            } else {
                prop_assert!(update.new <= score);
            }
            score = update.new;
        }
    }

    #[test]
    fn crossing_is_edge_triggered(
        rule in arb_rule(),
        attempts in prop::collection::vec(arb_attempt(), 1..60),
    ) {
        let mut score = 0;
        for attempt in &attempts {
            let update = rule.apply(score, attempt);
            let expected = score < rule.threshold && update.new >= rule.threshold;
            prop_assert_eq!(update.crossed, expected);
            score = update.new;
        }
    }

    #[test]
    fn queue_accounts_for_every_item(
        count in 1usize..8,
        seed in any::<u64>(),
        answers in prop::collection::vec(any::<bool>(), 0..80),
    ) {
        let mut queue = SessionQueue::new(items(count), StdRng::seed_from_u64(seed));
        for mastered_now in answers {
            match queue.next_item() {
                Next::Complete => {
                    prop_assert!(queue.is_complete());
                    break;
                }
                Next::Item(id) => {
                    prop_assert_eq!(queue.len_accounted(), count);
                    prop_assert!(!queue.is_mastered(&id));
                    queue.resolve(&id, mastered_now).unwrap();
                }
            }
            prop_assert_eq!(queue.len_accounted(), count);
        }
    }
}
