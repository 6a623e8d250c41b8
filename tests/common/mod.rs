#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use fact_fluency::fluency::{EngineConfig, Fact, FluencyStage, OutboxConfig, PracticeSession};
use fact_fluency::progress::memory::{InMemoryActivityLog, InMemoryProgressStore};
use fact_fluency::{FluencyEngine, SessionPlan};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub const USER: &str = "learner-1";
pub const TRACK: &str = "track-1";

pub struct Harness {
    pub engine: FluencyEngine,
    pub store: Arc<InMemoryProgressStore>,
    pub activity: Arc<InMemoryActivityLog>,
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        outbox: OutboxConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        ..EngineConfig::default()
    }
}

pub fn harness(facts: &[(Fact, FluencyStage)]) -> Harness {
    harness_for(&[USER], facts, fast_config())
}

/// Seeds every listed learner with the same facts at the same stages.
pub fn harness_for(users: &[&str], facts: &[(Fact, FluencyStage)], config: EngineConfig) -> Harness {
    let store = Arc::new(InMemoryProgressStore::new());
    for user in users {
        for (fact, stage) in facts {
            store.seed(user, TRACK, fact.fact_id.clone(), *stage);
        }
    }
    let activity = Arc::new(InMemoryActivityLog::new());
    let engine = FluencyEngine::new(config, store.clone(), store.clone(), activity.clone())
        .expect("valid engine config");
    Harness {
        engine,
        store,
        activity,
    }
}

pub fn plan(facts: &[(Fact, FluencyStage)]) -> SessionPlan {
    plan_for(USER, facts)
}

pub fn plan_for(user: &str, facts: &[(Fact, FluencyStage)]) -> SessionPlan {
    SessionPlan {
        user_id: user.to_string(),
        track_id: TRACK.to_string(),
        facts: facts.iter().map(|(fact, _)| fact.clone()).collect(),
        stage_filter: None,
        max_facts: None,
    }
}

pub async fn start(harness: &Harness, facts: &[(Fact, FluencyStage)], seed: u64) -> PracticeSession<StdRng> {
    harness
        .engine
        .start_session_with_rng(plan(facts), StdRng::seed_from_u64(seed))
        .await
        .expect("session starts")
}

/// Well inside the green zone of every default window.
pub fn green_delay() -> Duration {
    Duration::from_millis(1000)
}

pub fn at(t0: Instant, secs: f64) -> Instant {
    t0 + Duration::from_secs_f64(secs)
}
