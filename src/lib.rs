//! Fact fluency progression engine.
//!
//! Learners drill arithmetic facts under a response timer. Each practice
//! item carries a bounded session score; once every direction of a fact
//! reaches its stage's threshold, the fact advances one stage through the
//! fluency pipeline and the advance is written through the progress outbox.

pub mod config;
pub mod engine;
pub mod fluency;
pub mod logging;
pub mod progress;

pub use engine::{FluencyEngine, SessionPlan};
