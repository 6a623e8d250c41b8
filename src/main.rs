use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use fact_fluency::config::Config;
use fact_fluency::fluency::{
    AnswerFeedback, AttemptOutcome, EngineConfig, EngineError, Fact, Presentation, SubmitOutcome,
    TickReport, TransitionDecision,
};
use fact_fluency::logging;
use fact_fluency::progress::memory::{InMemoryActivityLog, InMemoryProgressStore};
use fact_fluency::progress::ProgressNotice;
use fact_fluency::{FluencyEngine, SessionPlan};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
/// Input arriving this soon after an expiry belongs to the expired item.
const LATE_INPUT_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] fact_fluency::fluency::ConfigError),
    #[error("stdin: {0}")]
    Io(#[from] std::io::Error),
    #[error("summary encoding: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "drill failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), CliError> {
    let engine_config = EngineConfig::from_env()?;

    let facts = Fact::track(config.operation, config.max_operand);
    let store = Arc::new(InMemoryProgressStore::new());
    for fact in &facts {
        store.seed(&config.user_id, &config.track_id, fact.fact_id.clone(), config.seed_stage);
    }
    let activity = Arc::new(InMemoryActivityLog::new());

    let engine = FluencyEngine::new(engine_config, store.clone(), store.clone(), activity)?;
    let mut session = engine
        .start_session(SessionPlan {
            user_id: config.user_id.clone(),
            track_id: config.track_id.clone(),
            facts,
            stage_filter: config.stage_filter,
            max_facts: config.max_facts,
        })
        .await?;
    let mut notices = session.subscribe_notices();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("Answer each fact before the timer runs out. Ctrl+C to quit.");

    'session: loop {
        let shown = match session.advance_to_next(Instant::now())? {
            Presentation::Complete => break 'session,
            Presentation::Item(shown) => shown,
        };
        println!(
            "[{} | {:.1}s] {}",
            shown.stage,
            shown.window.duration.as_secs_f64(),
            shown.prompt
        );

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    println!("\nSession cancelled; nothing from this session was saved.");
                    session.abandon();
                    engine.shutdown().await;
                    return Ok(());
                }
                line = lines.next_line() => {
                    let Some(raw) = line? else {
                        session.abandon();
                        engine.shutdown().await;
                        return Ok(());
                    };
                    if let SubmitOutcome::Scored(feedback) = session.submit_answer(&raw, Instant::now())? {
                        print_feedback(&feedback);
                    }
                    break;
                }
                _ = ticker.tick() => {
                    if let TickReport::Expired(feedback) = session.tick(Instant::now())? {
                        print_feedback(&feedback);
                        let late = discard_late_lines(&mut lines).await;
                        if late > 0 {
                            println!("  (ignored {late} late answer(s))");
                        }
                        break;
                    }
                }
                notice = notices.recv() => {
                    // only this learner's notices reach the receiver
                    if let Ok(ProgressNotice::MayNotHaveSaved { fact_id, .. }) = notice {
                        println!("  (progress for {fact_id} may not have saved)");
                    }
                }
            }
        }
    }

    let summary = session.finish();
    println!("All facts mastered for this session.");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    engine.shutdown().await;
    store.apply_summary(&summary);
    Ok(())
}

/// Drops lines typed for an item that already expired, so they are not
/// scored against the next prompt.
async fn discard_late_lines<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> usize {
    let mut discarded = 0;
    while let Ok(Ok(Some(_))) = tokio::time::timeout(LATE_INPUT_WINDOW, lines.next_line()).await {
        discarded += 1;
    }
    discarded
}

fn print_feedback(feedback: &AnswerFeedback) {
    let verdict = match feedback.attempt.outcome {
        AttemptOutcome::Correct if feedback.update.creditable => "correct".to_string(),
        AttemptOutcome::Correct => "correct, but too slow to count".to_string(),
        AttemptOutcome::Incorrect | AttemptOutcome::Invalid => {
            format!("not quite, it was {}", feedback.expected)
        }
        AttemptOutcome::TimedOut => format!("time's up, it was {}", feedback.expected),
    };
    println!("  {verdict} (score {})", feedback.update.new);
    match &feedback.transition {
        TransitionDecision::Advance(request) => {
            println!("  {} moves up to {}!", request.fact_id, request.to);
        }
        TransitionDecision::AwaitingSibling { .. } => {
            println!("  one direction down, now the other way round");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discard_late_lines_drains_buffered_input() {
        let mut lines = BufReader::new(&b"7\n8\n"[..]).lines();
        assert_eq!(discard_late_lines(&mut lines).await, 2);
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_discard_late_lines_stops_when_input_is_quiet() {
        let (reader, _writer) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        assert_eq!(discard_late_lines(&mut lines).await, 0);
    }
}
