use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const LOG_FILE_PREFIX: &str = "fact-fluency.log";

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn file_logging_enabled() -> bool {
    std::env::var("ENABLE_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Installs the global subscriber.
///
/// Events go to stderr, never stdout: the drill prints prompts, feedback and
/// the final JSON summary on stdout, and a learner piping that summary into
/// another tool must not get log lines mixed into it. With `ENABLE_FILE_LOGS`
/// a daily-rolling copy is also written under `LOG_DIR`.
pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, guard) = match file_logging_enabled().then(rolling_file_layer).flatten() {
        Some((layer, guard)) => (Some(layer), Some(FileLogGuard { _guard: guard })),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();

    guard
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn rolling_file_layer() -> Option<(BoxedLayer, WorkerGuard)> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        eprintln!("failed to create log directory {log_dir}: {err}");
        return None;
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    Some((layer, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_file_layer_creates_log_dir() {
        let dir = std::env::temp_dir().join(format!("fact-fluency-logs-{}", uuid::Uuid::new_v4()));
        std::env::set_var("LOG_DIR", &dir);
        let built = rolling_file_layer();
        std::env::remove_var("LOG_DIR");

        assert!(built.is_some());
        assert!(dir.is_dir());
        drop(built);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

