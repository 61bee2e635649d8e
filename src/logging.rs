use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

/// Install the crate's tracing subscriber with a rolling daily log file.
/// Keep the returned guard alive for the lifetime of the process, or buffered
/// log lines are lost on exit.
pub fn init(log_dir: &str) -> WorkerGuard {
    let file_appender = rolling::daily(log_dir, "clms.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .pretty()
        .init();

    guard
}
