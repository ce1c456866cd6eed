//! Tracing setup: one log file per session under `<dir>/<YYYY-MM-DD>/`,
//! plus stderr output when asked for or when file logging is off.

use rivet_config::{LogFormat, LoggingConfig};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Fails if tracing was already initialised.
pub fn init_tracing(logging: &LoggingConfig, session_id: &str, verbose: bool) -> Result<(), String> {
    if LOG_GUARD.get().is_some() {
        return Err("tracing is already initialised".to_string());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => {
            let level = if verbose { "debug" } else { logging.level.as_str() };
            EnvFilter::try_new(level).map_err(|e| e.to_string())?
        }
    };

    let mut maybe_writer = None;
    if logging.file {
        let dir = logging
            .directory
            .join(chrono::Local::now().format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let appender = tracing_appender::rolling::never(dir, log_file_name(session_id));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        LOG_GUARD
            .set(guard)
            .map_err(|_| "tracing is already initialised".to_string())?;
        maybe_writer = Some(non_blocking);
    }

    let json = logging.format == LogFormat::Json;
    let text_file = maybe_writer.clone().filter(|_| !json).map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });
    let json_file = maybe_writer
        .filter(|_| json)
        .map(|w| tracing_subscriber::fmt::layer().json().with_writer(w));
    let console = (verbose || !logging.file).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(text_file)
        .with(json_file)
        .try_init()
        .map_err(|e| e.to_string())
}

/// Session ids come from the command line; keep them inside the log dir.
fn log_file_name(session_id: &str) -> String {
    let safe: String = session_id
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("{safe}.log")
}
