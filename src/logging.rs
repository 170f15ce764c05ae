//! Log routing for the CLI and the HTTP server.
//!
//! Console output is compact and untargeted. A second, plain-text copy goes to
//! `DOCSYNC_LOG_FILE` when set, or to a daily file under `logs/`.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "docsync.log";

static FILE_WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).compact();
    let file = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

fn file_writer() -> Option<NonBlocking> {
    let (writer, guard) = match std::env::var("DOCSYNC_LOG_FILE") {
        Ok(path) => append_to(Path::new(&path))?,
        Err(_) => daily_file()?,
    };
    // Dropping the guard would stop the background writer.
    let _ = FILE_WRITER_GUARD.set(guard);
    Some(writer)
}

fn append_to(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(err) => {
            eprintln!("docsync: cannot open log file {}: {err}", path.display());
            None
        }
    }
}

fn daily_file() -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(err) = std::fs::create_dir_all(LOG_DIR) {
        eprintln!("docsync: cannot create {LOG_DIR}/: {err}");
        return None;
    }
    let appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}
