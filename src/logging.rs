//! Logging setup shared by the binaries
//!
//! `RUST_LOG` takes precedence over the configured level. Output goes to
//! stdout, or to a daily rolling file when `logging.file` is set.

use crate::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    let level = match level.to_ascii_lowercase().as_str() {
        l @ ("trace" | "debug" | "info" | "warn" | "error") => l.to_string(),
        _ => "info".to_string(),
    };
    format!("wattboard={level},tower_http={level}")
}

/// Install the global subscriber. The returned guard must be held for the
/// lifetime of the process so buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let to_file = config.file.is_some();
    let (writer, guard) = match config.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir).ok();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "wattboard.log".to_string());
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(writer).with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(!to_file).with_target(true))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("debug"), "wattboard=debug,tower_http=debug");
        assert_eq!(default_directives("WARN"), "wattboard=warn,tower_http=warn");
        assert_eq!(default_directives("loud"), "wattboard=info,tower_http=info");
    }
}
