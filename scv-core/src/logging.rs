//! Logging bootstrap for the shard process.
//!
//! Dependency chatter is capped at `warn`; the configured level applies
//! to this crate only. A `RUST_LOG` directive in the environment wins
//! over both.

use std::str::FromStr;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `format` selects flattened JSON (aggregators) or compact text
/// (terminals); with a `file_path` the same format goes to the file
/// instead, without ANSI escapes.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(&config.level)?);

    match (config.format.as_str(), &config.file_path) {
        ("json", Some(path)) => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_thread_ids(true)
                    .with_writer(std::sync::Arc::new(open_log_file(path)?))
                    .with_ansi(false),
            )
            .init(),
        ("json", None) => registry
            .with(fmt::layer().json().flatten_event(true).with_thread_ids(true))
            .init(),
        (_, Some(path)) => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::sync::Arc::new(open_log_file(path)?))
                    .with_ansi(false),
            )
            .init(),
        (_, None) => registry
            .with(fmt::layer().compact().with_target(false))
            .init(),
    }

    Ok(())
}

/// Filter precedence: `RUST_LOG` if set, otherwise the configured level
/// for `scv_core` with dependencies held at `warn`. The level is
/// validated either way so a config typo fails loudly at startup.
fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let level = LevelFilter::from_str(level)
        .map_err(|_| anyhow::anyhow!("unrecognized log level: {level}"))?;
    if let Ok(env) = EnvFilter::try_from_default_env() {
        return Ok(env);
    }
    Ok(EnvFilter::new(format!("warn,scv_core={level}")))
}

fn open_log_file(path: &str) -> anyhow::Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_tracing_levels() {
        assert!(build_filter("trace").is_ok());
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("INFO").is_ok());
        assert!(build_filter("Warn").is_ok());
        assert!(build_filter("error").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_typos() {
        assert!(build_filter("verbose").is_err());
        assert!(build_filter("").is_err());
    }
}
