//! Tracing setup for hosts embedding the engine.
//!
//! The engine itself only emits `tracing` spans and events: one `pipeline`
//! span per run (with a `run_id`) and one `stage` span per stage task.

use crate::config::PipelineConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise the level is `debug` when the
/// configuration is verbose and `info` when it is not.
///
/// Returns `false` when another global subscriber was already installed; that
/// subscriber stays in place.
pub fn init_tracing(config: &PipelineConfig, format: LogFormat) -> bool {
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    match installed {
        Ok(()) => true,
        Err(err) => {
            debug!(error = %err, "Keeping the existing tracing subscriber");
            false
        }
    }
}
