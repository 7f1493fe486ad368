//! Classification and selection of stage failures.
//!
//! Every stage outcome passes through [`classify`]. Real failures are appended
//! to a [`FailureLog`] in arrival order; once all stages have been joined the
//! log selects the pipeline's single reported error.

use crate::cancellation::Cancelled;
use crate::config::PipelineConfig;
use crate::connector::PipeError;
use crate::errors::PipelineError;
use parking_lot::Mutex;
use std::error::Error;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// How a stage's error is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Expected fallout of a downstream stage finishing first; discarded.
    Benign,
    /// A failure to record.
    Real,
}

/// Classifies the error returned by a stage.
///
/// Errors of the terminal stage are always real. For other stages the error is
/// benign when its source chain shows cancellation, a closed connector, or an
/// end-of-stream / broken-pipe I/O condition. A propagated upstream failure is
/// never benign.
pub fn classify(err: &(dyn Error + 'static), terminal: bool) -> Classification {
    if terminal {
        return Classification::Real;
    }
    let mut current = Some(err);
    while let Some(e) = current {
        match teardown_kind(e) {
            Some(true) => return Classification::Benign,
            Some(false) => return Classification::Real,
            None => current = e.source(),
        }
    }
    Classification::Real
}

// Some(true) for teardown conditions, Some(false) for propagated failures.
fn teardown_kind(e: &(dyn Error + 'static)) -> Option<bool> {
    if e.is::<Cancelled>() {
        return Some(true);
    }
    if let Some(pipe) = e.downcast_ref::<PipeError>() {
        return Some(matches!(pipe, PipeError::Closed));
    }
    if let Some(io_err) = e.downcast_ref::<io::Error>() {
        if let Some(inner) = io_err.get_ref() {
            if let Some(kind) = teardown_kind(inner) {
                return Some(kind);
            }
        }
        return match io_err.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Some(true),
            _ => None,
        };
    }
    None
}

/// A real failure observed by a stage task.
#[derive(Debug, Clone)]
pub struct RecordedFailure {
    /// The stage's position.
    pub index: usize,
    /// The stage's error.
    pub cause: Arc<dyn Error + Send + Sync>,
}

/// The failures of one run, in order of arrival.
#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Mutex<Vec<RecordedFailure>>,
    internal: Mutex<Option<PipelineError>>,
}

impl FailureLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a real failure.
    pub fn record(&self, index: usize, cause: Arc<dyn Error + Send + Sync>) {
        self.failures.lock().push(RecordedFailure { index, cause });
    }

    /// Records a failure of the engine itself. The first one is kept.
    pub fn record_internal(&self, error: PipelineError) {
        let mut slot = self.internal.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    /// Returns a snapshot of the recorded failures in arrival order.
    #[must_use]
    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().clone()
    }

    /// Selects the pipeline's outcome.
    ///
    /// An internal failure always wins. Otherwise, with pipefail the failure
    /// of the lowest-indexed stage is reported; without it only a failure of
    /// the terminal stage is.
    pub fn finish(&self, config: &PipelineConfig, terminal: usize) -> Result<(), PipelineError> {
        if let Some(internal) = self.internal.lock().take() {
            return Err(internal);
        }
        let failures = self.failures();

        let chosen = if config.pipefail {
            failures.iter().min_by_key(|f| f.index)
        } else {
            failures.iter().find(|f| f.index == terminal)
        };

        for dropped in failures.iter().filter(|f| chosen.map_or(true, |c| c.index != f.index)) {
            debug!(stage = dropped.index, error = %dropped.cause, "Failure not reported by policy");
        }

        match chosen {
            Some(failure) => Err(PipelineError::Stage {
                index: failure.index,
                source: Arc::clone(&failure.cause),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("exit status 1")]
    struct ExitStatus;

    #[derive(Debug, Error)]
    #[error("copy failed")]
    struct Wrapped(#[source] io::Error);

    fn cause(msg: &str) -> Arc<dyn Error + Send + Sync> {
        Arc::new(io::Error::new(io::ErrorKind::Other, msg.to_string()))
    }

    #[test]
    fn test_terminal_errors_are_real() {
        let cancelled = Cancelled {
            reason: "tail".into(),
        };
        assert_eq!(classify(&cancelled, true), Classification::Real);
    }

    #[test]
    fn test_teardown_errors_are_benign() {
        let cancelled = Cancelled {
            reason: "tail".into(),
        };
        assert_eq!(classify(&cancelled, false), Classification::Benign);
        assert_eq!(classify(&PipeError::Closed, false), Classification::Benign);

        let broken = io::Error::new(io::ErrorKind::BrokenPipe, PipeError::Closed);
        assert_eq!(classify(&broken, false), Classification::Benign);

        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(classify(&eof, false), Classification::Benign);
    }

    #[test]
    fn test_benign_detected_through_source_chain() {
        let wrapped = Wrapped(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert_eq!(classify(&wrapped, false), Classification::Benign);
    }

    #[test]
    fn test_upstream_failure_is_real() {
        let upstream = PipeError::Upstream(Arc::new(ExitStatus));
        let as_io = io::Error::new(io::ErrorKind::Other, upstream);
        assert_eq!(classify(&as_io, false), Classification::Real);
    }

    #[test]
    fn test_other_errors_are_real() {
        assert_eq!(classify(&ExitStatus, false), Classification::Real);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify(&denied, false), Classification::Real);
    }

    #[test]
    fn test_empty_log_succeeds() {
        let log = FailureLog::new();
        assert!(log.finish(&PipelineConfig::new(), 2).is_ok());
    }

    #[test]
    fn test_without_pipefail_only_terminal_counts() {
        let log = FailureLog::new();
        log.record(0, cause("upstream"));
        assert!(log.finish(&PipelineConfig::new(), 2).is_ok());

        let log = FailureLog::new();
        log.record(1, cause("middle"));
        log.record(2, cause("tail"));
        let err = log.finish(&PipelineConfig::new(), 2).expect_err("tail failed");
        assert_eq!(err.to_string(), "stage 2: tail");
    }

    #[test]
    fn test_pipefail_reports_lowest_index() {
        let log = FailureLog::new();
        log.record(2, cause("tail"));
        log.record(1, cause("middle"));
        assert_eq!(
            log.failures().iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![2, 1]
        );

        let config = PipelineConfig::new().with_pipefail(true);
        let err = log.finish(&config, 2).expect_err("pipefail");
        assert_eq!(err.stage_index(), Some(1));
        assert_eq!(err.to_string(), "stage 1: middle");
    }

    #[test]
    fn test_internal_failure_wins() {
        let log = FailureLog::new();
        log.record(2, cause("tail"));
        log.record_internal(PipelineError::Internal {
            index: 0,
            source: io::Error::new(io::ErrorKind::Other, "close"),
        });
        let err = log.finish(&PipelineConfig::new(), 2).expect_err("internal");
        assert!(err.is_internal());
    }
}
