//! Error types for pipeline construction and execution.

use crate::stages::StageError;
use std::error::Error;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The single error a pipeline reports.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline was built without stages.
    #[error("no stages configured")]
    NoStages,

    /// The only stage of a single-stage pipeline failed; reported as-is.
    #[error(transparent)]
    SingleStage(StageError),

    /// The stage selected by the failure policy.
    #[error("stage {index}: {source}")]
    Stage {
        /// Position of the failing stage.
        index: usize,
        /// The stage's own error.
        source: Arc<dyn Error + Send + Sync>,
    },

    /// The engine could not close a connector it owns.
    ///
    /// This points at a bug in connector management, not at a stage. The
    /// in-memory connectors always close cleanly, so this only guards
    /// connector types whose shutdown can fail.
    #[error("internal: stage {index} could not close its output connector: {source}")]
    Internal {
        /// The stage whose output connector failed to close.
        index: usize,
        /// The close error.
        source: io::Error,
    },

    /// A stage task could not be joined.
    #[error("internal: stage {index} task was lost: {message}")]
    Join {
        /// The stage whose task was lost.
        index: usize,
        /// The join error description.
        message: String,
    },
}

impl PipelineError {
    /// Returns the index of the stage this error is attributed to, if any.
    #[must_use]
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            Self::NoStages => None,
            Self::SingleStage(_) => Some(0),
            Self::Stage { index, .. } | Self::Internal { index, .. } | Self::Join { index, .. } => {
                Some(*index)
            }
        }
    }

    /// Returns true for failures of the engine itself rather than of a stage.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::Join { .. })
    }
}

/// Recorded as the cause when a stage panics.
#[derive(Debug, Clone, Error)]
#[error("stage panicked: {message}")]
pub struct StagePanicked {
    /// The panic payload, when it was a string.
    pub message: String,
}

impl StagePanicked {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }
}
