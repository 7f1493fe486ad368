//! Pipeline building and execution.
//!
//! This module provides:
//! - Pipeline construction from stages and options
//! - The stage launcher that runs stages concurrently over connectors

mod builder;
mod launcher;


pub use builder::PipelineBuilder;

use crate::cancellation::CancellationToken;
use crate::config::{ConfigOption, PipelineConfig};
use crate::errors::PipelineError;
use crate::stages::{Diagnostics, DynReader, DynWriter, Stage};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// An ordered, immutable sequence of stages plus its configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline from `stages`, folding `options` over the default
    /// configuration in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoStages`] if `stages` is empty.
    pub fn new<S, O>(stages: S, options: O) -> Result<Self, PipelineError>
    where
        S: IntoIterator<Item = Arc<dyn Stage>>,
        O: IntoIterator,
        O::Item: ConfigOption,
    {
        let stages: Vec<_> = stages.into_iter().collect();
        if stages.is_empty() {
            return Err(PipelineError::NoStages);
        }
        Ok(Self {
            stages,
            config: PipelineConfig::assemble(options),
        })
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in pipeline order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the pipeline.
    ///
    /// `input` feeds the first stage, the last stage writes to `output` and
    /// every stage shares `diagnostics`. Cancelling `token` asks every stage
    /// to stop. All stages have finished when this returns.
    ///
    /// # Errors
    ///
    /// A single-stage pipeline returns that stage's error unchanged. Otherwise
    /// the error selected by the pipefail policy is returned, tagged with its
    /// stage index; failures of the engine itself take precedence.
    pub async fn run<R, W>(
        &self,
        token: &CancellationToken,
        input: R,
        output: W,
        diagnostics: Diagnostics,
    ) -> Result<(), PipelineError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let span = info_span!(
            "pipeline",
            run_id = %Uuid::new_v4(),
            stages = self.stages.len(),
            pipefail = self.config.pipefail
        );
        async move {
            debug!(config = ?self.config, stages = ?self.stage_names(), "Starting pipeline");
            match self.stages.as_slice() {
                [] => Err(PipelineError::NoStages),
                [stage] => {
                    let (mut input, mut output) = (input, output);
                    stage
                        .execute(token, &mut input, &mut output, &diagnostics)
                        .await
                        .map_err(PipelineError::SingleStage)
                }
                stages => {
                    let input: Box<DynReader> = Box::new(input);
                    let output: Box<DynWriter> = Box::new(output);
                    launcher::launch(stages, self.config, token, input, output, diagnostics).await
                }
            }
        }
        .instrument(span)
        .await
    }
}
