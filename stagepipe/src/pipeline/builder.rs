//! Pipeline construction.

use super::Pipeline;
use crate::config::{ConfigOption, PipelineConfig};
use crate::errors::PipelineError;
use crate::stages::Stage;
use std::sync::Arc;

/// Builder for creating pipelines.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    /// The stages, in pipeline order.
    stages: Vec<Arc<dyn Stage>>,
    /// Configuration folded from the options added so far.
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends several stages, in order.
    #[must_use]
    pub fn stages<I>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Stage>>,
    {
        self.stages.extend(stages);
        self
    }

    /// Applies an option on top of the options already given.
    #[must_use]
    pub fn option(mut self, option: impl ConfigOption) -> Self {
        option.apply(&mut self.config);
        self
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoStages`] if no stage was added.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }
        Ok(Pipeline {
            stages: self.stages,
            config: self.config,
        })
    }
}
