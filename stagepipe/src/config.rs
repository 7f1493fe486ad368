//! Pipeline configuration and the options that build it.

use serde::{Deserialize, Serialize};

/// Immutable settings for one pipeline, shared read-only by all stages.
///
/// Only `pipefail` changes engine behaviour. The remaining fields are accepted
/// and carried for forward compatibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether a failure of any stage may become the pipeline's failure.
    pub pipefail: bool,
    /// Reserved.
    pub buffered: bool,
    /// Reserved.
    pub verbose: bool,
    /// Reserved.
    pub dry_run: bool,
    /// Reserved. Zero means no hint.
    pub max_concurrency: usize,
}

impl PipelineConfig {
    /// Creates the all-default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration by applying `options` to the default, in order.
    pub fn assemble<I>(options: I) -> Self
    where
        I: IntoIterator,
        I::Item: ConfigOption,
    {
        let mut config = Self::default();
        for option in options {
            option.apply(&mut config);
        }
        config
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets pipefail.
    #[must_use]
    pub fn with_pipefail(mut self, enabled: bool) -> Self {
        self.pipefail = enabled;
        self
    }

    /// Sets the buffered flag.
    #[must_use]
    pub fn with_buffered(mut self, enabled: bool) -> Self {
        self.buffered = enabled;
        self
    }

    /// Sets the verbose flag.
    #[must_use]
    pub fn with_verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    /// Sets the dry-run flag.
    #[must_use]
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sets the concurrency hint.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }
}

/// Something that can be folded into a [`PipelineConfig`].
pub trait ConfigOption {
    /// Applies this option to `config`.
    fn apply(&self, config: &mut PipelineConfig);
}

/// The built-in configuration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "option", content = "value")]
pub enum PipelineOption {
    /// Enables or disables pipefail.
    Pipefail(bool),
    /// Buffered or unbuffered output.
    Buffered(bool),
    /// Verbose or quiet.
    Verbose(bool),
    /// Dry run or normal.
    DryRun(bool),
    /// Concurrency hint.
    MaxConcurrency(usize),
}

impl PipelineOption {
    /// `set -o pipefail`.
    pub const PIPEFAIL: Self = Self::Pipefail(true);
    /// Only the last stage decides the outcome.
    pub const NO_PIPEFAIL: Self = Self::Pipefail(false);
    /// Buffered output.
    pub const BUFFERED: Self = Self::Buffered(true);
    /// Unbuffered output.
    pub const UNBUFFERED: Self = Self::Buffered(false);
    /// Verbose.
    pub const VERBOSE: Self = Self::Verbose(true);
    /// Quiet.
    pub const QUIET: Self = Self::Verbose(false);
    /// Dry run.
    pub const DRY_RUN: Self = Self::DryRun(true);
    /// Normal run.
    pub const NO_DRY_RUN: Self = Self::DryRun(false);
}

impl ConfigOption for PipelineOption {
    fn apply(&self, config: &mut PipelineConfig) {
        match *self {
            Self::Pipefail(v) => config.pipefail = v,
            Self::Buffered(v) => config.buffered = v,
            Self::Verbose(v) => config.verbose = v,
            Self::DryRun(v) => config.dry_run = v,
            Self::MaxConcurrency(v) => config.max_concurrency = v,
        }
    }
}

impl<T: ConfigOption> ConfigOption for Option<T> {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(option) = self {
            option.apply(config);
        }
    }
}

impl<T: ConfigOption + ?Sized> ConfigOption for &T {
    fn apply(&self, config: &mut PipelineConfig) {
        (**self).apply(config);
    }
}

impl<T: ConfigOption + ?Sized> ConfigOption for Box<T> {
    fn apply(&self, config: &mut PipelineConfig) {
        (**self).apply(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Strict;

    impl ConfigOption for Strict {
        fn apply(&self, config: &mut PipelineConfig) {
            config.pipefail = true;
            config.max_concurrency = 1;
        }
    }

    #[test]
    fn test_default_is_all_off() {
        let config = PipelineConfig::assemble(Vec::<PipelineOption>::new());
        assert_eq!(config, PipelineConfig::default());
        assert!(!config.pipefail);
        assert_eq!(config.max_concurrency, 0);
    }

    #[test]
    fn test_options_apply_in_order() {
        let config = PipelineConfig::assemble([
            PipelineOption::PIPEFAIL,
            PipelineOption::VERBOSE,
            PipelineOption::MaxConcurrency(8),
            PipelineOption::NO_PIPEFAIL,
        ]);
        assert_eq!(
            config,
            PipelineConfig::new()
                .with_verbose(true)
                .with_max_concurrency(8)
        );
    }

    #[test]
    fn test_absent_options_are_skipped() {
        let config = PipelineConfig::assemble([
            None,
            Some(PipelineOption::DRY_RUN),
            None,
            Some(PipelineOption::BUFFERED),
        ]);
        assert!(config.dry_run);
        assert!(config.buffered);
        assert!(!config.pipefail);
    }

    #[test]
    fn test_custom_options_as_trait_objects() {
        let options: Vec<Box<dyn ConfigOption>> =
            vec![Box::new(PipelineOption::QUIET), Box::new(Strict)];
        let config = PipelineConfig::assemble(options);
        assert!(config.pipefail);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_from_json_keeps_defaults() {
        let config = PipelineConfig::from_json(r#"{"pipefail": true}"#).expect("valid json");
        assert_eq!(config, PipelineConfig::new().with_pipefail(true));
    }

    #[test]
    fn test_option_serde_shape() {
        let json = serde_json::to_value(PipelineOption::MaxConcurrency(4)).expect("serialize");
        assert_eq!(json, serde_json::json!({"option": "max_concurrency", "value": 4}));
    }
}
