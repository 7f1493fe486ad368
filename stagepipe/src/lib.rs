//! # Stagepipe
//!
//! Run byte-stream stages concurrently with shell pipeline semantics.
//!
//! Stagepipe wires an ordered list of stages together the way a shell wires
//! `a | b | c`:
//!
//! - **Streaming connectors**: each stage's output feeds the next stage's input
//!   through a synchronous, unbuffered pipe
//! - **Early exit**: when the last stage finishes, the run is cancelled and
//!   upstream writers are released instead of being treated as failures
//! - **Pipefail**: optionally report failures from any stage, not just the last
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagepipe::prelude::*;
//! use stagepipe::testing::{HeadStage, RepeatStage};
//!
//! let pipeline = PipelineBuilder::new()
//!     .stage(Arc::new(RepeatStage::new("yes", "y\n")))
//!     .stage(Arc::new(HeadStage::new("head", 10)))
//!     .option(PipelineOption::PIPEFAIL)
//!     .build()?;
//!
//! let token = CancellationToken::new();
//! pipeline
//!     .run(&token, tokio::io::stdin(), tokio::io::stdout(), Diagnostics::new(tokio::io::stderr()))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod cancellation;
pub mod config;
pub mod connector;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, Cancelled};
    pub use crate::config::{ConfigOption, PipelineConfig, PipelineOption};
    pub use crate::connector::{pipe, PipeError, PipeReader, PipeWriter};
    pub use crate::errors::{PipelineError, StagePanicked};
    pub use crate::pipeline::{Pipeline, PipelineBuilder};
    pub use crate::stages::{Diagnostics, DynReader, DynWriter, Stage, StageError};
}
