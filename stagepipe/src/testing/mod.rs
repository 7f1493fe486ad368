//! Testing utilities for pipelines.
//!
//! This module provides:
//! - Stages modelled on common shell tools (`cat`, `yes`, `head`)
//! - Stages that fail or panic on demand, and a recording wrapper
//! - An in-memory output buffer

mod buffer;
mod mocks;

pub use buffer::SharedBuffer;
pub use mocks::{
    CopyStage, FailingStage, HeadStage, PanickingStage, RecordingStage, RepeatStage, StageFailed,
};
