//! Cancellation primitives.
//!
//! This module provides:
//! - CancellationToken for cooperative, one-shot cancellation with child tokens
//! - Cancelled, the condition a stage reports when it stops on cancellation

mod token;

pub use token::{CancelCallback, CancellationToken, Cancelled};
