//! Stage trait and the streams handed to a stage.
//!
//! Stages are opaque units of work: the engine only wires their streams and
//! invokes them.

mod diagnostics;

pub use diagnostics::Diagnostics;

use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::Debug;
use tokio::io::{AsyncRead, AsyncWrite};

/// The failure value a stage returns.
pub type StageError = Box<dyn Error + Send + Sync>;

/// The input stream type a stage reads from.
pub type DynReader = dyn AsyncRead + Send + Unpin;

/// The output stream type a stage writes to.
pub type DynWriter = dyn AsyncWrite + Send + Unpin;

/// Trait for pipeline stages.
///
/// A stage consumes `input`, produces `output` and may report progress or
/// problems on the shared `diagnostics` stream. It should observe `token`
/// (or notice its connectors closing) and stop early when asked to.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `token` - The run's cancellation token
    /// * `input` - The stream to read from
    /// * `output` - The stream to write to
    /// * `diagnostics` - The shared diagnostic stream
    async fn execute(
        &self,
        token: &CancellationToken,
        input: &mut DynReader,
        output: &mut DynWriter,
        diagnostics: &Diagnostics,
    ) -> Result<(), StageError>;
}
