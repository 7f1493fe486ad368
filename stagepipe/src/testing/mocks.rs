//! Stages for exercising pipelines in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::cancellation::CancellationToken;
use crate::stages::{Diagnostics, DynReader, DynWriter, Stage, StageError};

/// The error a [`FailingStage`] returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StageFailed(pub String);

/// Copies input to output until end-of-stream, like `cat`.
#[derive(Debug, Clone)]
pub struct CopyStage {
    name: String,
}

impl CopyStage {
    /// Creates a new copy stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for CopyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        input: &mut DynReader,
        output: &mut DynWriter,
        _diagnostics: &Diagnostics,
    ) -> Result<(), StageError> {
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            token.check()?;
            let n = tokio::select! {
                biased;
                () = token.cancelled() => continue,
                read = input.read(&mut buf) => read?,
            };
            if n == 0 {
                output.flush().await?;
                return Ok(());
            }
            output.write_all(&buf[..n]).await?;
        }
    }
}

/// Writes the same chunk over and over, like `yes`.
#[derive(Debug, Clone)]
pub struct RepeatStage {
    name: String,
    chunk: Vec<u8>,
    limit: Option<usize>,
}

impl RepeatStage {
    /// Creates a stage that writes `chunk` until stopped.
    #[must_use]
    pub fn new(name: impl Into<String>, chunk: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            chunk: chunk.into(),
            limit: None,
        }
    }

    /// Stops after `count` chunks.
    #[must_use]
    pub fn times(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }
}

#[async_trait]
impl Stage for RepeatStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        _input: &mut DynReader,
        output: &mut DynWriter,
        _diagnostics: &Diagnostics,
    ) -> Result<(), StageError> {
        let mut written = 0;
        while self.limit.map_or(true, |limit| written < limit) {
            token.check()?;
            output.write_all(&self.chunk).await?;
            written += 1;
        }
        output.flush().await?;
        Ok(())
    }
}

/// Passes through the first `lines` lines and exits, like `head -n`.
#[derive(Debug, Clone)]
pub struct HeadStage {
    name: String,
    lines: usize,
}

impl HeadStage {
    /// Creates a stage that keeps `lines` lines.
    #[must_use]
    pub fn new(name: impl Into<String>, lines: usize) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }
}

#[async_trait]
impl Stage for HeadStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _token: &CancellationToken,
        input: &mut DynReader,
        output: &mut DynWriter,
        _diagnostics: &Diagnostics,
    ) -> Result<(), StageError> {
        let mut reader = BufReader::new(input);
        let mut line = String::new();
        for _ in 0..self.lines {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            output.write_all(line.as_bytes()).await?;
        }
        output.flush().await?;
        Ok(())
    }
}

/// Fails with a fixed message, optionally after draining its input.
#[derive(Debug, Clone)]
pub struct FailingStage {
    name: String,
    message: String,
    drain_input: bool,
}

impl FailingStage {
    /// Creates a stage that fails immediately.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            drain_input: false,
        }
    }

    /// Reads all input before failing.
    #[must_use]
    pub fn after_draining_input(mut self) -> Self {
        self.drain_input = true;
        self
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _token: &CancellationToken,
        input: &mut DynReader,
        _output: &mut DynWriter,
        diagnostics: &Diagnostics,
    ) -> Result<(), StageError> {
        if self.drain_input {
            let mut sink = Vec::new();
            input.read_to_end(&mut sink).await?;
        }
        diagnostics
            .line(&format!("{}: {}", self.name, self.message))
            .await?;
        Err(Box::new(StageFailed(self.message.clone())))
    }
}

/// Panics as soon as it runs.
#[derive(Debug, Clone)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _token: &CancellationToken,
        _input: &mut DynReader,
        _output: &mut DynWriter,
        _diagnostics: &Diagnostics,
    ) -> Result<(), StageError> {
        panic!("{} exploded", self.name)
    }
}

/// Wraps another stage and records what it returned.
#[derive(Debug)]
pub struct RecordingStage {
    inner: Arc<dyn Stage>,
    outcome: Mutex<Option<Result<(), String>>>,
}

impl RecordingStage {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Stage>) -> Self {
        Self {
            inner,
            outcome: Mutex::new(None),
        }
    }

    /// Returns the recorded outcome, with errors rendered as strings.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<(), String>> {
        self.outcome.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        input: &mut DynReader,
        output: &mut DynWriter,
        diagnostics: &Diagnostics,
    ) -> Result<(), StageError> {
        let result = self.inner.execute(token, input, output, diagnostics).await;
        let recorded = match &result {
            Ok(()) => Ok(()),
            Err(err) => Err(err.to_string()),
        };
        *self.outcome.lock() = Some(recorded);
        result
    }
}
