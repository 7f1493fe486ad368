//! Concurrent execution of a multi-stage pipeline.
//!
//! Each stage runs on its own task. Stage `i` reads from connector `i - 1`
//! (or the external input) and writes to connector `i` (or the external
//! output). When the terminal stage finishes it cancels the run and
//! force-closes every connector's read side so that producers blocked on a
//! write are released.

use crate::aggregate::{classify, Classification, FailureLog};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::connector::{ConnectorHandle, Fabric};
use crate::errors::{PipelineError, StagePanicked};
use crate::stages::{Diagnostics, DynReader, DynWriter, Stage, StageError};
use futures::future::join_all;
use futures::FutureExt;
use std::error::Error;
use std::iter;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, debug_span, warn, Instrument};

/// Runs `stages` (at least two) concurrently and joins them.
pub(super) async fn launch(
    stages: &[Arc<dyn Stage>],
    config: PipelineConfig,
    parent: &CancellationToken,
    input: Box<DynReader>,
    output: Box<DynWriter>,
    diagnostics: Diagnostics,
) -> Result<(), PipelineError> {
    let terminal = stages.len() - 1;
    let token = parent.child_token();
    let log = Arc::new(FailureLog::new());

    let (readers, writers, handles) = Fabric::allocate(stages.len()).into_parts();
    let handles: Arc<[ConnectorHandle]> = handles.into();

    let inputs = iter::once(input).chain(
        readers
            .into_iter()
            .map(|reader| Box::new(reader) as Box<DynReader>),
    );
    let outputs = writers
        .into_iter()
        .map(|writer| Box::new(writer) as Box<DynWriter>)
        .chain(iter::once(output));

    let mut tasks = Vec::with_capacity(stages.len());
    for (index, ((stage, input), output)) in stages.iter().zip(inputs).zip(outputs).enumerate() {
        let task = StageTask {
            index,
            terminal,
            stage: Arc::clone(stage),
            config,
            token: Arc::clone(&token),
            handles: Arc::clone(&handles),
            log: Arc::clone(&log),
            diagnostics: diagnostics.clone(),
        };
        let span = debug_span!("stage", index, name = stage.name());
        tasks.push(tokio::spawn(task.run(input, output).instrument(span)));
    }

    for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
        if let Err(err) = joined {
            log.record_internal(PipelineError::Join {
                index,
                message: err.to_string(),
            });
        }
    }

    log.finish(&config, terminal)
}

struct StageTask {
    index: usize,
    terminal: usize,
    stage: Arc<dyn Stage>,
    config: PipelineConfig,
    token: Arc<CancellationToken>,
    handles: Arc<[ConnectorHandle]>,
    log: Arc<FailureLog>,
    diagnostics: Diagnostics,
}

impl StageTask {
    async fn run(self, mut input: Box<DynReader>, mut output: Box<DynWriter>) {
        debug!("Stage started");
        let outcome = AssertUnwindSafe(self.stage.execute(
            &self.token,
            &mut *input,
            &mut *output,
            &self.diagnostics,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(Box::new(StagePanicked::from_payload(&*payload)) as StageError));

        // Recorded before the connectors close so that, under pipefail,
        // downstream reads observe the failure instead of a clean EOF.
        match outcome {
            Ok(()) => debug!("Stage finished"),
            Err(err) => self.report(err),
        }

        self.teardown(input, output).await;
    }

    fn is_terminal(&self) -> bool {
        self.index == self.terminal
    }

    fn report(&self, err: StageError) {
        match classify(&*err, self.is_terminal()) {
            Classification::Benign => {
                debug!(error = %err, "Stage stopped by downstream teardown");
            }
            Classification::Real => {
                warn!(error = %err, "Stage failed");
                let cause: Arc<dyn Error + Send + Sync> = Arc::from(err);
                self.log.record(self.index, Arc::clone(&cause));
                if self.config.pipefail {
                    for handle in self.handles.iter().skip(self.index) {
                        handle.close_write_with_error(Arc::clone(&cause));
                    }
                }
            }
        }
    }

    async fn teardown(&self, input: Box<DynReader>, mut output: Box<DynWriter>) {
        if self.is_terminal() {
            self.token.cancel("terminal stage finished");
            for handle in self.handles.iter() {
                handle.close_read();
            }
        }

        if let Some(upstream) = self.index.checked_sub(1).and_then(|i| self.handles.get(i)) {
            upstream.close_read();
        }
        drop(input);

        if !self.is_terminal() {
            if let Err(source) = output.shutdown().await {
                warn!(error = %source, "Output connector failed to close");
                self.log.record_internal(PipelineError::Internal {
                    index: self.index,
                    source,
                });
            }
        }
    }
}
