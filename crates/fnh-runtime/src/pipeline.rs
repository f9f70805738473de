//! Single-shot load → resolve → decode → invoke run.

use std::fmt;
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::Harness;
use crate::error::{HarnessError, Stage};
use crate::invoker::Invocation;
use crate::namespace::Namespace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Loaded,
    Resolved,
    Decoded,
    Invoked,
    Failed(Stage),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Uninitialized => f.write_str("uninitialized"),
            PipelineState::Loaded => f.write_str("loaded"),
            PipelineState::Resolved => f.write_str("resolved"),
            PipelineState::Decoded => f.write_str("decoded"),
            PipelineState::Invoked => f.write_str("invoked"),
            PipelineState::Failed(stage) => write!(f, "failed at {stage}"),
        }
    }
}

/// A run that failed; `reached` is the last state completed before `stage` failed.
#[derive(Debug, Error)]
#[error("{stage} stage failed")]
pub struct PipelineError {
    pub stage: Stage,
    pub reached: PipelineState,
    #[source]
    pub source: HarnessError,
}

impl PipelineError {
    /// Terminal state of the failed run.
    pub fn state(&self) -> PipelineState {
        PipelineState::Failed(self.stage)
    }
}

pub(crate) enum ArtifactSource<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

pub(crate) struct Pipeline<'h> {
    harness: &'h Harness,
    state: PipelineState,
}

impl<'h> Pipeline<'h> {
    pub(crate) fn new(harness: &'h Harness) -> Self {
        Self {
            harness,
            state: PipelineState::Uninitialized,
        }
    }

    /// Drive every stage once. Consumes the pipeline: a failed run is not resumable.
    pub(crate) fn run(
        mut self,
        artifact: ArtifactSource<'_>,
        handler: &str,
        payload: &str,
    ) -> Result<Invocation, PipelineError> {
        let loaded = match artifact {
            ArtifactSource::Path(path) => self.harness.load(path),
            ArtifactSource::Bytes(bytes) => self.harness.load_bytes(bytes),
        };
        let namespace: Namespace = self.step(loaded, PipelineState::Loaded)?;
        let resolved = self.harness.resolve(&namespace, handler);
        let descriptor = self.step(resolved, PipelineState::Resolved)?;
        let decoded = self.harness.decode(payload, &descriptor);
        let instance = self.step(decoded, PipelineState::Decoded)?;
        let invoked = self.harness.invoke(&namespace, &descriptor, instance);
        self.step(invoked, PipelineState::Invoked)
    }

    fn step<T>(
        &mut self,
        result: Result<T, HarnessError>,
        next: PipelineState,
    ) -> Result<T, PipelineError> {
        match result {
            Ok(value) => {
                debug!("pipeline {} -> {}", self.state, next);
                self.state = next;
                Ok(value)
            }
            Err(source) => {
                let stage = source.stage();
                debug!(
                    "pipeline {} -> {}: {source}",
                    self.state,
                    PipelineState::Failed(stage)
                );
                Err(PipelineError {
                    stage,
                    reached: self.state,
                    source,
                })
            }
        }
    }
}
