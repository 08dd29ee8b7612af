use crate::channel::CancelToken;
use crate::errors::{PipelineError, Result};
use std::fmt;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Reader,
    Transform,
    Writer,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Reader => "reader",
            StageKind::Transform => "transform",
            StageKind::Writer => "writer",
        }
    }

    /// Phrase used in the timing report.
    pub fn activity(self) -> &'static str {
        match self {
            StageKind::Reader => "Reading the image",
            StageKind::Transform => "Processing the image",
            StageKind::Writer => "Writing the image",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Elapsed time a stage measured for its own work; set once, read once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: StageKind,
    pub elapsed: Duration,
}

impl StageTiming {
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub error: PipelineError,
    /// What the stage was doing when it failed, for the log line.
    pub operation: &'static str,
    /// The stage had already emitted output downstream or to disk.
    pub partial: bool,
}

impl StageFailure {
    pub fn nothing_produced(operation: &'static str, error: PipelineError) -> Self {
        Self {
            error,
            operation,
            partial: false,
        }
    }

    pub fn partial(operation: &'static str, error: PipelineError) -> Self {
        Self {
            error,
            operation,
            partial: true,
        }
    }
}

pub type StageResult = std::result::Result<StageTiming, StageFailure>;

/// A pipeline stage reading from one port and writing to another on its own thread.
/// Closing (dropping) `output` is how a stage signals end-of-data downstream.
pub trait Stage: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn kind(&self) -> StageKind;

    fn run(self, input: Self::Input, output: Self::Output, cancel: &CancelToken) -> StageResult;
}

#[derive(Debug)]
pub enum StageOutcome {
    Completed(StageTiming),
    Failed {
        stage: StageKind,
        error: PipelineError,
        partial: bool,
    },
}

impl StageOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }

    pub fn timing(&self) -> Option<StageTiming> {
        match self {
            StageOutcome::Completed(timing) => Some(*timing),
            StageOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            StageOutcome::Completed(_) => None,
            StageOutcome::Failed { error, .. } => Some(error),
        }
    }

    /// Failed before emitting anything.
    pub fn produced_nothing(&self) -> bool {
        matches!(self, StageOutcome::Failed { partial: false, .. })
    }

    /// Failed after emitting some output.
    pub fn is_partial(&self) -> bool {
        matches!(self, StageOutcome::Failed { partial: true, .. })
    }
}

pub struct StageHandle {
    kind: StageKind,
    handle: thread::JoinHandle<StageResult>,
}

impl StageHandle {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Waits for the stage thread. A panic inside the stage becomes a failure outcome.
    pub fn join(self) -> StageOutcome {
        let kind = self.kind;
        match self.handle.join() {
            Ok(Ok(timing)) => {
                tracing::debug!(stage = %kind, elapsed_ms = timing.elapsed.as_millis() as u64, "stage completed");
                StageOutcome::Completed(timing)
            }
            Ok(Err(failure)) => {
                failure.error.log_for_stage(kind, failure.operation);
                StageOutcome::Failed {
                    stage: kind,
                    error: failure.error,
                    partial: failure.partial,
                }
            }
            Err(_) => {
                log::error!("{} stage thread panicked", kind);
                StageOutcome::Failed {
                    stage: kind,
                    error: PipelineError::StagePanicked { stage: kind },
                    partial: false,
                }
            }
        }
    }
}

/// Starts `stage` on a dedicated, named thread.
pub fn spawn_stage<S: Stage>(
    stage: S,
    input: S::Input,
    output: S::Output,
    cancel: &CancelToken,
) -> Result<StageHandle> {
    let kind = stage.kind();
    let cancel = cancel.clone();
    let handle = thread::Builder::new()
        .name(format!("eqpipe-{}", kind))
        .spawn(move || stage.run(input, output, &cancel))?;

    Ok(StageHandle { kind, handle })
}
