use crate::channel::{byte_channel, handoff, CancelToken};
use crate::errors::{PipelineError, Result};
use crate::grid::PixelGrid;
use crate::reader::ReaderStage;
use crate::settings::PipelineSettings;
use crate::stage::{spawn_stage, StageKind, StageOutcome, StageTiming};
use crate::transform::TransformStage;
use crate::writer::WriterStage;
use std::path::{Path, PathBuf};

/// Wires reader -> transform -> writer and runs one image through them.
pub struct Pipeline {
    settings: PipelineSettings,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            cancel: CancelToken::new(),
        })
    }

    /// Cancelling this token interrupts every stage of a running pipeline.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the three stages concurrently and waits for all of them.
    /// Stage failures are reported in the returned [`PipelineReport`], not as `Err`.
    pub fn run(&self, source: &Path, destination: &Path) -> Result<PipelineReport> {
        let (grid_tx, grid_rx) = handoff::<PixelGrid>(self.settings.handoff_capacity);
        let (bytes_tx, bytes_rx) = byte_channel();

        log::info!(
            "Processing {} -> {} in {} segments",
            source.display(),
            destination.display(),
            self.settings.segment_count
        );

        let reader = spawn_stage(
            ReaderStage::new(self.settings.clone()),
            source.to_path_buf(),
            grid_tx,
            &self.cancel,
        )?;

        let transform = match spawn_stage(
            TransformStage::new(self.settings.clone()),
            grid_rx,
            bytes_tx,
            &self.cancel,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.cancel.cancel();
                reader.join();
                return Err(e);
            }
        };

        let writer = match spawn_stage(
            WriterStage::new(self.settings.clone()),
            bytes_rx,
            destination.to_path_buf(),
            &self.cancel,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.cancel.cancel();
                reader.join();
                transform.join();
                return Err(e);
            }
        };

        let report = PipelineReport {
            reader: reader.join(),
            transform: transform.join(),
            writer: writer.join(),
            destination: destination.to_path_buf(),
        };

        if report.is_success() {
            tracing::debug!(destination = %destination.display(), "pipeline completed");
        } else {
            log::warn!("Pipeline finished with {} failed stage(s)", report.failures().count());
        }
        Ok(report)
    }
}

/// Final state of each stage after the pipeline has been joined.
#[derive(Debug)]
pub struct PipelineReport {
    pub reader: StageOutcome,
    pub transform: StageOutcome,
    pub writer: StageOutcome,
    pub destination: PathBuf,
}

impl PipelineReport {
    pub fn outcomes(&self) -> [(StageKind, &StageOutcome); 3] {
        [
            (StageKind::Reader, &self.reader),
            (StageKind::Transform, &self.transform),
            (StageKind::Writer, &self.writer),
        ]
    }

    pub fn is_success(&self) -> bool {
        self.outcomes().iter().all(|(_, outcome)| outcome.is_completed())
    }

    pub fn failures(&self) -> impl Iterator<Item = (StageKind, &PipelineError)> + '_ {
        self.outcomes()
            .into_iter()
            .filter_map(|(kind, outcome)| outcome.error().map(|e| (kind, e)))
    }

    /// The failure that started the cascade, i.e. the most upstream one.
    pub fn root_failure(&self) -> Option<(StageKind, &PipelineError)> {
        self.failures().next()
    }

    pub fn timing(&self, stage: StageKind) -> Option<StageTiming> {
        self.outcomes()
            .iter()
            .find(|(kind, _)| *kind == stage)
            .and_then(|(_, outcome)| outcome.timing())
    }

    /// One human-readable line per stage: elapsed seconds, or the failure.
    pub fn summary_lines(&self) -> Vec<String> {
        self.outcomes()
            .iter()
            .map(|(kind, outcome)| match outcome {
                StageOutcome::Completed(timing) => {
                    format!("{} took {:.3} seconds", kind.activity(), timing.seconds())
                }
                StageOutcome::Failed { error, partial, .. } => format!(
                    "{} failed{} [{}]: {}",
                    kind.activity(),
                    if *partial { " after partial output" } else { "" },
                    error.error_code(),
                    error
                ),
            })
            .collect()
    }
}
