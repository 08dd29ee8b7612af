use crate::channel::{CancelToken, HandoffSender};
use crate::codec;
use crate::errors::Result;
use crate::grid::{PixelGrid, SegmentLayout};
use crate::settings::PipelineSettings;
use crate::stage::{Stage, StageFailure, StageKind, StageResult, StageTiming};
use std::path::PathBuf;
use std::time::Instant;

/// Decodes the source and rebuilds it band by band before handing it off whole.
pub struct ReaderStage {
    settings: PipelineSettings,
}

impl ReaderStage {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    fn ingest(&self, source: &PixelGrid, cancel: &CancelToken) -> Result<PixelGrid> {
        let layout = SegmentLayout::new(source.height(), self.settings.segment_count)?;
        let mut rebuilt = PixelGrid::new(source.width(), source.height());

        for band in layout.bands() {
            cancel.check(StageKind::Reader)?;
            log::info!("Reading segment {} of {}", band.index + 1, layout.count);

            if self.settings.trace_rows {
                for row in band.y..band.y + band.height {
                    let touched = source.row(row).count();
                    tracing::trace!(row, pixels = touched, "reader touched row");
                }
            }

            let rows = source.rows(band.y, band.height);
            rebuilt.paste(&rows, band.y);
            log::info!("Segment {} has been read", band.index + 1);

            cancel.pause(StageKind::Reader, self.settings.segment_delay())?;
        }

        Ok(rebuilt)
    }
}

impl Stage for ReaderStage {
    type Input = PathBuf;
    type Output = HandoffSender<PixelGrid>;

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn run(self, source: PathBuf, output: HandoffSender<PixelGrid>, cancel: &CancelToken) -> StageResult {
        let started = Instant::now();

        let decoded = codec::decode_file(&source, &self.settings)
            .map_err(|e| StageFailure::nothing_produced("decoding the source image", e))?;
        let rebuilt = self
            .ingest(&decoded, cancel)
            .map_err(|e| StageFailure::nothing_produced("reading segments", e))?;
        drop(decoded);

        let elapsed = started.elapsed();

        output
            .send(rebuilt)
            .map_err(|e| StageFailure::nothing_produced("handing off the image", e))?;
        output.close();

        Ok(StageTiming {
            stage: StageKind::Reader,
            elapsed,
        })
    }
}
