use crate::channel::{ByteWriter, CancelToken, HandoffReceiver};
use crate::codec;
use crate::equalize::equalize;
use crate::errors::Result;
use crate::framing;
use crate::grid::{split_rows, PixelGrid, SegmentLayout};
use crate::settings::PipelineSettings;
use crate::stage::{Stage, StageFailure, StageKind, StageResult, StageTiming};
use std::time::Instant;

/// Equalizes the handed-off grid and streams it downstream as length-prefixed segments.
pub struct TransformStage {
    settings: PipelineSettings,
}

impl TransformStage {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    /// Segments go out strictly in index order; the writer relies on arrival order.
    fn stream(
        &self,
        grid: &PixelGrid,
        output: &mut ByteWriter,
        cancel: &CancelToken,
        sent: &mut usize,
    ) -> Result<()> {
        let layout = SegmentLayout::new(grid.height(), self.settings.segment_count)?;

        for segment in split_rows(grid, &layout) {
            cancel.check(StageKind::Transform)?;

            let payload = codec::encode_segment(&segment.grid)?;
            framing::write_frame(output, &payload)?;
            *sent += 1;
            log::info!(
                "Segment {} of {} has been transmitted ({} bytes)",
                segment.index + 1,
                layout.count,
                payload.len()
            );

            cancel.pause(StageKind::Transform, self.settings.segment_delay())?;
        }
        Ok(())
    }
}

impl Stage for TransformStage {
    type Input = HandoffReceiver<PixelGrid>;
    type Output = ByteWriter;

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn run(self, input: HandoffReceiver<PixelGrid>, mut output: ByteWriter, cancel: &CancelToken) -> StageResult {
        let grid = match input.recv(StageKind::Transform, cancel) {
            Ok(grid) => grid,
            Err(e) => {
                output.abort(e.to_string());
                return Err(StageFailure::nothing_produced("waiting for the image", e));
            }
        };

        // Only the equalization itself is timed
        let started = Instant::now();
        let equalized = equalize(grid);
        let elapsed = started.elapsed();
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "equalization finished");

        let mut sent = 0;
        if let Err(e) = self.stream(&equalized, &mut output, cancel, &mut sent) {
            output.abort(e.to_string());
            let operation = "streaming segments";
            return Err(if sent > 0 {
                StageFailure::partial(operation, e)
            } else {
                StageFailure::nothing_produced(operation, e)
            });
        }
        output.close();

        Ok(StageTiming {
            stage: StageKind::Transform,
            elapsed,
        })
    }
}
