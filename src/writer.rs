use crate::channel::{ByteReader, CancelToken};
use crate::codec;
use crate::errors::{PipelineError, Result};
use crate::framing;
use crate::grid::{reassemble, PixelGrid};
use crate::settings::PipelineSettings;
use crate::stage::{Stage, StageFailure, StageKind, StageResult, StageTiming};
use std::path::PathBuf;
use std::time::Instant;

/// Receives the segments in arrival order, stacks them and writes the final image.
pub struct WriterStage {
    settings: PipelineSettings,
}

impl WriterStage {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    fn receive(&self, input: &mut ByteReader, cancel: &CancelToken) -> Result<PixelGrid> {
        let count = self.settings.segment_count;
        let mut bands = Vec::with_capacity(count);

        for index in 0..count {
            let payload = framing::read_frame(input).map_err(|e| {
                if cancel.is_cancelled() {
                    PipelineError::Interrupted {
                        stage: StageKind::Writer,
                    }
                } else {
                    e
                }
            })?;
            let band = codec::decode_segment(&payload)?;
            log::info!(
                "Segment {} of {} has been received and added ({} rows)",
                index + 1,
                count,
                band.height()
            );
            bands.push(band);

            cancel.pause(StageKind::Writer, self.settings.segment_delay())?;
        }

        // Sized from the received bands, so a taller final band still fits
        reassemble(&bands)
    }
}

impl Stage for WriterStage {
    type Input = ByteReader;
    type Output = PathBuf;

    fn kind(&self) -> StageKind {
        StageKind::Writer
    }

    fn run(self, input: ByteReader, destination: PathBuf, cancel: &CancelToken) -> StageResult {
        let started = Instant::now();
        let mut input = input.with_cancel(cancel.clone());

        let assembled = self
            .receive(&mut input, cancel)
            .map_err(|e| StageFailure::nothing_produced("receiving segments", e))?;
        drop(input);

        let bytes = codec::encode_file(&assembled, self.settings.output_format)
            .map_err(|e| StageFailure::nothing_produced("encoding the output image", e))?;

        // Once the destination has been created, a failed write leaves a truncated file behind
        let mut file = codec::create_output(&destination)
            .map_err(|e| StageFailure::nothing_produced("creating the output file", e))?;
        codec::write_output(&mut file, &bytes, &destination)
            .map_err(|e| StageFailure::partial("writing the output image", e))?;
        log::info!("The image has been written to {}", destination.display());

        Ok(StageTiming {
            stage: StageKind::Writer,
            elapsed: started.elapsed(),
        })
    }
}
