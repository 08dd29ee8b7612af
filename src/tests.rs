#[cfg(test)]
mod tests {
    use crate::channel::CancelToken;
    use crate::codec;
    use crate::grid::PixelGrid;
    use crate::settings::{OutputFormat, PipelineSettings};
    use crate::stage::StageKind;
    use crate::{Pipeline, PipelineError};
    use image::Rgba;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Duration;

    fn pattern(width: u32, height: u32) -> PixelGrid {
        PixelGrid::from_fn(width, height, |x, y| {
            Rgba([
                (x * 50 + y * 3) as u8,
                (y * 30) as u8,
                ((x * y) % 7 * 20) as u8,
                (60 + x * 10 + y) as u8,
            ])
        })
    }

    fn write_png(dir: &Path, name: &str, grid: &PixelGrid) -> PathBuf {
        let path = dir.join(name);
        let bytes = codec::encode_file(grid, OutputFormat::Png).unwrap();
        codec::write_file(&bytes, &path).unwrap();
        path
    }

    /// Straightforward per-channel CDF equalization, computed without the crate's LUT type.
    fn reference_equalize(grid: &PixelGrid) -> PixelGrid {
        let total = grid.pixel_count();
        let mut luts = [[0u8; 256]; 3];
        for (c, lut) in luts.iter_mut().enumerate() {
            let mut counts = [0u64; 256];
            for p in grid.pixels() {
                counts[p[c] as usize] += 1;
            }
            let mut cumulative = 0u64;
            for v in 0..256 {
                cumulative += counts[v];
                lut[v] = std::cmp::min(255, cumulative * 255 / total) as u8;
            }
        }

        PixelGrid::from_fn(grid.width(), grid.height(), |x, y| {
            let p = grid.pixel(x, y);
            Rgba([luts[0][p[0] as usize], luts[1][p[1] as usize], luts[2][p[2] as usize], p[3]])
        })
    }

    fn png_settings() -> PipelineSettings {
        PipelineSettings {
            output_format: OutputFormat::Png,
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_matches_reference() {
        let dir = tempfile::tempdir().unwrap();
        let input = pattern(4, 8);
        let source = write_png(dir.path(), "source.png", &input);
        let destination = dir.path().join("result.png");

        let report = Pipeline::new(png_settings()).unwrap().run(&source, &destination).unwrap();
        assert!(report.is_success(), "{:?}", report.summary_lines());
        for stage in [StageKind::Reader, StageKind::Transform, StageKind::Writer] {
            assert!(report.timing(stage).is_some());
        }

        let output = codec::decode_file(&destination, &PipelineSettings::default()).unwrap();
        assert_eq!(output.width(), input.width());
        assert_eq!(output.height(), input.height());
        assert_eq!(output, reference_equalize(&input));
    }

    #[test]
    fn test_end_to_end_with_uneven_height() {
        let dir = tempfile::tempdir().unwrap();
        let input = pattern(5, 7);
        let source = write_png(dir.path(), "source.png", &input);
        let destination = dir.path().join("result.png");

        let report = Pipeline::new(png_settings()).unwrap().run(&source, &destination).unwrap();
        assert!(report.is_success());

        let output = codec::decode_file(&destination, &PipelineSettings::default()).unwrap();
        assert_eq!(output.height(), 7);
        assert_eq!(output, reference_equalize(&input));
    }

    #[test]
    fn test_default_bmp_output_keeps_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let input = pattern(6, 9);
        let source = write_png(dir.path(), "source.png", &input);
        let destination = dir.path().join("result.bmp");

        let report = Pipeline::new(PipelineSettings::default())
            .unwrap()
            .run(&source, &destination)
            .unwrap();
        assert!(report.is_success());

        let output = codec::decode_file(&destination, &PipelineSettings::default()).unwrap();
        for (before, after) in input.pixels().zip(output.pixels()) {
            assert_eq!(before[3], after[3]);
        }
    }

    #[test]
    fn test_other_segment_counts() {
        let dir = tempfile::tempdir().unwrap();
        let input = pattern(3, 10);
        let source = write_png(dir.path(), "source.png", &input);

        for segment_count in [1, 3, 12] {
            let destination = dir.path().join(format!("result-{}.png", segment_count));
            let settings = PipelineSettings {
                segment_count,
                ..png_settings()
            };
            let report = Pipeline::new(settings).unwrap().run(&source, &destination).unwrap();
            assert!(report.is_success(), "segments {}", segment_count);

            let output = codec::decode_file(&destination, &PipelineSettings::default()).unwrap();
            assert_eq!(output, reference_equalize(&input), "segments {}", segment_count);
        }
    }

    #[test]
    fn test_fewer_rows_than_segments() {
        let dir = tempfile::tempdir().unwrap();
        let input = pattern(4, 2);
        let source = write_png(dir.path(), "source.png", &input);
        let destination = dir.path().join("result.png");

        let report = Pipeline::new(png_settings()).unwrap().run(&source, &destination).unwrap();
        assert!(report.is_success(), "{:?}", report.summary_lines());

        let output = codec::decode_file(&destination, &PipelineSettings::default()).unwrap();
        assert_eq!(output, reference_equalize(&input));
    }

    #[test]
    fn test_reader_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("missing.png");
        let destination = dir.path().join("result.png");

        let report = Pipeline::new(png_settings()).unwrap().run(&source, &destination).unwrap();
        assert!(!report.is_success());
        assert!(report.reader.produced_nothing());
        assert!(!report.transform.is_completed());
        assert!(!report.writer.is_completed());
        assert!(!destination.exists());

        let (stage, error) = report.root_failure().unwrap();
        assert_eq!(stage, StageKind::Reader);
        assert!(matches!(error, PipelineError::FileNotFound { .. }));

        let lines = report.summary_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Reading the image failed [FILE_NOT_FOUND]"));
    }

    #[test]
    fn test_unwritable_destination_reports_writer_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "source.png", &pattern(4, 8));
        let destination = dir.path().join("occupied");
        std::fs::create_dir(&destination).unwrap();

        let report = Pipeline::new(png_settings()).unwrap().run(&source, &destination).unwrap();
        assert!(report.reader.is_completed());
        assert!(report.transform.is_completed());
        assert!(report.writer.produced_nothing());

        let (stage, error) = report.root_failure().unwrap();
        assert_eq!(stage, StageKind::Writer);
        assert_eq!(error.error_code(), "WRITE_ERROR");
        assert!(report.summary_lines()[2].starts_with("Writing the image failed [WRITE_ERROR]"));
    }

    #[test]
    fn test_corrupt_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("corrupt.png");
        std::fs::write(&source, b"definitely not a png").unwrap();
        let destination = dir.path().join("result.png");

        let report = Pipeline::new(png_settings()).unwrap().run(&source, &destination).unwrap();
        let (stage, error) = report.root_failure().unwrap();
        assert_eq!(stage, StageKind::Reader);
        assert!(error.is_decode_failure());
        assert!(report.writer.produced_nothing());
        assert!(!destination.exists());
    }

    #[test]
    fn test_cancel_interrupts_running_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_png(dir.path(), "source.png", &pattern(4, 8));
        let destination = dir.path().join("result.png");
        let settings = PipelineSettings {
            segment_delay_ms: 500,
            ..png_settings()
        };

        let pipeline = Pipeline::new(settings).unwrap();
        let cancel: CancelToken = pipeline.cancel_token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        });

        let report = pipeline.run(&source, &destination).unwrap();
        canceller.join().unwrap();

        assert!(!report.is_success());
        assert!(report
            .failures()
            .any(|(_, e)| matches!(e, PipelineError::Interrupted { .. })));
        assert!(!destination.exists());
    }

    #[test]
    fn test_invalid_settings_are_rejected_up_front() {
        let settings = PipelineSettings {
            segment_count: 0,
            ..Default::default()
        };
        assert!(Pipeline::new(settings).is_err());
    }
}
