use crate::errors::{PipelineError, Result};
use crate::grid::PixelGrid;
use crate::settings::{OutputFormat, PipelineSettings};
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;

/// Wire container for segments travelling between the transform and writer stages.
pub const SEGMENT_FORMAT: ImageFormat = ImageFormat::Bmp;

const MMAP_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// Decodes the source file into an RGBA grid, enforcing the loader limits.
pub fn decode_file(path: &Path, settings: &PipelineSettings) -> Result<PixelGrid> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file_size = std::fs::metadata(path)?.len();
    if file_size > settings.max_file_size_mb.saturating_mul(1024 * 1024) {
        return Err(PipelineError::SourceTooLarge {
            path: path.to_path_buf(),
            message: format!(
                "File too large: {}MB (max {}MB)",
                file_size / (1024 * 1024),
                settings.max_file_size_mb
            ),
        });
    }

    let image = if file_size > MMAP_THRESHOLD_BYTES {
        decode_memory_mapped(path)?
    } else {
        image::open(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    let grid = PixelGrid::from_dynamic(image);
    if grid.is_empty() {
        return Err(PipelineError::Decode {
            path: path.to_path_buf(),
            message: "image has no pixels".to_string(),
        });
    }

    let megapixels = grid.pixel_count() / 1_000_000;
    if megapixels > settings.max_megapixels {
        return Err(PipelineError::SourceTooLarge {
            path: path.to_path_buf(),
            message: format!(
                "Image too large: {}MP (max {}MP)",
                megapixels, settings.max_megapixels
            ),
        });
    }

    tracing::debug!(path = %path.display(), width = grid.width(), height = grid.height(), "decoded source");
    Ok(grid)
}

fn decode_memory_mapped(path: &Path) -> Result<DynamicImage> {
    use memmap2::Mmap;
    use std::fs::File;

    let file = File::open(path).map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // SAFETY: the mapping is read-only and dropped before this function returns
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: format!("Memory mapping failed: {}", e),
    })?;

    image::load_from_memory(&mmap).map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Serializes a segment as a self-contained BMP. Zero-height segments encode to no bytes.
pub fn encode_segment(grid: &PixelGrid) -> Result<Vec<u8>> {
    if grid.is_empty() {
        return Ok(Vec::new());
    }

    let mut buffer = Cursor::new(Vec::new());
    grid.as_image()
        .write_to(&mut buffer, SEGMENT_FORMAT)
        .map_err(|e| PipelineError::Encode {
            message: format!("segment {}x{}: {}", grid.width(), grid.height(), e),
        })?;
    Ok(buffer.into_inner())
}

/// Inverse of [`encode_segment`]; an empty payload yields an empty grid.
pub fn decode_segment(payload: &[u8]) -> Result<PixelGrid> {
    if payload.is_empty() {
        return Ok(PixelGrid::new(0, 0));
    }

    let image = image::load_from_memory_with_format(payload, SEGMENT_FORMAT).map_err(|e| {
        PipelineError::Transfer {
            message: format!("segment payload of {} bytes did not decode: {}", payload.len(), e),
        }
    })?;
    Ok(PixelGrid::from_dynamic(image))
}

/// Encodes the assembled output grid in memory; see [`write_file`].
pub fn encode_file(grid: &PixelGrid, format: OutputFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    grid.as_image()
        .write_to(&mut buffer, format.image_format())
        .map_err(|e| PipelineError::Encode {
            message: format!("output {}: {}", format.extension(), e),
        })?;
    Ok(buffer.into_inner())
}

pub fn write_file(bytes: &[u8], path: &Path) -> Result<()> {
    let mut file = create_output(path)?;
    write_output(&mut file, bytes, path)
}

/// Creates (or truncates) the destination. Nothing has been written if this fails.
pub fn create_output(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| PipelineError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn write_output(file: &mut File, bytes: &[u8], path: &Path) -> Result<()> {
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| PipelineError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample(width: u32, height: u32) -> PixelGrid {
        PixelGrid::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, (x * y) as u8, 100 + x as u8]))
    }

    #[test]
    fn test_segment_survives_bmp_container() {
        let grid = sample(5, 3);
        let bytes = encode_segment(&grid).unwrap();
        assert_eq!(&bytes[..2], b"BM");
        assert_eq!(decode_segment(&bytes).unwrap(), grid);
    }

    #[test]
    fn test_empty_segment_has_empty_payload() {
        let bytes = encode_segment(&PixelGrid::new(5, 0)).unwrap();
        assert!(bytes.is_empty());
        assert!(decode_segment(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_payload_is_transfer_error() {
        let err = decode_segment(b"not an image").unwrap_err();
        assert!(err.is_transfer_failure());
    }

    #[test]
    fn test_missing_source() {
        let err = decode_file(Path::new("/definitely/not/here.png"), &PipelineSettings::default()).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_corrupt_source_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG but not really").unwrap();
        let err = decode_file(&path, &PipelineSettings::default()).unwrap_err();
        assert!(err.is_decode_failure());
    }

    #[test]
    fn test_write_then_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let grid = sample(4, 4);
        let bytes = encode_file(&grid, OutputFormat::Png).unwrap();
        write_file(&bytes, &path).unwrap();
        assert_eq!(decode_file(&path, &PipelineSettings::default()).unwrap(), grid);
    }

    #[test]
    fn test_huge_size_limit_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        let grid = sample(3, 2);
        write_file(&encode_file(&grid, OutputFormat::Png).unwrap(), &path).unwrap();

        let settings = PipelineSettings {
            max_file_size_mb: u64::MAX,
            ..Default::default()
        };
        assert_eq!(decode_file(&path, &settings).unwrap(), grid);
    }

    #[test]
    fn test_directory_destination_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_output(dir.path()).unwrap_err();
        assert_eq!(err.error_code(), "WRITE_ERROR");
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let err = write_file(b"BM", Path::new("/no/such/dir/out.bmp")).unwrap_err();
        assert_eq!(err.error_code(), "WRITE_ERROR");
    }
}
