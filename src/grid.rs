use crate::errors::{PipelineError, Result};
use image::{imageops, DynamicImage, Rgba, RgbaImage};

/// One pixel: red, green, blue, alpha (0-255 each).
pub type Pixel = Rgba<u8>;

/// Owned RGBA pixel grid handed from stage to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    image: RgbaImage,
}

impl PixelGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: FnMut(u32, u32) -> Pixel,
    {
        Self {
            image: RgbaImage::from_fn(width, height, f),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            image: image.into_rgba8(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        *self.image.get_pixel(x, y)
    }

    pub fn pixels(&self) -> impl Iterator<Item = &Pixel> {
        self.image.pixels()
    }

    pub fn pixels_mut(&mut self) -> impl Iterator<Item = &mut Pixel> {
        self.image.pixels_mut()
    }

    /// Iterates the pixels of row `y`, left to right.
    pub fn row(&self, y: u32) -> impl Iterator<Item = &Pixel> {
        let width = self.width() as usize;
        self.image
            .pixels()
            .skip(y as usize * width)
            .take(width)
    }

    /// Copies a full-width band of rows starting at `y`.
    pub fn rows(&self, y: u32, height: u32) -> PixelGrid {
        let view = imageops::crop_imm(&self.image, 0, y, self.width(), height);
        Self {
            image: view.to_image(),
        }
    }

    /// Writes `band` into this grid with its top edge at row `y`.
    pub fn paste(&mut self, band: &PixelGrid, y: u32) {
        imageops::replace(&mut self.image, &band.image, 0, y as i64);
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

/// A contiguous band of rows `[y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub index: usize,
    pub y: u32,
    pub height: u32,
}

/// Splits an image height into `count` full-width bands; the last band absorbs the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    pub image_height: u32,
    pub count: usize,
}

impl SegmentLayout {
    pub fn new(image_height: u32, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(PipelineError::InvalidSettings {
                message: "segment count must be at least 1".to_string(),
            });
        }
        Ok(Self { image_height, count })
    }

    /// Height of every band except the last.
    pub fn base_height(&self) -> u32 {
        self.image_height / self.count as u32
    }

    pub fn band(&self, index: usize) -> Band {
        let base = self.base_height();
        let y = index as u32 * base;
        let height = if index + 1 == self.count {
            self.image_height - y
        } else {
            base
        };
        Band { index, y, height }
    }

    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        (0..self.count).map(move |i| self.band(i))
    }
}

/// A band of rows cut from a grid, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub y: u32,
    pub grid: PixelGrid,
}

pub fn split_rows(grid: &PixelGrid, layout: &SegmentLayout) -> Vec<Segment> {
    layout
        .bands()
        .map(|band| Segment {
            index: band.index,
            y: band.y,
            grid: grid.rows(band.y, band.height),
        })
        .collect()
}

/// Stacks bands top to bottom in the order given. The output height is the sum
/// of the band heights, so a taller final band is placed correctly.
pub fn reassemble(bands: &[PixelGrid]) -> Result<PixelGrid> {
    let non_empty: Vec<&PixelGrid> = bands.iter().filter(|b| !b.is_empty()).collect();
    let width = match non_empty.first() {
        Some(first) => first.width(),
        None => return Ok(PixelGrid::new(0, 0)),
    };

    if let Some(bad) = non_empty.iter().find(|b| b.width() != width) {
        return Err(PipelineError::Transfer {
            message: format!("segment width {} does not match {}", bad.width(), width),
        });
    }

    let height: u32 = non_empty.iter().map(|b| b.height()).sum();
    let mut output = PixelGrid::new(width, height);
    let mut y = 0;
    for band in non_empty {
        output.paste(band, y);
        y += band.height();
    }
    Ok(output)
}
