use crate::grid::PixelGrid;

pub const BUCKETS: usize = 256;

/// Color channels that take part in equalization, in pixel order. Alpha is excluded.
pub const COLOR_CHANNELS: [usize; 3] = [0, 1, 2];

/// Per-channel frequency counts for red, green and blue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    pub channels: [[u64; BUCKETS]; 3],
    pub total: u64,
}

impl Histogram {
    pub fn from_grid(grid: &PixelGrid) -> Self {
        let mut channels = [[0u64; BUCKETS]; 3];

        for pixel in grid.pixels() {
            for (c, &ch) in COLOR_CHANNELS.iter().enumerate() {
                channels[c][pixel[ch] as usize] += 1;
            }
        }

        Self {
            channels,
            total: grid.pixel_count(),
        }
    }
}

/// Input value -> equalized value, one table per color channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lut {
    pub channels: [[u8; BUCKETS]; 3],
}

impl Lut {
    /// Cumulative-distribution scaling: `lut[v] = min(255, floor(cumsum(v) * 255 / total))`.
    pub fn from_histogram(histogram: &Histogram) -> Self {
        if histogram.total == 0 {
            return Self::identity();
        }

        let mut channels = [[0u8; BUCKETS]; 3];

        for (c, counts) in histogram.channels.iter().enumerate() {
            let mut sum: u64 = 0;
            for (value, &count) in counts.iter().enumerate() {
                sum += count;
                let scaled = sum * 255 / histogram.total;
                channels[c][value] = scaled.min(255) as u8;
            }
        }

        Self { channels }
    }

    pub fn identity() -> Self {
        let mut table = [0u8; BUCKETS];
        for (value, slot) in table.iter_mut().enumerate() {
            *slot = value as u8;
        }
        Self {
            channels: [table; 3],
        }
    }

    pub fn is_monotonic(&self) -> bool {
        self.channels
            .iter()
            .all(|table| table.windows(2).all(|w| w[0] <= w[1]))
    }

    /// Maps R, G and B of every pixel; alpha is left untouched.
    pub fn apply(&self, grid: &mut PixelGrid) {
        for pixel in grid.pixels_mut() {
            for (c, &ch) in COLOR_CHANNELS.iter().enumerate() {
                pixel[ch] = self.channels[c][pixel[ch] as usize];
            }
        }
    }
}

/// Global (non-adaptive) histogram equalization of each color channel.
pub fn equalize(mut grid: PixelGrid) -> PixelGrid {
    if grid.is_empty() {
        return grid;
    }

    let histogram = Histogram::from_grid(&grid);
    let lut = Lut::from_histogram(&histogram);
    tracing::trace!(
        width = grid.width(),
        height = grid.height(),
        "equalizing"
    );
    lut.apply(&mut grid);
    grid
}
