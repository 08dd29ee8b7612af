pub mod channel;
pub mod codec;
pub mod equalize;
pub mod errors;
pub mod framing;
pub mod grid;
pub mod logging;
pub mod pipeline;
pub mod reader;
pub mod settings;
pub mod stage;
pub mod transform;
pub mod writer;

pub use errors::{PipelineError, Result};
pub use grid::PixelGrid;
pub use pipeline::{Pipeline, PipelineReport};
pub use settings::{OutputFormat, PipelineSettings};

#[cfg(test)]
mod tests;
