use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SEGMENT_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    // Staging
    pub segment_count: usize,
    /// Artificial pause after each segment in every stage, in milliseconds
    pub segment_delay_ms: u64,
    pub handoff_capacity: usize,

    // Output
    pub output_format: OutputFormat,

    // Diagnostics
    pub trace_rows: bool,

    // Loader limits
    pub max_file_size_mb: u64,
    pub max_megapixels: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            segment_count: DEFAULT_SEGMENT_COUNT,
            segment_delay_ms: 0,
            handoff_capacity: 1,

            output_format: OutputFormat::Bmp,

            trace_rows: true,

            max_file_size_mb: 500,
            max_megapixels: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Bmp,
    Png,
}

impl OutputFormat {
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Bmp => image::ImageFormat::Bmp,
            OutputFormat::Png => image::ImageFormat::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Bmp => "bmp",
            OutputFormat::Png => "png",
        }
    }
}

impl PipelineSettings {
    /// Loads `settings.json` from the platform config directory, or defaults.
    pub fn load() -> Self {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                match Self::from_file(&config_path) {
                    Ok(settings) => return settings,
                    Err(e) => {
                        log::warn!("Ignoring settings at {}: {}", config_path.display(), e)
                    }
                }
            }
        }
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "eqpipe", "eqpipe")
            .map(|proj_dirs| proj_dirs.config_dir().join("settings.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_count == 0 {
            return Err(PipelineError::InvalidSettings {
                message: "segment_count must be at least 1".to_string(),
            });
        }
        if self.handoff_capacity == 0 {
            return Err(PipelineError::InvalidSettings {
                message: "handoff_capacity must be at least 1".to_string(),
            });
        }
        if self.max_file_size_mb == 0 || self.max_megapixels == 0 {
            return Err(PipelineError::InvalidSettings {
                message: "loader limits must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn segment_delay(&self) -> Duration {
        Duration::from_millis(self.segment_delay_ms)
    }
}
