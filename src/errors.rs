use std::path::PathBuf;
use thiserror::Error;

use crate::stage::StageKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode image '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Source image '{path}' is too large: {message}")]
    SourceTooLarge { path: PathBuf, message: String },

    #[error("Encoding error: {message}")]
    Encode { message: String },

    #[error("Transfer error: {message}")]
    Transfer { message: String },

    #[error("Channel closed prematurely: expected {expected} bytes, received {received}")]
    PrematureEof { expected: usize, received: usize },

    #[error("{stage} stage input closed before any data arrived")]
    UpstreamClosed { stage: StageKind },

    #[error("{stage} stage was interrupted")]
    Interrupted { stage: StageKind },

    #[error("{stage} stage panicked")]
    StagePanicked { stage: StageKind },

    #[error("Failed to write image '{path}': {message}")]
    Write { path: PathBuf, message: String },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Returns true if re-running with corrected input could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::FileNotFound { .. }
                | PipelineError::Write { .. }
                | PipelineError::InvalidSettings { .. }
                | PipelineError::Interrupted { .. }
                | PipelineError::Io { .. }
        )
    }

    /// True for errors that belong to the DecodeError family of the reader stage
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode { .. }
                | PipelineError::FileNotFound { .. }
                | PipelineError::SourceTooLarge { .. }
        )
    }

    /// True for encode/channel failures between the transform and writer stages
    pub fn is_transfer_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Encode { .. }
                | PipelineError::Transfer { .. }
                | PipelineError::PrematureEof { .. }
        )
    }

    /// Returns a user-friendly error message with recovery suggestions
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            PipelineError::FileNotFound { .. } => "Check that the source path exists and is readable.",
            PipelineError::Decode { .. } => "The source image may be corrupted or in an unsupported format.",
            PipelineError::SourceTooLarge { .. } => "Downscale the image or raise the size limits in the settings file.",
            PipelineError::Write { .. } => "Check that the destination directory exists and is writable.",
            PipelineError::InvalidSettings { .. } => "Fix the settings file or command line flags and try again.",
            PipelineError::UpstreamClosed { .. } => "An earlier stage failed; see its error above.",
            PipelineError::Interrupted { .. } => "The run was cancelled before it finished.",
            PipelineError::Encode { .. }
            | PipelineError::Transfer { .. }
            | PipelineError::PrematureEof { .. } => "The transfer between stages broke off; the output file may be incomplete.",
            _ => "An unexpected error occurred.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Decode { .. } => "DECODE_ERROR",
            PipelineError::FileNotFound { .. } => "FILE_NOT_FOUND",
            PipelineError::SourceTooLarge { .. } => "SOURCE_TOO_LARGE",
            PipelineError::Encode { .. } => "ENCODE_ERROR",
            PipelineError::Transfer { .. } => "TRANSFER_ERROR",
            PipelineError::PrematureEof { .. } => "PREMATURE_EOF",
            PipelineError::UpstreamClosed { .. } => "UPSTREAM_CLOSED",
            PipelineError::Interrupted { .. } => "INTERRUPTED",
            PipelineError::StagePanicked { .. } => "STAGE_PANICKED",
            PipelineError::Write { .. } => "WRITE_ERROR",
            PipelineError::InvalidSettings { .. } => "INVALID_SETTINGS",
            PipelineError::Io { .. } => "IO_ERROR",
            PipelineError::Json { .. } => "JSON_ERROR",
        }
    }

    /// Logs the error against the stage that hit it
    pub fn log_for_stage(&self, stage: StageKind, operation: &str) {
        log::error!(
            "{} stage failed while {} [{}]: {}",
            stage,
            operation,
            self.error_code(),
            self
        );
    }
}
