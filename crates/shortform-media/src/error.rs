//! Error types for pipeline operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline stage names, attached to every error for diagnosis without
/// re-running the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Source probing and ingest.
    Ingest,
    /// Segment extraction and concatenation.
    Assemble,
    /// Black-bar detection and crop.
    Letterbox,
    /// Vertical canvas composition.
    Compose,
    /// Transcript acquisition and overlay generation.
    Captions,
    /// Final overlay render and mux.
    Render,
}

impl Stage {
    /// Stable stage name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Assemble => "assemble",
            Stage::Letterbox => "letterbox",
            Stage::Compose => "compose",
            Stage::Captions => "captions",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error(
        "[{stage}] segment order={order} has invalid bounds [{start:.3}, {end:.3}) \
         for source duration {source_duration:.3}s"
    )]
    Range {
        stage: Stage,
        order: i64,
        start: f64,
        end: f64,
        source_duration: f64,
    },

    #[error("[{stage}] degenerate crop box: computed size {width}x{height}")]
    InvalidCrop {
        stage: Stage,
        width: i64,
        height: i64,
    },

    #[error("[{stage}] decode failed: {message}")]
    Decode {
        stage: Stage,
        message: String,
        stderr: Option<String>,
    },

    #[error("[{stage}] transcription failed: {message}")]
    Transcription { stage: Stage, message: String },

    #[error("[{stage}] encode failed: {message}")]
    Encode {
        stage: Stage,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("[{stage}] operation cancelled")]
    Cancelled { stage: Stage },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create a decode failure error.
    pub fn decode(stage: Stage, message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Decode {
            stage,
            message: message.into(),
            stderr,
        }
    }

    /// Create a transcription failure error.
    pub fn transcription(stage: Stage, message: impl Into<String>) -> Self {
        Self::Transcription {
            stage,
            message: message.into(),
        }
    }

    /// Create an encode failure error.
    pub fn encode(
        stage: Stage,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Encode {
            stage,
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Stage the error originated in, when it carries one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Range { stage, .. }
            | Self::InvalidCrop { stage, .. }
            | Self::Decode { stage, .. }
            | Self::Transcription { stage, .. }
            | Self::Encode { stage, .. }
            | Self::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_error_names_offending_segment() {
        let err = PipelineError::Range {
            stage: Stage::Assemble,
            order: 2,
            start: 5.0,
            end: 3.0,
            source_duration: 20.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("assemble"));
        assert!(msg.contains("order=2"));
        assert!(msg.contains("5.000"));
        assert!(msg.contains("20.000"));
    }

    #[test]
    fn test_invalid_crop_carries_computed_size() {
        let err = PipelineError::InvalidCrop {
            stage: Stage::Letterbox,
            width: 0,
            height: -4,
        };
        let msg = err.to_string();
        assert!(msg.contains("letterbox"));
        assert!(msg.contains("0x-4"));
    }

    #[test]
    fn test_stage_accessor() {
        let err = PipelineError::Cancelled {
            stage: Stage::Compose,
        };
        assert_eq!(err.stage(), Some(Stage::Compose));
        assert_eq!(PipelineError::FfmpegNotFound.stage(), None);
    }
}
