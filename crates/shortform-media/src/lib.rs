#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the shortform vertical-video pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with progress parsing and
//!   cancellation via tokio
//! - The four pipeline stages: segment assembly, letterbox removal,
//!   vertical canvas composition, caption synchronization
//! - `Transcriber` and `Renderer` capability traits with FFmpeg/whisper.cpp
//!   production implementations
//! - End-to-end orchestration with per-job scratch isolation

pub mod assemble;
pub mod captions;
pub mod command;
pub mod compose;
pub mod error;
pub mod fs_utils;
pub mod job;
pub mod letterbox;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod render;
pub mod timeline;
pub mod transcribe;

pub use assemble::SegmentAssembler;
pub use captions::{synchronize, OverlayEvent};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{ComposeConfig, ComposeLayout, ShortFormComposer};
pub use error::{PipelineError, PipelineResult, Stage};
pub use job::JobContext;
pub use letterbox::{LetterboxConfig, LetterboxRemover};
pub use pipeline::{PipelineConfig, RenderedShort, ShortFormPipeline};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use render::{generate_thumbnail, FfmpegRenderer, Renderer};
pub use timeline::{ClipSource, Timeline};
pub use transcribe::{acquire_transcript, Transcriber, WhisperCppTranscriber};
