//! Timelines and source ingest.
//!
//! A `Timeline` is one fully-rendered intermediate media file plus its
//! probed properties. Each pipeline stage consumes the previous stage's
//! timeline and produces a new, independent one; nothing is shared between
//! stages.

use std::path::{Path, PathBuf};

use crate::error::{PipelineResult, Stage};
use crate::probe::{probe_video, VideoInfo};

/// A rendered media file owned by exactly one stage at a time.
#[derive(Debug, Clone)]
pub struct Timeline {
    path: PathBuf,
    info: VideoInfo,
}

impl Timeline {
    /// Wrap an already-probed file.
    pub fn new(path: impl Into<PathBuf>, info: VideoInfo) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }

    /// Probe `path` and wrap it, attributing probe failures to `stage`.
    pub async fn probe(path: impl AsRef<Path>, stage: Stage) -> PipelineResult<Self> {
        let path = path.as_ref();
        let info = probe_video(path, stage).await?;
        Ok(Self::new(path, info))
    }

    /// Backing media file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Probed properties.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.info.duration
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.info.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.info.height
    }

    /// Frame rate in frames per second.
    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    /// Whether an audio stream is present.
    pub fn has_audio(&self) -> bool {
        self.info.has_audio
    }
}

/// Tagged pipeline input.
///
/// `FromPath` is probed on entry and makes the pipeline owner of every
/// derived scratch artifact; `FromTimeline` hands over an already-probed
/// timeline (for callers that prepared the clip themselves).
#[derive(Debug, Clone)]
pub enum ClipSource {
    /// A container on disk, decodable by FFmpeg.
    FromPath(PathBuf),
    /// An already-probed timeline handle.
    FromTimeline(Timeline),
}

impl ClipSource {
    /// Resolve to a concrete timeline, probing the path variant.
    pub async fn resolve(self) -> PipelineResult<Timeline> {
        match self {
            ClipSource::FromPath(path) => Timeline::probe(&path, Stage::Ingest).await,
            ClipSource::FromTimeline(timeline) => Ok(timeline),
        }
    }
}

impl From<PathBuf> for ClipSource {
    fn from(path: PathBuf) -> Self {
        ClipSource::FromPath(path)
    }
}

impl From<Timeline> for ClipSource {
    fn from(timeline: Timeline) -> Self {
        ClipSource::FromTimeline(timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_info() -> VideoInfo {
        VideoInfo {
            duration: 20.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            has_audio: true,
        }
    }

    #[test]
    fn test_timeline_accessors() {
        let t = Timeline::new("/tmp/clip.mp4", fake_info());
        assert_eq!(t.width(), 1920);
        assert_eq!(t.height(), 1080);
        assert!((t.duration() - 20.0).abs() < 1e-9);
        assert!(t.has_audio());
    }

    #[tokio::test]
    async fn test_from_timeline_resolves_without_probe() {
        // No file exists at this path; FromTimeline must not touch disk.
        let t = Timeline::new("/nonexistent/clip.mp4", fake_info());
        let resolved = ClipSource::FromTimeline(t).resolve().await.unwrap();
        assert_eq!(resolved.height(), 1080);
    }

    #[tokio::test]
    async fn test_from_path_missing_file_fails() {
        let src = ClipSource::FromPath(PathBuf::from("/nonexistent/clip.mp4"));
        assert!(src.resolve().await.is_err());
    }
}
