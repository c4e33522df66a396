//! End-to-end pipeline orchestration.
//!
//! Stages run strictly sequentially; each consumes the previous stage's
//! timeline and produces its own. Validation failures abort before any
//! output file exists, and the final render is moved into place only once
//! fully encoded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use shortform_models::{CaptionStyle, EncodingConfig, Segment};

use crate::assemble::SegmentAssembler;
use crate::captions::synchronize;
use crate::compose::{ComposeConfig, ShortFormComposer};
use crate::error::PipelineResult;
use crate::fs_utils::move_file;
use crate::job::JobContext;
use crate::letterbox::{LetterboxConfig, LetterboxRemover};
use crate::render::{generate_thumbnail_safe, Renderer};
use crate::timeline::ClipSource;
use crate::transcribe::{acquire_transcript, Transcriber};

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Letterbox detection parameters; `None` skips the crop stage.
    pub letterbox: Option<LetterboxConfig>,
    /// Canvas and blur parameters.
    pub compose: ComposeConfig,
    /// Caption overlay styling.
    pub caption_style: CaptionStyle,
    /// Encoding used for every intermediate and the final render.
    pub encoding: EncodingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            letterbox: Some(LetterboxConfig::default()),
            compose: ComposeConfig::default(),
            caption_style: CaptionStyle::default(),
            encoding: EncodingConfig::default(),
        }
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct RenderedShort {
    /// Final output file.
    pub path: PathBuf,
    /// Output duration in seconds.
    pub duration: f64,
    /// Number of caption overlays composited.
    pub overlay_count: usize,
}

/// The four-stage short-form pipeline.
///
/// The transcription engine and encoder sit behind capability traits, so
/// tests run the pipeline against fakes.
pub struct ShortFormPipeline {
    transcriber: Arc<dyn Transcriber>,
    renderer: Arc<dyn Renderer>,
    config: PipelineConfig,
}

impl ShortFormPipeline {
    /// Create a pipeline with the given collaborators.
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        renderer: Arc<dyn Renderer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transcriber,
            renderer,
            config,
        }
    }

    /// Run the full pipeline: assemble, crop, compose, caption, render.
    pub async fn run(
        &self,
        ctx: &JobContext,
        source: ClipSource,
        segments: &[Segment],
        output: &Path,
    ) -> PipelineResult<RenderedShort> {
        let encoding = &self.config.encoding;

        let source_timeline = source.resolve().await?;
        info!(
            job_id = %ctx.id(),
            source = %source_timeline.path().display(),
            duration = source_timeline.duration(),
            "Pipeline start"
        );

        let assembled = SegmentAssembler::new(encoding.clone())
            .assemble(ctx, &source_timeline, segments)
            .await?;
        drop(source_timeline);

        let trimmed = match &self.config.letterbox {
            Some(letterbox) => {
                LetterboxRemover::new(letterbox.clone(), encoding.clone())
                    .remove(ctx, &assembled)
                    .await?
            }
            None => assembled,
        };

        let composed = ShortFormComposer::new(self.config.compose.clone(), encoding.clone())
            .compose(ctx, &trimmed)
            .await?;
        drop(trimmed);

        let transcript = acquire_transcript(ctx, &composed, self.transcriber.as_ref()).await?;
        let overlays = synchronize(&composed, &transcript);
        info!(
            job_id = %ctx.id(),
            words = transcript.word_count(),
            overlays = overlays.len(),
            "Caption overlays generated"
        );

        // Render to scratch, then move into place: the output path never
        // holds a partially-encoded file.
        let staged = ctx.scratch_path("final.mp4");
        self.renderer
            .render(
                ctx,
                &composed,
                &overlays,
                &self.config.caption_style,
                encoding,
                &staged,
            )
            .await?;
        move_file(&staged, output).await?;

        generate_thumbnail_safe(output).await;

        info!(
            job_id = %ctx.id(),
            output = %output.display(),
            duration = composed.duration(),
            "Pipeline complete"
        );

        Ok(RenderedShort {
            path: output.to_path_buf(),
            duration: composed.duration(),
            overlay_count: overlays.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::OverlayEvent;
    use crate::error::{PipelineError, PipelineResult, Stage};
    use crate::probe::VideoInfo;
    use crate::timeline::Timeline;
    use async_trait::async_trait;
    use shortform_models::Transcript;
    use tokio::sync::watch;

    struct FakeTranscriber;

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, _audio: &std::path::Path) -> PipelineResult<Transcript> {
            Ok(Transcript::empty())
        }
    }

    struct FakeRenderer;

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(
            &self,
            _ctx: &JobContext,
            _clip: &Timeline,
            _overlays: &[OverlayEvent],
            _style: &CaptionStyle,
            _encoding: &EncodingConfig,
            output: &std::path::Path,
        ) -> PipelineResult<()> {
            tokio::fs::write(output, b"rendered").await?;
            Ok(())
        }
    }

    fn pipeline() -> ShortFormPipeline {
        ShortFormPipeline::new(
            Arc::new(FakeTranscriber),
            Arc::new(FakeRenderer),
            PipelineConfig::default(),
        )
    }

    fn fake_source() -> Timeline {
        Timeline::new(
            "/nonexistent/source.mp4",
            VideoInfo {
                duration: 20.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                has_audio: true,
            },
        )
    }

    #[tokio::test]
    async fn test_invalid_segments_abort_before_any_output() {
        let ctx = JobContext::new().unwrap();
        let out_dir = tempfile::TempDir::new().unwrap();
        let output = out_dir.path().join("short.mp4");

        let err = pipeline()
            .run(
                &ctx,
                ClipSource::FromTimeline(fake_source()),
                &[Segment::new(5.0, 3.0, 0)],
                &output,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Range { .. }));
        assert!(!output.exists(), "no partial output on validation failure");
    }

    #[tokio::test]
    async fn test_pre_cancelled_job_propagates_cancelled() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let ctx = JobContext::new().unwrap().with_cancel(rx);
        let output = ctx.workdir().join("never.mp4");

        let err = pipeline()
            .run(
                &ctx,
                ClipSource::FromTimeline(fake_source()),
                &[Segment::new(0.0, 5.0, 0)],
                &output,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::Assemble
            }
        ));
    }
}
