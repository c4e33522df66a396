//! Final overlay render and mux.
//!
//! The `Renderer` capability takes the composed clip plus the overlay track
//! and produces the encoded output file. The production implementation is
//! FFmpeg: the drawtext chain is written to a filter-graph script file and
//! composition streams through the encoder — the clip's frames are never
//! decoded into this process.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, warn};

use shortform_models::{CaptionStyle, EncodingConfig};

use crate::captions::{build_overlay_filter, OverlayEvent};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{PipelineResult, Stage};
use crate::job::JobContext;
use crate::timeline::Timeline;

const STAGE: Stage = Stage::Render;

/// Width of generated thumbnails.
const THUMBNAIL_SCALE_WIDTH: u32 = 480;
/// Timestamp thumbnails are taken at.
const THUMBNAIL_TIMESTAMP: &str = "00:00:01";

/// Render/encode capability.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Composite `overlays` over `clip` and encode to `output`.
    async fn render(
        &self,
        ctx: &JobContext,
        clip: &Timeline,
        overlays: &[OverlayEvent],
        style: &CaptionStyle,
        encoding: &EncodingConfig,
        output: &Path,
    ) -> PipelineResult<()>;
}

/// Production renderer backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRenderer;

impl FfmpegRenderer {
    /// Create a new renderer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(
        &self,
        ctx: &JobContext,
        clip: &Timeline,
        overlays: &[OverlayEvent],
        style: &CaptionStyle,
        encoding: &EncodingConfig,
        output: &Path,
    ) -> PipelineResult<()> {
        ctx.check_cancelled(STAGE)?;

        info!(
            job_id = %ctx.id(),
            overlays = overlays.len(),
            output = %output.display(),
            "Rendering final output"
        );

        let mut cmd = FfmpegCommand::new(clip.path(), output);

        match build_overlay_filter(overlays, style) {
            Some(filter) => {
                // One drawtext per overlay adds up fast on long transcripts;
                // a script file keeps the argument list bounded.
                let script = ctx.scratch_path("overlays.filter");
                tokio::fs::write(&script, &filter).await?;
                debug!(script = %script.display(), "Wrote overlay filter script");

                cmd = cmd.filter_complex_script(&script).map("[vout]");
            }
            None => {
                cmd = cmd.map("0:v");
            }
        }

        let duration_ms = (clip.duration() * 1000.0) as i64;
        let cmd = cmd
            .map("0:a?")
            .encoding(encoding)
            .pix_fmt("yuv420p")
            .faststart();

        FfmpegRunner::new(STAGE)
            .with_cancel(ctx.cancel_receiver())
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    percent = format!("{:.1}", progress.percentage(duration_ms)),
                    speed = progress.speed,
                    "Render progress"
                );
            })
            .await
    }
}

/// Generate a still JPEG thumbnail for a rendered file.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> PipelineResult<()> {
    let filter = format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH);

    let cmd = FfmpegCommand::new(video_path.as_ref(), output_path.as_ref())
        .input_arg("-ss")
        .input_arg(THUMBNAIL_TIMESTAMP)
        .single_frame()
        .video_filter(&filter);

    FfmpegRunner::new(STAGE).run(&cmd).await
}

/// Generate a thumbnail next to `output`, logging failure instead of
/// propagating it.
pub(crate) async fn generate_thumbnail_safe(output: &Path) {
    let thumb_path = output.with_extension("jpg");
    if let Err(e) = generate_thumbnail(output, &thumb_path).await {
        warn!(error = %e, "Failed to generate thumbnail");
    }
}
