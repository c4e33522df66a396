//! Vertical canvas composition.
//!
//! Places the unmodified clip at the center of a fixed-size vertical canvas
//! and fills the space above and below with blurred strips cropped from the
//! clip itself. All layout arithmetic happens up front in `ComposeLayout`;
//! the render is a single FFmpeg filter-graph pass, so identical input and
//! canvas always produce identical pixel regions and resize factors.

use tracing::{debug, info};

use shortform_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{PipelineResult, Stage};
use crate::job::JobContext;
use crate::timeline::Timeline;

const STAGE: Stage = Stage::Compose;

/// Canvas and blur parameters.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Output canvas width in pixels (default: 1080 for 9:16 portrait).
    pub canvas_width: u32,
    /// Output canvas height in pixels (default: 1920 for 9:16 portrait).
    pub canvas_height: u32,
    /// Box-blur kernel edge for the background panes (default: 15).
    pub blur_kernel: u32,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1080,
            canvas_height: 1920,
            blur_kernel: 15,
        }
    }
}

impl ComposeConfig {
    /// Create a config with custom canvas dimensions.
    pub fn with_canvas(width: u32, height: u32) -> Self {
        Self {
            canvas_width: width,
            canvas_height: height,
            ..Default::default()
        }
    }
}

/// Deterministic pixel layout for one composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeLayout {
    /// Canvas width.
    pub canvas_width: u32,
    /// Canvas height.
    pub canvas_height: u32,
    /// Center pane size: the clip, unmodified.
    pub center_width: u32,
    /// Center pane height.
    pub center_height: u32,
    /// Height of the source strip cropped from the blurred pane (25% of
    /// the clip height).
    pub strip_source_height: u32,
    /// Vertical origin of the bottom source strip within the clip.
    pub strip_bottom_y: u32,
    /// Height each strip is resized to on the canvas; width is preserved.
    pub side_height: u32,
}

impl ComposeLayout {
    /// Compute the layout for a clip on the configured canvas.
    pub fn compute(config: &ComposeConfig, clip_width: u32, clip_height: u32) -> Self {
        let center_height = clip_height;

        // Strip height reserves a 10% gap allowance around the center pane.
        let raw_side = (config.canvas_height as f64
            - center_height as f64
            - 0.1 * center_height as f64)
            / 2.0;
        let side_height = raw_side.round().max(0.0) as u32;
        let side_height = side_height - side_height % 2;

        // Top strip is centered at 12.5% height, bottom at 87.5%, both 25%
        // of the clip tall and full width.
        let strip_source_height = (clip_height / 4).max(1);
        let strip_bottom_y = clip_height - strip_source_height;

        Self {
            canvas_width: config.canvas_width,
            canvas_height: config.canvas_height,
            center_width: clip_width,
            center_height,
            strip_source_height,
            strip_bottom_y,
            side_height,
        }
    }

    /// Vertical origin of the centered pane on the canvas.
    pub fn center_y(&self) -> i64 {
        (self.canvas_height as i64 - self.center_height as i64) / 2
    }

    /// Canvas region above the center pane.
    pub fn region_above_center(&self) -> i64 {
        self.center_y()
    }

    /// Canvas region below the center pane.
    pub fn region_below_center(&self) -> i64 {
        self.canvas_height as i64 - self.center_height as i64 - self.center_y()
    }

    /// Whether the filler strips have any height to render.
    pub fn has_strips(&self) -> bool {
        self.side_height > 0
    }
}

/// Build the filter graph for one composition pass.
///
/// Video: the decoded input splits three ways; the two strip chains get a
/// box blur, the strip crop, and a non-uniform resize, then all panes
/// overlay a black canvas of exactly the configured size. Audio: the input
/// track splits into three lanes, the strip lanes pass through `volume=0`,
/// and the mix keeps only the center pane audible.
pub fn build_compose_filter(
    layout: &ComposeLayout,
    blur_kernel: u32,
    fps: f64,
    has_audio: bool,
) -> String {
    let blur_radius = (blur_kernel / 2).max(1);
    let mut filter = String::new();

    if layout.has_strips() {
        filter.push_str(&format!(
            "[0:v]split=3[center][tsrc][bsrc];\
             [tsrc]boxblur={r}:1,crop={cw}:{sh}:0:0,scale={cw}:{side}[top];\
             [bsrc]boxblur={r}:1,crop={cw}:{sh}:0:{by},scale={cw}:{side}[bottom];\
             color=c=black:s={w}x{h}:r={fps:.3}[canvas];\
             [canvas][top]overlay=x=(W-w)/2:y=0:shortest=1[with_top];\
             [with_top][bottom]overlay=x=(W-w)/2:y=H-h[with_strips];\
             [with_strips][center]overlay=x=(W-w)/2:y=(H-h)/2[vout]",
            r = blur_radius,
            cw = layout.center_width,
            sh = layout.strip_source_height,
            by = layout.strip_bottom_y,
            side = layout.side_height,
            w = layout.canvas_width,
            h = layout.canvas_height,
            fps = fps,
        ));
    } else {
        // Clip fills the canvas height; nothing left for strips.
        filter.push_str(&format!(
            "color=c=black:s={w}x{h}:r={fps:.3}[canvas];\
             [canvas][0:v]overlay=x=(W-w)/2:y=(H-h)/2:shortest=1[vout]",
            w = layout.canvas_width,
            h = layout.canvas_height,
            fps = fps,
        ));
    }

    if has_audio {
        filter.push_str(
            ";[0:a]asplit=3[acenter][atop][abottom];\
             [atop]volume=0[atop_mute];\
             [abottom]volume=0[abottom_mute];\
             [acenter][atop_mute][abottom_mute]amix=inputs=3:duration=first:normalize=0[aout]",
        );
    }

    filter
}

/// Builds a fixed-size vertical canvas from a horizontal clip.
pub struct ShortFormComposer {
    config: ComposeConfig,
    encoding: EncodingConfig,
}

impl ShortFormComposer {
    /// Create a composer for the configured canvas.
    pub fn new(config: ComposeConfig, encoding: EncodingConfig) -> Self {
        Self { config, encoding }
    }

    /// Compose `clip` onto the vertical canvas, returning a new timeline.
    pub async fn compose(&self, ctx: &JobContext, clip: &Timeline) -> PipelineResult<Timeline> {
        ctx.check_cancelled(STAGE)?;

        let layout = ComposeLayout::compute(&self.config, clip.width(), clip.height());
        let filter = build_compose_filter(&layout, self.config.blur_kernel, clip.fps(), clip.has_audio());

        info!(
            job_id = %ctx.id(),
            canvas = format!("{}x{}", layout.canvas_width, layout.canvas_height),
            center = format!("{}x{}", layout.center_width, layout.center_height),
            side_height = layout.side_height,
            "Composing vertical canvas"
        );
        debug!(filter = %filter, "Compose filter graph");

        let output = ctx.scratch_path("composed.mp4");
        let mut cmd = FfmpegCommand::new(clip.path(), &output)
            .filter_complex(filter)
            .map("[vout]")
            .encoding(&self.encoding)
            .pix_fmt("yuv420p");
        if clip.has_audio() {
            cmd = cmd.map("[aout]");
        }

        FfmpegRunner::new(STAGE)
            .with_cancel(ctx.cancel_receiver())
            .run(&cmd)
            .await?;

        Timeline::probe(&output, STAGE).await
    }
}
