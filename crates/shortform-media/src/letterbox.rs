//! Black-bar detection and crop.
//!
//! Samples a handful of frames from the first half of the clip, estimates
//! the true content box per frame from a luminance mask, aggregates the
//! boxes by coordinate-wise median, and crops the clip to the aggregate.
//! The crop is defined by center + extent rather than raw corners, so the
//! result stays centered under mild measurement noise.

use ndarray::Array3;
use rayon::prelude::*;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use shortform_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::job::JobContext;
use crate::timeline::Timeline;

const STAGE: Stage = Stage::Letterbox;

/// Detection parameters.
#[derive(Debug, Clone)]
pub struct LetterboxConfig {
    /// Offset of the first sample in seconds.
    pub sample_time: f64,
    /// Safety padding added to each side of the detected box, in pixels.
    pub margin: u32,
    /// Number of frames to analyze (N >= 1).
    pub analysis_frames: usize,
    /// Luminance cutoff: pixels above this count as content.
    pub threshold: u8,
}

impl Default for LetterboxConfig {
    fn default() -> Self {
        Self {
            sample_time: 2.0,
            margin: 1,
            analysis_frames: 3,
            threshold: 15,
        }
    }
}

/// Pixel bounds of detected content within a sampled frame.
///
/// Transient: computed during crop analysis and discarded once the crop is
/// applied. `top`/`left` are the first active row/column, `bottom`/`right`
/// one past the last active row/column. A frame with no active pixels
/// yields the all-zero degenerate box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryBox {
    pub top: i64,
    pub bottom: i64,
    pub left: i64,
    pub right: i64,
}

impl BoundaryBox {
    /// The all-zero degenerate box.
    pub const ZERO: Self = Self {
        top: 0,
        bottom: 0,
        left: 0,
        right: 0,
    };

    /// Content width implied by the box.
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    /// Content height implied by the box.
    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }

    /// Whether the box encloses no area.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// Final crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Removes letterbox bars from a clip.
pub struct LetterboxRemover {
    config: LetterboxConfig,
    encoding: EncodingConfig,
}

impl LetterboxRemover {
    /// Create a remover with the given detection parameters.
    pub fn new(config: LetterboxConfig, encoding: EncodingConfig) -> Self {
        Self { config, encoding }
    }

    /// Detect the content box of `clip` and return a cropped timeline.
    pub async fn remove(&self, ctx: &JobContext, clip: &Timeline) -> PipelineResult<Timeline> {
        let width = clip.width() as usize;
        let height = clip.height() as usize;
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidVideo(format!(
                "clip has no pixel dimensions: {}",
                clip.path().display()
            )));
        }

        let plan = sample_plan(
            self.config.sample_time,
            clip.duration(),
            self.config.analysis_frames,
        );
        let frames = sample_frames(ctx, clip, &plan).await?;

        info!(
            job_id = %ctx.id(),
            sampled = frames.len(),
            threshold = self.config.threshold,
            "Analyzing sampled frames for letterbox bounds"
        );

        // Per-frame analysis is order-independent; the median does not care.
        let threshold = self.config.threshold;
        let boxes: Vec<BoundaryBox> = frames
            .par_iter()
            .map(|frame| detect_content_box(frame, threshold))
            .collect();

        let degenerate = boxes.iter().filter(|b| b.is_degenerate()).count();
        if degenerate > 0 {
            warn!(
                degenerate,
                total = boxes.len(),
                "Excluding degenerate all-dark samples from aggregation"
            );
        }

        let aggregated = aggregate_boxes(&boxes).ok_or(PipelineError::InvalidCrop {
            stage: STAGE,
            width: 0,
            height: 0,
        })?;

        let expanded = expand_box(
            aggregated,
            self.config.margin as i64,
            clip.width() as i64,
            clip.height() as i64,
        );
        let crop = crop_geometry(expanded, clip.width() as i64, clip.height() as i64)?;

        debug!(?aggregated, ?crop, "Applying letterbox crop");

        ctx.check_cancelled(STAGE)?;

        let output = ctx.scratch_path("cropped.mp4");
        let cmd = FfmpegCommand::new(clip.path(), &output)
            .video_filter(format!(
                "crop={}:{}:{}:{}",
                crop.width, crop.height, crop.x, crop.y
            ))
            .encoding(&self.encoding)
            .pix_fmt("yuv420p");

        FfmpegRunner::new(STAGE)
            .with_cancel(ctx.cancel_receiver())
            .run(&cmd)
            .await?;

        Timeline::probe(&output, STAGE).await
    }
}

/// N timestamps evenly spaced between `sample_time` and half the clip
/// duration, inclusive on both endpoints, each clamped into the clip.
pub fn sample_plan(sample_time: f64, duration: f64, analysis_frames: usize) -> Vec<f64> {
    let n = analysis_frames.max(1);
    let last = (duration - 1e-3).max(0.0);
    let start = sample_time.clamp(0.0, last);
    let end = (duration * 0.5).clamp(0.0, last);

    if n == 1 {
        return vec![start];
    }

    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Decode the planned samples in ONE FFmpeg session.
///
/// Seeks once to the earliest timestamp and streams rgb24 frames over a
/// pipe at the sampling interval; cancellation is observed at every frame
/// boundary.
async fn sample_frames(
    ctx: &JobContext,
    clip: &Timeline,
    plan: &[f64],
) -> PipelineResult<Vec<Array3<u8>>> {
    let width = clip.width() as usize;
    let height = clip.height() as usize;
    let frame_len = width * height * 3;

    let first = plan.iter().cloned().fold(f64::INFINITY, f64::min);
    let last = plan.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = last - first;
    let wanted = plan.len();

    which::which("ffmpeg").map_err(|_| PipelineError::FfmpegNotFound)?;

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-v".into(),
        "error".into(),
        "-ss".into(),
        format!("{first:.3}"),
        "-i".into(),
        clip.path().to_string_lossy().into_owned(),
    ];
    if wanted > 1 && span > 1e-6 {
        let interval = span / (wanted - 1) as f64;
        args.push("-vf".into());
        args.push(format!("fps={:.6}", 1.0 / interval));
    }
    args.extend([
        "-frames:v".into(),
        wanted.to_string(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-f".into(),
        "rawvideo".into(),
        "pipe:1".into(),
    ]);

    debug!(job_id = %ctx.id(), samples = wanted, "Sampling frames: ffmpeg {}", args.join(" "));

    let mut child = tokio::process::Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = child.stdout.take().expect("stdout not captured");
    let mut frames = Vec::with_capacity(wanted);

    for _ in 0..wanted {
        if ctx.check_cancelled(STAGE).is_err() {
            let _ = child.kill().await;
            return Err(PipelineError::Cancelled { stage: STAGE });
        }

        let mut buf = vec![0u8; frame_len];
        match stdout.read_exact(&mut buf).await {
            Ok(_) => {
                let frame = Array3::from_shape_vec((height, width, 3), buf)
                    .expect("frame buffer matches probed dimensions");
                frames.push(frame);
            }
            // Stream ended early; a short clip can yield fewer samples.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e.into());
            }
        }
    }

    let mut stderr_buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut stderr_buf).await;
    }
    let _ = child.wait().await;

    if frames.is_empty() {
        return Err(PipelineError::decode(
            STAGE,
            format!("no frames decoded from {}", clip.path().display()),
            Some(stderr_buf),
        ));
    }

    Ok(frames)
}

/// Estimate the content box of one frame from its luminance mask.
///
/// Multi-channel frames reduce to luminance as the simple average of
/// channels; a pixel is "active" when its luminance exceeds `threshold`.
pub fn detect_content_box(frame: &Array3<u8>, threshold: u8) -> BoundaryBox {
    let (height, width, channels) = frame.dim();
    let mut row_active = vec![false; height];
    let mut col_active = vec![false; width];

    for y in 0..height {
        for x in 0..width {
            let mut sum: u32 = 0;
            for c in 0..channels {
                sum += frame[[y, x, c]] as u32;
            }
            let luma = (sum / channels as u32) as u8;
            if luma > threshold {
                row_active[y] = true;
                col_active[x] = true;
            }
        }
    }

    let top = row_active.iter().position(|&a| a);
    let left = col_active.iter().position(|&a| a);
    let (top, left) = match (top, left) {
        (Some(t), Some(l)) => (t, l),
        _ => return BoundaryBox::ZERO,
    };
    // Safe: an active row implies a last active row/column.
    let bottom = row_active.iter().rposition(|&a| a).unwrap() + 1;
    let right = col_active.iter().rposition(|&a| a).unwrap() + 1;

    BoundaryBox {
        top: top as i64,
        bottom: bottom as i64,
        left: left as i64,
        right: right as i64,
    }
}

/// Aggregate per-frame boxes by coordinate-wise median (not mean), rounded
/// to nearest integer. Degenerate boxes are excluded; returns `None` when
/// every sample is degenerate.
pub fn aggregate_boxes(boxes: &[BoundaryBox]) -> Option<BoundaryBox> {
    let usable: Vec<&BoundaryBox> = boxes.iter().filter(|b| !b.is_degenerate()).collect();
    if usable.is_empty() {
        return None;
    }

    let median = |pick: fn(&BoundaryBox) -> i64| -> i64 {
        let mut values: Vec<i64> = usable.iter().map(|b| pick(b)).collect();
        values.sort_unstable();
        let mid = values.len() / 2;
        if values.len() % 2 == 1 {
            values[mid]
        } else {
            ((values[mid - 1] + values[mid]) as f64 / 2.0).round() as i64
        }
    };

    Some(BoundaryBox {
        top: median(|b| b.top),
        bottom: median(|b| b.bottom),
        left: median(|b| b.left),
        right: median(|b| b.right),
    })
}

/// Expand the box outward by `margin` per side, clamped to the frame.
pub fn expand_box(b: BoundaryBox, margin: i64, frame_width: i64, frame_height: i64) -> BoundaryBox {
    BoundaryBox {
        top: (b.top - margin).max(0),
        bottom: (b.bottom + margin).min(frame_height),
        left: (b.left - margin).max(0),
        right: (b.right + margin).min(frame_width),
    }
}

/// Derive the crop rectangle from box center + extent.
///
/// Width and height are floored to even values for 4:2:0 encoding; the
/// origin is re-derived from the center so the crop stays centered.
pub fn crop_geometry(b: BoundaryBox, frame_width: i64, frame_height: i64) -> PipelineResult<CropRect> {
    let width = b.width() - b.width().rem_euclid(2);
    let height = b.height() - b.height().rem_euclid(2);
    if width <= 0 || height <= 0 {
        return Err(PipelineError::InvalidCrop {
            stage: STAGE,
            width,
            height,
        });
    }

    let x_center = (b.left + b.right) as f64 / 2.0;
    let y_center = (b.top + b.bottom) as f64 / 2.0;
    let x = ((x_center - width as f64 / 2.0).round() as i64).clamp(0, frame_width - width);
    let y = ((y_center - height as f64 / 2.0).round() as i64).clamp(0, frame_height - height);

    Ok(CropRect {
        x,
        y,
        width,
        height,
    })
}
