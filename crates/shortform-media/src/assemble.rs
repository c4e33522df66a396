//! Segment extraction and assembly.
//!
//! Cuts caller-supplied `[start, end)` ranges out of the source and
//! concatenates them in `order` into one timeline. Every part is re-encoded
//! with the job's encoding config so the concat step can stream-copy over
//! identical codec parameters.

use tracing::{debug, info};

use shortform_models::{segment::sort_for_assembly, EncodingConfig, Segment};

use crate::command::{cleanup_file, FfmpegCommand, FfmpegRunner};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::job::JobContext;
use crate::timeline::Timeline;

const STAGE: Stage = Stage::Assemble;

/// Extracts and concatenates sub-ranges of a source timeline.
pub struct SegmentAssembler {
    encoding: EncodingConfig,
}

impl SegmentAssembler {
    /// Create an assembler using the given encoding for part extraction.
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }

    /// Assemble `segments` from `source` into a single new timeline.
    ///
    /// The whole list is validated before the first extraction, so an
    /// invalid list produces no scratch output at all.
    pub async fn assemble(
        &self,
        ctx: &JobContext,
        source: &Timeline,
        segments: &[Segment],
    ) -> PipelineResult<Timeline> {
        validate_segments(segments, source.duration())?;

        let mut ordered = segments.to_vec();
        sort_for_assembly(&mut ordered);

        info!(
            job_id = %ctx.id(),
            segments = ordered.len(),
            source = %source.path().display(),
            "Assembling segments"
        );

        let mut parts = Vec::with_capacity(ordered.len());
        for (idx, segment) in ordered.iter().enumerate() {
            ctx.check_cancelled(STAGE)?;

            let part = ctx.scratch_path(&format!("part_{idx:03}.mp4"));
            debug!(
                order = segment.order,
                start = segment.start,
                end = segment.end,
                "Extracting segment"
            );

            let cmd = FfmpegCommand::new(source.path(), &part)
                .seek(segment.start)
                .duration(segment.duration())
                .encoding(&self.encoding)
                .keyframe_at_start();

            FfmpegRunner::new(STAGE)
                .with_cancel(ctx.cancel_receiver())
                .run(&cmd)
                .await?;

            parts.push(part);
        }

        ctx.check_cancelled(STAGE)?;

        let output = ctx.scratch_path("assembled.mp4");
        if parts.len() == 1 {
            tokio::fs::rename(&parts[0], &output).await?;
        } else {
            concatenate_parts(ctx, &parts, &output).await?;
            for part in &parts {
                cleanup_file(part).await;
            }
        }

        Timeline::probe(&output, STAGE).await
    }
}

/// Validate every segment against the source duration.
///
/// Fails with a range error naming the first offending segment.
pub fn validate_segments(segments: &[Segment], source_duration: f64) -> PipelineResult<()> {
    for segment in segments {
        let valid =
            segment.start >= 0.0 && segment.start < segment.end && segment.end <= source_duration;
        if !valid {
            return Err(PipelineError::Range {
                stage: STAGE,
                order: segment.order,
                start: segment.start,
                end: segment.end,
                source_duration,
            });
        }
    }
    Ok(())
}

/// Sum of segment durations: the expected assembled duration.
pub fn assembled_duration(segments: &[Segment]) -> f64 {
    segments.iter().map(|s| s.duration()).sum()
}

/// Concatenate identically-encoded parts with the concat demuxer.
async fn concatenate_parts(
    ctx: &JobContext,
    parts: &[std::path::PathBuf],
    output: &std::path::Path,
) -> PipelineResult<()> {
    let list_path = ctx.scratch_path("concat.txt");
    let list: String = parts
        .iter()
        .map(|p| format!("file '{}'", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(&list_path, &list).await?;

    // Parts share codec parameters, so stream copy is safe and fast.
    let cmd = FfmpegCommand::new(&list_path, output)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .codec_copy()
        .faststart();

    let result = FfmpegRunner::new(STAGE)
        .with_cancel(ctx.cancel_receiver())
        .run(&cmd)
        .await;

    cleanup_file(&list_path).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_segments_pass() {
        let segs = vec![Segment::new(0.0, 5.0, 0), Segment::new(10.0, 15.0, 1)];
        assert!(validate_segments(&segs, 20.0).is_ok());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let segs = vec![Segment::new(5.0, 3.0, 7)];
        let err = validate_segments(&segs, 20.0).unwrap_err();
        match err {
            PipelineError::Range { order, .. } => assert_eq!(order, 7),
            other => panic!("expected Range, got {other:?}"),
        }
    }

    #[test]
    fn test_end_past_source_rejected() {
        let segs = vec![Segment::new(0.0, 25.0, 0)];
        assert!(validate_segments(&segs, 20.0).is_err());
    }

    #[test]
    fn test_negative_start_rejected() {
        let segs = vec![Segment::new(-1.0, 5.0, 0)];
        assert!(validate_segments(&segs, 20.0).is_err());
    }

    #[test]
    fn test_zero_length_segment_rejected() {
        let segs = vec![Segment::new(5.0, 5.0, 0)];
        assert!(validate_segments(&segs, 20.0).is_err());
    }

    #[test]
    fn test_end_at_source_duration_allowed() {
        let segs = vec![Segment::new(15.0, 20.0, 0)];
        assert!(validate_segments(&segs, 20.0).is_ok());
    }

    #[test]
    fn test_assembled_duration_is_sum() {
        let segs = vec![
            Segment::new(0.0, 5.0, 0),
            Segment::new(10.0, 15.0, 1),
            Segment::new(16.0, 16.25, 2),
        ];
        assert!((assembled_duration(&segs) - 10.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_list_produces_no_scratch_output() {
        let ctx = JobContext::new().unwrap();
        let source = Timeline::new(
            "/nonexistent/source.mp4",
            crate::probe::VideoInfo {
                duration: 20.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                has_audio: true,
            },
        );
        let assembler = SegmentAssembler::new(EncodingConfig::default());
        let segs = vec![Segment::new(0.0, 30.0, 0)];

        let err = assembler.assemble(&ctx, &source, &segs).await.unwrap_err();
        assert!(matches!(err, PipelineError::Range { .. }));

        // Validation failed before any extraction was attempted.
        let entries: Vec<_> = std::fs::read_dir(ctx.workdir()).unwrap().collect();
        assert!(entries.is_empty());
    }
}
