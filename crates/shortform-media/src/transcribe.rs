//! Transcript acquisition.
//!
//! The pipeline consumes word-level transcripts; the recognition engine
//! itself sits behind the `Transcriber` capability so the core has no
//! compile-time dependency on a specific model. The production
//! implementation shells out to a whisper.cpp CLI.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, warn};

use shortform_models::{Transcript, TranscriptSegment, Word};

use crate::command::{cleanup_file, FfmpegCommand, FfmpegRunner};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::job::JobContext;
use crate::timeline::Timeline;

const STAGE: Stage = Stage::Captions;

/// Sample rate word-level ASR engines consume.
const ASR_SAMPLE_RATE: u32 = 16_000;

/// Speech-recognition capability.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Produce a word-level transcript for an audio file.
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Transcript>;
}

/// Obtain a transcript for `clip` via a temporary audio render.
///
/// The temporary WAV lives in the job scratch directory and is removed
/// unconditionally — after successful transcription and on every failure
/// path. A clip without an audio stream yields an empty transcript without
/// invoking the engine.
pub async fn acquire_transcript(
    ctx: &JobContext,
    clip: &Timeline,
    transcriber: &dyn Transcriber,
) -> PipelineResult<Transcript> {
    if !clip.has_audio() {
        info!(job_id = %ctx.id(), "Clip has no audio stream; skipping transcription");
        return Ok(Transcript::empty());
    }

    ctx.check_cancelled(STAGE)?;

    let audio_path = ctx.scratch_path("caption_audio.wav");
    extract_audio(ctx, clip, &audio_path).await?;

    let result = transcriber.transcribe(&audio_path).await;

    // Cleanup failures are logged, never fatal.
    if let Err(e) = tokio::fs::remove_file(&audio_path).await {
        warn!(
            path = %audio_path.display(),
            error = %e,
            "Failed to remove temporary caption audio"
        );
    }

    result
}

/// Render the clip's audio track to 16 kHz mono PCM.
async fn extract_audio(ctx: &JobContext, clip: &Timeline, output: &Path) -> PipelineResult<()> {
    debug!(
        input = %clip.path().display(),
        output = %output.display(),
        "Extracting caption audio"
    );

    let cmd = FfmpegCommand::new(clip.path(), output)
        .no_video()
        .audio_codec("pcm_s16le")
        .audio_rate(ASR_SAMPLE_RATE)
        .audio_channels(1);

    FfmpegRunner::new(STAGE)
        .with_cancel(ctx.cancel_receiver())
        .run(&cmd)
        .await
}

/// Production transcriber backed by a whisper.cpp CLI.
///
/// Runs the binary with word-level timestamps enabled and parses its
/// full-JSON output file.
pub struct WhisperCppTranscriber {
    binary: String,
    model: PathBuf,
    language: Option<String>,
}

impl WhisperCppTranscriber {
    /// Create a transcriber using the given ggml model file.
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            binary: "whisper-cli".to_string(),
            model: model.into(),
            language: None,
        }
    }

    /// Override the CLI binary name or path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set a language hint.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl Transcriber for WhisperCppTranscriber {
    async fn transcribe(&self, audio: &Path) -> PipelineResult<Transcript> {
        let binary = which::which(&self.binary).map_err(|_| {
            PipelineError::transcription(STAGE, format!("{} not found in PATH", self.binary))
        })?;
        if !self.model.exists() {
            return Err(PipelineError::transcription(
                STAGE,
                format!("model file not found: {}", self.model.display()),
            ));
        }

        info!(
            binary = %binary.display(),
            model = %self.model.display(),
            audio = %audio.display(),
            "Running whisper.cpp transcription"
        );

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.arg("-m")
            .arg(&self.model)
            .arg("--output-json-full")
            .arg("--output-words")
            .arg("--no-prints")
            .arg("--max-len")
            .arg("0");
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }
        cmd.arg(audio);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                PipelineError::transcription(STAGE, format!("failed to run whisper.cpp: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::transcription(
                STAGE,
                format!(
                    "whisper.cpp exited with {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            ));
        }

        // whisper.cpp writes its JSON next to the audio file.
        let json_path = PathBuf::from(format!("{}.json", audio.display()));
        let content = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            PipelineError::transcription(
                STAGE,
                format!("missing whisper.cpp output {}: {e}", json_path.display()),
            )
        })?;
        cleanup_file(&json_path).await;

        parse_whisper_json(&content)
    }
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    tokens: Vec<WhisperToken>,
}

#[derive(Debug, Deserialize)]
struct WhisperToken {
    text: String,
    offsets: WhisperOffsets,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: f64,
    to: f64,
}

/// Parse whisper.cpp full-JSON output into a transcript.
///
/// Token offsets are milliseconds; non-speech marker tokens (`[_BEG_]` and
/// friends) are dropped.
pub fn parse_whisper_json(content: &str) -> PipelineResult<Transcript> {
    let output: WhisperOutput = serde_json::from_str(content)?;

    let segments = output
        .transcription
        .into_iter()
        .map(|segment| TranscriptSegment {
            words: segment
                .tokens
                .into_iter()
                .filter_map(|token| {
                    let text = token.text.trim();
                    if text.is_empty() || (text.starts_with('[') && text.ends_with(']')) {
                        return None;
                    }
                    Some(Word::new(
                        text,
                        token.offsets.from / 1000.0,
                        token.offsets.to / 1000.0,
                    ))
                })
                .collect(),
        })
        .collect();

    Ok(Transcript { segments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoInfo;

    struct FailingTranscriber;

    #[async_trait]
    impl Transcriber for FailingTranscriber {
        async fn transcribe(&self, _audio: &Path) -> PipelineResult<Transcript> {
            Err(PipelineError::transcription(STAGE, "engine exploded"))
        }
    }

    #[test]
    fn test_parse_whisper_json_words() {
        let json = r#"{
            "transcription": [
                {
                    "offsets": {"from": 0, "to": 900},
                    "text": " hi there",
                    "tokens": [
                        {"text": "[_BEG_]", "offsets": {"from": 0, "to": 0}},
                        {"text": " hi", "offsets": {"from": 0, "to": 400}},
                        {"text": " there", "offsets": {"from": 500, "to": 900}}
                    ]
                }
            ]
        }"#;

        let transcript = parse_whisper_json(json).unwrap();
        assert_eq!(transcript.word_count(), 2);
        let words = &transcript.segments[0].words;
        assert_eq!(words[0].word, "hi");
        assert!((words[0].start - 0.0).abs() < 1e-9);
        assert!((words[0].end - 0.4).abs() < 1e-9);
        assert!((words[1].start - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_whisper_json_empty_transcription() {
        let transcript = parse_whisper_json(r#"{"transcription": []}"#).unwrap();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_parse_whisper_json_invalid() {
        assert!(parse_whisper_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_no_audio_clip_skips_engine() {
        let ctx = JobContext::new().unwrap();
        let clip = Timeline::new(
            "/nonexistent/composed.mp4",
            VideoInfo {
                duration: 10.0,
                width: 1080,
                height: 1920,
                fps: 30.0,
                has_audio: false,
            },
        );

        // FailingTranscriber would error if invoked; a silent clip must not
        // reach it.
        let transcript = acquire_transcript(&ctx, &clip, &FailingTranscriber)
            .await
            .unwrap();
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_missing_model_fails_cleanly() {
        let transcriber = WhisperCppTranscriber::new("/nonexistent/ggml-base.bin")
            .with_binary("sh"); // present on any PATH, never executed
        let err = transcriber
            .transcribe(Path::new("/tmp/audio.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transcription { .. }));
    }
}
