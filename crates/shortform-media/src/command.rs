//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// How many trailing stderr lines are attached to a failure.
const STDERR_TAIL_LINES: usize = 40;

/// How often a running child re-checks the cancellation signal.
const CANCEL_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Read the filter graph from a script file.
    pub fn filter_complex_script(self, script: impl AsRef<Path>) -> Self {
        self.output_arg("-filter_complex_script")
            .output_arg(script.as_ref().to_string_lossy().to_string())
    }

    /// Map a stream or filter-graph label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Set pixel format.
    pub fn pix_fmt(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(fmt)
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio sample rate.
    pub fn audio_rate(self, hz: u32) -> Self {
        self.output_arg("-ar").output_arg(hz.to_string())
    }

    /// Set audio channel count.
    pub fn audio_channels(self, channels: u32) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Force a keyframe on the first frame (clean concat boundaries).
    pub fn keyframe_at_start(self) -> Self {
        self.output_arg("-force_key_frames")
            .output_arg("expr:eq(n,0)")
    }

    /// Enable faststart for streaming-friendly MP4 output.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Apply an encoding configuration.
    pub fn encoding(self, encoding: &shortform_models::EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
pub struct FfmpegRunner {
    /// Stage attributed to failures and cancellation
    stage: Stage,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegRunner {
    /// Create a new runner attributing failures to `stage`.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: Option<watch::Receiver<bool>>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> PipelineResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> PipelineResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| PipelineError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!(stage = %self.stage, "Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr).lines();

        // Parse progress and keep a tail of non-progress lines for diagnosis.
        let stderr_handle = tokio::spawn(async move {
            let mut current_progress = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current_progress) {
                    Some(progress) => progress_callback(progress),
                    None => {
                        if !line.contains('=') {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.remove(0);
                            }
                            tail.push(line);
                        }
                    }
                }
            }

            tail
        });

        let result = self.wait_for_completion(&mut child).await;
        let tail = stderr_handle.await.unwrap_or_default();

        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(PipelineError::encode(
                self.stage,
                "FFmpeg exited with non-zero status",
                Some(tail.join("\n")),
                None,
            )),
            Err(e) => Err(e),
        }
    }

    /// Wait for the child, honoring cancellation.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` on non-zero exit.
    /// `Child::wait` is cancel-safe, so the wait future can be dropped and
    /// re-created between cancellation checks.
    async fn wait_for_completion(&self, child: &mut Child) -> PipelineResult<bool> {
        let cancel_rx = match &self.cancel_rx {
            Some(rx) => rx.clone(),
            None => return Ok(child.wait().await?.success()),
        };

        loop {
            if *cancel_rx.borrow() {
                info!(stage = %self.stage, "FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                return Err(PipelineError::Cancelled { stage: self.stage });
            }

            match tokio::time::timeout(CANCEL_POLL_INTERVAL, child.wait()).await {
                Ok(status) => return Ok(status?.success()),
                Err(_) => continue,
            }
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> PipelineResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| PipelineError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> PipelineResult<PathBuf> {
    which::which("ffprobe").map_err(|_| PipelineError::FfprobeNotFound)
}

/// Warn-level cleanup helper for scratch files; never fails the caller.
pub(crate) async fn cleanup_file(path: &Path) {
    if path.exists() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to clean up scratch file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .output_arg("-c:v")
            .output_arg("libx264");

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-t".to_string()));
        assert!(args.contains(&"30.000".to_string()));
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn test_seek_precedes_input() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4").seek(5.0);
        let args = cmd.build_args();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss_pos < i_pos);
    }

    #[test]
    fn test_encoding_args_appended() {
        let encoding = shortform_models::EncodingConfig::default();
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4").encoding(&encoding);
        let args = cmd.build_args();
        assert!(args.contains(&"-preset".to_string()));
        assert!(args.contains(&"fast".to_string()));
    }

    #[test]
    fn test_output_path_is_last() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4").faststart();
        let args = cmd.build_args();
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
