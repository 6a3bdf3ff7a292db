use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::TranscodeSection;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command failed ({command}): {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("transcode timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Runs the external tool so tests can substitute a fake instead of
/// invoking a real ffmpeg.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.output().await
    }
}

/// Derives preview imagery from a downloaded clip: a first-frame still
/// and/or a short animated preview. The tool itself is a black box.
pub struct Transcoder {
    ffmpeg: PathBuf,
    clip_seconds: u32,
    clip_fps: u32,
    clip_width: u32,
    run_timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl Transcoder {
    pub fn new(config: &TranscodeSection, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        Self {
            ffmpeg: PathBuf::from(&config.ffmpeg_path),
            clip_seconds: config.clip_seconds,
            clip_fps: config.clip_fps,
            clip_width: config.clip_width,
            run_timeout: Duration::from_secs(config.timeout_secs),
            executor: executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor)),
        }
    }

    /// First frame of the video as a still image.
    pub async fn still(&self, video: &Path, dest: &Path) -> TranscodeResult<()> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            dest.to_string_lossy().to_string(),
        ];
        self.run_tool(args).await
    }

    /// Leading seconds of the video as a downscaled animated preview.
    pub async fn animated(&self, video: &Path, dest: &Path) -> TranscodeResult<()> {
        let args = vec![
            "-y".to_string(),
            "-t".to_string(),
            self.clip_seconds.to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("fps={},scale={}:-1", self.clip_fps, self.clip_width),
            dest.to_string_lossy().to_string(),
        ];
        self.run_tool(args).await
    }

    async fn run_tool(&self, args: Vec<String>) -> TranscodeResult<()> {
        let mut command = Command::new(&self.ffmpeg);
        for arg in &args {
            command.arg(arg);
        }
        let output = timeout(self.run_timeout, self.executor.run(&mut command))
            .await
            .map_err(|_| TranscodeError::Timeout {
                seconds: self.run_timeout.as_secs(),
            })??;
        if !output.status.success() {
            return Err(TranscodeError::CommandFailed {
                command: format!("{} {}", self.ffmpeg.display(), args.join(" ")),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use std::sync::Mutex;

    struct RecordingExecutor {
        exit_code: i32,
        commands: Mutex<Vec<String>>,
    }

    impl RecordingExecutor {
        fn new(exit_code: i32) -> Self {
            Self {
                exit_code,
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
            let rendered = format!("{:?}", command.as_std());
            self.commands.lock().unwrap().push(rendered);
            Ok(Output {
                status: ExitStatus::from_raw(self.exit_code << 8),
                stdout: Vec::new(),
                stderr: if self.exit_code == 0 {
                    Vec::new()
                } else {
                    b"boom".to_vec()
                },
            })
        }
    }

    fn transcoder(executor: Arc<RecordingExecutor>) -> Transcoder {
        Transcoder::new(&TranscodeSection::default(), Some(executor))
    }

    #[tokio::test]
    async fn still_invokes_a_single_frame_extraction() {
        let executor = Arc::new(RecordingExecutor::new(0));
        let transcoder = transcoder(executor.clone());
        transcoder
            .still(Path::new("/tmp/in.mp4"), Path::new("/tmp/out.jpg"))
            .await
            .unwrap();
        let commands = executor.commands.lock().unwrap();
        assert!(commands[0].contains("-frames:v"));
        assert!(commands[0].contains("/tmp/out.jpg"));
    }

    #[tokio::test]
    async fn animated_scales_and_limits_duration() {
        let executor = Arc::new(RecordingExecutor::new(0));
        let transcoder = transcoder(executor.clone());
        transcoder
            .animated(Path::new("/tmp/in.mp4"), Path::new("/tmp/out.gif"))
            .await
            .unwrap();
        let commands = executor.commands.lock().unwrap();
        assert!(commands[0].contains("fps=5,scale=320:-1"));
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr() {
        let executor = Arc::new(RecordingExecutor::new(1));
        let transcoder = transcoder(executor);
        let err = transcoder
            .still(Path::new("/tmp/in.mp4"), Path::new("/tmp/out.jpg"))
            .await
            .unwrap_err();
        match err {
            TranscodeError::CommandFailed { stderr, status, .. } => {
                assert_eq!(stderr, "boom");
                assert_eq!(status, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
