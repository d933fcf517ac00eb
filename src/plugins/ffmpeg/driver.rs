use anyhow::Context;
use async_trait::async_trait;
use crate::core::config::AppConfig;
use crate::core::error::{tail_lines, PipelineError};
use crate::plugins::registry::Transcoder;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Converts downloaded media to a 192k stereo MP3 with basic ID3 tags.
pub struct FfmpegTranscoder {
    binary: String,
    output_dir: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(cfg: &AppConfig) -> Self {
        Self { binary: cfg.ffmpeg.binary.clone(), output_dir: cfg.download_dir.clone() }
    }

    pub async fn detect_version(binary: &str) -> Option<String> {
        Command::new(binary)
            .arg("-version")
            .output()
            .await
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|s| s.lines().next().map(str::to_string))
    }

    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        self.output_dir.join(format!("{stem}.mp3"))
    }

    pub fn build_args(input: &Path, output: &Path) -> Vec<String> {
        let title = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-acodec".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            "192k".into(),
            "-ac".into(),
            "2".into(),
            "-ar".into(),
            "44100".into(),
            "-id3v2_version".into(),
            "3".into(),
            "-metadata".into(),
            format!("title={title}"),
            "-metadata".into(),
            "artist=UnknownArtist".into(),
            "-metadata".into(),
            "album=UnknownAlbum".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str { "ffmpeg" }

    async fn transcode(&self, input: &Path) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("create_dir_all {}", self.output_dir.display()))?;

        let output = self.output_path(input);
        let args = Self::build_args(input, &output);
        info!(input = %input.display(), output = %output.display(), "starting ffmpeg");
        debug!(?args, "ffmpeg arguments");

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.binary))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::TranscodeFailed(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                tail_lines(&stderr, 10)
            ))
            .into());
        }

        match tokio::fs::metadata(&output).await {
            Ok(m) if m.len() > 0 => Ok(output),
            Ok(_) => Err(PipelineError::TranscodeFailed("Converted file is empty".into()).into()),
            Err(_) => Err(PipelineError::TranscodeFailed("Converted file does not exist".into()).into()),
        }
    }
}
