use crate::core::model::Platform;

/// Hard failures that abort a pipeline run. Display text is what users see.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Configuration(String),

    #[error("{platform} downloads are disabled.\n\n{remediation}")]
    FeatureDisabled { platform: Platform, remediation: String },

    #[error("yt-dlp exited with code {}. Error: {stderr}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    DownloadFailed { code: Option<i32>, stderr: String },

    #[error("Download finished successfully but no file was found.")]
    DownloadMissingFile,

    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("Upload failed: {body}")]
    UploadFailed { body: String },

    #[error("temp storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Last `max_lines` non-empty lines of a captured stream.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_failure_message_carries_stderr() {
        let e = PipelineError::DownloadFailed { code: Some(1), stderr: "ERROR: Unsupported URL".into() };
        assert_eq!(e.to_string(), "yt-dlp exited with code 1. Error: ERROR: Unsupported URL");
        let e = PipelineError::DownloadFailed { code: None, stderr: String::new() };
        assert!(e.to_string().starts_with("yt-dlp exited with code none."));
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("", 5), "");
    }
}
