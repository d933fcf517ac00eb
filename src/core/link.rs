//! URL normalization: pull a link out of free-form share text and classify it.

use crate::core::error::PipelineError;
use crate::core::model::Platform;
use regex::Regex;
use std::sync::OnceLock;

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex"))
}

fn direct_media_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(mp4|mp3|m3u8)(\?|$)").expect("static regex"))
}

/// First `http(s)://` run of non-whitespace, or the whole input when there is none.
pub fn extract_url(text: &str) -> String {
    url_pattern()
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| text.to_string())
}

pub fn is_direct_media(url: &str) -> bool {
    direct_media_pattern().is_match(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    DirectMedia,
    Platform(Platform),
    Opaque,
}

pub fn classify(url: &str) -> LinkKind {
    if is_direct_media(url) {
        return LinkKind::DirectMedia;
    }
    match Platform::detect(url) {
        Some(p) => LinkKind::Platform(p),
        None => LinkKind::Opaque,
    }
}

/// Fails fast for platforms switched off by configuration.
pub fn ensure_enabled(url: &str, enable_youtube: bool, remediation: &str) -> Result<(), PipelineError> {
    if Platform::detect(url) == Some(Platform::YouTube) && !enable_youtube {
        return Err(PipelineError::FeatureDisabled {
            platform: Platform::YouTube,
            remediation: remediation.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_url_from_share_text() {
        assert_eq!(
            extract_url("check this out https://vt.tiktok.com/ABC123 and https://b.com"),
            "https://vt.tiktok.com/ABC123"
        );
        assert_eq!(
            extract_url("7.94 复制打开抖音，看看【作品】https://v.douyin.com/iRNBho6u/ zGO:/"),
            "https://v.douyin.com/iRNBho6u/"
        );
    }

    #[test]
    fn text_without_url_is_returned_unchanged() {
        for text in ["", "   ", "no links here", "ftp://example.com/file", "www.example.com"] {
            assert_eq!(extract_url(text), text);
        }
    }

    #[test]
    fn direct_media_extensions() {
        assert!(is_direct_media("https://example.com/audio.mp3"));
        assert!(is_direct_media("https://cdn.example.com/v/clip.MP4?sig=abc"));
        assert!(is_direct_media("https://example.com/live/index.m3u8"));
        assert!(!is_direct_media("https://example.com/audio.mp3.html"));
        assert!(!is_direct_media("https://example.com/watch?v=mp4"));
    }

    #[test]
    fn classification() {
        assert_eq!(classify("https://example.com/audio.mp3"), LinkKind::DirectMedia);
        assert_eq!(classify("https://v.douyin.com/x/"), LinkKind::Platform(Platform::Douyin));
        assert_eq!(classify("https://t.co/abc"), LinkKind::Opaque);
    }

    #[test]
    fn youtube_is_gated_by_flag() {
        let err = ensure_enabled("https://www.youtube.com/watch?v=abc", false, "enable it").unwrap_err();
        assert!(matches!(err, PipelineError::FeatureDisabled { platform: Platform::YouTube, .. }));
        assert!(err.to_string().contains("enable it"));
        assert!(ensure_enabled("https://youtu.be/abc", true, "").is_ok());
        assert!(ensure_enabled("https://www.bilibili.com/video/BV1", false, "").is_ok());
    }
}
