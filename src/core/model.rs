use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub type TaskId = Uuid;
pub type RunId = Uuid;

/// Platforms that get per-platform cookie handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Douyin,
    Bilibili,
    TikTok,
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 4] = [Platform::Douyin, Platform::Bilibili, Platform::TikTok, Platform::YouTube];

    fn host_markers(self) -> &'static [&'static str] {
        match self {
            Platform::Douyin => &["douyin.com"],
            Platform::Bilibili => &["bilibili.com"],
            Platform::TikTok => &["tiktok.com"],
            Platform::YouTube => &["youtube.com", "youtu.be"],
        }
    }

    /// Host-substring match. Inputs that do not parse as URLs are matched as a whole.
    pub fn detect(raw: &str) -> Option<Platform> {
        let host = url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
        let haystack = host.as_deref().unwrap_or(raw);
        Self::ALL
            .into_iter()
            .find(|p| p.host_markers().iter().any(|m| haystack.contains(m)))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Douyin => "Douyin",
            Platform::Bilibili => "Bilibili",
            Platform::TikTok => "TikTok",
            Platform::YouTube => "YouTube",
        };
        f.write_str(s)
    }
}

/// Raw cookie values per platform: header-style strings or Netscape jar text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformCookies(HashMap<Platform, String>);

impl PlatformCookies {
    pub fn insert(&mut self, platform: Platform, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            self.0.remove(&platform);
        } else {
            self.0.insert(platform, value);
        }
    }

    pub fn get(&self, platform: Platform) -> Option<&str> {
        self.0.get(&platform).map(String::as_str)
    }

    pub fn for_url(&self, url: &str) -> Option<&str> {
        Platform::detect(url).and_then(|p| self.get(p))
    }
}

/// Credentials as they travel over the API and live in settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieSettings {
    pub netease_cookie: String,
    pub douyin_cookie: String,
    pub bilibili_cookie: String,
    pub tiktok_cookie: String,
    pub youtube_cookie: String,
}

impl CookieSettings {
    pub fn platform_cookies(&self) -> PlatformCookies {
        let mut cookies = PlatformCookies::default();
        cookies.insert(Platform::Douyin, self.douyin_cookie.clone());
        cookies.insert(Platform::Bilibili, self.bilibili_cookie.clone());
        cookies.insert(Platform::TikTok, self.tiktok_cookie.clone());
        cookies.insert(Platform::YouTube, self.youtube_cookie.clone());
        cookies
    }

    pub fn cloud_session(&self) -> Option<&str> {
        Some(self.netease_cookie.trim()).filter(|s| !s.is_empty())
    }

    /// Non-blank values of `self` win over `base`.
    pub fn overlay(&self, base: &CookieSettings) -> CookieSettings {
        fn pick(over: &str, base: &str) -> String {
            if over.trim().is_empty() { base.to_string() } else { over.to_string() }
        }
        CookieSettings {
            netease_cookie: pick(&self.netease_cookie, &base.netease_cookie),
            douyin_cookie: pick(&self.douyin_cookie, &base.douyin_cookie),
            bilibili_cookie: pick(&self.bilibili_cookie, &base.bilibili_cookie),
            tiktok_cookie: pick(&self.tiktok_cookie, &base.tiktok_cookie),
            youtube_cookie: pick(&self.youtube_cookie, &base.youtube_cookie),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    #[serde(flatten)]
    pub cookies: CookieSettings,
    pub audio_quality: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self { cookies: CookieSettings::default(), audio_quality: "best".to_string() }
    }
}

impl AppSettings {
    /// yt-dlp `-f` expression for the configured audio quality.
    pub fn format_selector(&self) -> String {
        match self.audio_quality.trim() {
            "" | "best" => "bestaudio/best".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    pub url: String,
    pub title: Option<String>,
}

/// Outcome of one resolver. Resolvers never fail the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolutionResult),
    SoftFailed(String),
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source_url: String,
    pub cookies: PlatformCookies,
    pub filename_hint: Option<String>,
    pub format_selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Cleaning,
    Resolving,
    Downloading,
    Transcoding,
    Uploading,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub status: String,
    pub message: String,
    pub song_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub result: Option<PipelineOutcome>,
    pub start_time: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Processing,
            message: "Task started...".to_string(),
            result: None,
            start_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_platform_by_host() {
        assert_eq!(Platform::detect("https://v.douyin.com/abc/"), Some(Platform::Douyin));
        assert_eq!(Platform::detect("https://www.bilibili.com/video/BV1"), Some(Platform::Bilibili));
        assert_eq!(Platform::detect("https://vt.tiktok.com/ABC123"), Some(Platform::TikTok));
        assert_eq!(Platform::detect("https://youtu.be/xyz"), Some(Platform::YouTube));
        assert_eq!(Platform::detect("https://example.com/?next=douyin.com"), None);
    }

    #[test]
    fn blank_cookies_are_absent() {
        let settings = CookieSettings { tiktok_cookie: "  ".into(), douyin_cookie: "a=b".into(), ..Default::default() };
        let cookies = settings.platform_cookies();
        assert_eq!(cookies.get(Platform::TikTok), None);
        assert_eq!(cookies.for_url("https://www.douyin.com/video/1"), Some("a=b"));
    }

    #[test]
    fn overlay_keeps_base_for_blank_fields() {
        let base = CookieSettings { netease_cookie: "MUSIC_U=1".into(), tiktok_cookie: "t=1".into(), ..Default::default() };
        let req = CookieSettings { tiktok_cookie: "t=2".into(), ..Default::default() };
        let merged = req.overlay(&base);
        assert_eq!(merged.netease_cookie, "MUSIC_U=1");
        assert_eq!(merged.tiktok_cookie, "t=2");
        assert_eq!(merged.cloud_session(), Some("MUSIC_U=1"));
    }

    #[test]
    fn format_selector_defaults_to_best_audio() {
        assert_eq!(AppSettings::default().format_selector(), "bestaudio/best");
        let custom = AppSettings { audio_quality: "140".into(), ..Default::default() };
        assert_eq!(custom.format_selector(), "140");
    }
}
