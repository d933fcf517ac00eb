use crate::i18n::Locale;
use std::path::PathBuf;

pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: String,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub binary: String,
}

#[derive(Debug, Clone)]
pub struct NeteaseConfig {
    /// Base URL of a NeteaseCloudMusicApi-compatible service.
    pub api_base: String,
    /// Fallback session cookie when neither the request nor settings carry one.
    pub cookie: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub temp_dir: PathBuf,
    pub download_dir: PathBuf,
    pub data_dir: PathBuf,
    pub locale: Locale,
    pub enable_youtube: bool,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub ytdlp: YtDlpConfig,
    pub ffmpeg: FfmpegConfig,
    pub netease: NeteaseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            temp_dir: PathBuf::from("temp"),
            download_dir: PathBuf::from("downloads"),
            data_dir: PathBuf::from("data"),
            locale: Locale::En,
            enable_youtube: false,
            user_agent: DESKTOP_USER_AGENT.to_string(),
            timeout_secs: 30,
            ytdlp: YtDlpConfig { binary: "yt-dlp".to_string(), proxy: None },
            ffmpeg: FfmpegConfig { binary: "ffmpeg".to_string() },
            netease: NeteaseConfig { api_base: "http://127.0.0.1:3001".to_string(), cookie: None },
        }
    }
}

impl AppConfig {
    pub fn settings_db(&self) -> PathBuf {
        self.data_dir.join("settings.sqlite")
    }
}
