/// Localized progress messages for LinkToCloud.
/// Locale can be selected via the `--locale` CLI flag (e.g. `--locale zh`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" | "zh-tw" | "zh_tw" => Self::Zh,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub cleaning: &'static str,
    pub parsing: &'static str,
    pub direct_media: &'static str,
    pub resolved: &'static str,
    pub redirect_fallback: &'static str,
    pub extractor_trying: &'static str,
    pub extractor_ok: &'static str,
    pub extractor_fallback: &'static str,
    pub title_found: &'static str,
    pub download_started: &'static str,
    pub downloading: &'static str,
    pub downloaded: &'static str,
    pub transcoding: &'static str,
    pub transcoded: &'static str,
    pub uploading: &'static str,
    pub uploaded: &'static str,
    pub upload_complete: &'static str,
    pub error_prefix: &'static str,
    pub final_cleanup: &'static str,
    pub final_cleanup_done: &'static str,
    pub missing_cloud_cookie: &'static str,
    pub youtube_disabled: &'static str,
}

pub static EN: Messages = Messages {
    cleaning: "Cleaning up old temporary files...",
    parsing: "Parsing link...",
    direct_media: "Direct media link detected, skipping resolution",
    resolved: "Resolved: ",
    redirect_fallback: "Could not follow redirects, using the original link",
    extractor_trying: "Trying the custom extractor for the video address...",
    extractor_ok: "Custom extractor succeeded, got a direct link",
    extractor_fallback: "Custom extractor failed, falling back to yt-dlp extraction",
    title_found: "Video title: ",
    download_started: "Downloading audio...",
    downloading: "Downloading: ",
    downloaded: "Download complete: ",
    transcoding: "Transcoding to MP3...",
    transcoded: "Transcoding complete",
    uploading: "Uploading to NetEase Cloud Music...",
    uploaded: "Upload succeeded!",
    upload_complete: "Upload complete",
    error_prefix: "Error: ",
    final_cleanup: "Cleaning up temporary files...",
    final_cleanup_done: "Cleanup complete",
    missing_cloud_cookie: "NetEase Cookie is not configured!",
    youtube_disabled: "YouTube's anti-bot measures make direct downloads likely to fail.\n\n\
        Alternatives:\n\
        1. Use a dedicated YouTube tool such as the latest yt-dlp command line.\n\
        2. To enable YouTube downloads here, start with --enable-youtube (or ENABLE_YOUTUBE=true).\n\
        3. Make sure the latest yt-dlp and its dependencies are installed.",
};

pub static ZH: Messages = Messages {
    cleaning: "正在清理旧的临时文件...",
    parsing: "正在解析链接...",
    direct_media: "检测到直接媒体链接，跳过解析",
    resolved: "解析成功: ",
    redirect_fallback: "无法跟随重定向，使用原始链接",
    extractor_trying: "尝试使用自定义解析器提取视频地址...",
    extractor_ok: "自定义解析成功，获取到直链",
    extractor_fallback: "自定义解析失败，尝试使用 yt-dlp 默认解析",
    title_found: "获取到视频标题: ",
    download_started: "开始下载音频...",
    downloading: "正在下载: ",
    downloaded: "下载完成: ",
    transcoding: "正在转码为 MP3...",
    transcoded: "转码完成",
    uploading: "正在上传至网易云音乐...",
    uploaded: "上传成功!",
    upload_complete: "上传完成",
    error_prefix: "错误: ",
    final_cleanup: "正在清理临时文件...",
    final_cleanup_done: "清理完成",
    missing_cloud_cookie: "网易云 Cookie 未配置!",
    youtube_disabled: "由于 YouTube 的反爬虫机制，直接下载可能会失败。\n\n\
        建议替代方案：\n\
        1. 使用专门的 YouTube 下载工具（如最新版本的 yt-dlp 命令行工具）。\n\
        2. 如果你想启用 YouTube 下载，请使用 --enable-youtube 启动（或设置 ENABLE_YOUTUBE=true）。\n\
        3. 确保已安装最新版本的 yt-dlp 和必要的依赖。",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}
