use anyhow::Context;
use async_trait::async_trait;
use crate::core::config::AppConfig;
use crate::core::error::{tail_lines, PipelineError};
use crate::core::model::{DownloadOutcome, DownloadRequest, Platform};
use crate::plugins::registry::{FetchContext, MediaFetcher};
use crate::plugins::ytdlp::cookies::{classify, CookieForm};
use crate::plugins::ytdlp::output::OutputTracker;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const STDOUT_LOG: &str = "last_yt_dlp_stdout.log";
pub const STDERR_LOG: &str = "last_yt_dlp_stderr.log";

const BILIBILI_REFERER: &str = "Referer: https://www.bilibili.com/";
const SCAN_EXCLUDED_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "txt", "log", "json", "part", "ytdl"];
const STDERR_TAIL_LINES: usize = 20;

pub struct YtDlpDriver {
    binary: String,
    proxy: Option<String>,
    user_agent: String,
}

impl YtDlpDriver {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            binary: cfg.ytdlp.binary.clone(),
            proxy: cfg.ytdlp.proxy.clone().filter(|p| !p.trim().is_empty()),
            user_agent: cfg.user_agent.clone(),
        }
    }

    pub async fn detect_version(binary: &str) -> Option<String> {
        Command::new(binary)
            .arg("--version")
            .output()
            .await
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
    }

    pub fn output_template(run_dir: &Path, hint: Option<&str>) -> String {
        let name = match hint.map(str::trim).filter(|h| !h.is_empty()) {
            // yt-dlp treats % as a template marker
            Some(h) => format!("{}.%(ext)s", h.replace('%', "%%")),
            None => "%(title)s.%(ext)s".to_string(),
        };
        run_dir.join(name).to_string_lossy().into_owned()
    }

    /// Cookie arguments for the request. A jar is written into `run_dir` first.
    pub async fn cookie_args(req: &DownloadRequest, run_dir: &Path) -> anyhow::Result<Vec<String>> {
        if Platform::detect(&req.source_url) == Some(Platform::YouTube) {
            return Ok(Vec::new());
        }
        let Some(raw) = req.cookies.for_url(&req.source_url) else {
            return Ok(Vec::new());
        };

        match classify(raw) {
            CookieForm::Jar(text) => {
                let path = run_dir.join(format!("cookie_{}.txt", chrono::Utc::now().timestamp_millis()));
                tokio::fs::write(&path, text)
                    .await
                    .with_context(|| format!("write cookie jar {}", path.display()))?;
                debug!(path = %path.display(), "using cookie jar");
                Ok(vec!["--cookies".to_string(), path.to_string_lossy().into_owned()])
            }
            CookieForm::Header(value) => Ok(vec!["--add-header".to_string(), format!("Cookie:{value}")]),
        }
    }

    pub fn build_args(&self, req: &DownloadRequest, run_dir: &Path, cookie_args: Vec<String>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-f".into(),
            req.format_selector.clone(),
            "-o".into(),
            Self::output_template(run_dir, req.filename_hint.as_deref()),
            "--no-playlist".into(),
            "--force-overwrites".into(),
            "--ignore-errors".into(),
            "--newline".into(),
            "--verbose".into(),
            "--user-agent".into(),
            self.user_agent.clone(),
        ];

        if let Some(proxy) = &self.proxy {
            args.extend(["--proxy".to_string(), proxy.clone()]);
        }

        if Platform::detect(&req.source_url) == Some(Platform::Bilibili) {
            args.extend(["--add-header".to_string(), BILIBILI_REFERER.to_string()]);
        }

        args.extend(cookie_args);
        args.push(req.source_url.clone());
        args
    }
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R, mut on_line: impl FnMut(&str)) -> std::io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut all = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\r', '\n']));
        all.push_str(&line);
    }
    Ok(all)
}

fn is_scan_excluded(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(true, |e| SCAN_EXCLUDED_EXTS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Most recently modified media-looking file directly under `dir`.
pub async fn newest_media_file(dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("read_dir {}", dir.display()))?;

    let mut best: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        if is_scan_excluded(&path) {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().map_or(true, |(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

#[async_trait]
impl MediaFetcher for YtDlpDriver {
    fn name(&self) -> &'static str { "yt-dlp" }

    async fn fetch(
        &self,
        req: &DownloadRequest,
        ctx: &FetchContext,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> anyhow::Result<DownloadOutcome> {
        let cookie_args = Self::cookie_args(req, &ctx.work_dir).await?;
        let args = self.build_args(req, &ctx.work_dir, cookie_args);
        info!(binary = %self.binary, url = %req.source_url, "starting yt-dlp");
        debug!(?args, "yt-dlp arguments");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary))?;

        let stdout = child.stdout.take().context("yt-dlp stdout not captured")?;
        let stderr = child.stderr.take().context("yt-dlp stderr not captured")?;

        let stderr_task = tokio::spawn(read_lines(stderr, |line| debug!(target: "yt_dlp", "{line}")));

        let mut tracker = OutputTracker::default();
        let stdout_text = read_lines(stdout, |line| {
            if let Some(pct) = tracker.observe(line) {
                on_progress(pct);
            }
        })
        .await
        .context("read yt-dlp stdout")?;

        let stderr_text = stderr_task.await.context("join stderr reader")?.context("read yt-dlp stderr")?;
        let status = child.wait().await.context("wait for yt-dlp")?;

        for (name, text) in [(STDOUT_LOG, &stdout_text), (STDERR_LOG, &stderr_text)] {
            let path = ctx.log_dir.join(name);
            if let Err(e) = tokio::fs::write(&path, text).await {
                warn!(path = %path.display(), error = %e, "failed to write yt-dlp debug log");
            }
        }

        if !status.success() {
            return Err(PipelineError::DownloadFailed {
                code: status.code(),
                stderr: tail_lines(&stderr_text, STDERR_TAIL_LINES),
            }
            .into());
        }

        if let Some(path) = tracker.path() {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Ok(DownloadOutcome { file_path: path.to_path_buf() });
            }
            debug!(path = %path.display(), "reported output missing on disk, scanning run directory");
        }

        match newest_media_file(&ctx.work_dir).await? {
            Some(file_path) => Ok(DownloadOutcome { file_path }),
            None => Err(PipelineError::DownloadMissingFile.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::PlatformCookies;
    use std::sync::Mutex;

    fn request(url: &str, cookies: PlatformCookies, hint: Option<&str>) -> DownloadRequest {
        DownloadRequest {
            source_url: url.to_string(),
            cookies,
            filename_hint: hint.map(str::to_string),
            format_selector: "bestaudio/best".to_string(),
        }
    }

    fn driver(binary: &str, proxy: Option<&str>) -> YtDlpDriver {
        let mut cfg = AppConfig::default();
        cfg.ytdlp.binary = binary.to_string();
        cfg.ytdlp.proxy = proxy.map(str::to_string);
        YtDlpDriver::new(&cfg)
    }

    #[test]
    fn template_escapes_percent_in_hint() {
        let dir = Path::new("temp/run-x");
        assert_eq!(YtDlpDriver::output_template(dir, Some("100% fun")), "temp/run-x/100%% fun.%(ext)s");
        assert_eq!(YtDlpDriver::output_template(dir, None), "temp/run-x/%(title)s.%(ext)s");
        assert_eq!(YtDlpDriver::output_template(dir, Some("  ")), "temp/run-x/%(title)s.%(ext)s");
    }

    #[test]
    fn args_carry_proxy_referer_and_url_last() {
        let d = driver("yt-dlp", Some("socks5://127.0.0.1:1080"));
        let req = request("https://www.bilibili.com/video/BV1xx", PlatformCookies::default(), None);
        let args = d.build_args(&req, Path::new("t"), Vec::new());
        let joined = args.join(" ");
        assert!(joined.starts_with("-f bestaudio/best -o t/%(title)s.%(ext)s --no-playlist"));
        assert!(joined.contains("--proxy socks5://127.0.0.1:1080"));
        assert!(joined.contains(&format!("--add-header {BILIBILI_REFERER}")));
        assert_eq!(args.last().map(String::as_str), Some("https://www.bilibili.com/video/BV1xx"));
    }

    #[tokio::test]
    async fn youtube_skips_cookies() {
        let mut cookies = PlatformCookies::default();
        cookies.insert(Platform::YouTube, "SID=1");
        let tmp = tempfile::tempdir().unwrap();
        let req = request("https://youtu.be/abc", cookies, None);
        assert!(YtDlpDriver::cookie_args(&req, tmp.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn header_and_jar_cookies() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cookies = PlatformCookies::default();
        cookies.insert(Platform::TikTok, "sid=1");
        cookies.insert(Platform::Bilibili, "# Netscape HTTP Cookie File\n.bilibili.com TRUE / FALSE 0 SESSDATA abc");

        let tiktok = request("https://vt.tiktok.com/ABC", cookies.clone(), None);
        assert_eq!(
            YtDlpDriver::cookie_args(&tiktok, tmp.path()).await.unwrap(),
            vec!["--add-header".to_string(), "Cookie:sid=1".to_string()]
        );

        let bili = request("https://www.bilibili.com/video/BV1", cookies, None);
        let args = YtDlpDriver::cookie_args(&bili, tmp.path()).await.unwrap();
        assert_eq!(args[0], "--cookies");
        let jar = std::fs::read_to_string(&args[1]).unwrap();
        assert!(jar.contains(".bilibili.com\tTRUE\t/\tFALSE\t0\tSESSDATA\tabc"));
        assert!(Path::new(&args[1]).file_name().unwrap().to_string_lossy().starts_with("cookie_"));
    }

    #[tokio::test]
    async fn scan_prefers_newest_media_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("cover.jpg"), b"x").unwrap();
        std::fs::write(tmp.path().join("clip.m4a.part"), b"x").unwrap();
        std::fs::write(tmp.path().join("old.webm"), b"x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(tmp.path().join("new.m4a"), b"x").unwrap();
        std::fs::write(tmp.path().join("info.json"), b"x").unwrap();
        assert_eq!(newest_media_file(tmp.path()).await.unwrap(), Some(tmp.path().join("new.m4a")));
    }

    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-yt-dlp.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    fn fetch_ctx(root: &Path) -> FetchContext {
        let work_dir = root.join("run-1");
        std::fs::create_dir_all(&work_dir).unwrap();
        FetchContext { work_dir, log_dir: root.to_path_buf() }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_reports_progress_and_parsed_path() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = fetch_ctx(tmp.path());
        let out = ctx.work_dir.join("song.m4a");
        let script = fake_ytdlp(
            tmp.path(),
            &format!(
                "echo '[download] Destination: {0}'\necho '[download]  50.0% of 1MiB'\nprintf data > '{0}'\necho '[download] 100.0% of 1MiB'\necho 'debug line' >&2",
                out.display()
            ),
        );

        let seen = Mutex::new(Vec::new());
        let req = request("https://vt.tiktok.com/ABC", PlatformCookies::default(), Some("song"));
        let outcome = driver(&script, None)
            .fetch(&req, &ctx, &|p| seen.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(outcome.file_path, out);
        assert_eq!(*seen.lock().unwrap(), vec![50.0, 100.0]);
        assert!(std::fs::read_to_string(tmp.path().join(STDOUT_LOG)).unwrap().contains("Destination"));
        assert_eq!(std::fs::read_to_string(tmp.path().join(STDERR_LOG)).unwrap(), "debug line\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_falls_back_to_scan_when_nothing_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = fetch_ctx(tmp.path());
        let script = fake_ytdlp(tmp.path(), &format!("printf data > '{}/Some Title.webm'", ctx.work_dir.display()));
        let req = request("https://vt.tiktok.com/ABC", PlatformCookies::default(), None);
        let outcome = driver(&script, None).fetch(&req, &ctx, &|_| {}).await.unwrap();
        assert_eq!(outcome.file_path, ctx.work_dir.join("Some Title.webm"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_is_read_from_tool_output() {
        let tmp = tempfile::tempdir().unwrap();
        let script = fake_ytdlp(tmp.path(), "echo 2024.08.06");
        assert_eq!(YtDlpDriver::detect_version(&script).await.as_deref(), Some("2024.08.06"));
        assert_eq!(YtDlpDriver::detect_version("/nonexistent/yt-dlp").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = fetch_ctx(tmp.path());
        let req = request("https://vt.tiktok.com/ABC", PlatformCookies::default(), None);

        let failing = fake_ytdlp(tmp.path(), "echo 'ERROR: Unsupported URL' >&2\nexit 1");
        let err = driver(&failing, None).fetch(&req, &ctx, &|_| {}).await.unwrap_err();
        assert_eq!(err.to_string(), "yt-dlp exited with code 1. Error: ERROR: Unsupported URL");

        let silent = fake_ytdlp(tmp.path(), "exit 0");
        let err = driver(&silent, None).fetch(&req, &ctx, &|_| {}).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::DownloadMissingFile)));
    }
}
