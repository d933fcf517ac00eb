use async_trait::async_trait;
use bytes::Bytes;
use crate::core::config::AppConfig;
use crate::core::model::{DownloadOutcome, DownloadRequest, PlatformCookies, Resolution};
use clap::{ArgMatches, Command};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub cookies: PlatformCookies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverRole {
    /// Generic link unshortening.
    Redirect,
    /// Platform page scraping that yields a direct media URL.
    Extractor,
}

/// One step of the resolution chain. Implementations never fail the pipeline:
/// problems come back as `Resolution::SoftFailed`.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    fn name(&self) -> &'static str;
    fn role(&self) -> ResolverRole;
    fn can_handle(&self, url: &str) -> bool;
    async fn resolve(&self, url: &str, ctx: &ResolveContext) -> Resolution;
}

#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Run-private directory the download lands in.
    pub work_dir: PathBuf,
    /// Where per-invocation debug logs go.
    pub log_dir: PathBuf,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(
        &self,
        req: &DownloadRequest,
        ctx: &FetchContext,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> anyhow::Result<DownloadOutcome>;
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns the path of a new, non-empty audio file.
    async fn transcode(&self, input: &Path) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub code: i64,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait CloudUploader: Send + Sync {
    fn name(&self) -> &'static str;
    async fn upload(&self, file_name: &str, data: Bytes, session_cookie: &str) -> anyhow::Result<UploadReceipt>;
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()>;
}

pub struct PluginRegistry {
    resolvers: Vec<Box<dyn LinkResolver>>,
    fetcher: Box<dyn MediaFetcher>,
    transcoder: Box<dyn Transcoder>,
    uploader: Box<dyn CloudUploader>,
}

impl PluginRegistry {
    pub fn new(
        resolvers: Vec<Box<dyn LinkResolver>>,
        fetcher: Box<dyn MediaFetcher>,
        transcoder: Box<dyn Transcoder>,
        uploader: Box<dyn CloudUploader>,
    ) -> Self {
        Self { resolvers, fetcher, transcoder, uploader }
    }

    /// Resolvers run in registration order: redirects first, then platform extractors.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let resolvers: Vec<Box<dyn LinkResolver>> = vec![
            Box::new(crate::plugins::http::resolver::RedirectResolver::new(cfg)?),
            Box::new(crate::plugins::douyin::resolver::DouyinResolver::new(cfg)?),
        ];

        Ok(Self::new(
            resolvers,
            Box::new(crate::plugins::ytdlp::driver::YtDlpDriver::new(cfg)),
            Box::new(crate::plugins::ffmpeg::driver::FfmpegTranscoder::new(cfg)),
            Box::new(crate::plugins::netease::driver::NeteaseUploader::new(cfg)?),
        ))
    }

    fn cli_plugins() -> Vec<Box<dyn CliPlugin>> {
        vec![
            Box::new(crate::plugins::http::cli::HttpCliPlugin::new()),
            Box::new(crate::plugins::ytdlp::cli::YtDlpCliPlugin::new()),
            Box::new(crate::plugins::ffmpeg::cli::FfmpegCliPlugin::new()),
            Box::new(crate::plugins::netease::cli::NeteaseCliPlugin::new()),
        ]
    }

    pub fn augment_command(cmd: Command) -> Command {
        Self::cli_plugins()
            .iter()
            .fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(matches: &ArgMatches, cfg: &mut AppConfig) -> anyhow::Result<()> {
        for p in Self::cli_plugins() {
            p.apply_matches(matches, cfg)?;
        }
        Ok(())
    }

    pub fn resolvers(&self) -> impl Iterator<Item = &dyn LinkResolver> {
        self.resolvers.iter().map(|r| r.as_ref())
    }

    pub fn fetcher(&self) -> &dyn MediaFetcher {
        self.fetcher.as_ref()
    }

    pub fn transcoder(&self) -> &dyn Transcoder {
        self.transcoder.as_ref()
    }

    pub fn uploader(&self) -> &dyn CloudUploader {
        self.uploader.as_ref()
    }
}
