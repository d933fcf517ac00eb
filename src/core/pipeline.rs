//! The link → download → transcode → upload state machine.
//!
//! Every run gets its own context and its own `run-<id>` directory under the
//! temp root. Whatever a run leaves on disk is removed when it ends, success
//! or not.

use crate::core::error::PipelineError;
use crate::core::events::ProgressSink;
use crate::core::link::{self, LinkKind};
use crate::core::model::{CookieSettings, DownloadRequest, PipelineOutcome, PipelineStage, Resolution, RunId};
use crate::core::workspace::{remove_dir_if_exists, remove_if_exists, TempWorkspace};
use crate::i18n::{get_messages, Locale, Messages};
use crate::plugins::registry::{FetchContext, PluginRegistry, ResolveContext, ResolverRole};
use anyhow::Context;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hosts whose links get a generated file name when no title was found.
const DOUYIN_MARKERS: &[&str] = &["aweme.snssdk.com", "douyin.com"];

#[derive(Debug, Clone)]
pub struct PipelineInput {
    /// Free-form share text containing the link.
    pub text: String,
    /// Effective credentials for this run.
    pub cookies: CookieSettings,
    pub format_selector: String,
}

/// Cross-step state of one run.
#[derive(Debug)]
struct RunContext {
    id: RunId,
    stage: PipelineStage,
    url: String,
    filename_hint: Option<String>,
    work_dir: Option<PathBuf>,
    downloaded: Option<PathBuf>,
    transcoded: Option<PathBuf>,
}

impl RunContext {
    fn new(url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: PipelineStage::Idle,
            url,
            filename_hint: None,
            work_dir: None,
            downloaded: None,
            transcoded: None,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(run = %self.id, from = ?self.stage, to = ?stage, "stage transition");
        self.stage = stage;
    }
}

pub struct PipelineController<'a> {
    registry: &'a PluginRegistry,
    workspace: &'a TempWorkspace,
    msgs: &'static Messages,
    enable_youtube: bool,
}

impl<'a> PipelineController<'a> {
    pub fn new(registry: &'a PluginRegistry, workspace: &'a TempWorkspace, locale: Locale, enable_youtube: bool) -> Self {
        Self { registry, workspace, msgs: get_messages(locale), enable_youtube }
    }

    fn say(&self, ctx: &RunContext, sink: &dyn ProgressSink, message: &str) {
        info!(run = %ctx.id, stage = ?ctx.stage, "{message}");
        sink.emit(message);
    }

    pub async fn run(&self, input: &PipelineInput, sink: &dyn ProgressSink) -> anyhow::Result<PipelineOutcome> {
        let mut ctx = RunContext::new(link::extract_url(&input.text));

        let session = match self.preflight(&ctx.url, &input.cookies) {
            Ok(session) => session,
            Err(e) => return Err(self.fail(&mut ctx, sink, e.into())),
        };

        // the failure is reported before cleanup starts
        let result = self
            .execute(&mut ctx, input, &session, sink)
            .await
            .map_err(|e| self.fail(&mut ctx, sink, e));
        self.cleanup(&mut ctx, sink).await;
        if result.is_ok() {
            ctx.enter(PipelineStage::Done);
        }
        result
    }

    fn fail(&self, ctx: &mut RunContext, sink: &dyn ProgressSink, e: anyhow::Error) -> anyhow::Error {
        ctx.enter(PipelineStage::Failed);
        warn!(run = %ctx.id, url = %ctx.url, error = ?e, "pipeline failed");
        self.say(ctx, sink, &format!("{}{}", self.msgs.error_prefix, e));
        e
    }

    /// Checks that need neither network nor disk.
    fn preflight(&self, url: &str, cookies: &CookieSettings) -> Result<String, PipelineError> {
        link::ensure_enabled(url, self.enable_youtube, self.msgs.youtube_disabled)?;
        cookies
            .cloud_session()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Configuration(self.msgs.missing_cloud_cookie.to_string()))
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        input: &PipelineInput,
        session: &str,
        sink: &dyn ProgressSink,
    ) -> anyhow::Result<PipelineOutcome> {
        ctx.enter(PipelineStage::Cleaning);
        self.say(ctx, sink, self.msgs.cleaning);
        match self.workspace.sweep().await {
            Ok(n) => debug!(run = %ctx.id, removed = n, "temp sweep done"),
            Err(e) => warn!(run = %ctx.id, error = ?e, "temp sweep failed"),
        }
        let work_dir = self.workspace.create_run_dir(ctx.id).await?;
        ctx.work_dir = Some(work_dir.clone());

        ctx.enter(PipelineStage::Resolving);
        let platform_cookies = input.cookies.platform_cookies();
        self.resolve(ctx, &ResolveContext { cookies: platform_cookies.clone() }, sink).await;

        ctx.enter(PipelineStage::Downloading);
        self.say(ctx, sink, self.msgs.download_started);
        let req = DownloadRequest {
            source_url: ctx.url.clone(),
            cookies: platform_cookies,
            filename_hint: ctx.filename_hint.clone(),
            format_selector: input.format_selector.clone(),
        };
        let fetch_ctx = FetchContext { work_dir, log_dir: self.workspace.root().to_path_buf() };
        let progress_prefix = self.msgs.downloading;
        let on_progress = |pct: f64| sink.emit(&format!("{progress_prefix}{pct:.1}%"));
        info!(run = %ctx.id, fetcher = self.registry.fetcher().name(), url = %req.source_url, "downloading");
        let downloaded = self.registry.fetcher().fetch(&req, &fetch_ctx, &on_progress).await?.file_path;
        ctx.downloaded = Some(downloaded.clone());
        self.say(ctx, sink, &format!("{}{}", self.msgs.downloaded, display_name(&downloaded)));

        ctx.enter(PipelineStage::Transcoding);
        self.say(ctx, sink, self.msgs.transcoding);
        let transcoded = self.registry.transcoder().transcode(&downloaded).await?;
        ctx.transcoded = Some(transcoded.clone());
        remove_if_exists(&downloaded).await;
        ctx.downloaded = None;
        self.say(ctx, sink, self.msgs.transcoded);

        ctx.enter(PipelineStage::Uploading);
        self.say(ctx, sink, self.msgs.uploading);
        let data = tokio::fs::read(&transcoded)
            .await
            .with_context(|| format!("read {}", transcoded.display()))?;
        let uploader = self.registry.uploader();
        info!(run = %ctx.id, uploader = uploader.name(), bytes = data.len(), "uploading");
        let receipt = uploader.upload(&display_name(&transcoded), Bytes::from(data), session).await?;
        if !matches!(receipt.code, 200 | 201) {
            return Err(PipelineError::UploadFailed { body: receipt.body.to_string() }.into());
        }
        self.say(ctx, sink, self.msgs.uploaded);

        Ok(PipelineOutcome {
            status: "success".to_string(),
            message: self.msgs.upload_complete.to_string(),
            song_name: transcoded
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    /// Runs the resolver chain. Never fails; the URL only changes on success.
    async fn resolve(&self, ctx: &mut RunContext, rctx: &ResolveContext, sink: &dyn ProgressSink) {
        self.say(ctx, sink, self.msgs.parsing);
        match link::classify(&ctx.url) {
            LinkKind::DirectMedia => {
                self.say(ctx, sink, self.msgs.direct_media);
                return;
            }
            LinkKind::Platform(platform) => debug!(run = %ctx.id, %platform, "recognized platform link"),
            LinkKind::Opaque => debug!(run = %ctx.id, url = %ctx.url, "unrecognized host, resolving anyway"),
        }

        for resolver in self.registry.resolvers() {
            if !resolver.can_handle(&ctx.url) {
                continue;
            }
            let role = resolver.role();
            if role == ResolverRole::Extractor {
                self.say(ctx, sink, self.msgs.extractor_trying);
            }

            match resolver.resolve(&ctx.url, rctx).await {
                Resolution::Resolved(found) => {
                    debug!(run = %ctx.id, resolver = resolver.name(), from = %ctx.url, to = %found.url, "resolved");
                    ctx.url = found.url;
                    match role {
                        ResolverRole::Redirect => {
                            self.say(ctx, sink, &format!("{}{}", self.msgs.resolved, ctx.url));
                        }
                        ResolverRole::Extractor => self.say(ctx, sink, self.msgs.extractor_ok),
                    }
                    if let Some(title) = found.title {
                        self.say(ctx, sink, &format!("{}{}", self.msgs.title_found, title));
                        ctx.filename_hint = Some(title);
                    }
                }
                Resolution::SoftFailed(reason) => {
                    warn!(run = %ctx.id, resolver = resolver.name(), %reason, "resolution step failed");
                    let msg = match role {
                        ResolverRole::Redirect => self.msgs.redirect_fallback,
                        ResolverRole::Extractor => self.msgs.extractor_fallback,
                    };
                    self.say(ctx, sink, msg);
                }
            }
        }

        if ctx.filename_hint.is_none() && DOUYIN_MARKERS.iter().any(|m| ctx.url.contains(m)) {
            ctx.filename_hint = Some(format!("douyin_{}", chrono::Utc::now().timestamp_millis()));
        }
    }

    async fn cleanup(&self, ctx: &mut RunContext, sink: &dyn ProgressSink) {
        self.say(ctx, sink, self.msgs.final_cleanup);
        for file in [ctx.downloaded.take(), ctx.transcoded.take()].into_iter().flatten() {
            remove_if_exists(&file).await;
        }
        if let Some(dir) = ctx.work_dir.take() {
            remove_dir_if_exists(&dir).await;
        }
        self.say(ctx, sink, self.msgs.final_cleanup_done);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
