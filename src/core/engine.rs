use crate::core::config::AppConfig;
use crate::core::events::{ProgressEvent, ProgressSink};
use crate::core::model::{AppSettings, CookieSettings, PipelineOutcome, TaskId, TaskRecord};
use crate::core::pipeline::{PipelineController, PipelineInput};
use crate::core::store::SqliteStore;
use crate::core::tasks::TaskStore;
use crate::core::workspace::TempWorkspace;
use crate::plugins::registry::PluginRegistry;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

const TASK_SWEEP_EVERY: Duration = Duration::from_secs(10 * 60);
const TASK_RETENTION_SECS: i64 = 60 * 60;

/// Owns the shared pieces and runs pipelines, either inline or as background tasks.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<PluginRegistry>,
    cfg: Arc<AppConfig>,
    workspace: TempWorkspace,
    store: SqliteStore,
    tasks: TaskStore,
    event_tx: broadcast::Sender<ProgressEvent>,
}

impl Engine {
    pub async fn new(registry: PluginRegistry, cfg: AppConfig) -> anyhow::Result<Self> {
        let (event_tx, _) = broadcast::channel(256);

        for dir in [&cfg.temp_dir, &cfg.download_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create dir {}", dir.display()))?;
        }
        let store = SqliteStore::open(&cfg.settings_db()).await?;

        Ok(Self {
            registry: Arc::new(registry),
            workspace: TempWorkspace::new(&cfg.temp_dir),
            cfg: Arc::new(cfg),
            store,
            tasks: TaskStore::default(),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    pub async fn settings(&self) -> anyhow::Result<AppSettings> {
        self.store.get_settings().await
    }

    pub async fn save_settings(&self, patch: &serde_json::Value) -> anyhow::Result<AppSettings> {
        self.store.save_settings(patch).await
    }

    pub async fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.get(id).await
    }

    /// Request cookies over stored settings over the configured fallback session.
    async fn prepare_input(&self, text: &str, request_cookies: &CookieSettings) -> anyhow::Result<PipelineInput> {
        let settings = self.settings().await?;
        let configured = CookieSettings {
            netease_cookie: self.cfg.netease.cookie.clone().unwrap_or_default(),
            ..Default::default()
        };
        Ok(PipelineInput {
            text: text.to_string(),
            cookies: request_cookies.overlay(&settings.cookies.overlay(&configured)),
            format_selector: settings.format_selector(),
        })
    }

    /// Runs one pipeline to completion on the caller's task.
    pub async fn run_once(
        &self,
        text: &str,
        cookies: &CookieSettings,
        sink: &dyn ProgressSink,
    ) -> anyhow::Result<PipelineOutcome> {
        let input = self.prepare_input(text, cookies).await?;
        PipelineController::new(&self.registry, &self.workspace, self.cfg.locale, self.cfg.enable_youtube)
            .run(&input, sink)
            .await
    }

    /// Starts a background run and returns its task id immediately.
    pub async fn submit(&self, text: String, cookies: CookieSettings) -> TaskId {
        let task_id = self.tasks.create().await;
        info!(%task_id, "task accepted");

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_task(task_id, text, cookies).await;
        });
        task_id
    }

    async fn run_task(&self, task_id: TaskId, text: String, cookies: CookieSettings) {
        // the sink is synchronous, so task-record updates go through a channel
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<String>();
        let tasks = self.tasks.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(m) = msg_rx.recv().await {
                tasks.set_message(task_id, &m).await;
            }
        });

        let event_tx = self.event_tx.clone();
        let sink = move |m: &str| {
            // no listeners is fine
            let _ = event_tx.send(ProgressEvent { message: m.to_string(), task_id: Some(task_id) });
            let _ = msg_tx.send(m.to_string());
        };

        let result = self.run_once(&text, &cookies, &sink).await;
        drop(sink);
        if let Err(e) = forwarder.await {
            warn!(%task_id, error = %e, "task message forwarder stopped");
        }

        match result {
            Ok(outcome) => {
                info!(%task_id, song = %outcome.song_name, "task completed");
                self.tasks.complete(task_id, outcome).await;
            }
            Err(e) => {
                warn!(%task_id, error = %e, "task failed");
                self.tasks.fail(task_id, e.to_string()).await;
            }
        }
    }

    /// Drops task records older than an hour, every ten minutes.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(TASK_SWEEP_EVERY);
            // the first tick completes immediately
            tick.tick().await;
            loop {
                tick.tick().await;
                let removed = tasks.sweep(chrono::Duration::seconds(TASK_RETENTION_SECS)).await;
                let remaining = tasks.len().await;
                debug!(removed, remaining, "task sweep");
            }
        })
    }
}
