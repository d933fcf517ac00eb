use crate::core::model::AppSettings;
use anyhow::Context;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::debug;

/// Persisted user settings as key/value rows over the `AppSettings` JSON shape.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }

        let abs = if db_path.is_absolute() {
            db_path.to_path_buf()
        } else {
            std::env::current_dir()
                .with_context(|| "current_dir")?
                .join(db_path)
        };

        let mut p = abs.to_string_lossy().to_string();
        if cfg!(windows) {
            p = p.replace('\\', "/");
        }

        // mode=rwc creates the file on first open
        let url = if p.starts_with('/') {
            format!("sqlite://{}?mode=rwc", p)
        } else {
            format!("sqlite:///{}?mode=rwc", p)
        };

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .with_context(|| format!("connect sqlite url={} (file={})", url, abs.display()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
              key TEXT PRIMARY KEY NOT NULL,
              value TEXT NOT NULL,
              updated_at INTEGER NOT NULL
            );
            "#,
        )
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn now_epoch() -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    async fn load_map(&self) -> anyhow::Result<Map<String, Value>> {
        let rows = sqlx::query(r#"SELECT key, value FROM settings"#)
            .fetch_all(&self.pool)
            .await
            .context("load settings")?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("key"), Value::String(r.get::<String, _>("value"))))
            .collect())
    }

    /// Defaults overlaid with whatever has been stored.
    pub async fn get_settings(&self) -> anyhow::Result<AppSettings> {
        let mut merged = defaults_map()?;
        merged.extend(self.load_map().await?);
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Merges a partial settings object into the stored settings. Unknown keys are ignored.
    pub async fn save_settings(&self, patch: &Value) -> anyhow::Result<AppSettings> {
        let patch = patch.as_object().context("settings must be a JSON object")?;
        let known = defaults_map()?;
        let now = Self::now_epoch();

        let mut tx = self.pool.begin().await?;
        for (key, value) in patch {
            if !known.contains_key(key) {
                debug!(key = %key, "ignoring unknown settings key");
                continue;
            }
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            sqlx::query(
                r#"
                INSERT INTO settings(key, value, updated_at) VALUES(?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at;
                "#,
            )
                .bind(key)
                .bind(text)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.get_settings().await
    }
}

fn defaults_map() -> anyhow::Result<Map<String, Value>> {
    match serde_json::to_value(AppSettings::default())? {
        Value::Object(m) => Ok(m),
        _ => anyhow::bail!("settings defaults are not an object"),
    }
}
