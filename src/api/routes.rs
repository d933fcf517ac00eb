use crate::core::engine::Engine;
use crate::core::model::CookieSettings;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error};
use uuid::Uuid;

const SSE_KEEP_ALIVE_SECS: u64 = 15;

pub fn create_router(engine: Engine) -> Router {
    Router::new()
        .route("/api/sse", get(events))
        .route("/api/settings", get(get_settings).post(save_settings))
        .route("/api/process", post(process))
        .route("/api/status/{task_id}", get(status))
        .with_state(engine)
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "status": "error", "message": message.into() }))).into_response()
}

async fn events(State(engine): State<Engine>) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    // lagged receivers drop what they missed
    let stream = BroadcastStream::new(engine.subscribe()).filter_map(|item| async move {
        match item {
            Ok(ev) => Event::default().json_data(&ev).ok().map(Ok::<Event, Infallible>),
            Err(e) => {
                debug!(error = %e, "sse listener lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

async fn get_settings(State(engine): State<Engine>) -> Response {
    match engine.settings().await {
        Ok(s) => Json(s).into_response(),
        Err(e) => {
            error!(error = ?e, "failed to load settings");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn save_settings(State(engine): State<Engine>, Json(patch): Json<Value>) -> Response {
    match engine.save_settings(&patch).await {
        Ok(settings) => Json(json!({ "status": "success", "settings": settings })).into_response(),
        Err(e) => {
            error!(error = ?e, "failed to save settings");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// An object, or the same object serialized into a string.
    #[serde(default)]
    pub cookies: Option<Value>,
}

pub fn parse_cookies(raw: Option<Value>) -> CookieSettings {
    match raw {
        Some(Value::String(s)) => serde_json::from_str(&s).unwrap_or_default(),
        Some(v @ Value::Object(_)) => serde_json::from_value(v).unwrap_or_default(),
        _ => CookieSettings::default(),
    }
}

async fn process(State(engine): State<Engine>, Json(req): Json<ProcessRequest>) -> Response {
    let Some(url) = req.url.filter(|u| !u.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing URL");
    };

    let task_id = engine.submit(url, parse_cookies(req.cookies)).await;
    Json(json!({
        "status": "processing",
        "taskId": task_id,
        "message": "Task started in background",
    }))
    .into_response()
}

async fn status(State(engine): State<Engine>, Path(task_id): Path<String>) -> Response {
    let task = match Uuid::parse_str(&task_id) {
        Ok(id) => engine.task(id).await,
        Err(_) => None,
    };
    match task {
        Some(t) => Json(json!({ "status": t.status, "message": t.message, "result": t.result })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Task not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::plugins::registry::PluginRegistry;

    async fn spawn_api() -> (String, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.temp_dir = tmp.path().join("temp");
        cfg.download_dir = tmp.path().join("downloads");
        cfg.data_dir = tmp.path().join("data");
        let engine = Engine::new(PluginRegistry::from_config(&cfg).unwrap(), cfg).await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, create_router(engine)).await.unwrap() });
        (format!("http://{addr}"), tmp)
    }

    #[test]
    fn cookies_accept_object_or_string() {
        let from_obj = parse_cookies(Some(json!({"tiktokCookie": "sid=1"})));
        assert_eq!(from_obj.tiktok_cookie, "sid=1");
        let from_str = parse_cookies(Some(json!("{\"neteaseCookie\":\"MUSIC_U=1\"}")));
        assert_eq!(from_str.netease_cookie, "MUSIC_U=1");
        assert_eq!(parse_cookies(Some(json!("not json"))), CookieSettings::default());
        assert_eq!(parse_cookies(None), CookieSettings::default());
    }

    #[tokio::test]
    async fn process_requires_url() {
        let (base, _tmp) = spawn_api().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/process"))
            .json(&json!({"url": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"status": "error", "message": "Missing URL"}));
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let (base, _tmp) = spawn_api().await;
        for id in [Uuid::new_v4().to_string(), "nope".to_string()] {
            let resp = reqwest::get(format!("{base}/api/status/{id}")).await.unwrap();
            assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["message"], "Task not found");
        }
    }

    #[tokio::test]
    async fn settings_round_trip_and_task_status() {
        let (base, _tmp) = spawn_api().await;
        let client = reqwest::Client::new();

        let saved: Value = client
            .post(format!("{base}/api/settings"))
            .json(&json!({"douyinCookie": "ttwid=1"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(saved["status"], "success");
        assert_eq!(saved["settings"]["douyinCookie"], "ttwid=1");

        let current: Value = client.get(format!("{base}/api/settings")).send().await.unwrap().json().await.unwrap();
        assert_eq!(current["audioQuality"], "best");
        assert_eq!(current["douyinCookie"], "ttwid=1");

        let accepted: Value = client
            .post(format!("{base}/api/process"))
            .json(&json!({"url": "https://vt.tiktok.com/ABC123", "cookies": "{}"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(accepted["status"], "processing");
        let id = accepted["taskId"].as_str().unwrap().to_string();

        // no cloud cookie anywhere, so the task fails during preflight
        let mut last = Value::Null;
        for _ in 0..200 {
            last = client.get(format!("{base}/api/status/{id}")).send().await.unwrap().json().await.unwrap();
            if last["status"] != "processing" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "error");
        assert_eq!(last["message"], "NetEase Cookie is not configured!");
    }
}
