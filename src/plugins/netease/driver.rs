use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use crate::core::config::AppConfig;
use crate::plugins::registry::{CloudUploader, UploadReceipt};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub const NO_CODE: i64 = -1;

/// Uploads to the cloud drive of a NeteaseCloudMusicApi-compatible service.
pub struct NeteaseUploader {
    client: reqwest::Client,
    endpoint: String,
}

/// Re-reads each UTF-8 byte as one Latin-1 char. The upstream multipart
/// parser decodes filenames as Latin-1, so this round-trips non-ASCII names.
pub fn latin1_shim(name: &str) -> String {
    name.bytes().map(char::from).collect()
}

/// Code the service embedded in its JSON reply. Without one, a non-2xx HTTP
/// status is passed through and anything else maps to [`NO_CODE`].
fn response_code(body: &Value, status: reqwest::StatusCode) -> i64 {
    match body.get("code").and_then(Value::as_i64) {
        Some(code) => code,
        None if !status.is_success() => i64::from(status.as_u16()),
        None => NO_CODE,
    }
}

impl NeteaseUploader {
    pub fn new(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        let endpoint = format!("{}/cloud", cfg.netease.api_base.trim_end_matches('/'));
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CloudUploader for NeteaseUploader {
    fn name(&self) -> &'static str { "netease-cloud" }

    async fn upload(&self, file_name: &str, data: Bytes, session_cookie: &str) -> anyhow::Result<UploadReceipt> {
        let size = data.len();
        let part = Part::stream_with_length(data, size as u64)
            .file_name(latin1_shim(file_name))
            .mime_str("audio/mpeg")?;
        // raw header bytes, the shim already did the encoding work
        let form = Form::new().percent_encode_noop().part("songFile", part);

        info!(file_name, size, endpoint = %self.endpoint, "uploading to cloud drive");
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("cookie", session_cookie.to_string()),
                ("timestamp", chrono::Utc::now().timestamp_millis().to_string()),
            ])
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = resp.status();
        let text = resp.text().await.context("read upload response")?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        let code = response_code(&body, status);
        debug!(code, %status, "upload response");

        Ok(UploadReceipt { code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn shim_widens_each_byte() {
        assert_eq!(latin1_shim("song.mp3"), "song.mp3");
        let shimmed = latin1_shim("歌.mp3");
        assert_eq!(shimmed.chars().count(), 3 + 4);
        assert_eq!(shimmed.chars().next(), Some('\u{e6}'));
    }

    async fn cloud(Query(q): Query<HashMap<String, String>>, body: Bytes) -> Json<Value> {
        let text = String::from_utf8_lossy(&body);
        let ok = q.get("cookie").map(String::as_str) == Some("MUSIC_U=abc")
            && text.contains("name=\"songFile\"")
            && text.contains("filename=\"clip.mp3\"")
            && text.contains("audio/mpeg");
        if ok {
            Json(json!({"code": 200, "privateCloud": {"songId": 1}}))
        } else {
            Json(json!({"code": 400, "msg": "bad form"}))
        }
    }

    #[tokio::test]
    async fn posts_multipart_with_cookie_query() {
        let app = Router::new().route("/cloud", post(cloud));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut cfg = AppConfig::default();
        cfg.netease.api_base = format!("http://{addr}/");
        let uploader = NeteaseUploader::new(&cfg).unwrap();

        let receipt = uploader.upload("clip.mp3", Bytes::from_static(b"ID3"), "MUSIC_U=abc").await.unwrap();
        assert_eq!(receipt.code, 200);

        let receipt = uploader.upload("clip.mp3", Bytes::from_static(b"ID3"), "wrong").await.unwrap();
        assert_eq!(receipt.code, 400);
        assert_eq!(receipt.body["msg"], "bad form");
    }

    #[tokio::test]
    async fn replies_without_a_json_code_are_not_success() {
        let app = Router::new()
            .route("/html/cloud", post(|| async { "<html>nginx default page</html>" }))
            .route("/nocode/cloud", post(|| async { Json(json!({"msg": "no code"})) }))
            .route(
                "/down/cloud",
                post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "upstream gone") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        for (prefix, expected) in [("html", NO_CODE), ("nocode", NO_CODE), ("down", 502)] {
            let mut cfg = AppConfig::default();
            cfg.netease.api_base = format!("http://{addr}/{prefix}");
            let uploader = NeteaseUploader::new(&cfg).unwrap();
            let receipt = uploader.upload("clip.mp3", Bytes::from_static(b"ID3"), "MUSIC_U=abc").await.unwrap();
            assert_eq!(receipt.code, expected, "{prefix}");
        }
    }
}
