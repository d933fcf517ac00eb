use async_trait::async_trait;
use crate::core::config::AppConfig;
use crate::core::model::{Platform, Resolution, ResolutionResult};
use crate::plugins::registry::{LinkResolver, ResolveContext, ResolverRole};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";

const MAX_SEARCH_DEPTH: usize = 64;
const MAX_TITLE_CHARS: usize = 50;

fn router_data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"window\._ROUTER_DATA\s*=\s*(.+?);?</script>").expect("static regex"))
}

#[derive(thiserror::Error, Debug)]
pub enum DouyinError {
    #[error("page request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("page returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("no video data found in page")]
    NoVideoData,
}

/// Pulls the watermark-free play URL out of a Douyin share page.
pub struct DouyinResolver {
    client: reqwest::Client,
}

impl DouyinResolver {
    pub fn new(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(MOBILE_USER_AGENT)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch_video(&self, page_url: &str, cookie: Option<&str>) -> Result<ResolutionResult, DouyinError> {
        let mut headers = HeaderMap::new();
        if let Some(c) = cookie.filter(|c| !c.trim().is_empty()) {
            match HeaderValue::from_str(c.trim()) {
                Ok(v) => {
                    headers.insert(COOKIE, v);
                }
                Err(_) => warn!("douyin cookie is not a valid header value, sending without it"),
            }
        }

        let resp = self.client.get(page_url).headers(headers).send().await?;
        if !resp.status().is_success() {
            return Err(DouyinError::Status(resp.status()));
        }
        let html = resp.text().await?;
        extract(&html).ok_or(DouyinError::NoVideoData)
    }
}

/// Parses the embedded router JSON of a share page. Pure; `None` on any mismatch.
pub fn extract(html: &str) -> Option<ResolutionResult> {
    let blob = router_data_re().captures(html)?.get(1)?.as_str();
    let data: Value = match serde_json::from_str(blob) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "router data is not valid JSON");
            return None;
        }
    };

    let info = find_video_info(&data, 0)?;
    let item = info.get("item_list")?.get(0)?;
    let play = item
        .pointer("/video/play_addr/url_list/0")?
        .as_str()?
        .replacen("playwm", "play", 1);

    let title = item.get("desc").and_then(Value::as_str).and_then(sanitize_title);
    Some(ResolutionResult { url: play, title })
}

/// First `videoInfoRes` whose `item_list` is non-empty, depth first.
fn find_video_info(v: &Value, depth: usize) -> Option<&Value> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match v {
        Value::Object(map) => {
            if let Some(info) = map.get("videoInfoRes") {
                let has_items = info
                    .get("item_list")
                    .and_then(Value::as_array)
                    .is_some_and(|a| !a.is_empty());
                if has_items {
                    return Some(info);
                }
            }
            map.values().find_map(|child| find_video_info(child, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|child| find_video_info(child, depth + 1)),
        _ => None,
    }
}

pub fn sanitize_title(raw: &str) -> Option<String> {
    let opts = sanitize_filename::Options { windows: true, truncate: true, replacement: "" };
    let cleaned = sanitize_filename::sanitize_with_options(raw, opts);
    let truncated: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
    let title = truncated.trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

#[async_trait]
impl LinkResolver for DouyinResolver {
    fn name(&self) -> &'static str { "douyin-extractor" }

    fn role(&self) -> ResolverRole { ResolverRole::Extractor }

    fn can_handle(&self, url: &str) -> bool {
        Platform::detect(url) == Some(Platform::Douyin)
    }

    async fn resolve(&self, url: &str, ctx: &ResolveContext) -> Resolution {
        match self.fetch_video(url, ctx.cookies.get(Platform::Douyin)).await {
            Ok(found) => Resolution::Resolved(found),
            Err(e) => {
                warn!(url, error = %e, "douyin extraction failed");
                Resolution::SoftFailed(e.to_string())
            }
        }
    }
}
