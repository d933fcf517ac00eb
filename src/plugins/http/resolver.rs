use async_trait::async_trait;
use crate::core::config::AppConfig;
use crate::core::model::{Resolution, ResolutionResult};
use crate::plugins::registry::{LinkResolver, ResolveContext, ResolverRole};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const MAX_REDIRECTS: usize = 5;

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

#[derive(thiserror::Error, Debug)]
pub enum RedirectError {
    #[error("http status error: {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Follows short-link redirects to the canonical destination.
pub struct RedirectResolver {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl RedirectResolver {
    pub fn new(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::custom(|attempt| {
                // previous() includes the initial URL, so its length is the hop count
                if attempt.previous().len() > MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else {
                    attempt.follow()
                }
            }))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&cfg.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));

        Ok(Self { client, headers })
    }

    fn accept_status(status: reqwest::StatusCode) -> Result<(), RedirectError> {
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(RedirectError::Status(status))
        }
    }

    /// HEAD first; some origins reject it, so fall back to a GET whose body is never read.
    pub async fn follow(&self, url: &str) -> Result<String, RedirectError> {
        let head = self.client.head(url).headers(self.headers.clone()).send().await;
        match head {
            Ok(resp) if Self::accept_status(resp.status()).is_ok() => return Ok(resp.url().to_string()),
            Ok(resp) => debug!(url, status = %resp.status(), "HEAD rejected, retrying with GET"),
            Err(e) => debug!(url, error = %e, "HEAD failed, retrying with GET"),
        }

        let resp = self.client.get(url).headers(self.headers.clone()).send().await?;
        Self::accept_status(resp.status())?;
        let final_url = resp.url().to_string();
        // dropping the response aborts the body transfer
        drop(resp);
        Ok(final_url)
    }

    /// Never fails: the original URL comes back when nothing better is known.
    pub async fn unshorten(&self, url: &str) -> String {
        self.follow(url).await.unwrap_or_else(|_| url.to_string())
    }
}

#[async_trait]
impl LinkResolver for RedirectResolver {
    fn name(&self) -> &'static str { "redirect-resolver" }

    fn role(&self) -> ResolverRole { ResolverRole::Redirect }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false)
    }

    async fn resolve(&self, url: &str, _ctx: &ResolveContext) -> Resolution {
        match self.follow(url).await {
            Ok(final_url) => Resolution::Resolved(ResolutionResult { url: final_url, title: None }),
            Err(e) => Resolution::SoftFailed(e.to_string()),
        }
    }
}
