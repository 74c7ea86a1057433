//! Hub client: the RPC surface this worker needs from Koji hub
//! (`getTag`, `getBuildConfig`, `getRepo`, `repoInfo`).
//!
//! Grounded on `api/client.rs`'s retry/backoff HTTP client — same shape
//! (exponential backoff, bearer auth, retryable-status classification),
//! re-pointed at the hub's JSON-RPC-over-HTTP endpoint instead of the
//! donor's REST API.

mod error;
mod types;

pub use error::{HubError, HubResult};
pub use types::{BuildConfig, Repo, RepoInfo, Tag};

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Configuration;

const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

pub struct HubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HubClient {
    pub fn new(config: &Configuration) -> HubResult<Self> {
        let base_url = config.hub_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(HubError::InvalidUrl(base_url));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client, base_url, token: config.hub_token.clone() })
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    /// Koji hub speaks JSON-RPC-over-HTTP to the adjutant's XML-RPC-replacing
    /// sidecar: `{"method": name, "params": params}` posted to `/rpc`.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: impl Serialize) -> HubResult<T> {
        let url = format!("{}/rpc", self.base_url);
        let body = json!({ "method": method, "params": params });

        let mut last_error: Option<HubError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = std::cmp::min(BASE_RETRY_DELAY * 2u32.pow(attempt - 1), MAX_RETRY_DELAY);
                debug!("retrying hub call {} (attempt {}), waiting {:?}", method, attempt + 1, delay);
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(auth) = self.auth_header() {
                request = request.header("Authorization", auth);
            }

            match self.execute(request).await {
                Ok(response) => return self.parse(response).await,
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    warn!("hub call {} failed (attempt {}): {}", method, attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(HubError::RetryExhausted(
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string()),
        ))
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> HubResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() { HubError::Timeout } else { HubError::Request(e) }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(HubError::Authentication);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(HubError::NotFound("resource not found".to_string()));
        }
        if status.is_server_error() || status.is_client_error() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(HubError::Server { status: status.as_u16(), message });
        }

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(&self, response: reqwest::Response) -> HubResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(HubError::Parse)
    }

    pub async fn get_tag(&self, tag_name: &str) -> HubResult<Tag> {
        self.call("getTag", json!([tag_name])).await
    }

    pub async fn get_build_config(&self, tag_name: &str) -> HubResult<BuildConfig> {
        self.call("getBuildConfig", json!([tag_name])).await
    }

    pub async fn get_repo(&self, tag_name: &str) -> HubResult<Repo> {
        self.call("getRepo", json!([tag_name])).await
    }

    pub async fn repo_info(&self, repo_id: i64) -> HubResult<RepoInfo> {
        self.call("repoInfo", json!([repo_id])).await
    }
}
