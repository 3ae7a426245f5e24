use collab_core::{Agent, AgentsEnvelope, Task, TasksEnvelope};
use std::time::Duration;
use thiserror::Error;

pub mod poll;

pub use poll::{spawn_poller, PollEvent};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub poll_interval: Duration,
}

impl Config {
    /// Resolve configuration once at startup. CLI values win over the
    /// environment; the environment wins over the local default.
    pub fn resolve(cli_base_url: Option<&str>, cli_poll_ms: Option<u64>) -> Self {
        let base_url = resolve_base_url(cli_base_url, std::env::var("COLLAB_API_URL").ok());
        let poll_interval = resolve_poll_interval(
            cli_poll_ms,
            std::env::var("COLLAB_POLL_MS")
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok()),
        );
        Self {
            base_url,
            poll_interval,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

fn resolve_base_url(cli: Option<&str>, env: Option<String>) -> String {
    let candidate = cli
        .map(str::to_string)
        .filter(|value| !value.trim().is_empty())
        .or(env.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    normalize_base_url(&candidate)
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_poll_interval(cli: Option<u64>, env: Option<u64>) -> Duration {
    let ms = cli
        .filter(|value| *value > 0)
        .or(env.filter(|value| *value > 0))
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    Duration::from_millis(ms)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{endpoint} body did not decode: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Thin client for the collaboration backend. Cheap to clone; clones share
/// the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_agents(&self) -> Result<Vec<Agent>, ApiError> {
        let envelope: AgentsEnvelope = self.get_json("agents", "/agents/status").await?;
        Ok(envelope.agents)
    }

    pub async fn fetch_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let envelope: TasksEnvelope = self.get_json("tasks", "/tasks").await?;
        Ok(envelope.tasks)
    }

    async fn get_json<T>(&self, endpoint: &'static str, path: &str) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { endpoint, status });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { endpoint, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_prefers_cli_over_env_over_default() {
        assert_eq!(
            resolve_base_url(Some("http://one:1"), Some("http://two:2".to_string())),
            "http://one:1"
        );
        assert_eq!(
            resolve_base_url(None, Some("http://two:2/".to_string())),
            "http://two:2"
        );
        assert_eq!(resolve_base_url(None, None), DEFAULT_BASE_URL);
        assert_eq!(resolve_base_url(Some("  "), None), DEFAULT_BASE_URL);
    }

    #[test]
    fn poll_interval_rejects_zero() {
        assert_eq!(
            resolve_poll_interval(Some(0), Some(250)),
            Duration::from_millis(250)
        );
        assert_eq!(
            resolve_poll_interval(None, None),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        assert_eq!(
            resolve_poll_interval(Some(1000), None),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn client_normalizes_trailing_slash() {
        let client = ApiClient::new("http://127.0.0.1:8000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }
}
