use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:2207/api";

/// Client settings. Every field has a default so a partial file still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub api_url: String,
    /// Push hub endpoint; derived from `api_url` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub_url: Option<String>,
    pub reconnect_delays_ms: Vec<u64>,
    pub request_timeout_secs: u64,
    /// Target column titles containing this (case-insensitive) celebrate a
    /// finished card.
    pub completion_marker: String,
    pub default_board_title: String,
    pub default_column_title: String,
    pub default_card_title: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            hub_url: None,
            reconnect_delays_ms: vec![0, 2000, 5000, 10000, 30000],
            request_timeout_secs: 30,
            completion_marker: "done".to_string(),
            default_board_title: "Untitled Board".to_string(),
            default_column_title: "New Column".to_string(),
            default_card_title: "New Card".to_string(),
        }
    }
}

impl ClientConfig {
    /// `ws(s)://host/hubs/board` for an `http(s)://host/api` base.
    pub fn resolved_hub_url(&self) -> String {
        if let Some(url) = &self.hub_url {
            return url.clone();
        }
        let base = self.api_url.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        let base = if let Some(rest) = base.strip_prefix("https") {
            format!("wss{}", rest)
        } else if let Some(rest) = base.strip_prefix("http") {
            format!("ws{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/hubs/board", base)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect_delays_ms
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Fixed reconnect backoff table. `delay(n)` is the wait before attempt `n`;
/// `None` once the table is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ClientConfig::default().reconnect_policy()
    }
}

impl ReconnectPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }
}
