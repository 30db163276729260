use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::api::DEFAULT_API_BASE_URL;
use crate::store::ConflictPolicy;
use crate::stream::ReconnectPolicy;

pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8088/api/v1/ws";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Limit on opening the stream, TCP connect and upgrade together.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Extra headers sent with API requests and the stream handshake.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Capacity of the store change channel.
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_change_buffer() -> usize {
    256
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            stream_url: default_stream_url(),
            reconnect: ReconnectConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            headers: BTreeMap::new(),
            change_buffer: default_change_buffer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// When set, the delay doubles per consecutive failure up to this cap.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_delay_ms() -> u64 {
    3_000
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        match self.max_delay_ms {
            Some(max) => ReconnectPolicy::Exponential {
                initial: delay,
                max: Duration::from_millis(max),
            },
            None => ReconnectPolicy::Fixed(delay),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_delay_ms: None,
        }
    }
}
