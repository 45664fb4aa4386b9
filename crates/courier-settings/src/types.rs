//! Settings type definitions.

use serde::{Deserialize, Serialize};

use courier_llm::provider::ToolChoice;
use courier_relay::delivery::DeliveryMode;
use courier_relay::relay::CancelPolicy;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Completion-provider settings.
    pub provider: ProviderSettings,
    /// Relay pipeline settings.
    pub relay: RelaySettings,
}

impl CourierSettings {
    /// Validate cross-field constraints after loading.
    pub fn validate(&self) -> Result<()> {
        if self.provider.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "provider.model must not be empty".into(),
            ));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "provider.baseUrl must not be empty".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Maximum live WebSocket connections (`0` = unlimited).
    pub max_connections: usize,
    /// Per-connection outbound queue capacity.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8890,
            max_connections: 256,
            send_queue_capacity: 1024,
        }
    }
}

/// Completion-provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    /// OpenAI-compatible gateway base URL.
    pub base_url: String,
    /// Bearer API key. Usually supplied via `COURIER_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier passed through verbatim.
    pub model: String,
    /// Output token cap, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature override, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Function/tool-invocation behavior mode.
    pub tool_choice: ToolChoice,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "openai/gpt-4o-mini".to_string(),
            max_tokens: None,
            temperature: None,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Relay pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Pacing delay between chunk deliveries in milliseconds (`0` disables).
    pub chunk_delay_ms: u64,
    /// Cancellation-history policy.
    pub cancel_policy: CancelPolicy,
    /// Deployment delivery mode.
    pub delivery_mode: DeliveryMode,
    /// Evict sessions idle for this many seconds. Absent = never evict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_idle_timeout_secs: Option<u64>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_delay_ms: 100,
            cancel_policy: CancelPolicy::KeepPartial,
            delivery_mode: DeliveryMode::Push,
            session_idle_timeout_secs: None,
        }
    }
}
