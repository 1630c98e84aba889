use {
    danmu_common::EventKind,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DanmuConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub reconnect: ReconnectConfig,
    pub pipeline: PipelineConfig,
}

/// Remote capture service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the HTTP control plane.
    pub api_address: String,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_token: Option<Secret<String>>,
    /// Base URL of the event stream; rooms live at `{ws_address}/{platform}/{rid}`.
    pub ws_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_address: "http://127.0.0.1:7000".into(),
            api_token: None,
            ws_address: "ws://127.0.0.1:7777".into(),
        }
    }
}

impl ServerConfig {
    pub fn stream_url(&self, platform: &str, room_id: &str) -> String {
        format!(
            "{}/{platform}/{room_id}",
            self.ws_address.trim_end_matches('/')
        )
    }

    pub fn token(&self) -> Option<&str> {
        self.api_token
            .as_ref()
            .map(|t| t.expose_secret().as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub log_level: String,
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            debug: false,
        }
    }
}

/// Stream reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub delay_secs: u64,
    /// `0` retries forever.
    pub max_retries: u32,
    pub read_timeout_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 5,
            max_retries: 0,
            read_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub plugins: Vec<PluginEntry>,
}

/// One configured delivery target. Each enabled consumer entry becomes its
/// own pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Event-kind allow-list. Empty lets every kind through.
    #[serde(default, alias = "messagetypes")]
    pub event_kinds: Vec<EventKind>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

impl PluginEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            event_kinds: Vec::new(),
            config: Map::new(),
        }
    }
}

impl DanmuConfig {
    pub fn plugin(&self, name: &str) -> Option<&PluginEntry> {
        self.pipeline.plugins.iter().find(|p| p.name == name)
    }

    pub fn plugin_mut(&mut self, name: &str) -> Option<&mut PluginEntry> {
        self.pipeline.plugins.iter_mut().find(|p| p.name == name)
    }
}

fn default_true() -> bool {
    true
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
