use crate::codec::{GridShape, Layout};
use crate::error::Result;
use crate::schema::SCHEMA_VERSION;
use crate::sync::LiveLayout;
use serde::Deserialize;

/// Root client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

/// Where the device is and how to talk to it.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// WebSocket endpoint, e.g. "ws://linuxcnc-hmi.local/ws".
    pub url: String,

    /// Fixed delay between a lost connection and the next attempt.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Configuration schema version we expect the device to send.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// HTTP base for `/get_config_json`. Derived from `url` when absent.
    #[serde(default)]
    pub http_url: Option<String>,
}

impl DeviceConfig {
    /// HTTP base URL of the device's web server, without a trailing slash.
    pub fn http_base(&self) -> String {
        if let Some(url) = &self.http_url {
            return url.trim_end_matches('/').to_string();
        }
        let (scheme, rest) = if let Some(rest) = self.url.strip_prefix("wss://") {
            ("https://", rest)
        } else if let Some(rest) = self.url.strip_prefix("ws://") {
            ("http://", rest)
        } else {
            ("http://", self.url.as_str())
        };
        let host = rest.split('/').next().unwrap_or(rest);
        format!("{scheme}{host}")
    }
}

/// Shapes of the live-state grids.
///
/// Without a `[live]` section both grids default to the 8x8 packed-row
/// matrix. With one, only the grids listed are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    #[serde(default)]
    pub buttons: Option<GridConfig>,

    #[serde(default)]
    pub leds: Option<GridConfig>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            buttons: Some(GridConfig::default()),
            leds: Some(GridConfig::default()),
        }
    }
}

impl LiveConfig {
    /// # Errors
    /// Returns `SyncError::EmptyGrid` or `SyncError::GridTooLarge` for an
    /// unusable grid.
    pub fn layout(&self) -> Result<LiveLayout> {
        Ok(LiveLayout {
            buttons: self.buttons.as_ref().map(GridConfig::shape).transpose()?,
            leds: self.leds.as_ref().map(GridConfig::shape).transpose()?,
        })
    }
}

/// One bit grid.
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub rows: u8,
    pub cols: u8,
    #[serde(default = "default_layout")]
    pub layout: Layout,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 8,
            cols: 8,
            layout: default_layout(),
        }
    }
}

impl GridConfig {
    /// # Errors
    /// See `GridShape::new`.
    pub fn shape(&self) -> Result<GridShape> {
        GridShape::new(self.rows, self.cols, self.layout)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetyConfig {
    /// Approve sensitive action changes without asking.
    #[serde(default)]
    pub auto_confirm_sensitive: bool,
}

// --- Defaults ---

fn default_reconnect_interval() -> u64 {
    2000
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_layout() -> Layout {
    Layout::PackedRows
}
