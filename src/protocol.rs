//! Wire frames exchanged with the device.
//!
//! Inbound frames are `{"type": ..., "payload": ...}`; outbound frames are
//! `{"command": ..., "payload"?: ...}`. One JSON document per message.

use crate::codec::WireBits;
use crate::error::Result;
use crate::schema::ConfigPayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_INITIAL_CONFIG: &str = "initialConfig";
pub const TYPE_INITIAL_STATE: &str = "initialState";
pub const TYPE_LIVE_STATUS: &str = "liveStatus";

/// Payload key under which an `initialState` frame may bundle live state.
pub const BUNDLED_LIVE_KEY: &str = "liveStatus";

/// An inbound frame before its payload is interpreted.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub payload: Value,
}

/// Live readings: button and LED bitfields plus selector scalars.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiveStatus {
    #[serde(default)]
    pub buttons: Option<WireBits>,

    #[serde(default)]
    pub leds: Option<WireBits>,

    #[serde(default)]
    pub axis: Option<i64>,

    #[serde(default)]
    pub step: Option<i64>,

    #[serde(default)]
    pub handwheel: Option<i64>,
}

/// A full configuration snapshot, optionally with the live state at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub config: ConfigPayload,
    pub live: Option<LiveStatus>,
}

/// Commands sent to the device.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    SaveConfig { payload: ConfigPayload },
    GetInitialState,
    ResetDefaults,
    FactoryTest,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SaveConfig { .. } => "saveConfig",
            Self::GetInitialState => "getInitialState",
            Self::ResetDefaults => "resetDefaults",
            Self::FactoryTest => "factoryTest",
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    /// Returns `SyncError::Json` if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
