use crate::codec::Grid;
use crate::schema::ConfigPayload;
use std::sync::Arc;

/// Events published to observers (the rendering layer) on a broadcast channel.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A configuration snapshot was loaded into the model.
    ConfigReady(Arc<ConfigPayload>),

    /// Freshly decoded live state. Not retained anywhere.
    LiveState(Arc<LiveState>),

    /// The link to the device went up (`true`) or down (`false`).
    ConnectionChanged(bool),

    /// The snapshot's schema version differs from ours; rendering is best-effort.
    SchemaMismatch { expected: u32, found: Option<u32> },

    /// A configuration save was handed to the transport.
    Saved,
}

/// One live-status frame, decoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveState {
    pub buttons: Option<Grid>,
    pub leds: Option<Grid>,
    pub scalars: LiveScalars,
}

/// Selector and handwheel readings, passed through as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveScalars {
    pub axis: Option<i64>,
    pub step: Option<i64>,
    pub handwheel: Option<i64>,
}
