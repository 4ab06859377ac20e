use crate::protocol::{
    InboundFrame, LiveStatus, Snapshot, BUNDLED_LIVE_KEY, TYPE_INITIAL_CONFIG,
    TYPE_INITIAL_STATE, TYPE_LIVE_STATUS,
};
use crate::schema::ConfigPayload;
use serde_json::Value;
use tracing::warn;

/// Where an inbound frame goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Replace the configuration model.
    Snapshot(Snapshot),
    /// Decode and republish live state.
    Live(LiveStatus),
    /// Unknown or malformed; already logged.
    Ignored,
}

/// Per-connection frame counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub unknown: u64,
    pub malformed: u64,
}

/// Classifies inbound text frames by their declared type.
///
/// Unknown types and malformed frames are logged and dropped; neither is
/// fatal to the connection.
#[derive(Debug, Default)]
pub struct MessageRouter {
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RouterStats::default();
    }

    pub fn dispatch(&mut self, text: &str) -> Route {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping malformed frame: {e}");
                self.stats.malformed += 1;
                return Route::Ignored;
            }
        };

        let route = match frame.kind.as_str() {
            TYPE_INITIAL_CONFIG | TYPE_INITIAL_STATE => parse_snapshot(frame.payload),
            TYPE_LIVE_STATUS => serde_json::from_value(frame.payload).map(Route::Live),
            other => {
                warn!("unknown message type: {other}");
                self.stats.unknown += 1;
                return Route::Ignored;
            }
        };

        match route {
            Ok(route) => {
                self.stats.routed += 1;
                route
            }
            Err(e) => {
                warn!("dropping '{}' frame with bad payload: {e}", frame.kind);
                self.stats.malformed += 1;
                Route::Ignored
            }
        }
    }
}

fn parse_snapshot(mut payload: Value) -> serde_json::Result<Route> {
    let bundled = payload.as_object_mut().and_then(|p| p.remove(BUNDLED_LIVE_KEY));
    let config: ConfigPayload = serde_json::from_value(payload)?;
    let live = bundled.and_then(|live| match serde_json::from_value::<LiveStatus>(live) {
        Ok(live) => Some(live),
        Err(e) => {
            warn!("dropping malformed bundled live state: {e}");
            None
        }
    });
    Ok(Route::Snapshot(Snapshot { config, live }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireBits;

    #[test]
    fn initial_config_routes_to_snapshot() {
        let mut router = MessageRouter::new();
        let route = router.dispatch(
            r#"{"type":"initialConfig","payload":{"schemaVersion":1,"buttons":[{"name":"Stop","is_toggle":false,"radio_group_id":0}]}}"#,
        );
        let Route::Snapshot(snapshot) = route else {
            panic!("expected snapshot, got {route:?}");
        };
        assert_eq!(snapshot.config.buttons[0].name, "Stop");
        assert!(snapshot.live.is_none());
        assert_eq!(router.stats().routed, 1);
    }

    #[test]
    fn malformed_bundled_live_status_keeps_config() {
        let mut router = MessageRouter::new();
        let route = router.dispatch(
            r#"{"type":"initialState","payload":{"schemaVersion":1,"buttons":[{"name":"Stop","is_toggle":false,"radio_group_id":0}],"liveStatus":{"buttons":"lots"}}}"#,
        );
        let Route::Snapshot(snapshot) = route else {
            panic!("expected snapshot, got {route:?}");
        };
        assert_eq!(snapshot.config.buttons[0].name, "Stop");
        assert!(snapshot.live.is_none());
        assert!(!snapshot.config.extra.contains_key("liveStatus"));
        assert_eq!(router.stats().malformed, 0);
    }

    #[test]
    fn initial_state_may_bundle_live_status() {
        let mut router = MessageRouter::new();
        let route = router.dispatch(
            r#"{"type":"initialState","payload":{"leds":[],"liveStatus":{"buttons":3,"axis":1}}}"#,
        );
        let Route::Snapshot(snapshot) = route else {
            panic!("expected snapshot, got {route:?}");
        };
        let live = snapshot.live.unwrap();
        assert_eq!(live.buttons, Some(WireBits::Single(3)));
        assert_eq!(live.axis, Some(1));
        assert!(!snapshot.config.extra.contains_key("liveStatus"));
    }

    #[test]
    fn live_status_routes_to_live() {
        let mut router = MessageRouter::new();
        let route = router.dispatch(r#"{"type":"liveStatus","payload":{"buttons":5}}"#);
        assert_eq!(
            route,
            Route::Live(LiveStatus {
                buttons: Some(WireBits::Single(5)),
                ..Default::default()
            })
        );
    }

    #[test]
    fn unknown_type_is_ignored() {
        let mut router = MessageRouter::new();
        let route = router.dispatch(r#"{"type":"unknownFutureType","payload":{"x":1}}"#);
        assert_eq!(route, Route::Ignored);
        assert_eq!(router.stats().unknown, 1);
    }

    #[test]
    fn malformed_frames_are_ignored() {
        let mut router = MessageRouter::new();
        assert_eq!(router.dispatch("not json"), Route::Ignored);
        assert_eq!(router.dispatch(r#"{"payload":{}}"#), Route::Ignored);
        assert_eq!(
            router.dispatch(r#"{"type":"liveStatus","payload":{"buttons":"lots"}}"#),
            Route::Ignored
        );
        assert_eq!(
            router.dispatch(r#"{"type":"initialConfig","payload":"Error parsing config"}"#),
            Route::Ignored
        );
        assert_eq!(router.stats().malformed, 4);
        assert_eq!(router.stats().routed, 0);

        router.reset_stats();
        assert_eq!(router.stats(), RouterStats::default());
    }
}
