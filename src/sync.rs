use crate::codec::{self, Grid, GridShape, WireBits};
use crate::connection::{Attempt, ConnectionManager, ReconnectPlan, ReconnectTicket, TransportEvent};
use crate::error::{Result, SyncError};
use crate::event::{LiveScalars, LiveState, SyncEvent};
use crate::model::{BindingPatch, ConfigModel, Patch};
use crate::protocol::{Command, LiveStatus, Snapshot};
use crate::router::{MessageRouter, Route, RouterStats};
use crate::schema::validate::{validate, ValidationResult};
use crate::schema::{ActionType, ConfigPayload};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Grid shapes used to decode live-status bitfields. `None` skips that grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveLayout {
    pub buttons: Option<GridShape>,
    pub leds: Option<GridShape>,
}

/// A binding edit that changes to or from an action that switches a physical
/// input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveChange {
    pub binding: usize,
    pub from: i32,
    pub to: i32,
}

/// Asks the user to approve a sensitive change.
pub trait ConfirmSensitive {
    fn confirm(&mut self, change: &SensitiveChange) -> bool;
}

/// Answers every confirmation the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl ConfirmSensitive for AutoConfirm {
    fn confirm(&mut self, _change: &SensitiveChange) -> bool {
        self.0
    }
}

impl<F> ConfirmSensitive for F
where
    F: FnMut(&SensitiveChange) -> bool,
{
    fn confirm(&mut self, change: &SensitiveChange) -> bool {
        self(change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// A sensitive action change was declined and its action rolled back.
    Reverted,
}

/// Ties the link, the router, the model and the codec together.
///
/// Every method runs one reaction to completion; the caller feeds it
/// transport events, timer expiries and user requests one at a time.
pub struct SyncController {
    connection: ConnectionManager,
    model: ConfigModel,
    router: MessageRouter,
    live_layout: LiveLayout,
    expected_schema: u32,
    confirm: Box<dyn ConfirmSensitive>,
    events: broadcast::Sender<SyncEvent>,
    snapshots: u64,
}

impl SyncController {
    pub fn new(
        connection: ConnectionManager,
        model: ConfigModel,
        live_layout: LiveLayout,
        expected_schema: u32,
        confirm: Box<dyn ConfirmSensitive>,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            connection,
            model,
            router: MessageRouter::new(),
            live_layout,
            expected_schema,
            confirm,
            events,
            snapshots: 0,
        }
    }

    pub fn model(&self) -> &ConfigModel {
        &self.model
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// How many configuration snapshots have been loaded so far.
    pub fn snapshots_loaded(&self) -> u64 {
        self.snapshots
    }

    /// Kick off the first connection attempt.
    pub fn start(&mut self) -> Option<Attempt> {
        self.connection.begin_connect()
    }

    /// A reconnect timer fired.
    pub fn on_reconnect_due(&mut self, ticket: ReconnectTicket) -> Option<Attempt> {
        self.connection.on_reconnect_due(ticket)
    }

    /// React to a transport event. Returns a reconnect to schedule, if any.
    pub fn handle_transport(&mut self, event: TransportEvent) -> Option<ReconnectPlan> {
        match event {
            TransportEvent::Opened { attempt, sink } => {
                if self.connection.on_open(attempt, Box::new(sink)) {
                    self.router.reset_stats();
                    let _ = self.events.send(SyncEvent::ConnectionChanged(true));
                    if let Err(e) = self.send_command(&Command::GetInitialState) {
                        warn!("failed to request configuration: {e}");
                    }
                }
                None
            }
            TransportEvent::Message { attempt, text } => {
                if !self.connection.is_open_attempt(attempt) {
                    debug!("dropping frame from stale attempt {attempt}");
                    return None;
                }
                match self.router.dispatch(&text) {
                    Route::Snapshot(snapshot) => self.apply_snapshot(snapshot),
                    Route::Live(live) => self.publish_live(&live),
                    Route::Ignored => {}
                }
                None
            }
            TransportEvent::Closed { attempt, reason } => {
                let down = self.connection.on_closed(attempt)?;
                match reason {
                    Some(reason) => warn!("connection lost: {reason}"),
                    None => info!("connection closed"),
                }
                self.model.discard_staged();
                if down.was_connected {
                    let _ = self.events.send(SyncEvent::ConnectionChanged(false));
                }
                info!(
                    "reconnecting in {} ms",
                    down.reconnect.delay.as_millis()
                );
                Some(down.reconnect)
            }
        }
    }

    /// Apply a field edit to the staged configuration.
    ///
    /// Changing a binding's action to or from a sensitive action requires
    /// confirmation. A declined change reverts the action alone; other fields
    /// in the same patch stay applied.
    ///
    /// # Errors
    /// Returns `SyncError::NotLoaded` or `SyncError::IndexOutOfRange` from the model.
    pub fn edit(&mut self, index: usize, patch: Patch) -> Result<EditOutcome> {
        let sensitive = self.sensitive_change(index, &patch);
        let (patch, gated) = match (patch, sensitive) {
            (Patch::Binding(binding), Some(change)) => (
                Patch::Binding(BindingPatch {
                    action: None,
                    ..binding
                }),
                Some(change),
            ),
            (patch, _) => (patch, None),
        };
        self.model.update(index, patch)?;

        let Some(change) = gated else {
            return Ok(EditOutcome::Applied);
        };
        let inverse = self.model.update(
            index,
            Patch::Binding(BindingPatch {
                action: Some(change.to),
                ..Default::default()
            }),
        )?;

        if !self.confirm.confirm(&change) {
            warn!(
                "binding {index}: action change {} -> {} declined, reverting",
                change.from, change.to
            );
            self.model.update(index, inverse)?;
            return Ok(EditOutcome::Reverted);
        }
        info!(
            "binding {index}: action change {} -> {} confirmed",
            change.from, change.to
        );
        Ok(EditOutcome::Applied)
    }

    /// Stage an edited configuration by diffing it against the model and
    /// applying each change through `edit`. Returns how many patches applied
    /// in full.
    ///
    /// Sections the model does not track (`extra`) are not staged.
    ///
    /// # Errors
    /// Returns `SyncError::ShapeMismatch` if a collection changed size.
    pub fn stage(&mut self, edited: &ConfigPayload) -> Result<usize> {
        let patches = self.model.diff(edited)?;
        let mut applied = 0;
        for (index, patch) in patches {
            if self.edit(index, patch)? == EditOutcome::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Validate the staged configuration and send it to the device.
    ///
    /// Success means the frame was handed to the transport; the device sends
    /// no acknowledgment. On any error the staged edits are left untouched.
    ///
    /// # Errors
    /// `SyncError::NotLoaded` before the first snapshot, `SyncError::Invalid`
    /// with every violation, or `SyncError::NotConnected` if the link is down.
    pub fn save(&mut self) -> Result<()> {
        let payload = self.model.to_payload(self.expected_schema)?;

        if let ValidationResult::Invalid(errors) = validate(&payload) {
            for e in &errors {
                warn!("invalid configuration: {e}");
            }
            return Err(SyncError::Invalid(errors));
        }

        self.send_command(&Command::SaveConfig { payload })?;
        self.model.commit();
        info!("configuration sent to device");
        let _ = self.events.send(SyncEvent::Saved);
        Ok(())
    }

    /// Ask the device to restore factory defaults, then fetch the result.
    ///
    /// # Errors
    /// Returns `SyncError::NotConnected` if the link is down.
    pub fn reset_defaults(&mut self) -> Result<()> {
        self.send_command(&Command::ResetDefaults)?;
        self.send_command(&Command::GetInitialState)
    }

    /// Ask the device to run its factory self-test.
    ///
    /// # Errors
    /// Returns `SyncError::NotConnected` if the link is down.
    pub fn factory_test(&mut self) -> Result<()> {
        self.send_command(&Command::FactoryTest)
    }

    fn send_command(&self, command: &Command) -> Result<()> {
        debug!("sending {}", command.name());
        self.connection.send(command.to_frame()?)
    }

    fn sensitive_change(&self, index: usize, patch: &Patch) -> Option<SensitiveChange> {
        let Patch::Binding(BindingPatch {
            action: Some(to), ..
        }) = patch
        else {
            return None;
        };
        let from = self.model.bindings().get(index)?.action;
        let touches_sensitive =
            ActionType::is_sensitive_code(from) || ActionType::is_sensitive_code(*to);
        (from != *to && touches_sensitive).then_some(SensitiveChange {
            binding: index,
            from,
            to: *to,
        })
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        let Snapshot { config, live } = snapshot;

        if config.schema_version != Some(self.expected_schema) {
            warn!(
                "schema version mismatch: expected {}, device sent {:?}; rendering best-effort",
                self.expected_schema, config.schema_version
            );
            let _ = self.events.send(SyncEvent::SchemaMismatch {
                expected: self.expected_schema,
                found: config.schema_version,
            });
        }

        info!(
            "configuration received: {} buttons, {} leds, {} bindings",
            config.buttons.len(),
            config.leds.len(),
            config.bindings.len()
        );
        let ready = Arc::new(config.clone());
        self.model.load(config);
        self.snapshots += 1;
        let _ = self.events.send(SyncEvent::ConfigReady(ready));

        if let Some(live) = live {
            self.publish_live(&live);
        }
    }

    fn publish_live(&self, live: &LiveStatus) {
        let state = LiveState {
            buttons: decode_grid("buttons", live.buttons.as_ref(), self.live_layout.buttons.as_ref()),
            leds: decode_grid("leds", live.leds.as_ref(), self.live_layout.leds.as_ref()),
            scalars: LiveScalars {
                axis: live.axis,
                step: live.step,
                handwheel: live.handwheel,
            },
        };
        let _ = self.events.send(SyncEvent::LiveState(Arc::new(state)));
    }
}

fn decode_grid(name: &str, wire: Option<&WireBits>, shape: Option<&GridShape>) -> Option<Grid> {
    match (wire, shape) {
        (Some(wire), Some(shape)) => match codec::decode(wire, shape) {
            Ok(grid) => Some(grid),
            Err(e) => {
                warn!("dropping live {name}: {e}");
                None
            }
        },
        (Some(_), None) => {
            debug!("no grid shape configured for live {name}");
            None
        }
        (None, _) => None,
    }
}
