use crate::codec::Grid;
use crate::config::schema::AppConfig;
use crate::config::watcher;
use crate::connection::{ws, Attempt, ConnectionManager, ReconnectTicket, TransportEvent};
use crate::error::{Result, SyncError};
use crate::event::SyncEvent;
use crate::model::ConfigModel;
use crate::schema::ConfigPayload;
use crate::sync::{AutoConfirm, SyncController};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 64;
const EDITS_CAPACITY: usize = 4;

/// What to do beyond keeping the model in sync.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stage and save every change to this JSON payload file.
    pub edits: Option<PathBuf>,
    /// Approve sensitive action changes without asking.
    pub auto_confirm: bool,
    /// Send `resetDefaults` once connected.
    pub reset_defaults: bool,
    /// Send `factoryTest` once connected.
    pub factory_test: bool,
}

/// Run the sync client until Ctrl-C.
///
/// # Errors
/// Returns `SyncError` if the live-state layout in the settings is unusable.
pub async fn run(config: AppConfig, options: RunOptions) -> Result<()> {
    let cancel = CancellationToken::new();
    let (tx, _) = broadcast::channel::<SyncEvent>(CHANNEL_CAPACITY);
    let (transport_tx, mut transport_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let (edits_tx, mut edits_rx) = mpsc::channel::<ConfigPayload>(EDITS_CAPACITY);

    let auto_confirm = options.auto_confirm || config.safety.auto_confirm_sensitive;
    let mut controller = SyncController::new(
        ConnectionManager::new(Duration::from_millis(config.device.reconnect_interval_ms)),
        ConfigModel::new(),
        config.live.layout()?,
        config.device.schema_version,
        Box::new(AutoConfirm(auto_confirm)),
        tx.clone(),
    );

    let observer_handle = spawn_observer(&tx, &cancel);
    let watcher_handle = options
        .edits
        .as_ref()
        .map(|path| spawn_edits_watcher(edits_tx, &cancel, path));

    let url = config.device.url.clone();
    let mut one_shots = OneShots {
        reset_defaults: options.reset_defaults,
        factory_test: options.factory_test,
    };
    let mut reconnect: Option<(Instant, ReconnectTicket)> = None;
    let mut pending = PendingEdits::default();

    if let Some(attempt) = controller.start() {
        spawn_dial(&url, attempt, &transport_tx, &cancel);
    }

    info!("hmilink running, device: {url}");

    loop {
        let deadline = reconnect.map_or_else(Instant::now, |(at, _)| at);

        tokio::select! {
            () = cancel.cancelled() => break,
            () = async { tokio::signal::ctrl_c().await.ok(); } => {
                info!("received SIGINT, shutting down");
                break;
            }
            Some(event) = transport_rx.recv() => {
                if let Some(plan) = controller.handle_transport(event) {
                    reconnect = Some((Instant::now() + plan.delay, plan.ticket));
                }
                one_shots.fire(&mut controller);
                pending.resume(&mut controller);
            }
            () = tokio::time::sleep_until(deadline), if reconnect.is_some() => {
                if let Some((_, ticket)) = reconnect.take() {
                    if let Some(attempt) = controller.on_reconnect_due(ticket) {
                        spawn_dial(&url, attempt, &transport_tx, &cancel);
                    }
                }
            }
            Some(edited) = edits_rx.recv() => pending.submit(&mut controller, edited),
        }
    }

    info!("shutting down...");
    cancel.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = observer_handle.await;
        if let Some(handle) = watcher_handle {
            let _ = handle.await;
        }
    })
    .await;

    let stats = controller.router_stats();
    info!(
        "stopped ({} frames routed, {} unknown, {} malformed)",
        stats.routed, stats.unknown, stats.malformed
    );
    Ok(())
}

/// Commands requested on the command line, sent once the link is up.
struct OneShots {
    reset_defaults: bool,
    factory_test: bool,
}

impl OneShots {
    fn fire(&mut self, controller: &mut SyncController) {
        if !controller.connection().is_connected() {
            return;
        }
        if std::mem::take(&mut self.reset_defaults) {
            match controller.reset_defaults() {
                Ok(()) => info!("requested factory defaults"),
                Err(e) => warn!("reset defaults failed: {e}"),
            }
        }
        if std::mem::take(&mut self.factory_test) {
            match controller.factory_test() {
                Ok(()) => info!("requested factory test"),
                Err(e) => warn!("factory test failed: {e}"),
            }
        }
    }
}

/// Edits from the edits file that have not reached the device yet.
///
/// A payload is held while no configuration is loaded or when the link is
/// down at save time, and is staged again after the next snapshot.
#[derive(Debug, Default)]
struct PendingEdits {
    /// The payload and the snapshot count when it was held.
    held: Option<(ConfigPayload, u64)>,
}

impl PendingEdits {
    fn submit(&mut self, controller: &mut SyncController, edited: ConfigPayload) {
        if !controller.model().is_loaded() {
            info!("no configuration loaded yet, holding edits");
            self.hold(controller, edited);
            return;
        }
        if apply_edits(controller, &edited) {
            info!("device unreachable, holding edits until it resyncs");
            self.hold(controller, edited);
        } else {
            self.held = None;
        }
    }

    /// Re-stage held edits once a newer snapshot has loaded.
    fn resume(&mut self, controller: &mut SyncController) {
        let resync = matches!(&self.held, Some((_, seen)) if controller.snapshots_loaded() > *seen);
        if !resync {
            return;
        }
        if let Some((edited, _)) = self.held.take() {
            self.submit(controller, edited);
        }
    }

    fn hold(&mut self, controller: &SyncController, edited: ConfigPayload) {
        self.held = Some((edited, controller.snapshots_loaded()));
    }
}

/// Stage an edited payload and save it if anything changed.
///
/// Returns `true` if the save failed because the link is down.
fn apply_edits(controller: &mut SyncController, edited: &ConfigPayload) -> bool {
    match controller.stage(edited) {
        Ok(n) => debug!("staged {n} edit(s)"),
        Err(e) => {
            warn!("cannot stage edits: {e}");
            return false;
        }
    }

    if !controller.model().has_staged_changes() {
        info!("edits match the device configuration, nothing to save");
        return false;
    }

    match controller.save() {
        Ok(()) => false,
        Err(SyncError::NotConnected) => true,
        Err(SyncError::Invalid(errors)) => {
            warn!("save aborted: {} validation error(s)", errors.len());
            false
        }
        Err(e) => {
            warn!("save failed, edits kept: {e}");
            false
        }
    }
}

fn spawn_dial(
    url: &str,
    attempt: Attempt,
    events: &mpsc::UnboundedSender<TransportEvent>,
    cancel: &CancellationToken,
) {
    let url = url.to_string();
    let events = events.clone();
    let cancel = cancel.clone();
    tokio::spawn(ws::dial(url, attempt, events, cancel));
}

fn spawn_edits_watcher(
    tx: mpsc::Sender<ConfigPayload>,
    cancel: &CancellationToken,
    path: &std::path::Path,
) -> tokio::task::JoinHandle<()> {
    let watcher_cancel = cancel.clone();
    let watcher_path = path.to_path_buf();
    tokio::spawn(async move {
        if let Err(e) = watcher::watch_edits(watcher_path, tx, watcher_cancel).await {
            error!("edits watcher error: {e}");
        }
    })
}

/// Log every published event. Stands in for a rendering layer.
fn spawn_observer(
    tx: &broadcast::Sender<SyncEvent>,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = tx.subscribe();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("observer lagged, missed {n} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            log_event(&event);
        }
    })
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::ConfigReady(config) => info!(
            "configuration ready: {} buttons, {} leds, {} joysticks, {} bindings",
            config.buttons.len(),
            config.leds.len(),
            config.joysticks.as_ref().map_or(0, Vec::len),
            config.bindings.len(),
        ),
        SyncEvent::LiveState(state) => debug!(
            "live: buttons {} leds {} axis {:?} step {:?} handwheel {:?}",
            grid_summary(state.buttons.as_ref()),
            grid_summary(state.leds.as_ref()),
            state.scalars.axis,
            state.scalars.step,
            state.scalars.handwheel,
        ),
        SyncEvent::ConnectionChanged(true) => info!("device online"),
        SyncEvent::ConnectionChanged(false) => info!("device offline"),
        SyncEvent::SchemaMismatch { expected, found } => {
            warn!("rendering best-effort: schema {found:?}, expected {expected}");
        }
        SyncEvent::Saved => info!("configuration saved (device sends no acknowledgment)"),
    }
}

fn grid_summary(grid: Option<&Grid>) -> String {
    grid.map_or_else(
        || "-".to_string(),
        |g| format!("{}/{}", g.count_set(), g.rows() * g.cols()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::GridShape;
    use crate::codec::Layout;
    use crate::sync::LiveLayout;

    fn controller() -> (SyncController, broadcast::Receiver<SyncEvent>) {
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let controller = SyncController::new(
            ConnectionManager::new(Duration::from_millis(10)),
            ConfigModel::new(),
            LiveLayout {
                buttons: Some(GridShape::new(2, 2, Layout::PackedRows).unwrap()),
                leds: None,
            },
            1,
            Box::new(AutoConfirm(false)),
            tx,
        );
        (controller, rx)
    }

    #[test]
    fn one_shots_wait_for_the_link() {
        let (mut controller, _rx) = controller();
        let mut one_shots = OneShots {
            reset_defaults: true,
            factory_test: true,
        };

        one_shots.fire(&mut controller);
        assert!(one_shots.reset_defaults);
        assert!(one_shots.factory_test);

        let attempt = controller.start().unwrap();
        let (sink, mut out) = mpsc::unbounded_channel();
        controller.handle_transport(TransportEvent::Opened { attempt, sink });
        one_shots.fire(&mut controller);
        assert!(!one_shots.reset_defaults);
        assert!(!one_shots.factory_test);

        let frames: Vec<String> = std::iter::from_fn(|| out.try_recv().ok()).collect();
        assert!(frames.iter().any(|f| f.contains("resetDefaults")));
        assert!(frames.iter().any(|f| f.contains("factoryTest")));

        // Already fired: reconnecting does not repeat them.
        one_shots.fire(&mut controller);
        assert!(out.try_recv().is_err());
    }

    #[test]
    fn edits_before_snapshot_are_not_staged() {
        let (mut controller, _rx) = controller();
        apply_edits(&mut controller, &ConfigPayload::default());
        assert!(!controller.model().has_staged_changes());
    }

    const SNAPSHOT: &str = r#"{"type":"initialConfig","payload":{"schemaVersion":1,"buttons":[{"name":"A","is_toggle":false,"radio_group_id":0}]}}"#;

    fn open(
        controller: &mut SyncController,
        attempt: Attempt,
    ) -> mpsc::UnboundedReceiver<String> {
        let (sink, out) = mpsc::unbounded_channel();
        controller.handle_transport(TransportEvent::Opened { attempt, sink });
        out
    }

    fn receive(controller: &mut SyncController, attempt: Attempt, text: &str) {
        controller.handle_transport(TransportEvent::Message {
            attempt,
            text: text.to_string(),
        });
    }

    fn commands(out: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        std::iter::from_fn(|| out.try_recv().ok())
            .map(|f| serde_json::from_str(&f).unwrap())
            .collect()
    }

    fn renamed(name: &str) -> ConfigPayload {
        let mut payload: ConfigPayload = serde_json::from_str(
            r#"{"schemaVersion":1,"buttons":[{"name":"A","is_toggle":false,"radio_group_id":0}]}"#,
        )
        .unwrap();
        payload.buttons[0].name = name.to_string();
        payload
    }

    #[test]
    fn offline_edits_are_saved_after_resync() {
        let (mut controller, _rx) = controller();
        let mut pending = PendingEdits::default();

        let first = controller.start().unwrap();
        let mut out = open(&mut controller, first);
        receive(&mut controller, first, SNAPSHOT);
        commands(&mut out);

        let plan = controller
            .handle_transport(TransportEvent::Closed {
                attempt: first,
                reason: None,
            })
            .unwrap();
        pending.submit(&mut controller, renamed("Renamed offline"));
        assert!(pending.held.is_some());

        let second = controller.on_reconnect_due(plan.ticket).unwrap();
        let mut out = open(&mut controller, second);
        pending.resume(&mut controller);
        assert_eq!(
            commands(&mut out),
            vec![serde_json::json!({"command": "getInitialState"})]
        );

        receive(&mut controller, second, SNAPSHOT);
        pending.resume(&mut controller);
        let frames = commands(&mut out);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["command"], "saveConfig");
        assert_eq!(frames[0]["payload"]["buttons"][0]["name"], "Renamed offline");
        assert!(pending.held.is_none());
    }

    #[test]
    fn edits_before_first_snapshot_wait_for_it() {
        let (mut controller, _rx) = controller();
        let mut pending = PendingEdits::default();

        pending.submit(&mut controller, renamed("Early"));
        assert!(pending.held.is_some());

        let attempt = controller.start().unwrap();
        let mut out = open(&mut controller, attempt);
        pending.resume(&mut controller);
        assert!(pending.held.is_some());

        receive(&mut controller, attempt, SNAPSHOT);
        pending.resume(&mut controller);
        let frames = commands(&mut out);
        assert_eq!(frames.last().unwrap()["payload"]["buttons"][0]["name"], "Early");
        assert!(pending.held.is_none());
    }

    #[test]
    fn grid_summary_counts_set_cells() {
        let grid = Grid::from_cells(1, 3, [true, false, true]);
        assert_eq!(grid_summary(Some(&grid)), "2/3");
        assert_eq!(grid_summary(None), "-");
    }
}
