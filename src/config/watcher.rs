use crate::error::SyncError;
use crate::schema::ConfigPayload;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Watch an edits file and forward each parsed payload to the sync loop.
///
/// The file holds a full configuration payload in the device's JSON shape.
/// A file that fails to parse is logged and skipped.
///
/// # Errors
/// Returns `SyncError::Watcher` if the file watcher cannot be initialized.
pub async fn watch_edits(
    edits_path: PathBuf,
    tx: mpsc::Sender<ConfigPayload>,
    cancel: CancellationToken,
) -> crate::error::Result<()> {
    let (notify_tx, mut notify_rx) = mpsc::channel(16);
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let watch_path = edits_path.clone();
    let watch_cancel = cancel.child_token();
    let thread_cancel = watch_cancel.clone();

    // The notify watcher must live on a blocking thread.
    let watcher_handle = tokio::task::spawn_blocking(move || {
        let debouncer = new_debouncer(
            Duration::from_millis(500),
            move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match events {
                    Ok(evts) => {
                        if evts.iter().any(|e| e.kind == DebouncedEventKind::Any) {
                            let _ = notify_tx.blocking_send(());
                        }
                    }
                    Err(e) => warn!("file watcher error: {e}"),
                }
            },
        );

        let mut debouncer = match debouncer {
            Ok(d) => d,
            Err(e) => {
                let _ = ready_tx.send(Err(SyncError::Watcher(e.to_string())));
                return;
            }
        };
        if let Err(e) = debouncer
            .watcher()
            .watch(&watch_path, notify::RecursiveMode::NonRecursive)
        {
            let _ = ready_tx.send(Err(SyncError::Watcher(e.to_string())));
            return;
        }
        let _ = ready_tx.send(Ok(()));

        // Keep the debouncer alive until shutdown.
        while !thread_cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(250));
        }
    });

    ready_rx
        .await
        .map_err(|_| SyncError::Watcher("watcher thread exited".to_string()))??;
    info!("watching edits file: {}", edits_path.display());

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("edits watcher shutting down");
                break;
            }
            Some(()) = notify_rx.recv() => {
                match crate::config::read_payload(&edits_path) {
                    Ok(payload) => {
                        info!("edits file changed, staging");
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("ignoring unreadable edits file: {e}"),
                }
            }
        }
    }

    watch_cancel.cancel();
    let _ = watcher_handle.await;
    Ok(())
}
