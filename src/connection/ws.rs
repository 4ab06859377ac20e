use super::{Attempt, TransportEvent};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dial the device and pump frames until the link drops.
///
/// Emits `Opened` once the handshake completes, one `Message` per inbound
/// text frame, and exactly one `Closed` when the attempt ends for any reason.
/// There is no application-level keepalive: a peer that stops talking without
/// closing the socket is not detected.
pub async fn dial(
    url: String,
    attempt: Attempt,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    let reason = pump(&url, attempt, &events, &cancel).await;
    let _ = events.send(TransportEvent::Closed { attempt, reason });
}

async fn pump(
    url: &str,
    attempt: Attempt,
    events: &mpsc::UnboundedSender<TransportEvent>,
    cancel: &CancellationToken,
) -> Option<String> {
    let stream = tokio::select! {
        () = cancel.cancelled() => return Some("cancelled".to_string()),
        result = tokio_tungstenite::connect_async(url) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("connect to {url} failed: {e}");
                return Some(e.to_string());
            }
        },
    };

    let (mut write, mut read) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    if events
        .send(TransportEvent::Opened {
            attempt,
            sink: out_tx,
        })
        .is_err()
    {
        return None;
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return None;
            }
            Some(frame) = out_rx.recv() => {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!("send failed: {e}");
                    return Some(e.to_string());
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message { attempt, text });
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        let _ = events.send(TransportEvent::Message { attempt, text });
                    }
                    Err(_) => warn!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("device closed the connection");
                    return frame.map(|f| f.reason.to_string());
                }
                Some(Ok(_)) => {
                    debug!("control frame");
                }
                Some(Err(e)) => {
                    warn!("connection error: {e}");
                    return Some(e.to_string());
                }
                None => return Some("stream ended".to_string()),
            },
        }
    }
}
