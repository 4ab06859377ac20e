pub mod ws;

use crate::error::{Result, SyncError};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound half of an open link. Sending never waits for the peer.
pub trait FrameSink {
    /// Queue a text frame for transmission.
    ///
    /// # Errors
    /// Returns `SyncError::NotConnected` if the link has gone away.
    fn send_frame(&self, frame: String) -> Result<()>;
}

impl FrameSink for mpsc::UnboundedSender<String> {
    fn send_frame(&self, frame: String) -> Result<()> {
        self.send(frame).map_err(|_| SyncError::NotConnected)
    }
}

/// Identifies one connection attempt; events from older attempts are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt(u64);

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one scheduled reconnect; only the pending ticket may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectTicket(u64);

/// A reconnect the caller must trigger after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPlan {
    pub ticket: ReconnectTicket,
    pub delay: Duration,
}

/// Outcome of a link going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    /// The link had been open (as opposed to a failed attempt).
    pub was_connected: bool,
    pub reconnect: ReconnectPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events raised by the transport task.
pub enum TransportEvent {
    Opened {
        attempt: Attempt,
        sink: mpsc::UnboundedSender<String>,
    },
    Message {
        attempt: Attempt,
        text: String,
    },
    /// Connection refused, closed by the peer, or failed. Sent once per attempt.
    Closed {
        attempt: Attempt,
        reason: Option<String>,
    },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened { attempt, .. } => write!(f, "Opened({attempt})"),
            Self::Message { attempt, text } => write!(f, "Message({attempt}, {} bytes)", text.len()),
            Self::Closed { attempt, reason } => write!(f, "Closed({attempt}, {reason:?})"),
        }
    }
}

/// Owns the link lifecycle: one connection at a time, fixed-interval retries,
/// forever.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Disconnected -(delay)-> Connecting
/// ```
///
/// The manager does no I/O itself. The caller dials when `begin_connect`
/// hands out an attempt, reports the outcome, and arms a timer for each
/// `ReconnectPlan`.
pub struct ConnectionManager {
    state: ConnectionState,
    attempt: u64,
    reconnect_interval: Duration,
    next_ticket: u64,
    pending_reconnect: Option<ReconnectTicket>,
    link: Option<Box<dyn FrameSink>>,
}

impl ConnectionManager {
    pub fn new(reconnect_interval: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            reconnect_interval,
            next_ticket: 0,
            pending_reconnect: None,
            link: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Whether a reconnect timer is armed and has not fired yet.
    pub fn reconnect_pending(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    /// Start a connection attempt.
    ///
    /// Returns `None` while an attempt is in flight, the link is up, or a
    /// reconnect delay is still running.
    pub fn begin_connect(&mut self) -> Option<Attempt> {
        if self.state != ConnectionState::Disconnected {
            debug!("connect requested while {:?}, ignoring", self.state);
            return None;
        }
        if self.pending_reconnect.is_some() {
            debug!("connect requested during reconnect delay, ignoring");
            return None;
        }

        self.attempt += 1;
        self.state = ConnectionState::Connecting;
        let attempt = Attempt(self.attempt);
        info!("connecting (attempt {attempt})");
        Some(attempt)
    }

    /// The transport opened. Returns `true` if the link was accepted.
    pub fn on_open(&mut self, attempt: Attempt, link: Box<dyn FrameSink>) -> bool {
        if !self.is_current(attempt) || self.state != ConnectionState::Connecting {
            warn!("ignoring open from stale attempt {attempt}");
            return false;
        }
        self.state = ConnectionState::Connected;
        self.link = Some(link);
        info!("connected (attempt {attempt})");
        true
    }

    /// The transport closed or failed.
    ///
    /// Returns the single reconnect to schedule, or `None` if this event is
    /// stale or the link was already down.
    pub fn on_closed(&mut self, attempt: Attempt) -> Option<Disconnect> {
        if !self.is_current(attempt) || self.state == ConnectionState::Disconnected {
            debug!("ignoring close from attempt {attempt}");
            return None;
        }

        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        self.link = None;

        self.next_ticket += 1;
        let ticket = ReconnectTicket(self.next_ticket);
        self.pending_reconnect = Some(ticket);

        Some(Disconnect {
            was_connected,
            reconnect: ReconnectPlan {
                ticket,
                delay: self.reconnect_interval,
            },
        })
    }

    /// A reconnect timer fired. Only the pending ticket starts an attempt.
    pub fn on_reconnect_due(&mut self, ticket: ReconnectTicket) -> Option<Attempt> {
        if self.pending_reconnect != Some(ticket) {
            debug!("ignoring stale reconnect timer");
            return None;
        }
        self.pending_reconnect = None;
        self.begin_connect()
    }

    /// Whether frames from `attempt` belong to the open link.
    pub fn is_open_attempt(&self, attempt: Attempt) -> bool {
        self.is_current(attempt) && self.is_connected()
    }

    /// Send a frame over the open link. Fire-and-forget.
    ///
    /// # Errors
    /// Returns `SyncError::NotConnected` unless the link is up.
    pub fn send(&self, frame: String) -> Result<()> {
        match (&self.link, self.state) {
            (Some(link), ConnectionState::Connected) => link.send_frame(frame),
            _ => Err(SyncError::NotConnected),
        }
    }

    fn is_current(&self, attempt: Attempt) -> bool {
        attempt.0 == self.attempt
    }
}
