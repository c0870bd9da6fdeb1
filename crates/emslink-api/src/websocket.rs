//! WebSocket link with auto-reconnect.
//!
//! [`Connection::spawn`] validates the endpoint and starts a background
//! task that owns the socket. The returned [`Link`] is the only way to talk
//! to that task: outgoing text frames go in through [`Link::send`],
//! inbound frames and lifecycle changes come out of [`Link::recv`] in wire
//! order, and [`Link::state`] exposes the current [`LinkState`].
//!
//! The task reconnects with exponential backoff + jitter until cancelled,
//! until `max_retries` consecutive attempts have failed, or until an error
//! shows the endpoint itself is unusable. Frames still buffered from a
//! previous socket are discarded when a new one opens.
//!
//! # Example
//!
//! ```rust,ignore
//! use emslink_api::websocket::{Connection, LinkEvent, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let url = Connection::parse_endpoint("wss://portal.example.com/ws")?;
//! let mut link = Connection::spawn(url, ReconnectConfig::default(), CancellationToken::new())?;
//!
//! while let Some(event) = link.recv().await {
//!     if let LinkEvent::Frame(text) = event {
//!         println!("{text}");
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::error::Error;

// ── Channel capacities ───────────────────────────────────────────────

const OUTBOUND_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── Link state and events ────────────────────────────────────────────

/// Observable state of the physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed { reason: String },
}

/// Everything the connection task reports, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A socket is open and ready for frames.
    Opened,
    /// One inbound text frame, verbatim.
    Frame(String),
    /// The socket closed or a connection attempt failed. The task keeps
    /// reconnecting unless it was cancelled or ran out of retries.
    Closed { reason: String },
}

// ── Link ─────────────────────────────────────────────────────────────

/// Handle to a running connection task.
///
/// Dropping the link cancels the task.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::Sender<String>,
    events: mpsc::Receiver<LinkEvent>,
    state: watch::Receiver<LinkState>,
    cancel: CancellationToken,
}

impl Link {
    /// Assemble a link from raw channel halves.
    ///
    /// Used to plug in transports other than [`Connection`], such as an
    /// in-memory peer in tests. The other side owns the matching
    /// `outbound` receiver, `events` sender and `state` sender.
    pub fn from_parts(
        outbound: mpsc::Sender<String>,
        events: mpsc::Receiver<LinkEvent>,
        state: watch::Receiver<LinkState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            outbound,
            events,
            state,
            cancel,
        }
    }

    /// Queue a text frame for the current socket. Never blocks.
    pub fn send(&self, text: String) -> Result<(), Error> {
        self.outbound.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::OutboundFull {
                capacity: self.outbound.max_capacity(),
            },
            mpsc::error::TrySendError::Closed(_) => Error::LinkClosed,
        })
    }

    /// Next event, or `None` once the connection task has exited.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Subscribe to link state changes.
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == LinkState::Open
    }

    /// Signal the connection task to close the socket and exit.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Spawns connection tasks.
pub struct Connection;

impl Connection {
    /// Parse and validate an endpoint string.
    pub fn parse_endpoint(raw: &str) -> Result<Url, Error> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidEndpoint {
            url: raw.to_owned(),
            reason: e.to_string(),
        })?;
        validate_endpoint(&url)?;
        Ok(url)
    }

    /// Validate `url` and spawn the reconnection loop.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background and is reported through [`Link::recv`]. A malformed
    /// endpoint fails here and is never retried.
    pub fn spawn(
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Link, Error> {
        let uri = validate_endpoint(&url)?;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        let task = ConnectionTask {
            url,
            uri,
            outbound: outbound_rx,
            events: event_tx,
            state: state_tx,
            reconnect,
            jitter_seed: Uuid::new_v4().as_u64_pair().0,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Ok(Link::from_parts(outbound_tx, event_rx, state_rx, cancel))
    }
}

fn validate_endpoint(url: &Url) -> Result<tungstenite::http::Uri, Error> {
    let invalid = |reason: &str| Error::InvalidEndpoint {
        url: url.to_string(),
        reason: reason.to_owned(),
    };

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid("scheme must be ws or wss"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    url.as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| invalid(&e.to_string()))
}

// ── Background reconnection loop ─────────────────────────────────────

/// How a single socket's lifetime ended.
enum SocketExit {
    /// Cancelled by the owner.
    Cancelled,
    /// The `Link` is gone; nobody is listening anymore.
    Detached,
    /// Closed by the peer or by an I/O error.
    Closed(Error),
}

struct ConnectionTask {
    url: Url,
    uri: tungstenite::http::Uri,
    outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<LinkEvent>,
    state: watch::Sender<LinkState>,
    reconnect: ReconnectConfig,
    /// Per-connection randomness so clients that dropped together do not
    /// retry in lockstep.
    jitter_seed: u64,
    cancel: CancellationToken,
}

impl ConnectionTask {
    /// Main loop: connect → read/write → on close, backoff → reconnect.
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            self.state.send_replace(LinkState::Connecting);
            tracing::info!(url = %self.url, attempt, "Connecting to WebSocket");

            let opened = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = open_socket(&self.uri) => result,
            };

            let error = match opened {
                Ok(socket) => {
                    attempt = 0;
                    self.discard_stale_outbound();
                    tracing::info!(url = %self.url, "WebSocket connected");
                    self.state.send_replace(LinkState::Open);
                    if !self.emit(LinkEvent::Opened).await {
                        break;
                    }
                    match self.pump(socket).await {
                        SocketExit::Cancelled | SocketExit::Detached => break,
                        SocketExit::Closed(error) => error,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "WebSocket connection failed");
                    e
                }
            };

            let reason = error.to_string();
            self.state.send_replace(LinkState::Closed {
                reason: reason.clone(),
            });
            if !self.emit(LinkEvent::Closed { reason }).await {
                break;
            }

            if !should_retry(&error, attempt, &self.reconnect) {
                if error.is_transient() {
                    tracing::error!(
                        max_retries = ?self.reconnect.max_retries,
                        "WebSocket reconnection limit reached, giving up"
                    );
                    self.state.send_replace(LinkState::Closed {
                        reason: "reconnection limit reached".into(),
                    });
                } else {
                    tracing::error!(error = %error, "WebSocket endpoint unusable, giving up");
                }
                break;
            }

            let delay = calculate_backoff(attempt, self.jitter_seed, &self.reconnect);
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "Waiting before reconnect"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            attempt = attempt.saturating_add(1);
        }

        if self.cancel.is_cancelled() {
            self.state.send_replace(LinkState::Closed {
                reason: "shut down".into(),
            });
        }
        tracing::debug!(url = %self.url, "WebSocket loop exiting");
    }

    /// Read and write one socket until it drops.
    async fn pump(&mut self, socket: Socket) -> SocketExit {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    // Frames queued before shutdown (e.g. a logout) still go out.
                    while let Ok(text) = self.outbound.try_recv() {
                        if write.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    let _ = write.send(Message::Close(None)).await;
                    return SocketExit::Cancelled;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !self.emit(LinkEvent::Frame(text.as_str().to_owned())).await {
                            return SocketExit::Detached;
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong; it goes out with the next write
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let error = match frame {
                            Some(cf) => {
                                tracing::info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                                Error::WebSocketClosed {
                                    code: u16::from(cf.code),
                                    reason: cf.reason.as_str().to_owned(),
                                }
                            }
                            None => {
                                tracing::info!("WebSocket close frame received (no payload)");
                                closed(CLOSE_NO_STATUS, "closed by peer")
                            }
                        };
                        return SocketExit::Closed(error);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read failed");
                        return SocketExit::Closed(closed(CLOSE_ABNORMAL, &e.to_string()));
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return SocketExit::Closed(closed(CLOSE_ABNORMAL, "stream ended"));
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                },
                outgoing = self.outbound.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = write.send(Message::text(text)).await {
                            tracing::warn!(error = %e, "WebSocket write failed");
                            return SocketExit::Closed(closed(CLOSE_ABNORMAL, &e.to_string()));
                        }
                    }
                    None => return SocketExit::Detached,
                },
            }
        }
    }

    /// Drop frames queued for a socket that no longer exists.
    fn discard_stale_outbound(&mut self) {
        let mut dropped = 0_usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded frames queued before reconnect");
        }
    }

    /// Deliver an event; `false` means the link was dropped.
    async fn emit(&self, event: LinkEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

async fn open_socket(uri: &tungstenite::http::Uri) -> Result<Socket, Error> {
    let request = ClientRequestBuilder::new(uri.clone());
    let (socket, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| match e {
            tungstenite::Error::Url(reason) => Error::InvalidEndpoint {
                url: uri.to_string(),
                reason: reason.to_string(),
            },
            other => Error::WebSocketConnect(other.to_string()),
        })?;
    Ok(socket)
}

// ── Close codes (RFC 6455 §7.4.1) ────────────────────────────────────

/// The peer sent a close frame without a status code.
const CLOSE_NO_STATUS: u16 = 1005;
/// The socket dropped without a close frame.
const CLOSE_ABNORMAL: u16 = 1006;

fn closed(code: u16, reason: &str) -> Error {
    Error::WebSocketClosed {
        code,
        reason: reason.to_owned(),
    }
}

/// Whether the loop should try again after `error` ended attempt `attempt`.
fn should_retry(error: &Error, attempt: u32, config: &ReconnectConfig) -> bool {
    error.is_transient() && config.max_retries.is_none_or(|max| attempt < max)
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25%, drawn from `seed` and `attempt`. Each connection picks
/// its own seed, so clients that lost the backend at the same moment spread
/// their retries instead of reconnecting in lockstep.
pub(crate) fn calculate_backoff(attempt: u32, seed: u64, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * noise(seed, attempt);
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

/// Uniform value in `[-1, 1]` (splitmix64 finalizer over seed and attempt).
fn noise(seed: u64, attempt: u32) -> f64 {
    let mut z = seed.wrapping_add(u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let high = u32::try_from(z >> 32).unwrap_or(u32::MAX);
    f64::from(high) / f64::from(u32::MAX) * 2.0 - 1.0
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SEED: u64 = 0x5EED;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        // Doubling outgrows the jitter band from attempt 2 on.
        let d0 = calculate_backoff(0, SEED, &config);
        let d2 = calculate_backoff(2, SEED, &config);
        let d4 = calculate_backoff(4, SEED, &config);

        assert!(d2 > d0, "d2 ({d2:?}) should be greater than d0 ({d0:?})");
        assert!(d4 > d2, "d4 ({d4:?}) should be greater than d2 ({d2:?})");
    }

    #[test]
    fn backoff_stays_within_jitter_band_of_ceiling() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        for attempt in [10, 20, 1000] {
            let d = calculate_backoff(attempt, SEED, &config);
            assert!(d <= Duration::from_millis(12_500), "attempt {attempt}: {d:?}");
            assert!(d >= Duration::from_millis(7_500), "attempt {attempt}: {d:?}");
        }
    }

    #[test]
    fn first_attempt_stays_near_initial_delay() {
        let config = ReconnectConfig::default();
        for seed in 0..64 {
            let d = calculate_backoff(0, seed, &config);
            assert!(d >= Duration::from_millis(750), "seed {seed}: {d:?}");
            assert!(d <= Duration::from_millis(1_250), "seed {seed}: {d:?}");
        }
    }

    #[test]
    fn jitter_differs_between_connections() {
        let config = ReconnectConfig::default();
        let delays: std::collections::BTreeSet<Duration> =
            (0..16).map(|seed| calculate_backoff(3, seed, &config)).collect();
        assert!(delays.len() > 1, "every seed produced {delays:?}");

        // A given connection still backs off predictably.
        assert_eq!(calculate_backoff(3, SEED, &config), calculate_backoff(3, SEED, &config));
    }

    #[test]
    fn peer_close_is_retried_until_the_limit() {
        let config = ReconnectConfig {
            max_retries: Some(2),
            ..ReconnectConfig::default()
        };
        let error = closed(CLOSE_ABNORMAL, "stream ended");
        assert!(should_retry(&error, 0, &config));
        assert!(should_retry(&error, 1, &config));
        assert!(!should_retry(&error, 2, &config));
        assert!(should_retry(&error, 1_000, &ReconnectConfig::default()));
    }

    #[test]
    fn unusable_endpoint_is_never_retried() {
        let error = Error::InvalidEndpoint {
            url: "wss://portal.example.com".into(),
            reason: "TLS support not compiled in".into(),
        };
        assert!(!should_retry(&error, 0, &ReconnectConfig::default()));
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = Connection::parse_endpoint("https://portal.example.com/ws").unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let err = Connection::parse_endpoint("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[test]
    fn accepts_ws_and_wss() {
        assert!(Connection::parse_endpoint("ws://127.0.0.1:8085").is_ok());
        assert!(Connection::parse_endpoint("wss://portal.example.com/openems-backend-ui2").is_ok());
    }

    #[tokio::test]
    async fn link_send_reports_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (_state_tx, state_rx) = watch::channel(LinkState::Open);
        let link = Link::from_parts(tx, event_rx, state_rx, CancellationToken::new());

        link.send("a".into()).unwrap();
        assert!(matches!(
            link.send("b".into()),
            Err(Error::OutboundFull { capacity: 1 })
        ));

        drop(rx);
        assert!(matches!(link.send("c".into()), Err(Error::LinkClosed)));
    }

    #[tokio::test]
    async fn dropping_link_cancels_token() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (_state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let link = Link::from_parts(tx, event_rx, state_rx, cancel.clone());

        assert!(!link.is_open());
        drop(link);
        assert!(cancel.is_cancelled());
    }
}
