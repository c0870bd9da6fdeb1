// ── Session ──
//
// Full lifecycle of one backend connection: authentication, request
// correlation, the offline queue, batched channel subscriptions and the
// edge registry. All mutable state lives in a single actor task; the
// `Session` handle talks to it over a command channel.

mod actor;
mod queue;
mod state;

use std::collections::BTreeSet;
use std::sync::Arc;

use emslink_api::protocol::{
    QueryHistoricTimeseriesEnergyParams, QueryHistoricTimeseriesEnergyResponse, method,
};
use emslink_api::{Connector, WebSocketConnector};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::batcher::{BatchKey, ConsumerId};
use crate::config::{Credentials, SessionConfig};
use crate::edges::EdgeRegistry;
use crate::error::CoreError;
use crate::model::{ChannelAddress, ChannelSnapshot, DateRange, Edge, User};
use crate::store::ValueCache;
use crate::stream::ChannelStream;

pub use state::ConnectionState;

const COMMAND_CHANNEL_SIZE: usize = 256;

// ── Commands ─────────────────────────────────────────────────────────

/// Where a request is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EdgeTarget {
    /// The backend itself.
    Backend,
    /// Whatever edge is selected when the request is issued.
    Selected,
    Edge(String),
}

pub(crate) enum Command {
    Open {
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Login {
        credentials: Option<Credentials>,
        reply: oneshot::Sender<Result<LoginInfo, CoreError>>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    Request {
        method: String,
        params: Value,
        target: EdgeTarget,
        reply: oneshot::Sender<Result<Value, CoreError>>,
    },
    Subscribe {
        consumer: ConsumerId,
        key: BatchKey,
        channels: BTreeSet<ChannelAddress>,
        reply: oneshot::Sender<ChannelStream>,
    },
    Unsubscribe {
        consumer: ConsumerId,
        key: BatchKey,
        channels: BTreeSet<ChannelAddress>,
    },
    Release {
        consumer: ConsumerId,
    },
    SelectEdge {
        edge_id: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
}

/// State readable without going through the actor.
pub(crate) struct Shared {
    pub state: watch::Sender<ConnectionState>,
    pub registry: EdgeRegistry,
    pub live: Arc<ValueCache>,
}

/// What a successful login returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInfo {
    pub user: User,
    pub edges: Arc<Vec<Arc<Edge>>>,
}

// ── Session ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable. Every clone talks to the same background actor,
/// which is shut down when the last clone is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Session {
    /// Create a session that connects over WebSocket to `config.endpoint`.
    ///
    /// Does NOT connect; call [`connect()`](Self::connect) or
    /// [`login()`](Self::login). Must be called within a Tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        let connector = WebSocketConnector::new(config.endpoint.clone(), config.reconnect.clone());
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a session over a custom transport.
    pub fn with_connector(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            state,
            registry: EdgeRegistry::new(),
            live: Arc::new(ValueCache::new()),
        });
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let actor = actor::SessionActor::new(
            config.clone(),
            connector,
            Arc::clone(&shared),
            command_rx,
            cancel.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            inner: Arc::new(SessionInner {
                config,
                shared,
                commands,
                cancel,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the connection and, if the config carries credentials, log in.
    pub async fn connect(&self) -> Result<(), CoreError> {
        match self.inner.config.credentials.clone() {
            Some(credentials) => self.login(credentials).await.map(|_| ()),
            None => self.call(|reply| Command::Open { reply }).await?,
        }
    }

    /// Authenticate. Opens the connection first if needed.
    ///
    /// On success the credentials (and any token the backend issues) are
    /// kept for automatic re-authentication after a reconnect.
    pub async fn login(&self, credentials: Credentials) -> Result<LoginInfo, CoreError> {
        self.call(|reply| Command::Login {
            credentials: Some(credentials),
            reply,
        })
        .await?
    }

    /// Log out and close the connection.
    ///
    /// Every pending and queued request fails with
    /// [`CoreError::SessionEnded`]; caches and credentials are cleared.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.call(|reply| Command::Logout { reply }).await
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send a request to the backend and wait for its result.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value, CoreError> {
        self.request(EdgeTarget::Backend, method, params).await
    }

    /// Send a request to the selected edge (wrapped in `edgeRpc`).
    pub async fn send_edge_request(&self, method: &str, params: Value) -> Result<Value, CoreError> {
        self.request(EdgeTarget::Selected, method, params).await
    }

    /// Send a request to a specific edge (wrapped in `edgeRpc`).
    pub async fn send_edge_request_to(
        &self,
        edge_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, CoreError> {
        self.request(EdgeTarget::Edge(edge_id.to_owned()), method, params)
            .await
    }

    async fn request(&self, target: EdgeTarget, method: &str, params: Value) -> Result<Value, CoreError> {
        self.call(|reply| Command::Request {
            method: method.to_owned(),
            params,
            target,
            reply,
        })
        .await?
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register live-value demand for `channels` on behalf of `consumer`.
    pub async fn subscribe(
        &self,
        consumer: impl Into<ConsumerId>,
        channels: impl IntoIterator<Item = ChannelAddress>,
    ) -> Result<ChannelStream, CoreError> {
        self.subscribe_key(consumer.into(), BatchKey::Live, channels).await
    }

    /// Register demand for historical values over `range`.
    pub async fn subscribe_range(
        &self,
        consumer: impl Into<ConsumerId>,
        range: DateRange,
        channels: impl IntoIterator<Item = ChannelAddress>,
    ) -> Result<ChannelStream, CoreError> {
        self.subscribe_key(consumer.into(), BatchKey::Range(range), channels)
            .await
    }

    async fn subscribe_key(
        &self,
        consumer: ConsumerId,
        key: BatchKey,
        channels: impl IntoIterator<Item = ChannelAddress>,
    ) -> Result<ChannelStream, CoreError> {
        let channels = channels.into_iter().collect();
        self.call(|reply| Command::Subscribe {
            consumer,
            key,
            channels,
            reply,
        })
        .await
    }

    pub async fn unsubscribe(
        &self,
        consumer: impl Into<ConsumerId>,
        channels: impl IntoIterator<Item = ChannelAddress>,
    ) -> Result<(), CoreError> {
        self.send(Command::Unsubscribe {
            consumer: consumer.into(),
            key: BatchKey::Live,
            channels: channels.into_iter().collect(),
        })
        .await
    }

    pub async fn unsubscribe_range(
        &self,
        consumer: impl Into<ConsumerId>,
        range: DateRange,
        channels: impl IntoIterator<Item = ChannelAddress>,
    ) -> Result<(), CoreError> {
        self.send(Command::Unsubscribe {
            consumer: consumer.into(),
            key: BatchKey::Range(range),
            channels: channels.into_iter().collect(),
        })
        .await
    }

    /// Drop everything `consumer` subscribed to, live and historical.
    pub async fn release(&self, consumer: impl Into<ConsumerId>) -> Result<(), CoreError> {
        self.send(Command::Release {
            consumer: consumer.into(),
        })
        .await
    }

    /// Query historical values over `range` from the selected edge, once.
    ///
    /// Bypasses the subscription batcher: nothing is cached, and a backend
    /// error or malformed answer is returned instead of keeping the last
    /// values. Results come back in the order `channels` was given.
    pub async fn query_history(
        &self,
        range: DateRange,
        channels: impl IntoIterator<Item = ChannelAddress>,
    ) -> Result<Vec<(ChannelAddress, Option<Value>)>, CoreError> {
        let edge = self.selected_edge().ok_or(CoreError::NoEdgeSelected)?;
        let range = recorded_range(range, &edge);
        let channels: Vec<ChannelAddress> = channels.into_iter().collect();
        let names: Vec<String> = channels.iter().map(ToString::to_string).collect();

        let params = serde_json::to_value(QueryHistoricTimeseriesEnergyParams {
            from_date: range.from(),
            to_date: range.to(),
            channels: &names,
        })
        .map_err(|e| CoreError::Internal(e.to_string()))?;
        let result = self
            .send_edge_request_to(&edge.id, method::QUERY_HISTORIC_TIMESERIES_ENERGY, params)
            .await?;
        let mut response: QueryHistoricTimeseriesEnergyResponse =
            serde_json::from_value(result).map_err(|e| CoreError::invalid_response(&e))?;

        Ok(channels
            .into_iter()
            .zip(names)
            .map(|(address, name)| (address, response.data.remove(&name)))
            .collect())
    }

    // ── Edges ────────────────────────────────────────────────────────

    /// Make `edge_id` the target of edge requests and subscriptions.
    ///
    /// Clears every value cache and reissues all subscriptions against
    /// the new edge.
    pub async fn select_edge(&self, edge_id: &str) -> Result<(), CoreError> {
        self.call(|reply| Command::SelectEdge {
            edge_id: edge_id.to_owned(),
            reply,
        })
        .await?
    }

    pub fn selected_edge(&self) -> Option<Arc<Edge>> {
        self.inner.shared.registry.selected()
    }

    pub fn edges(&self) -> Arc<Vec<Arc<Edge>>> {
        self.inner.shared.registry.snapshot()
    }

    pub fn edge(&self, edge_id: &str) -> Option<Arc<Edge>> {
        self.inner.shared.registry.get(edge_id)
    }

    /// Subscribe to edge list changes.
    pub fn watch_edges(&self) -> watch::Receiver<Arc<Vec<Arc<Edge>>>> {
        self.inner.shared.registry.subscribe()
    }

    /// Subscribe to selection changes.
    pub fn watch_selected_edge(&self) -> watch::Receiver<Option<Arc<Edge>>> {
        self.inner.shared.registry.subscribe_selected()
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Latest live values of the selected edge.
    pub fn current_values(&self) -> ChannelSnapshot {
        self.inner.shared.live.snapshot()
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn send(&self, command: Command) -> Result<(), CoreError> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| session_gone())
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| session_gone())
    }
}

/// `range` with its start moved up to the day `edge` was set up; nothing
/// was recorded before that.
pub(crate) fn recorded_range(range: DateRange, edge: &Edge) -> DateRange {
    match edge.first_setup_protocol {
        Some(setup) => range.clamp_start(setup),
        None => range,
    }
}

fn session_gone() -> CoreError {
    CoreError::Internal("session task stopped".into())
}
