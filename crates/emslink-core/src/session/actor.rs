// ── Session actor ──
//
// The single task that owns every piece of mutable session state. Each
// loop iteration handles exactly one input: a command from a `Session`
// handle, a link event, a request deadline, or a debounce timer.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;

use emslink_api::protocol::{
    AuthenticateResponse, AuthenticateWithPasswordParams, AuthenticateWithTokenParams,
    CurrentDataParams, EdgeRpcNotificationParams, EdgeRpcParams, EdgeRpcResult,
    EdgesStatusUpdateParams, GetEdgesParams, GetEdgesResponse, QueryHistoricTimeseriesEnergyParams,
    QueryHistoricTimeseriesEnergyResponse, SubscribeChannelsParams, method,
};
use emslink_api::{Connector, Frame, JsonRpcNotification, JsonRpcRequest, Link, LinkEvent};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queue::{QueuedRequest, RequestQueue};
use super::state::{ConnectionState, Phase, Transition};
use super::{Command, EdgeTarget, LoginInfo, Shared, recorded_range};
use crate::batcher::{Batch, BatchKey, Batcher};
use crate::config::{Credentials, SessionConfig};
use crate::correlator::RequestCorrelator;
use crate::error::CoreError;
use crate::model::{Edge, User};

/// What to complete when a correlated response arrives.
#[derive(Debug)]
enum Reply {
    /// A consumer awaiting `send_request`; edge requests are unwrapped first.
    Caller {
        tx: oneshot::Sender<Result<Value, CoreError>>,
        unwrap_edge: bool,
    },
    /// An authentication attempt. Token attempts may fall back to password.
    Login { via_token: bool },
    /// A subscription batch, tagged for staleness checks.
    Batch {
        key: BatchKey,
        generation: u64,
        epoch: u64,
    },
    /// One page of `getEdges`.
    EdgePage { page: u32 },
}

type LoginWaiter = oneshot::Sender<Result<LoginInfo, CoreError>>;

/// Label for login deadlines in timeout errors.
const LOGIN: &str = "login";

pub(crate) struct SessionActor {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,

    link: Option<Link>,
    phase: Phase,
    correlator: RequestCorrelator<Reply>,
    queue: RequestQueue,
    batcher: Batcher,

    credentials: Option<Credentials>,
    token: Option<SecretString>,
    /// Callers of `login`, each with its own deadline. The socket may not
    /// open for a long time, so these cannot rely on the auth request's.
    login_waiters: RequestCorrelator<LoginWaiter>,
}

impl SessionActor {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<Shared>,
        commands: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) -> Self {
        let queue = RequestQueue::new(config.queue_capacity);
        let batcher = Batcher::new(config.debounce_window, Arc::clone(&shared.live));
        Self {
            config,
            connector,
            shared,
            commands,
            cancel,
            link: None,
            phase: Phase::LoggedOut,
            correlator: RequestCorrelator::new(),
            queue,
            batcher,
            credentials: None,
            token: None,
            login_waiters: RequestCorrelator::new(),
        }
    }

    pub async fn run(mut self) {
        debug!(endpoint = %self.config.endpoint, "session actor started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = next_link_event(self.link.as_mut()) => self.handle_link_event(event),
                (id, entry) = self.correlator.next_expired() => {
                    warn!(%id, method = %entry.method, "request timed out");
                    let error = entry.timeout_error();
                    self.complete(id, entry.target, Err(error));
                }
                (_, entry) = self.login_waiters.next_expired() => {
                    warn!(phase = ?self.phase, "login timed out");
                    let error = entry.timeout_error();
                    let _ = entry.target.send(Err(error));
                }
                key = self.batcher.next_due() => {
                    if let Some(batch) = self.batcher.fire(key, self.phase.is_online()) {
                        self.send_batch(&batch);
                    }
                }
            }
        }

        self.teardown(&CoreError::SessionEnded);
        debug!("session actor stopped");
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { reply } => {
                let _ = reply.send(self.ensure_link());
            }
            Command::Login { credentials, reply } => self.login(credentials, reply),
            Command::Logout { reply } => {
                self.logout();
                let _ = reply.send(());
            }
            Command::Request {
                method,
                params,
                target,
                reply,
            } => self.request(&method, params, target, reply),
            Command::Subscribe {
                consumer,
                key,
                channels,
                reply,
            } => {
                let stream = self.batcher.subscribe(consumer, key, channels);
                let _ = reply.send(stream);
            }
            Command::Unsubscribe {
                consumer,
                key,
                channels,
            } => self.batcher.unsubscribe(&consumer, key, &channels),
            Command::Release { consumer } => self.batcher.release(&consumer),
            Command::SelectEdge { edge_id, reply } => {
                let _ = reply.send(self.select_edge(&edge_id));
            }
        }
    }

    fn ensure_link(&mut self) -> Result<(), CoreError> {
        if self.link.is_some() {
            return Ok(());
        }
        let link = self
            .connector
            .open(self.cancel.child_token())
            .inspect_err(|e| warn!(error = %e, "cannot open connection"))?;
        self.link = Some(link);
        self.transition(Transition::Connect);
        Ok(())
    }

    fn login(&mut self, credentials: Option<Credentials>, reply: LoginWaiter) {
        if let Some(credentials) = credentials {
            self.credentials = Some(credentials);
            self.token = None;
        }
        if self.credentials.is_none() {
            let _ = reply.send(Err(CoreError::AuthenticationFailed {
                message: "no credentials configured".into(),
            }));
            return;
        }

        self.login_waiters
            .register(LOGIN, reply, self.config.request_timeout);
        match self.phase {
            Phase::LoggedOut => {
                if let Err(e) = self.ensure_link() {
                    self.fail_login_waiters(&e);
                }
            }
            // Authenticates as soon as the socket opens.
            Phase::Connecting => {}
            Phase::WaitingForCredentials | Phase::Authenticating { .. } | Phase::Online => {
                self.authenticate();
            }
        }
    }

    fn logout(&mut self) {
        if self.phase == Phase::LoggedOut {
            return;
        }
        if let Some(link) = &self.link {
            match JsonRpcNotification::new(method::LOGOUT, Value::Null).to_text() {
                Ok(frame) => {
                    if let Err(e) = link.send(frame) {
                        debug!(error = %e, "logout notification not sent");
                    }
                }
                Err(e) => debug!(error = %e, "logout notification not built"),
            }
        }
        self.teardown(&CoreError::SessionEnded);
        info!("logged out");
    }

    fn request(
        &mut self,
        request_method: &str,
        params: Value,
        target: EdgeTarget,
        reply: oneshot::Sender<Result<Value, CoreError>>,
    ) {
        let offline = self.phase == Phase::LoggedOut
            || (!self.phase.is_online() && self.queue.capacity() == 0);
        if offline {
            let _ = reply.send(Err(CoreError::NotConnected));
            return;
        }

        let edge = match target {
            EdgeTarget::Backend => None,
            EdgeTarget::Selected => {
                let Some(edge_id) = self.shared.registry.selected_id() else {
                    let _ = reply.send(Err(CoreError::NoEdgeSelected));
                    return;
                };
                Some(edge_id)
            }
            EdgeTarget::Edge(edge_id) => {
                if self.shared.registry.get(&edge_id).is_none() {
                    let _ = reply.send(Err(CoreError::UnknownEdge { edge_id }));
                    return;
                }
                Some(edge_id)
            }
        };

        let target = Reply::Caller {
            tx: reply,
            unwrap_edge: edge.is_some(),
        };
        self.issue(request_method, params, target, edge.as_deref());
    }

    fn select_edge(&mut self, edge_id: &str) -> Result<(), CoreError> {
        if self.shared.registry.select(edge_id)? {
            info!(edge_id, "edge selected");
            self.batcher.clear_values();
            self.refire_batches();
        }
        Ok(())
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Send an authentication request: the cached token if there is one,
    /// otherwise the configured credentials.
    fn authenticate(&mut self) {
        let Some(credentials) = self.credentials.as_ref() else {
            return;
        };

        let (auth_method, params, via_token) = match (&self.token, credentials) {
            (Some(token), _) => (
                method::AUTHENTICATE_WITH_TOKEN,
                serde_json::to_value(AuthenticateWithTokenParams {
                    token: token.expose_secret(),
                }),
                true,
            ),
            (None, Credentials::Password { username, password }) => (
                method::AUTHENTICATE_WITH_PASSWORD,
                serde_json::to_value(AuthenticateWithPasswordParams {
                    username: username.as_deref(),
                    password: password.expose_secret(),
                }),
                false,
            ),
            (None, Credentials::Token(token)) => (
                method::AUTHENTICATE_WITH_TOKEN,
                serde_json::to_value(AuthenticateWithTokenParams {
                    token: token.expose_secret(),
                }),
                false,
            ),
        };

        let params = match params {
            Ok(params) => params,
            Err(e) => {
                self.fail_login_waiters(&CoreError::Internal(e.to_string()));
                return;
            }
        };

        let id = self.correlator.register(
            auth_method,
            Reply::Login { via_token },
            self.config.request_timeout,
        );
        let frame = match JsonRpcRequest::new(id, auth_method, params).to_text() {
            Ok(frame) => frame,
            Err(e) => {
                self.correlator.cancel(id);
                self.fail_login_waiters(&CoreError::from(e));
                return;
            }
        };
        if !self.transition(Transition::AuthStarted(id)) {
            self.correlator.cancel(id);
            return;
        }
        debug!(method = auth_method, "authenticating");
        self.transmit(id, frame);
    }

    fn on_auth_result(&mut self, id: Uuid, via_token: bool, outcome: Result<Value, CoreError>) {
        let is_current = matches!(self.phase, Phase::Authenticating { request } if request == id);
        if !is_current {
            debug!(%id, "result of superseded authentication ignored");
            return;
        }

        match outcome.and_then(parse::<AuthenticateResponse>) {
            Ok(response) => self.on_authenticated(id, response),
            Err(error) => {
                let has_password = matches!(self.credentials, Some(Credentials::Password { .. }));
                if via_token && has_password {
                    debug!(error = %error, "token rejected, retrying with password");
                    self.token = None;
                    self.authenticate();
                    return;
                }

                self.transition(Transition::AuthFailed(id));
                warn!(error = %error, "authentication failed");
                let error = match error {
                    CoreError::Protocol { message, .. } => {
                        // Rejected credentials are not retried on reconnect.
                        self.credentials = None;
                        self.token = None;
                        CoreError::AuthenticationFailed { message }
                    }
                    other => other,
                };
                self.fail_login_waiters(&error);
            }
        }
    }

    fn on_authenticated(&mut self, id: Uuid, response: AuthenticateResponse) {
        if !self.transition(Transition::AuthSucceeded(id)) {
            return;
        }
        if let Some(token) = response.token {
            self.token = Some(SecretString::from(token));
        }

        let user = User::from(response.user);
        info!(user = %user.id, edges = response.edges.len(), "authenticated");

        if self
            .shared
            .registry
            .replace_all(response.edges.into_iter().map(Edge::from))
        {
            self.batcher.clear_values();
        }
        self.auto_select();

        let info = LoginInfo {
            user,
            edges: self.shared.registry.snapshot(),
        };
        for (_, waiter) in self.login_waiters.drain() {
            let _ = waiter.target.send(Ok(info.clone()));
        }

        self.flush_queue();
        self.request_edge_page(0);
        self.refire_batches();
    }

    fn fail_login_waiters(&mut self, error: &CoreError) {
        for (_, waiter) in self.login_waiters.drain() {
            let _ = waiter.target.send(Err(error.clone()));
        }
    }

    // ── Link events ──────────────────────────────────────────────────

    fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Opened) => {
                if self.transition(Transition::LinkOpened) && self.credentials.is_some() {
                    self.authenticate();
                }
            }
            Some(LinkEvent::Frame(text)) => self.on_frame(&text),
            Some(LinkEvent::Closed { reason }) => self.on_link_closed(&reason),
            None => {
                warn!("connection gave up reconnecting");
                self.link = None;
                let error = CoreError::ConnectionFailed {
                    url: self.config.endpoint.to_string(),
                    reason: "reconnection abandoned".into(),
                };
                self.teardown(&error);
            }
        }
    }

    fn on_link_closed(&mut self, reason: &str) {
        if matches!(self.phase, Phase::LoggedOut | Phase::Connecting) {
            debug!(reason, "connection attempt failed");
            return;
        }

        warn!(reason, "connection lost, reconnecting");
        self.transition(Transition::LinkLost);

        let in_flight = self.correlator.drain_in_flight();
        debug!(rejected = in_flight.len(), queued = self.queue.len(), "in-flight requests rejected");
        for (id, entry) in in_flight {
            self.complete(id, entry.target, Err(CoreError::TransportClosed));
        }
        self.batcher.clear_values();
    }

    fn on_frame(&mut self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame {
            Frame::Response(response) => {
                if let Some((id, entry, outcome)) = self.correlator.resolve(response) {
                    self.complete(id, entry.target, outcome);
                }
            }
            Frame::Notification(notification) => self.on_notification(notification),
            Frame::Request(request) => {
                debug!(method = %request.method, "ignoring request from backend");
            }
        }
    }

    fn on_notification(&mut self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            method::EDGE_RPC => match parse::<EdgeRpcNotificationParams>(notification.params) {
                Ok(params) => {
                    let inner = params.payload;
                    if inner.method == method::CURRENT_DATA {
                        self.on_current_data(Some(&params.edge_id), inner.params);
                    } else {
                        debug!(edge_id = %params.edge_id, method = %inner.method, "unhandled edge notification");
                    }
                }
                Err(e) => debug!(error = %e, "malformed edgeRpc notification"),
            },
            method::EDGES_STATUS_UPDATE => match parse::<EdgesStatusUpdateParams>(notification.params) {
                Ok(params) => {
                    let changed = self.shared.registry.apply_status(&params.edges);
                    debug!(changed, "edge status updated");
                }
                Err(e) => debug!(error = %e, "malformed edgesStatusUpdate"),
            },
            // Direct edge connections push without the edgeRpc wrapper.
            method::CURRENT_DATA => self.on_current_data(None, notification.params),
            other => debug!(method = other, "unhandled notification"),
        }
    }

    fn on_current_data(&mut self, edge_id: Option<&str>, params: Value) {
        if let Some(edge_id) = edge_id {
            if self.shared.registry.selected_id().as_deref() != Some(edge_id) {
                debug!(edge_id, "currentData for unselected edge dropped");
                return;
            }
        }
        match parse::<CurrentDataParams>(params) {
            Ok(values) => {
                self.batcher.apply_push(values);
            }
            Err(e) => debug!(error = %e, "malformed currentData"),
        }
    }

    // ── Outgoing requests ────────────────────────────────────────────

    /// Register a request and send it (or queue it while not online).
    fn issue(&mut self, request_method: &str, params: Value, target: Reply, edge_id: Option<&str>) {
        let label = match edge_id {
            Some(_) => format!("{}/{request_method}", method::EDGE_RPC),
            None => request_method.to_owned(),
        };
        let id = self
            .correlator
            .register(label, target, self.config.request_timeout);

        match build_frame(id, request_method, params, edge_id) {
            Ok(frame) => self.submit(id, frame),
            Err(e) => {
                if let Some(entry) = self.correlator.cancel(id) {
                    self.complete(id, entry.target, Err(e));
                }
            }
        }
    }

    fn submit(&mut self, id: Uuid, frame: String) {
        if self.phase.is_online() {
            self.transmit(id, frame);
            return;
        }

        let Some(evicted) = self.queue.push(QueuedRequest { id, frame }) else {
            debug!(%id, queued = self.queue.len(), "request queued until online");
            return;
        };
        let error = if evicted.id == id {
            CoreError::NotConnected
        } else {
            warn!(evicted = %evicted.id, "request queue full, oldest request evicted");
            CoreError::Backpressure {
                capacity: self.queue.capacity(),
            }
        };
        if let Some(entry) = self.correlator.cancel(evicted.id) {
            self.complete(evicted.id, entry.target, Err(error));
        }
    }

    fn transmit(&mut self, id: Uuid, frame: String) {
        let sent = match &self.link {
            Some(link) => link.send(frame).map_err(CoreError::from),
            None => Err(CoreError::NotConnected),
        };
        match sent {
            Ok(()) => self.correlator.mark_sent(id),
            Err(error) => {
                warn!(%id, error = %error, "request could not be sent");
                if let Some(entry) = self.correlator.cancel(id) {
                    self.complete(id, entry.target, Err(error));
                }
            }
        }
    }

    /// Send everything queued while offline, in order. Entries whose
    /// deadline already passed are gone from the correlator and skipped.
    fn flush_queue(&mut self) {
        let queued = self.queue.take_all();
        if queued.is_empty() {
            return;
        }
        let mut sent = 0_usize;
        let mut expired = 0_usize;
        for request in queued {
            if self.correlator.contains(request.id) {
                self.transmit(request.id, request.frame);
                sent += 1;
            } else {
                expired += 1;
            }
        }
        debug!(sent, expired, pending = self.correlator.len(), "offline queue flushed");
    }

    fn request_edge_page(&mut self, page: u32) {
        let params = GetEdgesParams {
            page,
            limit: self.config.edge_page_size,
            search_query: None,
        };
        match serde_json::to_value(&params) {
            Ok(params) => self.issue(method::GET_EDGES, params, Reply::EdgePage { page }, None),
            Err(e) => warn!(error = %e, "cannot build getEdges request"),
        }
    }

    // ── Completion ───────────────────────────────────────────────────

    /// Deliver the outcome of a correlated request to whoever is waiting.
    fn complete(&mut self, id: Uuid, target: Reply, outcome: Result<Value, CoreError>) {
        match target {
            Reply::Caller { tx, unwrap_edge } => {
                let result = if unwrap_edge {
                    outcome.and_then(unwrap_edge_result)
                } else {
                    outcome
                };
                let _ = tx.send(result);
            }
            Reply::Login { via_token } => self.on_auth_result(id, via_token, outcome),
            Reply::Batch {
                key,
                generation,
                epoch,
            } => self.on_batch_result(key, generation, epoch, outcome),
            Reply::EdgePage { page } => self.on_edge_page(page, outcome),
        }
    }

    fn on_edge_page(&mut self, page: u32, outcome: Result<Value, CoreError>) {
        let response = match outcome.and_then(parse::<GetEdgesResponse>) {
            Ok(response) => response,
            Err(e) => {
                warn!(page, error = %e, "edge list refresh failed");
                return;
            }
        };

        let count = response.edges.len();
        self.shared
            .registry
            .upsert_many(response.edges.into_iter().map(Edge::from));
        debug!(page, count, total = self.shared.registry.len(), "edge page loaded");

        let page_size = self.config.edge_page_size;
        if page_size > 0 && u32::try_from(count).is_ok_and(|n| n >= page_size) {
            self.request_edge_page(page.saturating_add(1));
        }
        if self.auto_select() {
            self.refire_batches();
        }
    }

    fn on_batch_result(
        &mut self,
        key: BatchKey,
        generation: u64,
        epoch: u64,
        outcome: Result<Value, CoreError>,
    ) {
        if epoch != self.shared.registry.epoch() {
            debug!(%key, generation, "batch result for a previous edge discarded");
            return;
        }
        let result = match outcome.and_then(unwrap_edge_result) {
            Ok(result) => result,
            Err(e) => {
                warn!(%key, error = %e, "batch failed, keeping last values");
                return;
            }
        };

        let data = match (key, parse::<QueryHistoricTimeseriesEnergyResponse>(result)) {
            (_, Ok(response)) => response.data,
            // Live subscriptions usually answer with an empty result.
            (BatchKey::Live, Err(_)) => HashMap::new(),
            (BatchKey::Range(_), Err(e)) => {
                warn!(%key, error = %e, "malformed history response");
                return;
            }
        };
        self.batcher.apply(key, generation, data);
    }

    // ── Batches ──────────────────────────────────────────────────────

    fn refire_batches(&mut self) {
        if !self.phase.is_online() {
            return;
        }
        for batch in self.batcher.fire_all() {
            self.send_batch(&batch);
        }
    }

    fn send_batch(&mut self, batch: &Batch) {
        let Some(edge) = self.shared.registry.selected() else {
            debug!(key = %batch.key, "no edge selected, batch held");
            return;
        };

        let channels = batch.channel_strings();
        let (batch_method, params) = match batch.key {
            BatchKey::Live => (
                method::SUBSCRIBE_CHANNELS,
                serde_json::to_value(SubscribeChannelsParams {
                    count: batch.generation,
                    channels: &channels,
                }),
            ),
            BatchKey::Range(range) => {
                let range = recorded_range(range, &edge);
                (
                    method::QUERY_HISTORIC_TIMESERIES_ENERGY,
                    serde_json::to_value(QueryHistoricTimeseriesEnergyParams {
                        from_date: range.from(),
                        to_date: range.to(),
                        channels: &channels,
                    }),
                )
            }
        };
        let params = match params {
            Ok(params) => params,
            Err(e) => {
                warn!(key = %batch.key, error = %e, "cannot build batch request");
                return;
            }
        };

        debug!(
            key = %batch.key,
            generation = batch.generation,
            channels = channels.len(),
            edge_id = %edge.id,
            "sending batch"
        );
        let target = Reply::Batch {
            key: batch.key,
            generation: batch.generation,
            epoch: self.shared.registry.epoch(),
        };
        self.issue(batch_method, params, target, Some(&edge.id));
    }

    // ── Edges ────────────────────────────────────────────────────────

    /// Select the configured default edge, or the only known edge, if
    /// nothing is selected yet. Returns `true` if a selection was made.
    fn auto_select(&mut self) -> bool {
        let registry = &self.shared.registry;
        if registry.selected().is_some() {
            return false;
        }

        let candidate = self
            .config
            .default_edge
            .clone()
            .filter(|id| registry.get(id).is_some())
            .or_else(|| {
                let edges = registry.snapshot();
                match edges.as_slice() {
                    [only] => Some(only.id.clone()),
                    _ => None,
                }
            });
        let Some(edge_id) = candidate else {
            return false;
        };

        match registry.select(&edge_id) {
            Ok(true) => {
                info!(edge_id = %edge_id, "edge selected automatically");
                self.batcher.clear_values();
                true
            }
            Ok(false) | Err(_) => false,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Apply a state transition and publish the public state if it changed.
    fn transition(&mut self, transition: Transition) -> bool {
        let Some(next) = self.phase.next(transition) else {
            debug!(phase = ?self.phase, ?transition, "transition ignored");
            return false;
        };
        self.phase = next;

        let state = ConnectionState::from(next);
        let changed = self.shared.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(?state, "connection state changed");
        }
        true
    }

    /// Close the link and fail everything outstanding with `error`.
    ///
    /// Demand is kept: consumers still hold their subscriptions and they
    /// are reissued after the next login.
    fn teardown(&mut self, error: &CoreError) {
        if let Some(link) = self.link.take() {
            link.shutdown();
        }
        self.transition(Transition::Logout);

        for (id, entry) in self.correlator.drain() {
            self.complete(id, entry.target, Err(error.clone()));
        }
        self.queue.clear();
        self.fail_login_waiters(error);

        self.batcher.cancel_timers();
        self.batcher.clear_values();
        self.shared.registry.clear();
        self.credentials = None;
        self.token = None;
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn next_link_event(link: Option<&mut Link>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, CoreError> {
    serde_json::from_value(value).map_err(|e| CoreError::invalid_response(&e))
}

/// Extract the inner result of an `edgeRpc` response.
fn unwrap_edge_result(result: Value) -> Result<Value, CoreError> {
    let wrapped: EdgeRpcResult = parse(result)?;
    wrapped.payload.into_outcome().map_err(CoreError::from)
}

fn build_frame(
    id: Uuid,
    request_method: &str,
    params: Value,
    edge_id: Option<&str>,
) -> Result<String, CoreError> {
    let frame = match edge_id {
        None => JsonRpcRequest::new(id, request_method, params).to_text(),
        Some(edge_id) => {
            let inner = JsonRpcRequest::new(Uuid::new_v4(), request_method, params);
            JsonRpcRequest::with_params(
                id,
                method::EDGE_RPC,
                &EdgeRpcParams {
                    edge_id,
                    payload: &inner,
                },
            )
            .and_then(|outer| outer.to_text())
        }
    };
    frame.map_err(CoreError::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edge_frames_wrap_the_inner_request() {
        let id = Uuid::new_v4();
        let frame = build_frame(id, "getEdgeConfig", json!({}), Some("edge0")).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["id"], id.to_string());
        assert_eq!(value["method"], "edgeRpc");
        assert_eq!(value["params"]["edgeId"], "edge0");
        assert_eq!(value["params"]["payload"]["method"], "getEdgeConfig");
        assert_ne!(value["params"]["payload"]["id"], id.to_string());
    }

    #[test]
    fn backend_frames_are_not_wrapped() {
        let id = Uuid::new_v4();
        let frame = build_frame(id, "getEdges", json!({ "page": 0 }), None).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "getEdges");
        assert_eq!(value["params"]["page"], 0);
    }

    #[test]
    fn edge_results_are_unwrapped() {
        let ok = unwrap_edge_result(json!({ "payload": { "id": "x", "result": { "v": 1 } } }));
        assert_eq!(ok.unwrap(), json!({ "v": 1 }));

        let err = unwrap_edge_result(json!({
            "payload": { "id": "x", "error": { "code": 7, "message": "nope" } }
        }));
        assert_eq!(
            err.unwrap_err(),
            CoreError::Protocol {
                code: 7,
                message: "nope".into()
            }
        );

        assert!(matches!(
            unwrap_edge_result(json!({ "unexpected": true })),
            Err(CoreError::InvalidResponse { .. })
        ));
    }
}
