use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::websocket::{Connection, Link, ReconnectConfig};

/// Opens links to a backend.
///
/// The session layer asks its connector for a fresh [`Link`] every time it
/// needs one (first connect, or login after logout). Swapping the
/// implementation lets embedders run the session over another transport.
pub trait Connector: Send + Sync {
    fn open(&self, cancel: CancellationToken) -> Result<Link, Error>;
}

/// Production connector: a reconnecting WebSocket to one endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    reconnect: ReconnectConfig,
}

impl WebSocketConnector {
    pub fn new(url: Url, reconnect: ReconnectConfig) -> Self {
        Self { url, reconnect }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, cancel: CancellationToken) -> Result<Link, Error> {
        Connection::spawn(self.url.clone(), self.reconnect.clone(), cancel)
    }
}
