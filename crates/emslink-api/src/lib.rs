// emslink-api: WebSocket transport and JSON-RPC protocol types for
// energy-management backends (edge proxies and direct edge connections).

pub mod connector;
pub mod error;
pub mod jsonrpc;
pub mod protocol;
pub mod websocket;

pub use connector::{Connector, WebSocketConnector};
pub use error::Error;
pub use jsonrpc::{Frame, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
pub use websocket::{Connection, Link, LinkEvent, LinkState, ReconnectConfig};
