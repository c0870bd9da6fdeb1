// ── Core error types ──
//
// User-facing errors from emslink-core. Consumers never see raw socket
// or framing failures; the `From<emslink_api::Error>` impl translates
// transport-layer errors into session-level variants.

use emslink_api::JsonRpcError;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    // ── Request lifecycle ────────────────────────────────────────────
    #[error("Request {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("Backend returned error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Request queue full ({capacity} pending); oldest request evicted")]
    Backpressure { capacity: usize },

    #[error("Session ended by logout")]
    SessionEnded,

    #[error("Transport closed before a response arrived")]
    TransportClosed,

    // ── Edges ────────────────────────────────────────────────────────
    #[error("Unknown edge: {edge_id}")]
    UnknownEdge { edge_id: String },

    #[error("No edge selected")]
    NoEdgeSelected,

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether a caller may safely issue the same request again.
    ///
    /// The session itself never retries individual requests.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::TransportClosed | Self::Backpressure { .. }
        )
    }

    pub(crate) fn invalid_response(err: &serde_json::Error) -> Self {
        Self::InvalidResponse {
            message: err.to_string(),
        }
    }
}

impl From<JsonRpcError> for CoreError {
    fn from(err: JsonRpcError) -> Self {
        Self::Protocol {
            code: err.code,
            message: err.message,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<emslink_api::Error> for CoreError {
    fn from(err: emslink_api::Error) -> Self {
        use emslink_api::Error as Api;

        match err {
            Api::InvalidEndpoint { url, reason } => Self::ConnectionFailed { url, reason },
            Api::WebSocketConnect(reason) => Self::ConnectionFailed {
                url: "<websocket>".into(),
                reason,
            },
            Api::WebSocketClosed { .. } | Api::LinkClosed => Self::TransportClosed,
            Api::OutboundFull { capacity } => Self::Backpressure { capacity },
            Api::InvalidFrame { message, .. } => Self::InvalidResponse { message },
            Api::Serialization(e) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(
            CoreError::Timeout {
                method: "getEdges".into(),
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(CoreError::TransportClosed.is_retryable());
        assert!(CoreError::Backpressure { capacity: 1 }.is_retryable());
        assert!(!CoreError::SessionEnded.is_retryable());
        assert!(!CoreError::NotConnected.is_retryable());
        assert!(
            !CoreError::Protocol {
                code: 1,
                message: "x".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn jsonrpc_error_maps_to_protocol() {
        let err: CoreError = JsonRpcError {
            code: 1003,
            message: "Access denied".into(),
            data: None,
        }
        .into();
        assert_eq!(
            err,
            CoreError::Protocol {
                code: 1003,
                message: "Access denied".into()
            }
        );
    }

    #[test]
    fn invalid_endpoint_maps_to_connection_failed() {
        let err: CoreError = emslink_api::Error::InvalidEndpoint {
            url: "http://x".into(),
            reason: "scheme must be ws or wss".into(),
        }
        .into();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    }
}
