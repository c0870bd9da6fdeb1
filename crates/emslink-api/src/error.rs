use thiserror::Error;

/// Top-level error type for the `emslink-api` crate.
///
/// Covers the transport and framing failure modes. `emslink-core` maps
/// these into the session-level taxonomy consumers see.
#[derive(Debug, Error)]
pub enum Error {
    // ── Configuration ───────────────────────────────────────────────
    /// The endpoint can never work (bad scheme, no host, unparseable).
    /// Surfaced immediately and never retried.
    #[error("Invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket handshake or I/O failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// An open socket closed. `code` is the peer's close code, or 1005/1006
    /// when it sent none or the socket simply dropped.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The link's background task is gone; nothing can be sent anymore.
    #[error("Link closed")]
    LinkClosed,

    /// The outbound buffer is full.
    #[error("Outbound buffer full ({capacity} frames)")]
    OutboundFull { capacity: usize },

    // ── Data ────────────────────────────────────────────────────────
    /// A text frame was not a JSON-RPC envelope, with the raw body for debugging.
    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String, body: String },

    /// Payload (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if reconnecting could resolve this error.
    ///
    /// The connection task stops retrying on anything else.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } | Self::OutboundFull { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_endpoint_is_not_transient() {
        let err = Error::InvalidEndpoint {
            url: "http://x".into(),
            reason: "scheme".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn connect_failure_and_peer_close_are_transient() {
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        let closed = Error::WebSocketClosed {
            code: 1001,
            reason: "going away".into(),
        };
        assert!(closed.is_transient());
        assert_eq!(closed.to_string(), "WebSocket closed (code 1001): going away");
    }
}
