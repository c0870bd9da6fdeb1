//! Session layer between `emslink-api` and telemetry consumers.
//!
//! - **[`Session`]** owns one backend connection for its whole life:
//!   authentication (with transparent re-login after a reconnect), JSON-RPC
//!   request correlation with per-request deadlines, and a bounded queue for
//!   requests issued before the session is online.
//!
//! - **Subscriptions** are reference-counted per consumer and batched: every
//!   `subscribe` inside one debounce window collapses into a single
//!   `subscribeChannels` (live values) or `queryHistoricTimeseriesEnergy`
//!   (a [`DateRange`]) request. Results reach consumers through a
//!   [`ChannelStream`], one notification per batch.
//!
//! - **Edges** are the addressable devices behind the backend. The session
//!   keeps a registry fed by login, paged `getEdges` and status pushes;
//!   [`Session::select_edge`] picks the target of edge requests.
//!
//! All mutable state lives in a single actor task, so there is no locking
//! around the pending-request table or the demand maps.

pub mod batcher;
pub mod config;
mod correlator;
mod edges;
pub mod error;
pub mod model;
pub mod session;
mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use batcher::{BatchKey, ConsumerId};
pub use config::{Credentials, SessionConfig};
pub use error::CoreError;
pub use session::{ConnectionState, LoginInfo, Session};
pub use stream::{ChannelStream, ChannelWatchStream};

pub use model::{
    ChannelAddress, ChannelSnapshot, ChannelValues, DateRange, Edge, InvalidChannelAddress, Role,
    User,
};

// Transport types callers need to build a session over a custom link.
pub use emslink_api::{Connector, Link, LinkEvent, LinkState, ReconnectConfig};
