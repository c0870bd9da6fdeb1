// ── Domain model ──
//
// Canonical types consumers depend on. Wire shapes live in
// `emslink_api::protocol`; these are converted from them.

pub mod channel;
pub mod edge;
pub mod user;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use channel::{ChannelAddress, DateRange, InvalidChannelAddress};
pub use edge::{Edge, Role};
pub use user::User;

/// Latest known value per channel.
pub type ChannelValues = HashMap<ChannelAddress, Value>;

/// Shared immutable snapshot handed to consumers.
pub type ChannelSnapshot = Arc<ChannelValues>;
