use emslink_api::protocol::UserMetadata;
use serde::{Deserialize, Serialize};

use super::edge::Role;

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Role across all edges; per-edge roles live on [`super::Edge`].
    pub global_role: Role,
    pub language: Option<String>,
}

impl From<UserMetadata> for User {
    fn from(meta: UserMetadata) -> Self {
        Self {
            global_role: Role::from_wire(&meta.global_role),
            id: meta.id,
            name: meta.name,
            language: meta.language,
        }
    }
}
