// ── Edge domain types ──

use chrono::{DateTime, NaiveDate};
use emslink_api::protocol::{EdgeMetadata, EdgeStatus};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Capability level of the logged-in user on an edge.
///
/// Ordered from least to most privileged, so `>=` compares capability.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[default]
    Guest,
    Owner,
    Installer,
    Admin,
}

impl Role {
    /// Parse a role as the backend spells it. Unknown roles map to
    /// [`Role::Guest`] so an unexpected value never grants capability.
    pub fn from_wire(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| {
            tracing::debug!(role = raw, "unknown role, treating as guest");
            Self::Guest
        })
    }

    pub fn is_at_least(self, required: Role) -> bool {
        self >= required
    }
}

/// A remote energy-management device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub comment: String,
    pub product_type: String,
    pub version: Option<String>,
    pub is_online: bool,
    /// Day the edge was first set up; no history exists before it.
    pub first_setup_protocol: Option<NaiveDate>,
    pub role: Role,
}

impl Edge {
    /// Copy with the fields a status push carries applied.
    #[must_use]
    pub fn with_status(&self, status: &EdgeStatus) -> Self {
        let mut updated = self.clone();
        if let Some(online) = status.is_online {
            updated.is_online = online;
        }
        if let Some(role) = &status.role {
            updated.role = Role::from_wire(role);
        }
        updated
    }
}

impl From<EdgeMetadata> for Edge {
    fn from(meta: EdgeMetadata) -> Self {
        Self {
            first_setup_protocol: meta.first_setup_protocol.as_deref().and_then(parse_setup_date),
            role: Role::from_wire(&meta.role),
            id: meta.id,
            comment: meta.comment,
            product_type: meta.product_type,
            version: meta.version,
            is_online: meta.is_online,
        }
    }
}

/// Accepts an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
fn parse_setup_date(raw: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| d.parse().ok()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn metadata(role: &str) -> EdgeMetadata {
        EdgeMetadata {
            id: "edge0".into(),
            comment: "Home".into(),
            product_type: "home".into(),
            version: Some("2024.1.0".into()),
            role: role.into(),
            is_online: true,
            first_setup_protocol: Some("2023-05-01T10:00:00+02:00".into()),
        }
    }

    #[test]
    fn roles_are_ordered_by_capability() {
        let roles: Vec<Role> = Role::iter().collect();
        assert_eq!(roles, vec![Role::Guest, Role::Owner, Role::Installer, Role::Admin]);

        assert!(Role::Admin.is_at_least(Role::Installer));
        assert!(Role::Owner.is_at_least(Role::Owner));
        assert!(!Role::Guest.is_at_least(Role::Owner));
    }

    #[test]
    fn role_parsing_is_lenient() {
        assert_eq!(Role::from_wire("installer"), Role::Installer);
        assert_eq!(Role::from_wire("ADMIN"), Role::Admin);
        assert_eq!(Role::from_wire("superuser"), Role::Guest);
        assert_eq!(Role::Owner.to_string(), "owner");
    }

    #[test]
    fn edge_from_metadata() {
        let edge = Edge::from(metadata("owner"));
        assert_eq!(edge.role, Role::Owner);
        assert_eq!(edge.first_setup_protocol, NaiveDate::from_ymd_opt(2023, 5, 1));
    }

    #[test]
    fn setup_date_accepts_plain_dates() {
        assert_eq!(parse_setup_date("2022-12-24"), NaiveDate::from_ymd_opt(2022, 12, 24));
        assert_eq!(parse_setup_date("garbage"), None);
    }

    #[test]
    fn status_updates_only_touch_online_and_role() {
        let edge = Edge::from(metadata("guest"));
        let updated = edge.with_status(&EdgeStatus {
            id: "edge0".into(),
            is_online: Some(false),
            role: Some("admin".into()),
        });
        assert!(!updated.is_online);
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.comment, edge.comment);
        assert_eq!(updated.first_setup_protocol, edge.first_setup_protocol);

        let untouched = edge.with_status(&EdgeStatus {
            id: "edge0".into(),
            is_online: None,
            role: None,
        });
        assert_eq!(untouched, edge);
    }
}
