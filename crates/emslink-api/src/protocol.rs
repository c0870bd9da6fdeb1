//! Typed params and results for the backend's JSON-RPC methods.
//!
//! Field names follow the wire (camelCase). Requests that target a single
//! edge are wrapped in an `edgeRpc` envelope; see [`EdgeRpcParams`].

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest};

/// Method names.
pub mod method {
    pub const AUTHENTICATE_WITH_PASSWORD: &str = "authenticateWithPassword";
    pub const AUTHENTICATE_WITH_TOKEN: &str = "authenticateWithToken";
    pub const LOGOUT: &str = "logout";
    pub const GET_EDGES: &str = "getEdges";
    pub const EDGE_RPC: &str = "edgeRpc";
    pub const SUBSCRIBE_CHANNELS: &str = "subscribeChannels";
    pub const QUERY_HISTORIC_TIMESERIES_ENERGY: &str = "queryHistoricTimeseriesEnergy";
    pub const CURRENT_DATA: &str = "currentData";
    pub const EDGES_STATUS_UPDATE: &str = "edgesStatusUpdate";
}

// ── Authentication ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AuthenticateWithPasswordParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AuthenticateWithTokenParams<'a> {
    pub token: &'a str,
}

/// Result of both authentication methods.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateResponse {
    /// Session token for later `authenticateWithToken` calls. Some
    /// backends (direct edge connections) never issue one.
    #[serde(default)]
    pub token: Option<String>,
    pub user: UserMetadata,
    #[serde(default)]
    pub edges: Vec<EdgeMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    pub id: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub global_role: String,
    #[serde(default)]
    pub language: Option<String>,
}

// ── Edges ────────────────────────────────────────────────────────────

/// Metadata for one edge as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMetadata {
    pub id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, rename = "producttype", alias = "productType")]
    pub product_type: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, alias = "online")]
    pub is_online: bool,
    /// ISO-8601 timestamp of the edge's first setup, if known.
    #[serde(default)]
    pub first_setup_protocol: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEdgesParams<'a> {
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct GetEdgesResponse {
    #[serde(default)]
    pub edges: Vec<EdgeMetadata>,
}

/// Params of the `edgesStatusUpdate` push.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgesStatusUpdateParams {
    #[serde(default)]
    pub edges: Vec<EdgeStatus>,
}

/// Partial edge update; absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStatus {
    pub id: String,
    #[serde(default, alias = "online")]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub role: Option<String>,
}

// ── Edge RPC ─────────────────────────────────────────────────────────

/// Params of an `edgeRpc` request: the inner request addressed to one edge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRpcParams<'a> {
    pub edge_id: &'a str,
    pub payload: &'a JsonRpcRequest,
}

/// Result of an `edgeRpc` request: the inner response envelope.
#[derive(Debug, Deserialize)]
pub struct EdgeRpcResult {
    pub payload: EdgeRpcPayload,
}

#[derive(Debug, Deserialize)]
pub struct EdgeRpcPayload {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl EdgeRpcPayload {
    /// Collapse the inner envelope; an `error` member wins over `result`.
    pub fn into_outcome(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Params of an `edgeRpc` push: a notification originating at one edge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRpcNotificationParams {
    pub edge_id: String,
    pub payload: JsonRpcNotification,
}

// ── Channel data ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SubscribeChannelsParams<'a> {
    /// Monotonic counter; the edge ignores subscriptions older than the
    /// latest one it has seen.
    pub count: u64,
    pub channels: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryHistoricTimeseriesEnergyParams<'a> {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub channels: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct QueryHistoricTimeseriesEnergyResponse {
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

/// Params of the `currentData` push: channel address to latest value.
pub type CurrentDataParams = HashMap<String, Value>;

fn default_role() -> String {
    "guest".into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn password_params_omit_missing_username() {
        let params = AuthenticateWithPasswordParams {
            username: None,
            password: "user",
        };
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({ "password": "user" }));
    }

    #[test]
    fn edge_metadata_reads_wire_names() {
        let edge: EdgeMetadata = serde_json::from_value(json!({
            "id": "edge0",
            "comment": "Basement",
            "producttype": "home",
            "version": "2024.1.0",
            "role": "owner",
            "isOnline": true,
            "firstSetupProtocol": "2023-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(edge.id, "edge0");
        assert_eq!(edge.product_type, "home");
        assert_eq!(edge.role, "owner");
        assert!(edge.is_online);
        assert_eq!(edge.first_setup_protocol.as_deref(), Some("2023-05-01T10:00:00Z"));
    }

    #[test]
    fn edge_metadata_defaults_to_guest_offline() {
        let edge: EdgeMetadata = serde_json::from_value(json!({ "id": "edge1" })).unwrap();
        assert_eq!(edge.role, "guest");
        assert!(!edge.is_online);
        assert!(edge.first_setup_protocol.is_none());
    }

    #[test]
    fn edge_rpc_params_wrap_inner_request() {
        let inner_id = Uuid::new_v4();
        let inner = JsonRpcRequest::new(inner_id, method::SUBSCRIBE_CHANNELS, json!({ "count": 1 }));
        let params = EdgeRpcParams {
            edge_id: "edge0",
            payload: &inner,
        };

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["edgeId"], "edge0");
        assert_eq!(value["payload"]["id"], inner_id.to_string());
        assert_eq!(value["payload"]["method"], "subscribeChannels");
    }

    #[test]
    fn edge_rpc_result_unwraps_error_payload() {
        let result: EdgeRpcResult = serde_json::from_value(json!({
            "payload": { "jsonrpc": "2.0", "id": "x", "error": { "code": -1, "message": "no" } }
        }))
        .unwrap();
        let err = result.payload.into_outcome().unwrap_err();
        assert_eq!(err.code, -1);
    }

    #[test]
    fn historic_query_serializes_dates() {
        let channels = vec!["_sum/GridActivePower".to_string()];
        let params = QueryHistoricTimeseriesEnergyParams {
            from_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            channels: &channels,
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "fromDate": "2024-01-01",
                "toDate": "2024-01-31",
                "channels": ["_sum/GridActivePower"]
            })
        );
    }

    #[test]
    fn status_update_fields_are_optional() {
        let update: EdgesStatusUpdateParams = serde_json::from_value(json!({
            "edges": [{ "id": "edge0", "isOnline": false }, { "id": "edge1", "role": "admin" }]
        }))
        .unwrap();
        assert_eq!(update.edges[0].is_online, Some(false));
        assert_eq!(update.edges[0].role, None);
        assert_eq!(update.edges[1].role.as_deref(), Some("admin"));
    }
}
