//! Shared helpers for command handlers.

use emslink_core::{ChannelAddress, Session};
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use crate::error::CliError;

/// Parse `component/channel` arguments.
pub fn parse_channels(raw: &[String]) -> Result<Vec<ChannelAddress>, CliError> {
    raw.iter()
        .map(|s| {
            s.parse().map_err(|e: emslink_core::InvalidChannelAddress| CliError::Validation {
                field: "channel".into(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Fail early when there is no edge to talk to.
pub fn require_edge(session: &Session) -> Result<(), CliError> {
    match session.selected_edge() {
        Some(_) => Ok(()),
        None => Err(CliError::NoEdgeSelected),
    }
}

/// One channel and its value, for tables and JSON alike.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ValueRow {
    #[tabled(rename = "Channel")]
    pub channel: String,
    #[tabled(rename = "Value")]
    #[serde(skip)]
    pub display: String,
    #[tabled(skip)]
    pub value: Option<Value>,
}

pub fn value_rows(values: Vec<(ChannelAddress, Option<Value>)>) -> Vec<ValueRow> {
    values
        .into_iter()
        .map(|(channel, value)| ValueRow {
            channel: channel.to_string(),
            display: format_value(value.as_ref()),
            value,
        })
        .collect()
}

pub fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".into(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_arguments_are_validated() {
        let ok = parse_channels(&["_sum/GridActivePower".into(), "ess0/Soc".into()]).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].component_id(), "ess0");

        let err = parse_channels(&["GridActivePower".into()]).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(format_value(None), "-");
        assert_eq!(format_value(Some(&Value::Null)), "-");
        assert_eq!(format_value(Some(&json!(1200))), "1200");
        assert_eq!(format_value(Some(&json!("on"))), "on");
    }
}
