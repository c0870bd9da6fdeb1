//! Raw JSON-RPC requests.

use emslink_core::Session;
use serde_json::Value;

use crate::cli::{GlobalOpts, RequestArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(session: &Session, args: RequestArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let params: Value = serde_json::from_str(&args.params)?;
    if !params.is_object() {
        return Err(CliError::Validation {
            field: "params".into(),
            reason: "expected a JSON object".into(),
        });
    }

    let result = if args.to_edge {
        util::require_edge(session)?;
        session.send_edge_request(&args.method, params).await?
    } else {
        session.send_request(&args.method, params).await?
    };

    output::print_output(&output::render_value(global.output, &result));
    Ok(())
}
