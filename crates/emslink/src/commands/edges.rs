//! Edge listing.

use std::sync::Arc;

use emslink_core::{Edge, Session};
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "")]
    selected: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Comment")]
    comment: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Online")]
    online: &'static str,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Since")]
    since: String,
}

fn to_row(edge: &Arc<Edge>, selected: Option<&str>) -> EdgeRow {
    EdgeRow {
        selected: if selected == Some(edge.id.as_str()) { "*" } else { "" },
        id: edge.id.clone(),
        comment: edge.comment.clone(),
        product: edge.product_type.clone(),
        version: edge.version.clone().unwrap_or_default(),
        online: if edge.is_online { "yes" } else { "no" },
        role: edge.role.to_string(),
        since: edge
            .first_setup_protocol
            .map(|d| d.to_string())
            .unwrap_or_default(),
    }
}

pub fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let edges = session.edges();
    let selected = session.selected_edge();
    let selected_id = selected.as_ref().map(|e| e.id.as_str());

    let out = output::render_list(
        global.output,
        edges.as_slice(),
        |e| to_row(e, selected_id),
        |e| e.id.clone(),
    );
    output::print_output(&out);
    Ok(())
}
