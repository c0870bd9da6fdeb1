//! Energy history over a date range.

use emslink_core::{DateRange, Session};

use crate::cli::{GlobalOpts, HistoryArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(session: &Session, args: HistoryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let channels = util::parse_channels(&args.channels)?;
    let range = DateRange::new(args.from, args.to).ok_or_else(|| CliError::Validation {
        field: "range".into(),
        reason: format!("--to ({}) is before --from ({})", args.to, args.from),
    })?;
    util::require_edge(session)?;

    let values = session.query_history(range, channels).await?;

    let rows = util::value_rows(values);
    let out = output::render_list(
        global.output,
        &rows,
        util::ValueRow::clone,
        |r| format!("{}\t{}", r.channel, r.display),
    );
    output::print_output(&out);
    Ok(())
}
