//! Live channel values.

use emslink_core::{ChannelAddress, ConnectionState, Session};
use serde_json::{Map, Value};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

const CONSUMER: &str = "emslink-watch";

pub async fn handle(session: &Session, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let channels = util::parse_channels(&args.channels)?;
    util::require_edge(session)?;

    let mut stream = session.subscribe(CONSUMER, channels).await?;
    let mut state = session.connection_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current.is_pending_auth() {
                    tracing::warn!(state = ?current, "connection interrupted, values paused");
                } else if current == ConnectionState::Online {
                    tracing::info!("online");
                } else {
                    return Err(CliError::Disconnected {
                        reason: "session closed".into(),
                    });
                }
            }
            snapshot = stream.changed() => {
                if snapshot.is_none() {
                    break;
                }
                let values = stream.selected();
                let complete = values.iter().all(|(_, v)| v.is_some());
                print_values(global.output, values);
                if args.once && complete {
                    break;
                }
            }
        }
    }

    session.release(CONSUMER).await?;
    Ok(())
}

fn print_values(format: OutputFormat, values: Vec<(ChannelAddress, Option<Value>)>) {
    let rows = util::value_rows(values);
    let out = match format {
        // One line per update keeps the stream greppable.
        OutputFormat::Plain | OutputFormat::JsonCompact => {
            let line: Map<String, Value> = rows
                .into_iter()
                .map(|r| (r.channel, r.value.unwrap_or(Value::Null)))
                .collect();
            if matches!(format, OutputFormat::Plain) {
                line.iter()
                    .map(|(k, v)| format!("{k}={}", util::format_value(Some(v))))
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                Value::Object(line).to_string()
            }
        }
        OutputFormat::Table | OutputFormat::Json => {
            output::render_list(format, &rows, util::ValueRow::clone, |r| r.channel.clone())
        }
    };
    output::print_output(&out);
}
