//! Clap derive structures for the `emslink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// emslink -- telemetry client for energy-management edges
#[derive(Debug, Parser)]
#[command(
    name = "emslink",
    version,
    about = "Watch energy-management edges from the command line",
    long_about = "Connects to an energy-management backend over WebSocket,\n\
        lists the edges you can access, streams live channel values and\n\
        queries energy history.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "EMSLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend WebSocket URL (overrides profile)
    #[arg(long, short = 'e', env = "EMSLINK_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Login name (overrides profile)
    #[arg(long, short = 'u', env = "EMSLINK_USERNAME", global = true)]
    pub username: Option<String>,

    /// Edge to select after login (overrides profile)
    #[arg(long, env = "EMSLINK_EDGE", global = true)]
    pub edge: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EMSLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Request timeout in seconds
    #[arg(long, env = "EMSLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the edges this account can access
    #[command(alias = "e")]
    Edges,

    /// Stream live channel values of the selected edge
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Query energy totals over a date range
    #[command(alias = "hist")]
    History(HistoryArgs),

    /// Send a raw JSON-RPC request
    #[command(alias = "rpc")]
    Request(RequestArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Channel addresses (`component/channel`, e.g. `_sum/GridActivePower`)
    #[arg(required = true)]
    pub channels: Vec<String>,

    /// Print the first set of values and exit
    #[arg(long)]
    pub once: bool,
}

// ── History ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// First day (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub from: NaiveDate,

    /// Last day (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub to: NaiveDate,

    /// Channel addresses (`component/channel`)
    #[arg(required = true)]
    pub channels: Vec<String>,
}

// ── Request ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// JSON-RPC method name
    pub method: String,

    /// Params as a JSON object
    #[arg(default_value = "{}")]
    pub params: String,

    /// Send to the selected edge (wrapped in edgeRpc) instead of the backend
    #[arg(long, short = 'E')]
    pub to_edge: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration (passwords redacted)
    Show,

    /// Add or replace a profile
    Set(ConfigSetArgs),

    /// Store a profile's password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    /// Profile name. Values come from the global `--endpoint`,
    /// `--username` and `--edge` flags.
    pub name: String,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}
