//! Clap derive structures for the `ewelink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ewelink -- discover and switch eWeLink outlets on the local network
#[derive(Debug, Parser)]
#[command(
    name = "ewelink",
    version,
    about = "Discover and switch eWeLink devices on the local network",
    long_about = "Enumerates devices from the eWeLink cloud directory and a local\n\
        known-devices table, then finds them on the LAN over mDNS and controls\n\
        them directly, with or without payload encryption.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "EWELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (overrides `defaults.output`)
    #[arg(long, short = 'o', env = "EWELINK_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Seconds to wait for devices to announce themselves on the LAN
    #[arg(long, short = 'w', global = true)]
    pub wait: Option<u64>,

    /// Skip the cloud directory and use known devices only
    #[arg(long, global = true)]
    pub no_cloud: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Device ids, one per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List known and discovered devices
    #[command(alias = "dev", alias = "ls")]
    Devices(DevicesArgs),

    /// Turn an outlet on or off
    Set(SetArgs),

    /// Print switch transitions until interrupted
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// List right away instead of waiting for LAN announcements
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Device id (e.g. 1000abcdef)
    pub device_id: String,

    /// Desired state
    pub state: PowerArg,

    /// Outlet index on multi-outlet devices
    #[arg(long, short = 'n', default_value = "0")]
    pub outlet: usize,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only report transitions for these device ids
    #[arg(long = "device", short = 'd')]
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}

impl PowerArg {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}
