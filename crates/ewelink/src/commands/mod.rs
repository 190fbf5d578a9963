//! Command dispatch.

pub mod devices;
pub mod set;
pub mod watch;

use std::time::Duration;

use ewelink_core::Discovery;

use crate::cli::{Command, OutputFormat};
use crate::error::CliError;

/// Settings resolved from flags and the config file.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub output: OutputFormat,
    pub color: bool,
    pub wait: Duration,
}

/// Start discovery, run the command, then shut discovery down whatever the
/// outcome.
pub async fn dispatch(cmd: Command, discovery: &Discovery, ctx: &Context) -> Result<(), CliError> {
    discovery.start().await?;

    let result = match cmd {
        Command::Devices(args) => devices::handle(discovery, &args, ctx).await,
        Command::Set(args) => set::handle(discovery, &args, ctx).await,
        Command::Watch(args) => watch::handle(discovery, &args, ctx).await,
    };

    discovery.shutdown().await;
    result
}
