//! Live transition log.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use owo_colors::OwoColorize;

use ewelink_core::{Discovery, StateCallback, Switch};

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output;

use super::Context;

const CALLBACK_NAME: &str = "ewelink-watch";

/// Devices registered by a later cloud resync are picked up on this cadence.
const ATTACH_INTERVAL: Duration = Duration::from_secs(5);

/// Prints one line per switch transition.
struct TransitionPrinter {
    color: bool,
}

#[async_trait]
impl StateCallback for TransitionPrinter {
    async fn on_state_change(&self, switch: &Switch, new_state: bool) {
        let Some(device) = switch.device() else {
            return;
        };
        let stamp = chrono::Local::now().format("%H:%M:%S");
        let stamp = if self.color {
            stamp.dimmed().to_string()
        } else {
            stamp.to_string()
        };
        output::print_output(&format!(
            "{stamp} {device} outlet {}: {}",
            switch.index(),
            output::paint_power(new_state, self.color)
        ));
    }
}

fn attach(discovery: &Discovery, filter: &HashSet<&str>, printer: &Arc<dyn StateCallback>) {
    for device in discovery.devices() {
        if !filter.is_empty() && !filter.contains(device.device_id()) {
            continue;
        }
        for switch in device.switches() {
            switch.add_state_callback(CALLBACK_NAME, Arc::clone(printer));
        }
    }
}

pub async fn handle(discovery: &Discovery, args: &WatchArgs, ctx: &Context) -> Result<(), CliError> {
    let filter: HashSet<&str> = args.devices.iter().map(String::as_str).collect();
    let printer: Arc<dyn StateCallback> = Arc::new(TransitionPrinter { color: ctx.color });

    let mut ticker = tokio::time::interval(ATTACH_INTERVAL);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = ticker.tick() => attach(discovery, &filter, &printer),
        }
    }

    for device in discovery.devices() {
        for switch in device.switches() {
            switch.remove_callback(CALLBACK_NAME);
        }
    }
    Ok(())
}
