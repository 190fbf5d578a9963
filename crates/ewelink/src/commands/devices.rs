//! Device listing.

use tabled::Tabled;

use ewelink_core::{DeviceSnapshot, Discovery};

use crate::cli::DevicesArgs;
use crate::error::CliError;
use crate::output;

use super::Context;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Outlets")]
    outlets: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Encrypted")]
    encrypted: String,
}

impl DeviceRow {
    fn new(d: &DeviceSnapshot, color: bool) -> Self {
        let outlets = d
            .outlets
            .iter()
            .map(|on| output::paint_power(*on, color))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            id: d.device_id.clone(),
            name: d.name.clone(),
            model: d
                .device_model
                .as_ref()
                .map_or_else(|| d.product_model.clone(), |m| format!("{} ({m})", d.product_model)),
            outlets,
            address: d.address.clone().unwrap_or_else(|| "-".into()),
            encrypted: if d.encrypted { "yes".into() } else { "no".into() },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(discovery: &Discovery, args: &DevicesArgs, ctx: &Context) -> Result<(), CliError> {
    if !args.no_wait && !ctx.wait.is_zero() {
        tracing::debug!(wait = ?ctx.wait, "waiting for LAN announcements");
        tokio::time::sleep(ctx.wait).await;
    }

    let snapshots: Vec<DeviceSnapshot> = discovery.devices().iter().map(|d| d.snapshot()).collect();
    let out = output::render_list(
        ctx.output,
        &snapshots,
        |d| DeviceRow::new(d, ctx.color),
        |d| d.device_id.clone(),
    )
    .map_err(|e| CliError::Internal(format!("failed to render devices: {e}")))?;
    output::print_output(&out);
    Ok(())
}
