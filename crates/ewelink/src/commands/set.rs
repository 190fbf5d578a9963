//! Switch control.

use ewelink_core::Discovery;

use crate::cli::SetArgs;
use crate::error::CliError;
use crate::output;

use super::Context;

pub async fn handle(discovery: &Discovery, args: &SetArgs, ctx: &Context) -> Result<(), CliError> {
    let known = discovery
        .get_device(&args.device_id)
        .ok_or_else(|| CliError::DeviceNotFound {
            device_id: args.device_id.clone(),
        })?;
    if known.switch(args.outlet).is_none() {
        return Err(CliError::SwitchNotFound {
            device_id: args.device_id.clone(),
            index: args.outlet,
        });
    }

    let device = discovery.wait_for_device(&args.device_id, ctx.wait).await?;

    let on = args.state.is_on();
    discovery.set_switch(&args.device_id, args.outlet, on).await?;

    output::print_output(&format!(
        "{device} outlet {}: {}",
        args.outlet,
        output::paint_power(on, ctx.color)
    ));
    Ok(())
}
