//! Stop command

use super::Interrupt;
use crate::cli::args::DeviceArg;
use crate::error::BcacheResult;
use crate::host::BcacheHost;
use crate::lifecycle::StopOutcome;
use crate::ui::{self, UiContext};

/// Execute the stop command
pub async fn execute(args: DeviceArg, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let registry = host.registry().await?;
    let interrupt = Interrupt::listen();

    match host.stop(&registry, &args.device, interrupt.token()).await? {
        StopOutcome::Removed => ui::step_ok(&ctx, &format!("{} was stopped", args.device)),
        StopOutcome::MayStillBePresent => ui::step_warn_hint(
            &ctx,
            &format!("{} was stopped but may still be in sysfs", args.device),
            "check again with: bcachectl list",
        ),
    }
    Ok(())
}
