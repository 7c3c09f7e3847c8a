//! Format and super commands

use super::Interrupt;
use crate::cli::args::{DeviceArg, FormatArgs};
use crate::error::BcacheResult;
use crate::host::BcacheHost;
use crate::tools::FormatRequest;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the format command
pub async fn format(args: FormatArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let request = FormatRequest {
        backing: args.backing,
        cache: args.cache,
        wipe: args.wipe,
        writeback: args.writeback,
    };
    let registry = host.registry().await?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Formatting");
    let interrupt = Interrupt::listen();
    let result = host.format(&registry, &request, interrupt.token()).await;
    spinner.finish();

    for (device, outcome) in result? {
        ui::step_ok(&ctx, &format!("{}: {}", device.display(), outcome));
    }
    Ok(())
}

/// Execute the super command
pub async fn superblock(args: DeviceArg, host: &BcacheHost) -> BcacheResult<()> {
    let registry = host.registry().await?;
    let text = host.superblock(&registry, &args.device).await?;
    super::emit(&text);
    Ok(())
}
