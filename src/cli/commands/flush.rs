//! Flush command

use super::Interrupt;
use crate::cli::args::FlushArgs;
use crate::error::BcacheResult;
use crate::host::BcacheHost;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the flush command
///
/// Ctrl-C stops waiting for writeback; cache modes are still restored.
pub async fn execute(args: FlushArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let registry = host.registry().await?;
    let target = match args.device.as_str() {
        "all" => None,
        device => Some(device),
    };

    let interrupt = Interrupt::listen();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Flushing {}", args.device));
    let result = host.flush(&registry, target, interrupt.token().clone()).await;
    spinner.finish();

    let report = result?;
    if report.reports.is_empty() {
        ui::step_info(&ctx, "No backing devices found");
    }
    for device in &report.reports {
        if device.is_success() {
            ui::step_ok(&ctx, &format!("{}: {}", device.device, device.summary()));
        } else {
            ui::step_error(&ctx, &format!("{}: {}", device.device, device.summary()));
        }
    }
    report.into_result()?;
    Ok(())
}
