//! List and show commands

use super::emit;
use crate::cli::args::{ListArgs, ShowArgs};
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::render::{render, render_device};

/// Execute the list command
///
/// Unresolvable devices are rendered with the rest, then fail the command.
pub async fn list(args: ListArgs, host: &BcacheHost) -> BcacheResult<()> {
    let mut report = host.scan().await?;
    emit(&render(&report, args.format, &args.extra)?);

    match report.failures.len() {
        0 => Ok(()),
        1 => Err(report.failures.remove(0).into()),
        n => Err(BcacheError::User(format!(
            "{} device(s) could not be resolved",
            n
        ))),
    }
}

/// Execute the show command
pub async fn show(args: ShowArgs, host: &BcacheHost) -> BcacheResult<()> {
    let registry = host.registry().await?;
    let device = registry
        .backing(&args.device)
        .ok_or_else(|| BcacheError::NotRegistered(args.device.clone()))?;

    emit(&render_device(device, args.format)?);
    Ok(())
}
