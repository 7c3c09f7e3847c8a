//! Attach and detach commands

use super::Interrupt;
use crate::cli::args::PairArgs;
use crate::error::BcacheResult;
use crate::host::BcacheHost;
use crate::lifecycle::{AttachOutcome, DetachOutcome};
use crate::ui::{self, UiContext};

/// Execute the attach command
pub async fn attach(args: PairArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let registry = host.registry().await?;

    match host.attach(&registry, &args.cache, &args.backing).await? {
        AttachOutcome::Attached => ui::step_ok(
            &ctx,
            &format!("{} was attached to {}", args.cache, args.backing),
        ),
        AttachOutcome::AlreadyAttached => ui::step_info(
            &ctx,
            &format!("{} is already attached to {}", args.cache, args.backing),
        ),
    }
    Ok(())
}

/// Execute the detach command
pub async fn detach(args: PairArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let registry = host.registry().await?;

    let interrupt = Interrupt::listen();

    match host
        .detach(&registry, &args.cache, &args.backing, interrupt.token())
        .await?
    {
        DetachOutcome::Detached => ui::step_ok(
            &ctx,
            &format!("{} was detached from {}", args.cache, args.backing),
        ),
        DetachOutcome::Pending => ui::step_warn_hint(
            &ctx,
            &format!("Detaching {} from {} is in progress", args.cache, args.backing),
            "dirty data is written back first; check with: bcachectl show",
        ),
        DetachOutcome::AlreadyDetached => ui::step_info(
            &ctx,
            &format!("{} has no cache attached", args.backing),
        ),
    }
    Ok(())
}
