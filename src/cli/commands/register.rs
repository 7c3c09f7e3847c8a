//! Register and unregister commands

use super::{settle, Interrupt};
use crate::cli::args::DevicesArgs;
use crate::error::BcacheResult;
use crate::host::BcacheHost;
use crate::lifecycle::RegisterOutcome;
use crate::ui::{self, UiContext};

/// Execute the register command
pub async fn register(args: DevicesArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let interrupt = Interrupt::listen();
    let mut failures = Vec::new();

    for device in args.devices {
        // Registering one device can bring others with it
        let registry = host.registry().await?;
        match host.register(&registry, &device, interrupt.token()).await {
            Ok(RegisterOutcome::AlreadyRegistered) => {
                ui::step_info(&ctx, &format!("{} is already registered", device));
            }
            Ok(RegisterOutcome::Backing { short_name }) => ui::step_ok(
                &ctx,
                &format!("{} was registered as {} and is available for use", device, short_name),
            ),
            Ok(RegisterOutcome::Cache { uuid }) => ui::step_ok(
                &ctx,
                &format!(
                    "{} was registered as cache device with set {} and is available for use",
                    device, uuid
                ),
            ),
            Ok(outcome @ RegisterOutcome::Registered { .. }) => {
                ui::step_ok(&ctx, &outcome.to_string());
            }
            Err(e) => failures.push((device, e)),
        }
    }

    settle(&ctx, "register", failures)
}

/// Execute the unregister command
pub async fn unregister(args: DevicesArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let registry = host.registry().await?;
    let mut failures = Vec::new();

    for device in args.devices {
        let kind = if registry.backing(&device).is_some() {
            "backing"
        } else {
            "cache"
        };
        match host.unregister(&registry, &device).await {
            Ok(()) => ui::step_ok(
                &ctx,
                &format!("{} ({} device) was unregistered, but is still formatted", device, kind),
            ),
            Err(e) => failures.push((device, e)),
        }
    }

    settle(&ctx, "unregister", failures)
}
