//! Tune and print-tunables commands

use super::emit;
use crate::cli::args::{PrintTunablesArgs, TuneArgs};
use crate::codec::TuneSpec;
use crate::config::TuningProfile;
use crate::error::{BcacheError, BcacheResult};
use crate::host::BcacheHost;
use crate::render::render_tunables;
use crate::tunable::TuneReport;
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;

/// Execute the tune command
pub async fn tune(args: TuneArgs, host: &BcacheHost) -> BcacheResult<()> {
    let ctx = UiContext::detect();
    let registry = host.registry().await?;

    match args.target.as_str() {
        "from-file" => {
            let profile = TuningProfile::load(Path::new(&args.value)).await?;
            let report = host.apply_profile(&registry, &profile).await;
            print_report(&ctx, &report);
            report.into_result()?;
        }
        "all" => {
            let spec = TuneSpec::parse(&args.value)?;
            let report = host.tune_all(&registry, &spec).await?;
            print_report(&ctx, &report);
            report.into_result()?;
        }
        device => {
            let spec = TuneSpec::parse(&args.value)?;
            host.tune(&registry, device, &spec).await?;
            ui::step_ok(&ctx, &format!("{}: {} set to {}", device, spec.name, spec.value));
        }
    }
    Ok(())
}

fn print_report(ctx: &UiContext, report: &TuneReport) {
    if report.outcomes.is_empty() {
        ui::step_info(ctx, "No backing devices matched");
        return;
    }
    for outcome in &report.outcomes {
        let label = format!("{}: {}", outcome.device, outcome.tunable);
        match &outcome.result {
            Ok(()) => ui::step_ok(ctx, &label),
            Err(e) => ui::step_error_detail(ctx, &label, &e.to_string()),
        }
    }
}

/// Execute the print-tunables command
pub async fn print_tunables(args: PrintTunablesArgs, host: &BcacheHost) -> BcacheResult<()> {
    let registry = host.registry().await?;
    let table = host.current_tunables(&registry).await;
    let text = render_tunables(&table, args.format)?;

    match args.outfile {
        Some(path) => {
            fs::write(&path, &text)
                .await
                .map_err(|e| BcacheError::io(format!("writing {}", path.display()), e))?;
            ui::step_ok(
                &UiContext::detect(),
                &format!("Tunables written to {}", path.display()),
            );
        }
        None => emit(&text),
    }
    Ok(())
}
