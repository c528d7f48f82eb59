//! `provision apply`

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{
    ApplyContext, ApplyOptions, ApplySummary, NoProgress, RollbackReport, StopToken,
};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::ProvisionConfig;
use crate::kinds::Kinds;
use crate::progress::BarProgress;
use crate::secrets::Secrets;
use crate::{planfile, state, ui};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let (config, _) = ProvisionConfig::load(ctx.config.as_deref())?;
    let buffer = planfile::read(&args.plan)?;
    let store_path = config.store_path()?;
    let mut store = state::load_store(&store_path)?;
    let secrets = match config.secrets_path() {
        Some(path) => Secrets::load(&path)?,
        None => Secrets::from_env(),
    };

    let kinds = Kinds::default();
    let applier = kinds.applier(&secrets);
    let stop = StopToken::new();

    // Reconstruct everything up front; nothing runs in a dry run
    let preview = applier
        .apply(
            buffer.clone(),
            &mut ApplyContext::new(&mut store),
            ApplyOptions { dry_run: true },
            &stop,
            &mut NoProgress,
        )
        .map_err(|failure| failure.error)?;

    if preview.steps.is_empty() {
        ui::info("Plan has nothing to do");
        return Ok(());
    }
    if !ctx.quiet || args.dry_run {
        ui::header(&format!("Steps in {}", args.plan.display()));
        for step in &preview.steps {
            println!("  {} {}", "•".blue(), step.description);
        }
    }
    if args.dry_run {
        ui::dim(&format!(
            "Dry run: {} steps, total cost {}",
            preview.steps.len(),
            preview.total_cost
        ));
        return Ok(());
    }
    if !args.yes && !ui::confirm(&format!("Apply {} steps?", preview.steps.len()), true)? {
        ui::warn("Aborted");
        return Ok(());
    }

    ctrlc::set_handler(interrupt_handler(stop.clone()))
        .context("Failed to install Ctrl-C handler")?;
    let mut progress = BarProgress::new(ctx.quiet);
    let result = {
        let mut apply_ctx = ApplyContext::new(&mut store).with_retry(config.retry_policy());
        match applier.apply(
            buffer,
            &mut apply_ctx,
            ApplyOptions::default(),
            &stop,
            &mut progress,
        ) {
            Ok(summary) => Ok(summary),
            Err(failure) => {
                ui::error(&format!("Apply failed: {}", failure.error));
                let report = failure.roll_back(&mut apply_ctx);
                print_rollback(&report);
                Err(failure.error)
            }
        }
    };

    store.clear_finished();
    state::save_store(&store_path, &store)?;

    let summary = result?;
    print_summary(&summary);
    Ok(())
}

/// Ctrl-C asks the applier to stop before the next work item
fn interrupt_handler(stop: StopToken) -> impl FnMut() + Send + 'static {
    move || {
        if !stop.is_stop_requested() {
            eprintln!("\nStopping after the current step...");
        }
        stop.request_stop();
    }
}

fn print_rollback(report: &RollbackReport) {
    if report.undone.is_empty() && report.failed.is_empty() {
        ui::dim("Nothing to roll back");
        return;
    }
    for step in &report.undone {
        ui::dim(&format!("rolled back: {step}"));
    }
    for (step, reason) in &report.failed {
        ui::error(&format!("rollback {step} failed: {reason}"));
    }
    if report.is_clean() {
        ui::warn("Changes were rolled back");
    } else {
        ui::warn("Rollback was incomplete; run `provision status` to inspect the store");
    }
}

fn print_summary(summary: &ApplySummary) {
    ui::success(&format!(
        "Applied {} steps (cost {}/{})",
        summary.executed(),
        summary.completed_cost,
        summary.total_cost
    ));
}
