//! `provision plan`

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{Filter, Operation, PlanOptions, PlanSummary};

use crate::Context;
use crate::cli::PlanArgs;
use crate::config::ProvisionConfig;
use crate::kinds::{Kinds, Source};
use crate::manifest::Manifest;
use crate::{planfile, progress, state, ui};

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let (config, _) = ProvisionConfig::load(ctx.config.as_deref())?;
    let manifest = Manifest::load(&args.manifest)?;

    let filter = Filter::from_target(args.target.as_deref());
    if let Some(kind) = filter.kind()
        && !Kinds::NAMES.contains(&kind)
    {
        anyhow::bail!(
            "Unknown kind '{kind}' (expected one of: {})",
            Kinds::NAMES.join(", ")
        );
    }

    let store = state::load_store(&config.store_path()?)?;
    let operation = Operation::from(args.operation);
    let source = Source {
        manifest: &manifest,
        store: &store,
        operation,
    };
    let options = PlanOptions::new(config.new_run_id()).with_filter(filter);

    let kinds = Kinds::default();
    let spinner = (!ctx.quiet).then(|| progress::spinner("Planning..."));
    let output = kinds.planner().plan_simple(&source, &options);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let output = output.context("Planning failed")?;

    if !ctx.quiet {
        ui::header(&format!("Plan: {operation} ({})", options.run_id));
        print_summary(&output.summary);
    }

    planfile::write(&args.out, &output.buffer)?;
    if output.summary.has_changes() {
        ui::success(&format!(
            "Wrote {} ({} work items, total cost {})",
            args.out.display(),
            output.items,
            output.total_cost
        ));
    } else {
        ui::info(&format!("Nothing to do; wrote empty plan {}", args.out.display()));
    }
    Ok(())
}

fn print_summary(summary: &PlanSummary) {
    for change in &summary.changes {
        println!(
            "  {} {}.{} {}",
            ui::todo_marker(change.todo),
            change.kind,
            change.key,
            format!("({})", change.component).dimmed()
        );
    }
    println!();
    println!(
        "  {} to install, {} to uninstall, {} to reinstall, {} unchanged",
        summary.installs.to_string().green(),
        summary.uninstalls.to_string().red(),
        summary.reinstalls.to_string().yellow(),
        summary.unchanged
    );
}
