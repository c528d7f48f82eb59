//! Terminal progress for PLAN and APPLY.

use declarative::{ApplyPhase, PlanPhase, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Progress callback drawing one bar sized by total plan cost
pub struct BarProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar, quiet }
    }
}

impl ProgressCallback for BarProgress {
    fn on_plan_phase(&mut self, phase: PlanPhase) {
        log::debug!("Plan phase: {phase}");
    }

    fn on_apply_phase(&mut self, phase: ApplyPhase) {
        log::debug!("Apply phase: {phase}");
        if phase == ApplyPhase::Finalize {
            self.bar.finish_and_clear();
        }
    }

    fn on_plan_loaded(&mut self, steps: usize, total_cost: u64) {
        self.bar.set_length(total_cost);
        self.bar.set_position(0);
        if !self.quiet {
            self.bar.println(format!("{steps} steps to run"));
        }
    }

    fn on_step_start(&mut self, description: &str, _cost: u32) {
        self.bar.set_message(description.to_string());
    }

    fn on_step_complete(&mut self, description: &str, cost: u32) {
        self.bar.inc(u64::from(cost));
        log::debug!("Done: {description}");
    }
}
