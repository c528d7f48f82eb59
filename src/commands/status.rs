//! `provision status`

use anyhow::Result;
use colored::Colorize;
use declarative::{BackupState, MemoryStore};

use crate::Context;
use crate::config::ProvisionConfig;
use crate::{state, ui};

/// Entries shown without `-v`
const ENTRY_LIMIT: usize = 40;

pub fn run(ctx: &Context) -> Result<()> {
    let (config, config_file) = ProvisionConfig::load(ctx.config.as_deref())?;
    let store_path = config.store_path()?;
    let store = state::load_store(&store_path)?;

    ui::header("Provision Status");
    ui::kv(
        "Config",
        &config_file.map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string()),
    );
    ui::kv("Store", &store_path.display().to_string());

    print_entries(&store, ctx.verbose > 0);
    print_backups(&store);
    Ok(())
}

fn print_entries(store: &MemoryStore, all: bool) {
    let entries = store.entries();
    ui::section(&format!("Entries ({})", entries.len()));
    if entries.is_empty() {
        ui::dim("(empty)");
        return;
    }
    let shown = if all {
        entries.len()
    } else {
        ENTRY_LIMIT.min(entries.len())
    };
    for (path, value) in &entries[..shown] {
        println!("  {} = {}", path.dimmed(), value);
    }
    if shown < entries.len() {
        ui::dim(&format!("... {} more (use -v)", entries.len() - shown));
    }
}

fn print_backups(store: &MemoryStore) {
    let backups = store.backups();
    ui::section("Backups");
    if backups.is_empty() {
        ui::dim("(none)");
        return;
    }
    for backup in backups {
        let state = match backup.state {
            BackupState::Begun => backup.state.to_string().yellow(),
            BackupState::Committed => backup.state.to_string().green(),
            BackupState::Aborted => backup.state.to_string().red(),
        };
        println!("  {} {} ({})", backup.id, state, backup.subtree);
    }
    let open = store.in_flight().count();
    if open > 0 {
        ui::warn(&format!(
            "{open} backup(s) still open; a previous apply was interrupted"
        ));
    }
}
