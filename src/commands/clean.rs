use anyhow::{Context, Result};
use calmirror_core::config::MirrorConfig;
use calmirror_core::date_range::DateRange;
use calmirror_core::sync::{self, SyncOptions};
use owo_colors::OwoColorize;

use crate::lock;
use crate::registry;
use crate::utils::tui;

pub async fn run(config: &MirrorConfig, name: &str, range: DateRange, dry_run: bool) -> Result<()> {
    let _lock = lock::acquire_lock()?;

    let calendar_config = config.calendar(name).with_context(|| {
        let names: Vec<_> = config.calendars.iter().map(|c| c.name.as_str()).collect();
        format!("No calendar named '{}' (configured: {})", name, names.join(", "))
    })?;
    let calendar = registry::open_calendar(calendar_config)?;

    let options = SyncOptions {
        range,
        dry_run,
        ..SyncOptions::from_config(config)
    };

    let spinner = tui::create_spinner(format!("📅 {name}"));
    let result = sync::remove_copies(calendar.as_ref(), &options).await;
    spinner.finish_and_clear();
    let removed = result?;

    if removed.is_empty() {
        println!("{}", format!("No copies on {name}").dimmed());
        return Ok(());
    }

    let verb = if dry_run { "Would delete" } else { "Deleted" };
    for id in &removed {
        println!("   {} {}", "-".red(), id.red());
    }
    println!("\n{} {} copies from {}", verb, removed.len(), name);

    Ok(())
}
