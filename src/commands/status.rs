use anyhow::Result;
use calmirror_core::CalendarAdapter;
use calmirror_core::config::MirrorConfig;
use calmirror_core::date_range::DateRange;
use calmirror_core::sync::{self, SyncOptions};
use owo_colors::OwoColorize;

use crate::registry;
use crate::render::{pair_title, render_plan};
use crate::utils::tui;

pub async fn run(config: &MirrorConfig, range: DateRange, all: bool) -> Result<()> {
    let calendars = registry::open_all(config)?;
    let handles: Vec<&dyn CalendarAdapter> = calendars.iter().map(|c| c.as_ref()).collect();

    let options = SyncOptions {
        range,
        dry_run: true,
        ..SyncOptions::from_config(config)
    };

    let spinner = tui::create_spinner("Fetching calendars".to_string());
    let result = sync::synchronize(&handles, &options).await;
    spinner.finish_and_clear();
    let report = result?;

    for (n, plan) in report.plans.iter().enumerate() {
        println!("{}", pair_title(&calendars, plan.source, plan.target));
        println!("{}", render_plan(plan, all));

        if n < report.plans.len() - 1 {
            println!();
        }
    }

    let (creates, updates) = report.planned_counts();
    if creates > 0 || updates > 0 {
        println!(
            "\n{}",
            format!("Sync would create {creates} and update {updates} copies").dimmed()
        );
    }

    Ok(())
}
