use anyhow::Result;
use calmirror_core::CalendarAdapter;
use calmirror_core::config::MirrorConfig;
use calmirror_core::date_range::DateRange;
use calmirror_core::sync::{self, SyncOptions};
use owo_colors::OwoColorize;

use crate::lock;
use crate::registry;
use crate::render::render_report;
use crate::utils::tui;

pub struct SyncArgs {
    pub range: DateRange,
    pub max_events: Option<usize>,
    pub no_updates: bool,
    pub keep_going: bool,
}

fn options_for(config: &MirrorConfig, args: SyncArgs) -> SyncOptions {
    let defaults = SyncOptions::from_config(config);

    SyncOptions {
        range: args.range,
        max_events: args.max_events.unwrap_or(defaults.max_events),
        propagate_updates: defaults.propagate_updates && !args.no_updates,
        keep_going: args.keep_going,
        ..defaults
    }
}

pub async fn run(config: &MirrorConfig, args: SyncArgs) -> Result<()> {
    let _lock = lock::acquire_lock()?;

    let calendars = registry::open_all(config)?;
    let handles: Vec<&dyn CalendarAdapter> = calendars.iter().map(|c| c.as_ref()).collect();
    let options = options_for(config, args);

    let spinner = tui::create_spinner(format!("Mirroring {} calendars", calendars.len()));
    let result = sync::synchronize(&handles, &options).await;
    spinner.finish_and_clear();
    let report = result?;

    println!("{}", render_report(&calendars, &report));

    if !report.is_empty() {
        println!(
            "\nCreated: {}, updated: {}",
            report.created_count(),
            report.updated_count()
        );
    }

    if !report.failures.is_empty() {
        let failed = report.failures.len();
        anyhow::bail!("{} failed", pluralize_writes(failed).red());
    }

    Ok(())
}

fn pluralize_writes(count: usize) -> String {
    if count == 1 {
        "1 write".to_string()
    } else {
        format!("{count} writes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> SyncArgs {
        SyncArgs {
            range: DateRange::upcoming(7),
            max_events: None,
            no_updates: false,
            keep_going: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = MirrorConfig {
            max_events: 50,
            ..MirrorConfig::default()
        };

        let options = options_for(
            &config,
            SyncArgs {
                max_events: Some(10),
                no_updates: true,
                keep_going: true,
                ..make_args()
            },
        );

        assert_eq!(options.max_events, 10);
        assert!(!options.propagate_updates);
        assert!(options.keep_going);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_config_defaults_apply_without_flags() {
        let config = MirrorConfig {
            max_events: 50,
            propagate_updates: false,
            ..MirrorConfig::default()
        };

        let options = options_for(&config, make_args());
        assert_eq!(options.max_events, 50);
        assert!(!options.propagate_updates);
    }
}
