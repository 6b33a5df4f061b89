use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use owo_colors::OwoColorize;

use crate::registry;

pub fn run(config: &MirrorConfig) -> Result<()> {
    if config.calendars.is_empty() {
        println!("{}", "No calendars configured.".dimmed());
        println!("Add [[calendars]] entries to {}", MirrorConfig::config_path()?.display());
        return Ok(());
    }

    for (index, calendar) in config.calendars.iter().enumerate() {
        let account = registry::account_key(&calendar.provider)
            .and_then(|key| calendar.param(key).ok())
            .unwrap_or("-");

        let session = match registry::is_authenticated(calendar) {
            Ok(Some(true)) => "authenticated".green().to_string(),
            Ok(Some(false)) => "not authenticated".red().to_string(),
            Ok(None) => String::new(),
            Err(e) => e.to_string().red().to_string(),
        };

        println!(
            "{} {} {} {} {}",
            format!("[{index}]").dimmed(),
            calendar.name,
            format!("({})", calendar.provider).dimmed(),
            account,
            session
        );
    }

    Ok(())
}
