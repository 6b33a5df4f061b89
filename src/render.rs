//! Colored terminal rendering for sync plans and reports.

use calmirror_core::CalendarAdapter;
use calmirror_core::sync::{MirrorAction, MirrorKind, PairPlan, SyncFailure, SyncReport};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for MirrorKind {
    fn render(&self) -> String {
        let symbol = self.to_string();
        match self {
            MirrorKind::Create => symbol.green().to_string(),
            MirrorKind::Update => symbol.yellow().to_string(),
        }
    }
}

fn colorize(kind: MirrorKind, text: &str) -> String {
    match kind {
        MirrorKind::Create => text.green().to_string(),
        MirrorKind::Update => text.yellow().to_string(),
    }
}

impl Render for MirrorAction {
    fn render(&self) -> String {
        let time = colorize(self.kind, &self.origin.to_string());
        let id = format!("({})", self.origin_id());

        match (&self.copy, self.kind) {
            (Some(copy), MirrorKind::Update) => format!(
                "{} {} {} {}",
                self.kind.render(),
                time,
                id.dimmed(),
                format!("was {copy}").dimmed()
            ),
            _ => format!("{} {} {}", self.kind.render(), time, id.dimmed()),
        }
    }
}

impl Render for SyncFailure {
    fn render(&self) -> String {
        format!("{} {} {}", "!".red(), self.origin_id.red(), self.error.to_string().dimmed())
    }
}

/// "work → personal", using the adapters' names.
pub fn pair_title(calendars: &[Box<dyn CalendarAdapter>], source: usize, target: usize) -> String {
    format!(
        "📅 {} → {}",
        calendars[source].name(),
        calendars[target].name()
    )
}

/// Show counts instead of events above this many actions
const COMPACT_THRESHOLD: usize = 5;

pub fn render_plan(plan: &PairPlan, all: bool) -> String {
    if plan.is_empty() {
        return "   No changes".dimmed().to_string();
    }

    let mut lines = Vec::new();

    if all || plan.actions.len() <= COMPACT_THRESHOLD {
        for action in &plan.actions {
            lines.push(format!("   {}", action.render()));
        }
    } else {
        let creates = plan.count(MirrorKind::Create);
        let updates = plan.count(MirrorKind::Update);

        if creates > 0 {
            let label = format!("({} new {})", creates, pluralize("copy", creates));
            lines.push(format!("   {} {}", "+".green(), label.green()));
        }
        if updates > 0 {
            let label = format!("({} moved {})", updates, pluralize("copy", updates));
            lines.push(format!("   {} {}", "~".yellow(), label.yellow()));
        }
    }

    lines.join("\n")
}

/// Per-pair counts for a finished pass, skipping pairs where nothing happened.
pub fn render_report(calendars: &[Box<dyn CalendarAdapter>], report: &SyncReport) -> String {
    let mut lines = Vec::new();

    for &(source, target) in report.created.keys() {
        let created = report.created_for(source, target).len();
        let updated = report.updated_for(source, target).len();
        let failed = report
            .failures
            .iter()
            .filter(|f| f.source == source && f.target == target)
            .collect::<Vec<_>>();

        if created == 0 && updated == 0 && failed.is_empty() {
            continue;
        }

        lines.push(pair_title(calendars, source, target));
        if created > 0 {
            lines.push(format!("   {} {}", "+".green(), format!("{created} created").green()));
        }
        if updated > 0 {
            lines.push(format!("   {} {}", "~".yellow(), format!("{updated} updated").yellow()));
        }
        for failure in failed {
            lines.push(format!("   {}", failure.render()));
        }
    }

    if lines.is_empty() {
        return "Everything is already mirrored.".dimmed().to_string();
    }

    lines.join("\n")
}

fn pluralize(word: &str, count: usize) -> String {
    match (word, count) {
        (_, 1) => word.to_string(),
        ("copy", _) => "copies".to_string(),
        _ => format!("{word}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("copy", 1), "copy");
        assert_eq!(pluralize("copy", 3), "copies");
        assert_eq!(pluralize("event", 2), "events");
    }
}
