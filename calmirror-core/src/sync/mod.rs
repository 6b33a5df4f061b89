//! Mirroring events across calendars.
//!
//! A pass fetches every calendar once, plans every ordered pair `(i, j)`
//! with `plan_pair`, then applies the plan to calendar `j`. The provenance
//! marker on each copy is the only state carried between passes.

mod plan;
mod report;

pub use plan::{MirrorAction, MirrorKind, PairPlan, SkipReason, plan_pair};
pub use report::{SyncFailure, SyncReport};

use tracing::{debug, info, warn};

use crate::adapter::CalendarAdapter;
use crate::config::{DEFAULT_MAX_EVENTS, MirrorConfig};
use crate::date_range::DateRange;
use crate::error::CalMirrorResult;
use crate::event::Event;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Window every calendar is fetched with
    pub range: DateRange,
    /// Per-calendar fetch cap
    pub max_events: usize,
    pub propagate_updates: bool,
    /// Plan only, write nothing
    pub dry_run: bool,
    /// Record failing writes in the report instead of aborting
    pub keep_going: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            range: DateRange::default(),
            max_events: DEFAULT_MAX_EVENTS,
            propagate_updates: true,
            dry_run: false,
            keep_going: false,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &MirrorConfig) -> Self {
        SyncOptions {
            range: config.date_range(),
            max_events: config.max_events,
            propagate_updates: config.propagate_updates,
            ..SyncOptions::default()
        }
    }
}

/// Fetch and decode one calendar. A calendar the provider cannot find has no events.
pub async fn fetch_events(
    calendar: &dyn CalendarAdapter,
    options: &SyncOptions,
) -> CalMirrorResult<Vec<Event>> {
    let payloads = match calendar.get_events(&options.range, options.max_events).await {
        Ok(payloads) => payloads,
        Err(e) if e.is_not_found() => {
            warn!(calendar = calendar.name(), "Calendar not found, treating it as empty");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let serializer = calendar.serializer();
    let events = payloads
        .iter()
        .map(|p| serializer.deserialize_event(p))
        .collect::<CalMirrorResult<Vec<_>>>()?;

    debug!(calendar = calendar.name(), count = events.len(), "Fetched events");
    Ok(events)
}

/// Mirror every calendar into every other one.
///
/// Returns the events created (and updated) per ordered pair. Without
/// `keep_going`, the first failing write aborts the pass and is returned.
pub async fn synchronize(
    calendars: &[&dyn CalendarAdapter],
    options: &SyncOptions,
) -> CalMirrorResult<SyncReport> {
    let mut fetched = Vec::with_capacity(calendars.len());
    for calendar in calendars {
        fetched.push(fetch_events(*calendar, options).await?);
    }

    let mut report = SyncReport::new(calendars.len());

    for (i, source) in calendars.iter().enumerate() {
        for (j, target) in calendars.iter().enumerate() {
            if i == j {
                continue;
            }

            let plan = plan_pair(
                i,
                j,
                &fetched[i],
                &fetched[j],
                target.serializer(),
                options.propagate_updates,
            )?;

            for (id, reason) in &plan.skipped {
                debug!(from = source.name(), to = target.name(), event = %id, %reason, "Skipping");
            }
            debug!(
                from = source.name(),
                to = target.name(),
                creates = plan.count(MirrorKind::Create),
                updates = plan.count(MirrorKind::Update),
                "Planned pair"
            );

            if !options.dry_run {
                apply_plan(*target, &plan, options, &mut report).await?;
            }
            report.plans.push(plan);
        }
    }

    Ok(report)
}

async fn apply_plan(
    target: &dyn CalendarAdapter,
    plan: &PairPlan,
    options: &SyncOptions,
    report: &mut SyncReport,
) -> CalMirrorResult<()> {
    for action in &plan.actions {
        match apply_action(target, action).await {
            Ok(event) => {
                info!(
                    to = target.name(),
                    origin = action.origin_id(),
                    id = event.id.as_deref().unwrap_or_default(),
                    "{action}"
                );
                report.record(action.kind, plan.source, plan.target, event);
            }
            Err(error) if options.keep_going => {
                warn!(to = target.name(), origin = action.origin_id(), %error, "Mirroring failed");
                report.failures.push(SyncFailure {
                    source: plan.source,
                    target: plan.target,
                    origin_id: action.origin_id().to_string(),
                    kind: action.kind,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    Ok(())
}

async fn apply_action(target: &dyn CalendarAdapter, action: &MirrorAction) -> CalMirrorResult<Event> {
    let serializer = target.serializer();
    let stub = Event::from_origin(&action.origin);
    let payload = serializer.serialize_event(&stub)?;

    let response = match (&action.kind, &action.copy) {
        (MirrorKind::Update, Some(copy)) => {
            target.update_event(copy.require_id()?, payload, true).await?
        }
        _ => target.create_event(payload, Some(action.origin_id())).await?,
    };

    serializer.deserialize_event(&response)
}

/// Delete every copy on `calendar` within `options.range`.
///
/// Returns the ids removed. Only events carrying a provenance marker are
/// touched, and the adapter re-checks the marker before each delete.
pub async fn remove_copies(
    calendar: &dyn CalendarAdapter,
    options: &SyncOptions,
) -> CalMirrorResult<Vec<String>> {
    let events = fetch_events(calendar, options).await?;
    let mut removed = Vec::new();

    for copy in events.iter().filter(|e| e.is_copy()) {
        let id = copy.require_id()?;
        if !options.dry_run {
            calendar.delete_event(id, true).await?;
            info!(calendar = calendar.name(), id, "Deleted copy");
        }
        removed.push(id.to_string());
    }

    Ok(removed)
}
