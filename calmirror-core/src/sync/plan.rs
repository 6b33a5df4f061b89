//! Planning for one ordered pair of calendars.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CalMirrorResult;
use crate::event::Event;
use crate::serializer::EventSerializer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorKind {
    Create,
    Update,
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorKind::Create => write!(f, "+"),
            MirrorKind::Update => write!(f, "~"),
        }
    }
}

/// Something to do on the target calendar for one origin event.
#[derive(Debug, Clone)]
pub struct MirrorAction {
    pub kind: MirrorKind,
    pub origin: Event,
    /// The copy already on the target (set for updates)
    pub copy: Option<Event>,
}

impl MirrorAction {
    pub fn origin_id(&self) -> &str {
        self.origin.id.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for MirrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.origin)
    }
}

/// Why a source event produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event is itself a copy
    IsCopy,
    /// The target already holds an up-to-date copy
    AlreadyMirrored,
    Declined,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IsCopy => write!(f, "is a copy"),
            SkipReason::AlreadyMirrored => write!(f, "already mirrored"),
            SkipReason::Declined => write!(f, "declined"),
        }
    }
}

/// Actions for copying events from calendar `source` to calendar `target`.
#[derive(Debug, Clone)]
pub struct PairPlan {
    pub source: usize,
    pub target: usize,
    /// In source order
    pub actions: Vec<MirrorAction>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl PairPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, kind: MirrorKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }
}

/// Decide what calendar `target` needs from calendar `source`.
///
/// Events that are copies, already on the target, or declined are skipped.
/// With `propagate_updates`, an origin already on the target whose time
/// fields or recurrence drifted from its copy yields an update instead.
/// The origin is compared as `target_serializer` would store it, so a field
/// the target cannot hold never counts as drift.
pub fn plan_pair(
    source: usize,
    target: usize,
    source_events: &[Event],
    target_events: &[Event],
    target_serializer: &EventSerializer,
    propagate_updates: bool,
) -> CalMirrorResult<PairPlan> {
    // S_j: origin id -> the copy the target already holds
    let mut mirrored: HashMap<&str, &Event> = HashMap::new();
    for event in target_events {
        if let Some(origin_id) = event.source_event_id.as_deref() {
            mirrored.entry(origin_id).or_insert(event);
        }
    }

    let mut actions = Vec::new();
    let mut skipped = Vec::new();

    for event in source_events {
        let Some(id) = event.id.as_deref() else {
            continue;
        };

        if event.is_copy() {
            skipped.push((id.to_string(), SkipReason::IsCopy));
            continue;
        }

        if let Some(copy) = mirrored.get(id) {
            if propagate_updates
                && !event.declined
                && target_serializer.normalize(event)?.differs_from(copy)
            {
                actions.push(MirrorAction {
                    kind: MirrorKind::Update,
                    origin: event.clone(),
                    copy: Some((*copy).clone()),
                });
            } else {
                skipped.push((id.to_string(), SkipReason::AlreadyMirrored));
            }
            continue;
        }

        if event.declined {
            skipped.push((id.to_string(), SkipReason::Declined));
            continue;
        }

        actions.push(MirrorAction {
            kind: MirrorKind::Create,
            origin: event.clone(),
            copy: None,
        });
    }

    Ok(PairPlan {
        source,
        target,
        actions,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Recurrence, RecurrenceDialect};
    use crate::memory::MEMORY_SERIALIZER;
    use crate::serializer::{Field, FieldCodec, read_only, unreported};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    /// Memory's wire format, minus recurrence.
    static NO_RECURRENCE: [FieldCodec; 8] = [
        FieldCodec {
            field: Field::Start,
            encode: |e| MEMORY_SERIALIZER.serialize(Field::Start, e),
            decode: |p| MEMORY_SERIALIZER.deserialize(Field::Start, p),
        },
        FieldCodec {
            field: Field::End,
            encode: |e| MEMORY_SERIALIZER.serialize(Field::End, e),
            decode: |p| MEMORY_SERIALIZER.deserialize(Field::End, p),
        },
        FieldCodec {
            field: Field::Recurrence,
            encode: read_only,
            decode: unreported,
        },
        FieldCodec {
            field: Field::IsAllDay,
            encode: |e| MEMORY_SERIALIZER.serialize(Field::IsAllDay, e),
            decode: |p| MEMORY_SERIALIZER.deserialize(Field::IsAllDay, p),
        },
        FieldCodec {
            field: Field::Id,
            encode: |e| MEMORY_SERIALIZER.serialize(Field::Id, e),
            decode: |p| MEMORY_SERIALIZER.deserialize(Field::Id, p),
        },
        FieldCodec {
            field: Field::Url,
            encode: read_only,
            decode: unreported,
        },
        FieldCodec {
            field: Field::SourceEventId,
            encode: |e| MEMORY_SERIALIZER.serialize(Field::SourceEventId, e),
            decode: |p| MEMORY_SERIALIZER.deserialize(Field::SourceEventId, p),
        },
        FieldCodec {
            field: Field::Declined,
            encode: read_only,
            decode: unreported,
        },
    ];

    static NO_RECURRENCE_SERIALIZER: EventSerializer =
        EventSerializer::new("no-recurrence", &NO_RECURRENCE);

    fn make_plan(source: &[Event], target: &[Event], propagate_updates: bool) -> PairPlan {
        plan_pair(0, 1, source, target, &MEMORY_SERIALIZER, propagate_updates).unwrap()
    }

    fn make_event(id: &str, hour: u32) -> Event {
        let start = Utc.with_ymd_and_hms(2030, 3, 1, hour, 0, 0).unwrap().fixed_offset();
        Event {
            id: Some(id.to_string()),
            ..Event::stub(start, start + Duration::hours(1), false)
        }
    }

    fn make_copy(id: &str, origin: &Event) -> Event {
        Event {
            id: Some(id.to_string()),
            source_event_id: origin.id.clone(),
            ..Event::from_origin(origin)
        }
    }

    #[test]
    fn test_new_origins_are_created_in_source_order() {
        let source = vec![make_event("b", 12), make_event("a", 9)];
        let plan = make_plan(&source, &[], true);

        let ids: Vec<_> = plan.actions.iter().map(|a| a.origin_id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(plan.count(MirrorKind::Create), 2);
    }

    #[test]
    fn test_copies_are_never_sources() {
        let origin = make_event("o", 9);
        let source = vec![make_copy("c", &origin)];
        let plan = make_plan(&source, &[], true);

        assert!(plan.is_empty());
        assert_eq!(plan.skipped, vec![("c".to_string(), SkipReason::IsCopy)]);
    }

    #[test]
    fn test_already_mirrored_is_skipped() {
        let origin = make_event("o", 9);
        let target = vec![make_copy("c", &origin)];
        let plan = make_plan(std::slice::from_ref(&origin), &target, true);

        assert!(plan.is_empty());
        assert_eq!(plan.skipped[0].1, SkipReason::AlreadyMirrored);
    }

    #[test]
    fn test_declined_is_skipped() {
        let mut origin = make_event("o", 9);
        origin.declined = true;
        let plan = make_plan(&[origin], &[], true);

        assert!(plan.is_empty());
        assert_eq!(plan.skipped[0].1, SkipReason::Declined);
    }

    #[test]
    fn test_drifted_copy_is_updated() {
        let origin = make_event("o", 9);
        let stale = make_copy("c", &make_event("o", 8));
        let plan = make_plan(std::slice::from_ref(&origin), &[stale], true);

        assert_eq!(plan.actions.len(), 1);
        let action = &plan.actions[0];
        assert_eq!(action.kind, MirrorKind::Update);
        assert_eq!(action.copy.as_ref().and_then(|c| c.id.as_deref()), Some("c"));
        assert_eq!(action.to_string().chars().next(), Some('~'));
    }

    #[test]
    fn test_drift_ignored_without_update_propagation() {
        let origin = make_event("o", 9);
        let stale = make_copy("c", &make_event("o", 8));
        let plan = make_plan(&[origin], &[stale], false);

        assert!(plan.is_empty());
    }

    #[test]
    fn test_declined_origin_never_updates() {
        let mut origin = make_event("o", 9);
        origin.declined = true;
        let stale = make_copy("c", &make_event("o", 8));
        let plan = make_plan(&[origin], &[stale], true);

        assert!(plan.is_empty());
    }

    #[test]
    fn test_recurrence_the_target_cannot_hold_is_not_drift() {
        let mut origin = make_event("o", 9);
        origin.recurrence = Some(Recurrence {
            dialect: RecurrenceDialect::Opaque,
            payload: json!("weekly"),
        });
        let copy = make_copy("c", &make_event("o", 9));

        let plan = plan_pair(
            0,
            1,
            std::slice::from_ref(&origin),
            std::slice::from_ref(&copy),
            &NO_RECURRENCE_SERIALIZER,
            true,
        )
        .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped[0].1, SkipReason::AlreadyMirrored);

        // The same pair against a target that can hold it is drift
        let plan = make_plan(&[origin], &[copy], true);
        assert_eq!(plan.count(MirrorKind::Update), 1);
    }
}
