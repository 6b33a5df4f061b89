//! What a synchronization pass did.

use std::collections::BTreeMap;

use crate::error::CalMirrorError;
use crate::event::Event;
use crate::sync::plan::{MirrorKind, PairPlan};

/// A create or update that failed while `keep_going` was set.
#[derive(Debug)]
pub struct SyncFailure {
    pub source: usize,
    pub target: usize,
    pub origin_id: String,
    pub kind: MirrorKind,
    pub error: CalMirrorError,
}

/// Result of `synchronize`, keyed by `(source index, target index)`.
///
/// Every off-diagonal pair has an entry in `created` and `updated`, even
/// when nothing happened for it.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: BTreeMap<(usize, usize), Vec<Event>>,
    pub updated: BTreeMap<(usize, usize), Vec<Event>>,
    pub failures: Vec<SyncFailure>,
    /// One plan per ordered pair, in the order they were run
    pub plans: Vec<PairPlan>,
}

impl SyncReport {
    pub fn new(calendar_count: usize) -> Self {
        let mut report = SyncReport::default();
        for i in 0..calendar_count {
            for j in (0..calendar_count).filter(|&j| j != i) {
                report.created.insert((i, j), Vec::new());
                report.updated.insert((i, j), Vec::new());
            }
        }
        report
    }

    pub fn created_for(&self, source: usize, target: usize) -> &[Event] {
        self.created
            .get(&(source, target))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn updated_for(&self, source: usize, target: usize) -> &[Event] {
        self.updated
            .get(&(source, target))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn created_count(&self) -> usize {
        self.created.values().map(Vec::len).sum()
    }

    pub fn updated_count(&self) -> usize {
        self.updated.values().map(Vec::len).sum()
    }

    /// Nothing created, updated or failed.
    pub fn is_empty(&self) -> bool {
        self.created_count() == 0 && self.updated_count() == 0 && self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, kind: MirrorKind, source: usize, target: usize, event: Event) {
        let map = match kind {
            MirrorKind::Create => &mut self.created,
            MirrorKind::Update => &mut self.updated,
        };
        map.entry((source, target)).or_default().push(event);
    }

    /// Counts of (creates, updates) the plans call for.
    pub fn planned_counts(&self) -> (usize, usize) {
        self.plans.iter().fold((0, 0), |(c, u), plan| {
            (
                c + plan.count(MirrorKind::Create),
                u + plan.count(MirrorKind::Update),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_off_diagonal_pair_present() {
        let report = SyncReport::new(3);
        let pairs: Vec<_> = report.created.keys().copied().collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)]);
        assert_eq!(report.updated.len(), 6);
        assert!(report.is_empty());
        assert!(report.created_for(1, 1).is_empty());
    }
}
