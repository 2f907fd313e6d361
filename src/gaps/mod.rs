// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Finding and re-indexing the tasks that never completed.
//!
//! A task is complete at a height when its best processing report there is
//! `OK`, reports being ranked `OK < ERROR < INFO < SKIP`. Heights with a
//! `NULL_ROUND` report have nothing to index.

mod filler;
mod finder;

pub use filler::{FillSummary, GapFiller};
pub use finder::{FoundGaps, GapFinder};

use std::collections::{BTreeMap, BTreeSet};

use crate::model::reports::{ProcessingReport, ReportStatus};
use crate::shim::clock::ChainEpoch;

/// Best status per task at every reported height, null rounds aside.
#[derive(Debug, Default)]
struct ReportIndex {
    best: BTreeMap<ChainEpoch, BTreeMap<String, ReportStatus>>,
    null_rounds: BTreeSet<ChainEpoch>,
}

impl ReportIndex {
    fn new(reports: &[ProcessingReport]) -> Self {
        let mut index = Self::default();
        for report in reports {
            if report.is_null_round() {
                index.null_rounds.insert(report.height);
                continue;
            }
            index
                .best
                .entry(report.height)
                .or_default()
                .entry(report.task.clone())
                .and_modify(|best| {
                    if report.status.rank() < best.rank() {
                        *best = report.status;
                    }
                })
                .or_insert(report.status);
        }
        for height in &index.null_rounds {
            index.best.remove(height);
        }
        index
    }

    fn is_complete(&self, height: ChainEpoch, task: &str) -> bool {
        self.best
            .get(&height)
            .and_then(|tasks| tasks.get(task))
            .is_some_and(|status| *status == ReportStatus::Ok)
    }

    fn has_ok(&self, height: ChainEpoch) -> bool {
        self.best
            .get(&height)
            .is_some_and(|tasks| tasks.values().any(|s| *s == ReportStatus::Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reports::NULL_ROUND;
    use chrono::Utc;

    pub(super) fn report(height: ChainEpoch, task: &str, status: ReportStatus) -> ProcessingReport {
        ProcessingReport {
            height,
            state_root: format!("root-{height}"),
            reporter: "test".into(),
            task: task.into(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            status,
            status_information: None,
            errors_detected: None,
        }
    }

    #[test]
    fn best_status_wins() {
        let mut null = report(4, "consensus", ReportStatus::Info);
        null.status_information = Some(NULL_ROUND.into());
        let index = ReportIndex::new(&[
            report(1, "blocks", ReportStatus::Error),
            report(1, "blocks", ReportStatus::Ok),
            report(2, "blocks", ReportStatus::Skip),
            report(2, "blocks", ReportStatus::Info),
            report(4, "blocks", ReportStatus::Ok),
            null,
        ]);
        assert!(index.is_complete(1, "blocks"));
        assert!(!index.is_complete(2, "blocks"));
        assert_eq!(index.best[&2]["blocks"], ReportStatus::Info);
        assert!(!index.has_ok(2));
        assert!(!index.has_ok(4));
        assert!(index.null_rounds.contains(&4));
    }
}
