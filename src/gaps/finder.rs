// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::ReportIndex;
use crate::datasource::DataSource;
use crate::model::reports::{
    GapReport, GapStatus, NULL_ROUND, ProcessingReport, ReportStatus,
};
use crate::shim::clock::ChainEpoch;
use crate::storage::ReportStore;
use crate::tasks::TaskName;

/// Task recorded on the report of a null round.
const NULL_ROUND_TASK: TaskName = TaskName::Consensus;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FoundGaps {
    /// Newly recorded gaps.
    pub gaps: Vec<GapReport>,
    /// Heights newly found to be null rounds.
    pub null_rounds: Vec<ChainEpoch>,
}

/// Records a `GAP` for every configured task without a successful report
/// in `[min, max]`, and for every skipped task.
pub struct GapFinder {
    ds: Arc<DataSource>,
    reports: Arc<dyn ReportStore>,
    tasks: Vec<TaskName>,
    reporter: String,
    min: ChainEpoch,
    max: ChainEpoch,
}

impl GapFinder {
    pub fn new(
        ds: Arc<DataSource>,
        reports: Arc<dyn ReportStore>,
        tasks: Vec<TaskName>,
        reporter: String,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> Self {
        Self {
            ds,
            reports,
            tasks,
            reporter,
            min,
            max,
        }
    }

    pub async fn find(&self) -> anyhow::Result<FoundGaps> {
        anyhow::ensure!(
            self.min <= self.max,
            "min height {} is above max height {}",
            self.min,
            self.max
        );
        let reports = self.reports.processing_reports(self.min, self.max).await?;
        let index = ReportIndex::new(&reports);
        let mut missing = BTreeSet::new();

        // tasks missing at heights something was indexed at
        for height in index.best.keys() {
            for task in &self.tasks {
                if !index.is_complete(*height, task.as_ref()) {
                    missing.insert((*height, task.to_string()));
                }
            }
        }

        // skipped tasks, configured or not
        for report in reports.iter().filter(|r| r.status == ReportStatus::Skip) {
            if !index.null_rounds.contains(&report.height)
                && !index.is_complete(report.height, &report.task)
            {
                missing.insert((report.height, report.task.clone()));
            }
        }

        let null_rounds = self.height_gaps(&index, &mut missing).await?;

        let recorded: BTreeSet<(ChainEpoch, String)> = self
            .reports
            .gap_reports(GapStatus::Gap, self.min, self.max)
            .await?
            .into_iter()
            .map(|gap| (gap.height, gap.task))
            .collect();
        let now = Utc::now();
        let gaps: Vec<GapReport> = missing
            .difference(&recorded)
            .map(|(height, task)| GapReport {
                height: *height,
                task: task.clone(),
                status: GapStatus::Gap,
                reporter: self.reporter.clone(),
                reported_at: now,
            })
            .collect();
        self.reports.persist_gap_reports(&gaps).await?;
        info!(
            "found {} gaps and {} null rounds in [{}, {}]",
            gaps.len(),
            null_rounds.len(),
            self.min,
            self.max
        );
        Ok(FoundGaps { gaps, null_rounds })
    }

    /// Adds every task at heights without a single `OK` report. Heights the
    /// node resolves to another tipset are recorded as null rounds instead.
    async fn height_gaps(
        &self,
        index: &ReportIndex,
        missing: &mut BTreeSet<(ChainEpoch, String)>,
    ) -> anyhow::Result<Vec<ChainEpoch>> {
        let candidates: Vec<ChainEpoch> = (self.min.max(1)..=self.max)
            .filter(|h| !index.null_rounds.contains(h) && !index.has_ok(*h))
            .collect();
        if candidates.is_empty() {
            return Ok(vec![]);
        }
        let head = self.ds.chain_head().await?;
        let mut null_rounds = vec![];
        let mut null_reports = vec![];
        for height in candidates {
            let ts = match self.ds.tipset_by_height(height, head.key()).await {
                Ok(ts) => ts,
                Err(e) => {
                    warn!("skipping height {height}: {e:#}");
                    continue;
                }
            };
            if ts.epoch() == height {
                missing.extend(self.tasks.iter().map(|task| (height, task.to_string())));
                continue;
            }
            // a null round shows no gap even when reports exist for it
            missing.retain(|(h, _)| *h != height);
            null_rounds.push(height);
            let now = Utc::now();
            null_reports.push(ProcessingReport {
                height,
                state_root: ts.parent_state_root().to_string(),
                reporter: self.reporter.clone(),
                task: NULL_ROUND_TASK.to_string(),
                started_at: now,
                completed_at: now,
                status: ReportStatus::Info,
                status_information: Some(NULL_ROUND.into()),
                errors_detected: None,
            });
        }
        self.reports
            .persist_processing_reports(&null_reports)
            .await?;
        Ok(null_rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::tests::report;
    use crate::storage::MemoryStorage;
    use crate::test_utils::FakeChain;
    use pretty_assertions::assert_eq;

    const TASKS: [TaskName; 3] = [TaskName::Blocks, TaskName::Messages, TaskName::Consensus];

    fn finder(chain: FakeChain, store: Arc<MemoryStorage>, min: ChainEpoch, max: ChainEpoch) -> GapFinder {
        let ds = Arc::new(DataSource::new(Arc::new(chain)).unwrap());
        GapFinder::new(ds, store, TASKS.to_vec(), "finder".into(), min, max)
    }

    async fn store_with(reports: Vec<ProcessingReport>) -> Arc<MemoryStorage> {
        let store = Arc::new(MemoryStorage::default());
        store.persist_processing_reports(&reports).await.unwrap();
        store
    }

    fn all_tasks_ok(heights: impl IntoIterator<Item = ChainEpoch>) -> Vec<ProcessingReport> {
        heights
            .into_iter()
            .flat_map(|h| TASKS.map(|task| report(h, task.as_ref(), ReportStatus::Ok)))
            .collect()
    }

    fn pairs(gaps: &[GapReport]) -> Vec<(ChainEpoch, String)> {
        let mut pairs: Vec<_> = gaps.iter().map(|g| (g.height, g.task.clone())).collect();
        pairs.sort();
        pairs
    }

    #[tokio::test]
    async fn missing_heights_and_tasks() {
        let mut reports = all_tasks_ok((0..=10).filter(|h| *h != 5 && *h != 7));
        reports.push(report(7, "blocks", ReportStatus::Ok));
        let store = store_with(reports).await;
        let found = finder(FakeChain::linear(0..=10), store.clone(), 0, 10)
            .find()
            .await
            .unwrap();

        assert_eq!(
            pairs(&found.gaps),
            vec![
                (5, "blocks".into()),
                (5, "consensus".into()),
                (5, "messages".into()),
                (7, "consensus".into()),
                (7, "messages".into()),
            ]
        );
        assert!(found.null_rounds.is_empty());
        assert_eq!(pairs(&store.all_gap_reports()), pairs(&found.gaps));
    }

    #[tokio::test]
    async fn null_round_is_reported_not_a_gap() {
        let store = store_with(all_tasks_ok((0..=10).filter(|h| *h != 6))).await;
        let chain = FakeChain::linear((0..=10).filter(|h| *h != 6));
        let found = finder(chain, store.clone(), 0, 10).find().await.unwrap();

        assert!(found.gaps.is_empty());
        assert_eq!(found.null_rounds, vec![6]);
        let null: Vec<_> = store
            .all_processing_reports()
            .into_iter()
            .filter(|r| r.height == 6)
            .collect();
        assert_eq!(null.len(), 1);
        assert_eq!(null[0].task, "consensus");
        assert_eq!(null[0].status, ReportStatus::Info);
        assert_eq!(null[0].status_information.as_deref(), Some(NULL_ROUND));
        assert!(null[0].is_null_round());

        // known null rounds are not looked up again
        let chain = FakeChain::linear((0..=10).filter(|h| *h != 6));
        let again = finder(chain, store, 0, 10).find().await.unwrap();
        assert_eq!(again, FoundGaps::default());
    }

    #[tokio::test]
    async fn skipped_tasks_are_gaps_until_completed() {
        let mut reports = all_tasks_ok(1..=4);
        reports.push(report(3, "vm_messages", ReportStatus::Skip));
        reports.push(report(4, "blocks", ReportStatus::Skip));
        let store = store_with(reports).await;
        let found = finder(FakeChain::linear(0..=4), store, 1, 4)
            .find()
            .await
            .unwrap();
        assert_eq!(pairs(&found.gaps), vec![(3, "vm_messages".into())]);
    }

    #[tokio::test]
    async fn gaps_are_recorded_once() {
        let mut reports = all_tasks_ok(1..=3);
        reports.retain(|r| !(r.height == 2 && r.task == "messages"));
        let store = store_with(reports).await;
        let first = finder(FakeChain::linear(0..=3), store.clone(), 1, 3)
            .find()
            .await
            .unwrap();
        assert_eq!(pairs(&first.gaps), vec![(2, "messages".into())]);
        let second = finder(FakeChain::linear(0..=3), store.clone(), 1, 3)
            .find()
            .await
            .unwrap();
        assert!(second.gaps.is_empty());
        assert_eq!(store.all_gap_reports().len(), 1);
    }

    #[tokio::test]
    async fn genesis_is_never_a_gap() {
        let store = store_with(all_tasks_ok(1..=2)).await;
        let found = finder(FakeChain::linear(0..=2), store, 0, 2)
            .find()
            .await
            .unwrap();
        assert!(found.gaps.is_empty());
    }
}
