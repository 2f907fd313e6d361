// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::blocks::TipSet;
use crate::chain_follow::Walker;
use crate::index::{IndexManager, TipSetObserver};
use crate::model::reports::GapStatus;
use crate::shim::clock::ChainEpoch;
use crate::storage::ReportStore;
use crate::tasks::TaskName;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FillSummary {
    pub filled: Vec<ChainEpoch>,
    /// Heights where a task failed; their gaps stay open.
    pub incomplete: Vec<ChainEpoch>,
    /// Heights whose indexing hit a fatal error.
    pub failed: Vec<ChainEpoch>,
}

/// Indexes the missing tasks of one height.
struct HeightFill {
    manager: Arc<IndexManager>,
    tasks: Vec<TaskName>,
    outcome: Mutex<Option<anyhow::Result<bool>>>,
}

#[async_trait]
impl TipSetObserver for HeightFill {
    async fn tip_set(&self, ts: Arc<TipSet>) -> anyhow::Result<()> {
        let outcome = self.manager.index_only(ts, &self.tasks).await;
        *self.outcome.lock() = Some(outcome);
        Ok(())
    }
}

/// Re-indexes the open gaps in `[min, max]`, lowest height first.
pub struct GapFiller {
    manager: Arc<IndexManager>,
    reports: Arc<dyn ReportStore>,
    min: ChainEpoch,
    max: ChainEpoch,
}

impl GapFiller {
    pub fn new(
        manager: Arc<IndexManager>,
        reports: Arc<dyn ReportStore>,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> Self {
        Self {
            manager,
            reports,
            min,
            max,
        }
    }

    pub async fn run(&self) -> anyhow::Result<FillSummary> {
        let mut by_height: BTreeMap<ChainEpoch, Vec<String>> = BTreeMap::new();
        for gap in self
            .reports
            .gap_reports(GapStatus::Gap, self.min, self.max)
            .await?
        {
            by_height.entry(gap.height).or_default().push(gap.task);
        }
        info!("filling gaps at {} heights", by_height.len());

        let configured: Vec<TaskName> = self.manager.processor().task_names().collect();
        let mut summary = FillSummary::default();
        for (height, names) in by_height {
            let mut tasks = vec![];
            let mut known = vec![];
            let mut left_open = false;
            for name in names {
                match name.parse::<TaskName>() {
                    Ok(task) if configured.contains(&task) => {
                        tasks.push(task);
                        known.push(name);
                    }
                    Ok(_) => {
                        warn!("task {name} is not configured, its gap at height {height} stays open");
                        left_open = true;
                    }
                    Err(_) => warn!("ignoring gap of unknown task {name:?} at height {height}"),
                }
            }
            if tasks.is_empty() {
                if left_open {
                    summary.incomplete.push(height);
                }
                continue;
            }
            match self.fill(height, tasks).await {
                Ok(true) => {
                    self.reports.mark_gaps_filled(height, &known).await?;
                    if left_open {
                        summary.incomplete.push(height);
                    } else {
                        summary.filled.push(height);
                    }
                }
                Ok(false) => {
                    warn!("gaps at height {height} remain after re-indexing");
                    summary.incomplete.push(height);
                }
                Err(e) => {
                    error!("filling height {height} failed: {e:#}");
                    summary.failed.push(height);
                }
            }
        }
        Ok(summary)
    }

    async fn fill(&self, height: ChainEpoch, tasks: Vec<TaskName>) -> anyhow::Result<bool> {
        let obs = Arc::new(HeightFill {
            manager: self.manager.clone(),
            tasks,
            outcome: Mutex::new(None),
        });
        let ds = self.manager.processor().data_source().clone();
        Walker::new(ds, obs.clone(), height, height).run().await?;
        let outcome = obs.outcome.lock().take();
        outcome.unwrap_or_else(|| {
            warn!("height {height} is a null round");
            Ok(false)
        })
    }
}
