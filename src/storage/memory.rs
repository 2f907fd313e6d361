// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{ReportStore, Storage};
use crate::model::reports::{GapReport, GapStatus, ProcessingReport};
use crate::model::{Row, Value};
use crate::shim::clock::ChainEpoch;

fn key_of(row: &Row) -> Vec<String> {
    row.key
        .iter()
        .map(|column| match row.get(column) {
            Some(Value::Null) | None => String::new(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Int(i)) => i.to_string(),
            Some(Value::Text(s)) => s.clone(),
        })
        .collect()
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<BTreeMap<&'static str, BTreeMap<Vec<String>, Row>>>,
    reports: RwLock<Vec<ProcessingReport>>,
    gaps: RwLock<Vec<GapReport>>,
}

impl MemoryStorage {
    /// Rows of `table` in key order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_processing_reports(&self) -> Vec<ProcessingReport> {
        self.reports.read().clone()
    }

    pub fn all_gap_reports(&self) -> Vec<GapReport> {
        self.gaps.read().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn persist_batch(&self, rows: &[Row]) -> anyhow::Result<()> {
        insert_rows(&mut self.tables.write(), rows);
        Ok(())
    }

    async fn persist_result(&self, report: &ProcessingReport, rows: &[Row]) -> anyhow::Result<()> {
        let mut tables = self.tables.write();
        let mut reports = self.reports.write();
        insert_rows(&mut tables, rows);
        reports.push(report.clone());
        Ok(())
    }
}

fn insert_rows(tables: &mut BTreeMap<&'static str, BTreeMap<Vec<String>, Row>>, rows: &[Row]) {
    for row in rows {
        tables
            .entry(row.table)
            .or_default()
            .insert(key_of(row), row.clone());
    }
}

#[async_trait]
impl ReportStore for MemoryStorage {
    async fn persist_processing_reports(&self, reports: &[ProcessingReport]) -> anyhow::Result<()> {
        self.reports.write().extend_from_slice(reports);
        Ok(())
    }

    async fn processing_reports(
        &self,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> anyhow::Result<Vec<ProcessingReport>> {
        Ok(self
            .reports
            .read()
            .iter()
            .filter(|r| (min..=max).contains(&r.height))
            .cloned()
            .collect())
    }

    async fn persist_gap_reports(&self, gaps: &[GapReport]) -> anyhow::Result<()> {
        let mut stored = self.gaps.write();
        for gap in gaps {
            stored.retain(|g| (g.height, &g.task, g.status) != (gap.height, &gap.task, gap.status));
            stored.push(gap.clone());
        }
        Ok(())
    }

    async fn gap_reports(
        &self,
        status: GapStatus,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> anyhow::Result<Vec<GapReport>> {
        Ok(self
            .gaps
            .read()
            .iter()
            .filter(|g| g.status == status && (min..=max).contains(&g.height))
            .cloned()
            .collect())
    }

    async fn mark_gaps_filled(&self, height: ChainEpoch, tasks: &[String]) -> anyhow::Result<()> {
        let mut stored = self.gaps.write();
        let now = Utc::now();
        let filled: Vec<GapReport> = stored
            .iter()
            .filter(|g| g.height == height && g.status == GapStatus::Gap && tasks.contains(&g.task))
            .map(|g| GapReport {
                status: GapStatus::Filled,
                reported_at: now,
                ..g.clone()
            })
            .collect();
        stored.retain(|g| {
            !(g.height == height && filled.iter().any(|f| f.task == g.task))
        });
        stored.extend(filled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToRow as _;
    use crate::model::blocks::BlockParent;

    #[tokio::test]
    async fn rows_with_the_same_key_replace() {
        let storage = MemoryStorage::default();
        let row = |parent: &str| {
            BlockParent {
                height: 1,
                block: "b".into(),
                parent: parent.into(),
            }
            .to_row()
        };
        storage.persist_batch(&[row("p1"), row("p2")]).await.unwrap();
        storage.persist_batch(&[row("p1")]).await.unwrap();
        assert_eq!(storage.rows("block_parents").len(), 2);
        assert!(storage.rows("nothing").is_empty());
    }

    #[tokio::test]
    async fn filling_gaps() {
        let storage = MemoryStorage::default();
        let gap = |height, task: &str| GapReport {
            height,
            task: task.into(),
            status: GapStatus::Gap,
            reporter: "r".into(),
            reported_at: Utc::now(),
        };
        storage
            .persist_gap_reports(&[gap(5, "blocks"), gap(5, "messages"), gap(6, "blocks")])
            .await
            .unwrap();
        storage
            .mark_gaps_filled(5, &["blocks".to_string()])
            .await
            .unwrap();
        let open = storage.gap_reports(GapStatus::Gap, 0, 10).await.unwrap();
        let mut open: Vec<(ChainEpoch, String)> =
            open.into_iter().map(|g| (g.height, g.task)).collect();
        open.sort();
        assert_eq!(open, vec![(5, "messages".into()), (6, "blocks".into())]);
        let filled = storage.gap_reports(GapStatus::Filled, 5, 5).await.unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].task, "blocks");
    }
}
