// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Where rows and reports end up.

mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::Row;
use crate::model::reports::{GapReport, GapStatus, ProcessingReport};
use crate::shim::clock::ChainEpoch;

/// Sink for extracted rows.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Inserts `rows`, possibly of several tables, in one transaction. Rows
    /// whose key is already stored replace the stored ones.
    async fn persist_batch(&self, rows: &[Row]) -> anyhow::Result<()>;

    /// Like [`Self::persist_batch`], with the processing report of the task
    /// that produced `rows` written in the same transaction.
    async fn persist_result(&self, report: &ProcessingReport, rows: &[Row]) -> anyhow::Result<()>;
}

/// Processing and gap reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn persist_processing_reports(&self, reports: &[ProcessingReport]) -> anyhow::Result<()>;

    /// Reports with a height in `[min, max]`.
    async fn processing_reports(
        &self,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> anyhow::Result<Vec<ProcessingReport>>;

    async fn persist_gap_reports(&self, gaps: &[GapReport]) -> anyhow::Result<()>;

    /// Gap reports with `status` and a height in `[min, max]`.
    async fn gap_reports(
        &self,
        status: GapStatus,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> anyhow::Result<Vec<GapReport>>;

    /// Marks the `GAP` reports of `tasks` at `height` as `FILLED`.
    async fn mark_gaps_filled(&self, height: ChainEpoch, tasks: &[String]) -> anyhow::Result<()>;
}

/// Both stores in one.
pub trait Backend: Storage + ReportStore {}

impl<T: Storage + ReportStore> Backend for T {}

/// Shared handles to the two halves of one backend.
#[derive(Clone)]
pub struct Stores {
    pub rows: Arc<dyn Storage>,
    pub reports: Arc<dyn ReportStore>,
}

impl Stores {
    pub fn new<B: Backend + 'static>(backend: Arc<B>) -> Self {
        Self {
            rows: backend.clone(),
            reports: backend,
        }
    }
}
