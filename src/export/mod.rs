// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Routes extracted records through the transformers into the sinks.
//!
//! An [`ExportSession`] covers one tipset. The records of each task result
//! are grouped by model meta and published on the transform bus. Once the
//! transformers are done with a result, its rows are joined with its
//! processing report into one [`PersistBatch`], so a storage sink writes
//! both or neither. Archive contributions pass through unchanged. Everything
//! is published on the sink bus under its [`TransformKind`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::archive::{ArchiveSink, ArchiveWriter};
use crate::bus::{self, Handler, Router};
use crate::model::{ModelBatch, ModelMeta};
use crate::processor::ModelResult;
use crate::storage::{Storage, Stores};
use crate::transform::{
    self, ModelBatchMessage, PersistBatch, TransformKind, Transformed, Transformer,
};

pub type Sink = Arc<dyn Handler<Arc<Transformed>, ()>>;

/// Writes table rows, with the report they belong to, to a [`Storage`].
pub struct StorageSink {
    storage: Arc<dyn Storage>,
}

impl StorageSink {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Handler<Arc<Transformed>, ()> for StorageSink {
    fn name(&self) -> String {
        "storage".into()
    }

    fn matcher(&self) -> anyhow::Result<Regex> {
        bus::exact(TransformKind::Persistable.as_ref())
    }

    async fn handle(
        self: Arc<Self>,
        input: flume::Receiver<Arc<Transformed>>,
        _output: flume::Sender<()>,
    ) -> anyhow::Result<()> {
        while let Ok(msg) = input.recv_async().await {
            match msg.as_ref() {
                Transformed::Persistable(PersistBatch {
                    report: Some(report),
                    rows,
                }) => self.storage.persist_result(report, rows).await?,
                Transformed::Persistable(PersistBatch { report: None, rows }) => {
                    self.storage.persist_batch(rows).await?
                }
                other => anyhow::bail!("storage cannot persist {}", other.kind()),
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ModelExporter {
    transformers: Vec<Transformer>,
    sinks: Vec<Sink>,
}

impl ModelExporter {
    /// An exporter without transformers or sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows and processing reports go to `stores.rows`.
    pub fn for_storage(stores: &Stores) -> Self {
        Self::new()
            .with_transformers(transform::row_transformers())
            .with_sink(Arc::new(StorageSink::new(stores.rows.clone())))
    }

    /// Additionally stages every record into `writer`.
    pub fn with_archive(self, writer: Arc<ArchiveWriter>) -> Self {
        self.with_transformers(vec![transform::cbor_transformer()])
            .with_sink(Arc::new(ArchiveSink::new(writer)))
    }

    pub fn with_transformers(mut self, transformers: Vec<Transformer>) -> Self {
        self.transformers.extend(transformers);
        self
    }

    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Starts the sinks for one tipset.
    pub fn session(&self) -> anyhow::Result<ExportSession> {
        let (sinks, _) = Router::new(self.sinks.clone())?;
        Ok(ExportSession {
            transformers: self.transformers.clone(),
            sinks: Some(sinks),
        })
    }

    /// Exports every result of one tipset.
    pub async fn export(&self, results: Vec<ModelResult>) -> anyhow::Result<()> {
        let mut session = self.session()?;
        for result in results {
            session.export(result).await?;
        }
        session.finish().await
    }
}

pub struct ExportSession {
    transformers: Vec<Transformer>,
    /// Taken once a sink failed.
    sinks: Option<Router<Arc<Transformed>, ()>>,
}

impl ExportSession {
    /// Transforms the records of `result` and hands them to the sinks, the
    /// rows in one batch with the report of the result.
    pub async fn export(&mut self, result: ModelResult) -> anyhow::Result<()> {
        let ModelResult {
            report,
            data,
            current,
            executed,
            ..
        } = result;
        let mut groups: BTreeMap<ModelMeta, ModelBatch> = BTreeMap::new();
        for model in data {
            groups.entry(model.meta()).or_default().push(model);
        }

        let (transforms, transformed) = Router::new(self.transformers.clone())?;
        let collect = tokio::spawn(async move {
            let mut outputs = vec![];
            while let Ok(out) = transformed.recv_async().await {
                outputs.push(out);
            }
            outputs
        });
        let mut published: anyhow::Result<()> = Ok(());
        for (meta, data) in groups {
            let topic = meta.to_string();
            debug!("exporting {} {topic} records", data.len());
            let msg = Arc::new(ModelBatchMessage {
                meta,
                current: current.clone(),
                executed: executed.clone(),
                data,
            });
            if let Err(e) = transforms.emit(&topic, msg).await {
                published = Err(e);
                break;
            }
        }
        let stopped = transforms.stop().await;
        let outputs = collect.await?;
        published?;
        stopped?;

        let mut rows = vec![];
        for out in outputs {
            match out {
                Transformed::Persistable(batch) => rows.extend(batch.rows),
                other => self.sink(other).await?,
            }
        }
        self.sink(Transformed::Persistable(PersistBatch {
            report: Some(report),
            rows,
        }))
        .await
    }

    /// Publishes `out` on the sink bus. When a sink has stopped, its error
    /// is returned.
    async fn sink(&mut self, out: Transformed) -> anyhow::Result<()> {
        let Some(sinks) = &self.sinks else {
            anyhow::bail!("export session already failed");
        };
        let kind = out.kind();
        let emitted = sinks.emit(kind.as_ref(), Arc::new(out)).await;
        if let Err(e) = emitted {
            if let Some(sinks) = self.sinks.take() {
                sinks.stop().await?;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Waits for every sink.
    pub async fn finish(self) -> anyhow::Result<()> {
        match self.sinks {
            Some(sinks) => sinks.stop().await,
            None => anyhow::bail!("export session already failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::blocks::{BlockParent, DrandBlockEntry};
    use crate::model::reports::{ProcessingReport, ReportStatus};
    use crate::model::{Model, Row};
    use crate::storage::MemoryStorage;
    use crate::tasks::TaskName;
    use crate::test_utils::tipset_at;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn result(task: TaskName, data: ModelBatch) -> ModelResult {
        let current = tipset_at(2);
        ModelResult {
            task,
            report: ProcessingReport {
                height: 2,
                state_root: current.parent_state_root().to_string(),
                reporter: "test".into(),
                task: task.to_string(),
                started_at: Utc::now(),
                completed_at: Utc::now(),
                status: ReportStatus::Ok,
                status_information: None,
                errors_detected: None,
            },
            data,
            current,
            executed: tipset_at(1),
        }
    }

    fn parent(block: &str) -> Arc<dyn Model> {
        Arc::new(BlockParent {
            height: 2,
            block: block.into(),
            parent: "p".into(),
        })
    }

    /// Refuses every batch that carries `poisoned` rows.
    struct PoisonedStorage {
        inner: MemoryStorage,
        poisoned: &'static str,
    }

    #[async_trait]
    impl Storage for PoisonedStorage {
        async fn persist_batch(&self, rows: &[Row]) -> anyhow::Result<()> {
            self.inner.persist_batch(rows).await
        }

        async fn persist_result(&self, report: &ProcessingReport, rows: &[Row]) -> anyhow::Result<()> {
            if rows.iter().any(|r| r.table == self.poisoned) {
                anyhow::bail!("disk full");
            }
            self.inner.persist_result(report, rows).await
        }
    }

    #[tokio::test]
    async fn rows_and_reports_are_persisted() {
        let backend = Arc::new(MemoryStorage::default());
        let exporter = ModelExporter::for_storage(&Stores::new(backend.clone()));
        exporter
            .export(vec![
                result(TaskName::BlockParents, vec![parent("a"), parent("b")]),
                result(TaskName::Blocks, vec![]),
            ])
            .await
            .unwrap();
        assert_eq!(backend.rows("block_parents").len(), 2);
        assert_eq!(backend.all_processing_reports().len(), 2);
    }

    #[tokio::test]
    async fn archive_receives_every_record() {
        let backend = Arc::new(MemoryStorage::default());
        let writer = Arc::new(ArchiveWriter::new());
        let exporter =
            ModelExporter::for_storage(&Stores::new(backend.clone())).with_archive(writer.clone());
        exporter
            .export(vec![result(TaskName::BlockParents, vec![parent("a")])])
            .await
            .unwrap();
        assert_eq!(writer.staged_tipsets(), 1);
        assert_eq!(backend.rows("block_parents").len(), 1);
    }

    #[tokio::test]
    async fn report_and_rows_are_stored_together() {
        let storage = Arc::new(PoisonedStorage {
            inner: MemoryStorage::default(),
            poisoned: "block_parents",
        });
        let exporter = ModelExporter::new()
            .with_transformers(transform::row_transformers())
            .with_sink(Arc::new(StorageSink::new(storage.clone())));
        let entry: Arc<dyn Model> = Arc::new(DrandBlockEntry {
            round: 7,
            block: "a".into(),
        });
        let err = exporter
            .export(vec![
                result(TaskName::DrandBlockEntries, vec![entry]),
                result(TaskName::BlockParents, vec![parent("a")]),
            ])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("disk full"));

        let reports: Vec<_> = storage
            .inner
            .all_processing_reports()
            .into_iter()
            .map(|r| r.task)
            .collect();
        assert_eq!(reports, vec!["drand_block_entries".to_string()]);
        assert_eq!(storage.inner.rows("drand_block_entries").len(), 1);
        assert!(storage.inner.rows("block_parents").is_empty());
    }
}
