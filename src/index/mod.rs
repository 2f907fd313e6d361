// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Indexing of whole tipsets: deadline, export and the worker pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use smart_default::SmartDefault;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::blocks::TipSet;
use crate::export::ModelExporter;
use crate::metrics;
use crate::processor::StateProcessor;
use crate::tasks::TaskName;

/// Receives the tipsets a walker or watcher decides to index.
#[async_trait]
pub trait TipSetObserver: Send + Sync {
    async fn tip_set(&self, ts: Arc<TipSet>) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, SmartDefault, PartialEq, Eq)]
pub struct IndexOptions {
    /// Name recorded on every processing report.
    #[default("forest-indexer".into())]
    pub reporter: String,
    /// Time budget of one tipset. `None` or zero means no budget.
    pub window: Option<Duration>,
    /// Tipsets indexed in parallel by [`IndexManager::index_async`].
    #[default(1)]
    pub workers: usize,
}

struct Indexer {
    processor: StateProcessor,
    exporter: ModelExporter,
    options: IndexOptions,
}

impl Indexer {
    /// `Ok(false)` when some task did not succeed, `Err` on a fatal error.
    async fn index(&self, processor: &StateProcessor, ts: Arc<TipSet>) -> anyhow::Result<bool> {
        let height = ts.epoch();
        if height == 0 || processor.is_empty() {
            debug!("nothing to index at height {height}");
            return Ok(true);
        }
        let executed = processor
            .data_source()
            .tipset(ts.parents())
            .await
            .with_context(|| format!("loading the parent of height {height}"))?;
        let deadline = self
            .options
            .window
            .filter(|window| !window.is_zero())
            .map(|window| tokio::time::Instant::now() + window);
        let (results, fatal) = processor.process(ts, executed, deadline);
        let mut session = self.exporter.session()?;
        let mut success = true;
        loop {
            tokio::select! {
                biased;
                Ok(e) = fatal.recv_async() => {
                    return Err(e.context(format!("indexing height {height}")));
                }
                result = results.recv_async() => match result {
                    Ok(mut result) => {
                        result.report.reporter.clone_from(&self.options.reporter);
                        success &= result.report.status.is_success();
                        session
                            .export(result)
                            .await
                            .with_context(|| format!("exporting height {height}"))?;
                    }
                    Err(_) => break,
                },
            }
        }
        if let Ok(e) = fatal.try_recv() {
            return Err(e.context(format!("indexing height {height}")));
        }
        session
            .finish()
            .await
            .with_context(|| format!("exporting height {height}"))?;
        metrics::TIPSETS_INDEXED.inc();
        Ok(success)
    }
}

struct Pool {
    jobs: flume::Sender<Arc<TipSet>>,
    workers: JoinSet<()>,
}

/// Indexes tipsets, one at a time with [`Self::index`] or through a bounded
/// pool with [`Self::index_async`].
///
/// The first fatal error stops the pool and is latched: every later call to
/// [`Self::index_async`] fails with it.
pub struct IndexManager {
    indexer: Arc<Indexer>,
    pool: Mutex<Option<Pool>>,
    fatal: Arc<Mutex<Option<Arc<anyhow::Error>>>>,
    cancel: CancellationToken,
}

impl IndexManager {
    pub fn new(processor: StateProcessor, exporter: ModelExporter, options: IndexOptions) -> Self {
        Self {
            indexer: Arc::new(Indexer {
                processor,
                exporter,
                options,
            }),
            pool: Mutex::new(None),
            fatal: Default::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &IndexOptions {
        &self.indexer.options
    }

    pub fn processor(&self) -> &StateProcessor {
        &self.indexer.processor
    }

    pub fn exporter(&self) -> &ModelExporter {
        &self.indexer.exporter
    }

    /// Indexes `ts` with every configured task. Returns whether every task
    /// succeeded; `Err` is fatal.
    pub async fn index(&self, ts: Arc<TipSet>) -> anyhow::Result<bool> {
        self.indexer.index(&self.indexer.processor, ts).await
    }

    /// Like [`Self::index`] but only with those of the configured tasks that
    /// are in `tasks`.
    pub async fn index_only(&self, ts: Arc<TipSet>, tasks: &[TaskName]) -> anyhow::Result<bool> {
        let processor = self.indexer.processor.restricted_to(tasks);
        self.indexer.index(&processor, ts).await
    }

    /// The latched fatal error, if any.
    pub fn fatal(&self) -> Option<Arc<anyhow::Error>> {
        self.fatal.lock().clone()
    }

    fn check_fatal(&self) -> anyhow::Result<()> {
        match self.fatal() {
            Some(e) => {
                self.cancel.cancel();
                Err(anyhow::anyhow!("indexing stopped: {e:#}"))
            }
            None => Ok(()),
        }
    }

    fn jobs(&self) -> anyhow::Result<flume::Sender<Arc<TipSet>>> {
        if self.cancel.is_cancelled() {
            anyhow::bail!("index pool is shut down");
        }
        let mut pool = self.pool.lock();
        let pool = pool.get_or_insert_with(|| {
            let size = self.indexer.options.workers.max(1);
            let (jobs, queue) = flume::bounded(size * 2);
            let mut workers = JoinSet::new();
            for _ in 0..size {
                workers.spawn(work(
                    self.indexer.clone(),
                    queue.clone(),
                    self.cancel.clone(),
                    self.fatal.clone(),
                ));
            }
            Pool { jobs, workers }
        });
        Ok(pool.jobs.clone())
    }

    /// Queues `ts` for the pool, waiting while the queue is full.
    pub async fn index_async(&self, ts: Arc<TipSet>) -> anyhow::Result<()> {
        self.check_fatal()?;
        let jobs = self.jobs()?;
        let workers = self.indexer.options.workers.max(1);
        if jobs.len() >= workers {
            warn!(
                "{} tipsets waiting for {workers} index workers",
                jobs.len()
            );
        }
        jobs.send_async(ts)
            .await
            .map_err(|_| anyhow::anyhow!("index pool is shut down"))?;
        metrics::INDEXER_QUEUE_DEPTH.set(jobs.len() as i64);
        Ok(())
    }

    /// Lets the pool finish the queued tipsets, then stops it. Returns the
    /// latched fatal error, if any.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let pool = self.pool.lock().take();
        if let Some(Pool { jobs, mut workers }) = pool {
            drop(jobs);
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!("index worker failed: {e}");
                }
            }
        }
        self.cancel.cancel();
        self.check_fatal()
    }
}

#[async_trait]
impl TipSetObserver for IndexManager {
    async fn tip_set(&self, ts: Arc<TipSet>) -> anyhow::Result<()> {
        self.index_async(ts).await
    }
}

async fn work(
    indexer: Arc<Indexer>,
    queue: flume::Receiver<Arc<TipSet>>,
    cancel: CancellationToken,
    fatal: Arc<Mutex<Option<Arc<anyhow::Error>>>>,
) {
    loop {
        let ts = tokio::select! {
            () = cancel.cancelled() => break,
            job = queue.recv_async() => match job {
                Ok(ts) => ts,
                Err(_) => break,
            },
        };
        metrics::INDEXER_QUEUE_DEPTH.set(queue.len() as i64);
        metrics::INDEXER_ACTIVE_WORKERS.inc();
        let height = ts.epoch();
        let result = tokio::select! {
            () = cancel.cancelled() => None,
            result = indexer.index(&indexer.processor, ts) => Some(result),
        };
        metrics::INDEXER_ACTIVE_WORKERS.dec();
        match result {
            None => break,
            Some(Ok(true)) => info!("indexed height {height}"),
            Some(Ok(false)) => warn!("indexed height {height} with failed tasks"),
            Some(Err(e)) => {
                error!("fatal error at height {height}: {e:#}");
                fatal.lock().get_or_insert_with(|| Arc::new(e));
                cancel.cancel();
                break;
            }
        }
    }
}
