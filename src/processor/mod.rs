// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Runs every configured task on one tipset pair and reports each outcome.
//!
//! One worker per task runs in a [`JoinSet`]. A collector drains the set and
//! forwards a [`ModelResult`] per task. When the deadline passes, the set is
//! aborted and every unfinished task gets a `SKIP` report.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use chrono::Utc;
use futures::{FutureExt as _, StreamExt as _, stream};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::blocks::TipSet;
use crate::datasource::DataSource;
use crate::extract::{ActorExtractor, ActorInfo, Extracted};
use crate::metrics::{self, TaskLabel, TaskStatusLabel};
use crate::model::ModelBatch;
use crate::model::reports::{DEADLINE_EXCEEDED, ProcessingReport, ReportStatus};
use crate::statediff::ActorStateChanges;
use crate::tasks::{ActorFilter, Extractor, TaskName};

pub use crate::extract::FatalTaskError;

/// Default number of actors an actor task extracts concurrently.
pub const DEFAULT_ACTOR_CONCURRENCY: usize = 16;

/// Outcome of one task on one tipset.
#[derive(Debug)]
pub struct ModelResult {
    pub task: TaskName,
    /// The reporter is left empty for the index manager to fill in.
    pub report: ProcessingReport,
    pub data: ModelBatch,
    pub current: Arc<TipSet>,
    pub executed: Arc<TipSet>,
}

enum Outcome {
    Done(ModelResult),
    Fatal(anyhow::Error),
}

/// Shared by the workers of one tipset.
struct TipSetContext {
    ds: Arc<DataSource>,
    current: Arc<TipSet>,
    executed: Arc<TipSet>,
    changes: OnceCell<Result<Arc<ActorStateChanges>, String>>,
    actor_concurrency: usize,
}

impl TipSetContext {
    fn report(
        &self,
        task: TaskName,
        started_at: chrono::DateTime<Utc>,
        status: ReportStatus,
        status_information: Option<String>,
        errors: &[anyhow::Error],
    ) -> ProcessingReport {
        ProcessingReport {
            height: self.current.epoch(),
            state_root: self.current.parent_state_root().to_string(),
            reporter: String::new(),
            task: task.to_string(),
            started_at,
            completed_at: Utc::now(),
            status,
            status_information,
            errors_detected: (!errors.is_empty()).then(|| {
                serde_json::Value::Array(
                    errors
                        .iter()
                        .map(|e| serde_json::Value::String(format!("{e:#}")))
                        .collect(),
                )
            }),
        }
    }

    fn result(&self, task: TaskName, report: ProcessingReport, data: ModelBatch) -> ModelResult {
        ModelResult {
            task,
            report,
            data,
            current: self.current.clone(),
            executed: self.executed.clone(),
        }
    }

    async fn actor_changes(&self) -> Result<Arc<ActorStateChanges>, String> {
        self.changes
            .get_or_init(|| async {
                self.ds
                    .actor_state_changes(&self.current, &self.executed)
                    .await
                    .map_err(|e| format!("{e:#}"))
            })
            .await
            .clone()
    }

    async fn extract_actors(
        &self,
        extractor: &Arc<dyn ActorExtractor>,
        filter: &ActorFilter,
    ) -> anyhow::Result<Extracted> {
        let changes = self
            .actor_changes()
            .await
            .map_err(|e| anyhow::anyhow!("state diff failed: {e}"))?;
        let codes = self.ds.actor_codes(&self.executed).await?;
        let infos: Vec<ActorInfo> = changes
            .iter()
            .filter(|(_, change)| filter.matches(&codes, &change.actor.code))
            .map(|(address, change)| ActorInfo {
                address: *address,
                actor: change.actor.clone(),
                change: change.change,
                current: self.current.clone(),
                executed: self.executed.clone(),
            })
            .collect();
        let results: Vec<anyhow::Result<ModelBatch>> = stream::iter(infos)
            .map(|info| async move {
                extractor
                    .extract(&self.ds, &info)
                    .await
                    .with_context(|| format!("actor {}", info.address))
            })
            .buffer_unordered(self.actor_concurrency.max(1))
            .collect()
            .await;

        let mut out = Extracted::default();
        for result in results {
            match result {
                Ok(mut models) => out.models.append(&mut models),
                Err(e) if FatalTaskError::is_fatal(&e) => return Err(e),
                Err(e) => out.errors.push(e),
            }
        }
        Ok(out)
    }

    async fn extract(&self, extractor: &Extractor) -> anyhow::Result<Extracted> {
        match extractor {
            Extractor::TipSet(e) => e.extract(&self.ds, &self.current).await,
            Extractor::TipSetPair(e) => e.extract(&self.ds, &self.current, &self.executed).await,
            Extractor::Actor { extractor, filter } => self.extract_actors(extractor, filter).await,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

async fn run_task(ctx: Arc<TipSetContext>, task: TaskName, extractor: Extractor) -> (TaskName, Outcome) {
    let started_at = Utc::now();
    let start = Instant::now();
    let extracted = AssertUnwindSafe(ctx.extract(&extractor)).catch_unwind().await;
    metrics::TASK_DURATION
        .get_or_create(&TaskLabel { task: task.into() })
        .observe(start.elapsed().as_secs_f64());
    let outcome = match extracted {
        Err(panic) => Outcome::Fatal(anyhow::anyhow!(
            "task {task} panicked at height {}: {}",
            ctx.current.epoch(),
            panic_message(panic.as_ref())
        )),
        Ok(Err(e)) if FatalTaskError::is_fatal(&e) => Outcome::Fatal(e),
        Ok(Err(e)) => {
            let errors = [e];
            let report = ctx.report(task, started_at, ReportStatus::Error, None, &errors);
            Outcome::Done(ctx.result(task, report, vec![]))
        }
        Ok(Ok(extracted)) => {
            let status =
                ReportStatus::derive(!extracted.errors.is_empty(), extracted.status_info.as_deref());
            let report = ctx.report(
                task,
                started_at,
                status,
                extracted.status_info,
                &extracted.errors,
            );
            Outcome::Done(ctx.result(task, report, extracted.models))
        }
    };
    (task, outcome)
}

/// Fans the configured tasks out over one tipset pair.
pub struct StateProcessor {
    ds: Arc<DataSource>,
    tasks: Vec<(TaskName, Extractor)>,
    actor_concurrency: usize,
}

impl StateProcessor {
    pub fn new(ds: Arc<DataSource>, tasks: Vec<(TaskName, Extractor)>) -> Self {
        Self {
            ds,
            tasks,
            actor_concurrency: DEFAULT_ACTOR_CONCURRENCY,
        }
    }

    pub fn with_actor_concurrency(mut self, actor_concurrency: usize) -> Self {
        self.actor_concurrency = actor_concurrency;
        self
    }

    pub fn data_source(&self) -> &Arc<DataSource> {
        &self.ds
    }

    pub fn task_names(&self) -> impl Iterator<Item = TaskName> + '_ {
        self.tasks.iter().map(|(task, _)| *task)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// A processor running only those of its tasks that are in `tasks`.
    pub fn restricted_to(&self, tasks: &[TaskName]) -> Self {
        Self {
            ds: self.ds.clone(),
            tasks: self
                .tasks
                .iter()
                .filter(|(task, _)| tasks.contains(task))
                .cloned()
                .collect(),
            actor_concurrency: self.actor_concurrency,
        }
    }

    /// Starts processing `current`, whose parent state results from executing
    /// `executed`. Returns the per-task results and the fatal errors. Both
    /// channels close once every task reported or the deadline passed.
    pub fn process(
        &self,
        current: Arc<TipSet>,
        executed: Arc<TipSet>,
        deadline: Option<tokio::time::Instant>,
    ) -> (flume::Receiver<ModelResult>, flume::Receiver<anyhow::Error>) {
        let capacity = self.tasks.len().max(1);
        let (results_tx, results_rx) = flume::bounded(capacity);
        let (fatal_tx, fatal_rx) = flume::bounded(capacity);
        let ctx = Arc::new(TipSetContext {
            ds: self.ds.clone(),
            current,
            executed,
            changes: OnceCell::new(),
            actor_concurrency: self.actor_concurrency,
        });
        tokio::spawn(collect(ctx, self.tasks.clone(), deadline, results_tx, fatal_tx));
        (results_rx, fatal_rx)
    }
}

async fn collect(
    ctx: Arc<TipSetContext>,
    tasks: Vec<(TaskName, Extractor)>,
    deadline: Option<tokio::time::Instant>,
    results: flume::Sender<ModelResult>,
    fatal: flume::Sender<anyhow::Error>,
) {
    let started_at = Utc::now();
    let mut pending = BTreeSet::new();
    let mut workers = JoinSet::new();
    for (task, extractor) in tasks {
        pending.insert(task);
        workers.spawn(run_task(ctx.clone(), task, extractor));
    }
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expired);

    loop {
        tokio::select! {
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok((task, Outcome::Done(result)))) => {
                    pending.remove(&task);
                    metrics::TASK_REPORTS
                        .get_or_create(&TaskStatusLabel {
                            task: task.into(),
                            status: result.report.status.into(),
                        })
                        .inc();
                    if results.send_async(result).await.is_err() {
                        debug!("results dropped at height {}, stopping", ctx.current.epoch());
                        workers.abort_all();
                        return;
                    }
                }
                Some(Ok((task, Outcome::Fatal(e)))) => {
                    pending.remove(&task);
                    let _ = fatal.send_async(e).await;
                }
                // panics are caught inside the worker, so this is a cancellation
                Some(Err(e)) => debug!("worker stopped: {e}"),
            },
            () = &mut expired => {
                workers.abort_all();
                warn!(
                    "deadline exceeded at height {} with {} unfinished tasks",
                    ctx.current.epoch(),
                    pending.len()
                );
                for task in std::mem::take(&mut pending) {
                    let mut report = ctx.report(
                        task,
                        started_at,
                        ReportStatus::Skip,
                        Some(DEADLINE_EXCEEDED.into()),
                        &[],
                    );
                    report.completed_at = Utc::now();
                    metrics::TASK_REPORTS
                        .get_or_create(&TaskStatusLabel {
                            task: task.into(),
                            status: ReportStatus::Skip.into(),
                        })
                        .inc();
                    if results.send_async(ctx.result(task, report, vec![])).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
}
