// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::ConfigError;
use crate::archive::ArchiveWriter;
use crate::cli_shared::cli::{Config, StorageBackend};
use crate::datasource::DataSource;
use crate::export::ModelExporter;
use crate::index::{IndexManager, IndexOptions};
use crate::metrics;
use crate::processor::StateProcessor;
use crate::rpc_client::{ApiInfo, LotusClient};
use crate::storage::{MemoryStorage, Stores};
use crate::tasks::{TaskName, TaskRegistry, parse_tasks};

/// Everything a command needs, built from the configuration.
pub struct IndexerContext {
    pub config: Config,
    pub ds: Arc<DataSource>,
    pub stores: Stores,
    pub tasks: Vec<TaskName>,
    pub manager: Arc<IndexManager>,
    archive: Option<(PathBuf, Arc<ArchiveWriter>)>,
}

impl IndexerContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let tasks = configured_tasks(&config).map_err(ConfigError)?;
        let client = lotus_client(&config).map_err(ConfigError)?;
        info!("indexing {} tasks from {}", tasks.len(), client.url());
        let ds = Arc::new(
            DataSource::new(Arc::new(client))?.with_retry(config.client.retry_args()),
        );
        let stores = open_stores(&config).await?;
        let processor = StateProcessor::new(ds.clone(), TaskRegistry::default().select(&tasks)?)
            .with_actor_concurrency(config.indexer.actor_concurrency);
        let mut exporter = ModelExporter::for_storage(&stores);
        let archive = config
            .storage
            .archive
            .clone()
            .map(|path| (path, Arc::new(ArchiveWriter::new())));
        if let Some((_, writer)) = &archive {
            exporter = exporter.with_archive(writer.clone());
        }
        let manager = IndexManager::new(
            processor,
            exporter,
            IndexOptions {
                reporter: config.indexer.reporter.clone(),
                window: config.indexer.window,
                workers: config.indexer.workers,
            },
        );
        if let Some(address) = config.metrics.address {
            serve_metrics(address).await?;
        }
        Ok(Self {
            config,
            ds,
            stores,
            tasks,
            manager: Arc::new(manager),
            archive,
        })
    }

    /// Writes the archive, if one is configured.
    pub async fn finish(&self) -> anyhow::Result<()> {
        if let Some((path, writer)) = &self.archive {
            if writer.staged_tipsets() == 0 {
                warn!("nothing to archive");
                return Ok(());
            }
            let root = writer
                .write_file(path)
                .await
                .with_context(|| format!("writing archive {}", path.display()))?;
            info!(
                "archived {} tipsets to {} with root {root}",
                writer.staged_tipsets(),
                path.display()
            );
        }
        Ok(())
    }
}

fn configured_tasks(config: &Config) -> anyhow::Result<Vec<TaskName>> {
    let tasks = parse_tasks(&config.indexer.tasks.join(","))?;
    Ok(if tasks.is_empty() {
        TaskName::all()
    } else {
        tasks
    })
}

fn lotus_client(config: &Config) -> anyhow::Result<LotusClient> {
    let info = match &config.client.api_info {
        Some(info) => info.parse::<ApiInfo>()?,
        None => ApiInfo::from_env()?,
    }
    .set_token(config.client.token.clone());
    Ok(LotusClient::new(&info)?.with_poll_interval(config.client.poll_interval))
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("indexed rows are kept in memory only");
            Ok(Stores::new(Arc::new(MemoryStorage::default())))
        }
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => {
            let path = &config.storage.sqlite_path;
            let storage = crate::storage::SqliteStorage::open_file(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Ok(Stores::new(Arc::new(storage)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => Err(ConfigError(anyhow::anyhow!(
            "the sqlite backend is unavailable, forest-indexer needs to be recompiled with the `sqlite` feature"
        ))
        .into()),
    }
}

async fn serve_metrics(address: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding the metrics endpoint to {address}"))?;
    info!("serving metrics on http://{address}/metrics");
    tokio::spawn(async move {
        if let Err(e) = metrics::init_prometheus(listener).await {
            warn!("metrics endpoint stopped: {e:#}");
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_task_by_default() {
        assert_eq!(configured_tasks(&Config::default()).unwrap(), TaskName::all());
        let mut config = Config::default();
        config.indexer.tasks = vec!["blocks".into(), "blocks".into(), "messages".into()];
        assert_eq!(
            configured_tasks(&config).unwrap(),
            vec![TaskName::Blocks, TaskName::Messages]
        );
        config.indexer.tasks = vec!["bogus".into()];
        assert!(configured_tasks(&config).is_err());
    }

    #[tokio::test]
    async fn bad_api_info_is_a_config_error() {
        let mut config = Config::default();
        config.client.api_info = Some("/ip4/127.0.0.1/tcp/1234/ws/foo".into());
        config.storage.backend = StorageBackend::Memory;
        let Err(e) = IndexerContext::new(config).await else {
            panic!("expected an error");
        };
        assert!(e.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn memory_context() {
        let mut config = Config::default();
        config.client.api_info = Some("http://127.0.0.1:1234/rpc/v1".into());
        config.storage.backend = StorageBackend::Memory;
        config.indexer.tasks = vec!["blocks".into()];
        let ctx = IndexerContext::new(config).await.unwrap();
        assert_eq!(ctx.tasks, vec![TaskName::Blocks]);
        assert_eq!(ctx.manager.options().reporter, "forest-indexer");
        ctx.finish().await.unwrap();
    }
}
