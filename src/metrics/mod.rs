// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        gauge::Gauge,
        histogram::Histogram,
    },
};
use std::sync::LazyLock;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tracing::warn;

static DEFAULT_REGISTRY: LazyLock<RwLock<prometheus_client::registry::Registry>> =
    LazyLock::new(Default::default);

pub static LRU_CACHE_HIT: LazyLock<Family<KindLabel, Counter>> = LazyLock::new(|| {
    let metric = Family::default();
    DEFAULT_REGISTRY
        .write()
        .register("lru_cache_hit", "Stats of lru cache hit", metric.clone());
    metric
});
pub static LRU_CACHE_MISS: LazyLock<Family<KindLabel, Counter>> = LazyLock::new(|| {
    let metric = Family::default();
    DEFAULT_REGISTRY
        .write()
        .register("lru_cache_miss", "Stats of lru cache miss", metric.clone());
    metric
});

pub static NODE_CALL_FAILURES: LazyLock<Family<NodeMethodLabel, Counter>> =
    LazyLock::new(|| {
        let metric = Family::default();
        DEFAULT_REGISTRY.write().register(
            "indexer_node_call_failures",
            "Node API calls that failed or timed out",
            metric.clone(),
        );
        metric
    });

pub static NODE_CALL_DURATION: LazyLock<Family<NodeMethodLabel, Histogram>> =
    LazyLock::new(|| {
        let metric = Family::<NodeMethodLabel, Histogram>::new_with_constructor(default_histogram);
        DEFAULT_REGISTRY.write().register(
            "indexer_node_call_duration_seconds",
            "Duration of node API calls",
            metric.clone(),
        );
        metric
    });

pub static INDEXER_ACTIVE_WORKERS: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    DEFAULT_REGISTRY.write().register(
        "indexer_active_workers",
        "Number of tipsets being indexed",
        metric.clone(),
    );
    metric
});

pub static INDEXER_QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    DEFAULT_REGISTRY.write().register(
        "indexer_queue_depth",
        "Number of tipsets waiting for a worker",
        metric.clone(),
    );
    metric
});

pub static TIPSETS_INDEXED: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    DEFAULT_REGISTRY.write().register(
        "indexer_tipsets_indexed",
        "Number of tipsets indexed",
        metric.clone(),
    );
    metric
});

pub static TASK_REPORTS: LazyLock<Family<TaskStatusLabel, Counter>> = LazyLock::new(|| {
    let metric = Family::default();
    DEFAULT_REGISTRY.write().register(
        "indexer_task_reports",
        "Processing reports by task and status",
        metric.clone(),
    );
    metric
});

pub static TASK_DURATION: LazyLock<Family<TaskLabel, Histogram>> = LazyLock::new(|| {
    let metric = Family::<TaskLabel, Histogram>::new_with_constructor(default_histogram);
    DEFAULT_REGISTRY.write().register(
        "indexer_task_duration_seconds",
        "Duration of extraction tasks",
        metric.clone(),
    );
    metric
});

pub static WATCHER_HEAD: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    DEFAULT_REGISTRY.write().register(
        "indexer_watcher_head",
        "Epoch of the latest head the watcher has seen",
        metric.clone(),
    );
    metric
});

pub async fn init_prometheus(prometheus_listener: TcpListener) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(collect_prometheus_metrics))
        .layer(CompressionLayer::new());

    // Wait for server to exit
    Ok(axum::serve(prometheus_listener, app.into_make_service()).await?)
}

async fn collect_prometheus_metrics() -> impl IntoResponse {
    let mut metrics = String::new();
    if let Err(e) =
        prometheus_client::encoding::text::encode_registry(&mut metrics, &DEFAULT_REGISTRY.read())
    {
        warn!("failed to encode the default metrics registry: {e}");
    };
    if let Err(e) = prometheus_client::encoding::text::encode_eof(&mut metrics) {
        warn!("failed to encode metrics eof {e}");
    };
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodeMethodLabel {
    pub method: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet, derive_more::Constructor)]
pub struct KindLabel {
    kind: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TaskLabel {
    pub task: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TaskStatusLabel {
    pub task: &'static str,
    pub status: &'static str,
}

pub mod values {
    use super::KindLabel;

    /// Message executions memoized by the data source.
    pub const MESSAGE_EXECUTIONS: KindLabel = KindLabel::new("message_executions");
    /// Executed and block messages memoized by the data source.
    pub const EXECUTED_MESSAGES: KindLabel = KindLabel::new("executed_messages");
    /// Raw blocks read through the node.
    pub const NODE_BLOCKS: KindLabel = KindLabel::new("node_blocks");
}

pub fn default_histogram() -> Histogram {
    // Default values from go client(https://github.com/prometheus/client_golang/blob/5d584e2717ef525673736d72cd1d12e304f243d7/prometheus/histogram.go#L68)
    Histogram::new([
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_are_rendered() {
        TIPSETS_INDEXED.inc();
        LRU_CACHE_HIT.get_or_create(&values::NODE_BLOCKS).inc();
        let response = collect_prometheus_metrics().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("indexer_tipsets_indexed"));
        assert!(text.contains("lru_cache_hit"));
    }
}
