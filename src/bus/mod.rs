// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Topic router connecting the stages of an export.
//!
//! Every handler owns a bounded input channel and subscribes to the topics
//! its matcher accepts. Emission awaits room in each matching channel, so a
//! slow handler slows the emitter down.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use tokio::task::JoinSet;
use tracing::debug;

/// Capacity of each handler's input channel.
pub const HANDLER_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait Handler<In, Out>: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Topics the handler consumes.
    fn matcher(&self) -> anyhow::Result<Regex>;

    /// Consumes `input` until it closes.
    async fn handle(
        self: Arc<Self>,
        input: flume::Receiver<In>,
        output: flume::Sender<Out>,
    ) -> anyhow::Result<()>;
}

/// Exact topic matcher.
pub fn exact(topic: &str) -> anyhow::Result<Regex> {
    Ok(Regex::new(&format!("^{}$", regex::escape(topic)))?)
}

struct Route<In> {
    name: String,
    matcher: Regex,
    input: flume::Sender<In>,
}

pub struct Router<In, Out> {
    routes: Vec<Route<In>>,
    handlers: JoinSet<anyhow::Result<()>>,
    _output: std::marker::PhantomData<Out>,
}

impl<In, Out> Router<In, Out>
where
    In: Clone + Send + 'static,
    Out: Send + 'static,
{
    /// Starts every handler and returns the router with the channel all
    /// handlers write to. The channel closes once the router is stopped.
    pub fn new(
        handlers: Vec<Arc<dyn Handler<In, Out>>>,
    ) -> anyhow::Result<(Self, flume::Receiver<Out>)> {
        let (output_tx, output_rx) = flume::bounded(HANDLER_CHANNEL_CAPACITY);
        let mut routes = Vec::with_capacity(handlers.len());
        let mut set = JoinSet::new();
        for handler in handlers {
            let name = handler.name();
            let matcher = handler
                .matcher()
                .with_context(|| format!("bad matcher for handler {name}"))?;
            let (input_tx, input_rx) = flume::bounded(HANDLER_CHANNEL_CAPACITY);
            let output = output_tx.clone();
            let task_name = name.clone();
            set.spawn(async move {
                handler
                    .handle(input_rx, output)
                    .await
                    .with_context(|| format!("handler {task_name}"))
            });
            routes.push(Route {
                name,
                matcher,
                input: input_tx,
            });
        }
        Ok((
            Self {
                routes,
                handlers: set,
                _output: Default::default(),
            },
            output_rx,
        ))
    }

    /// Delivers `msg` to every handler subscribed to `topic`. Returns the
    /// number of handlers reached.
    pub async fn emit(&self, topic: &str, msg: In) -> anyhow::Result<usize> {
        let mut delivered = 0;
        for route in self.routes.iter().filter(|r| r.matcher.is_match(topic)) {
            route
                .input
                .send_async(msg.clone())
                .await
                .map_err(|_| anyhow::anyhow!("handler {} stopped", route.name))?;
            delivered += 1;
        }
        if delivered == 0 {
            debug!("no handler for topic {topic}");
        }
        Ok(delivered)
    }

    /// Closes every input, waits for the handlers and returns the first error.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        self.routes.clear();
        let mut first = None;
        while let Some(joined) = self.handlers.join_next().await {
            let result = joined.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = result
                && first.is_none()
            {
                first = Some(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper {
        topic: &'static str,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Handler<String, String> for Upper {
        fn name(&self) -> String {
            format!("upper-{}", self.topic)
        }

        fn matcher(&self) -> anyhow::Result<Regex> {
            match self.topic {
                "*" => Ok(Regex::new(".*")?),
                topic => exact(topic),
            }
        }

        async fn handle(
            self: Arc<Self>,
            input: flume::Receiver<String>,
            output: flume::Sender<String>,
        ) -> anyhow::Result<()> {
            while let Ok(msg) = input.recv_async().await {
                if Some(msg.as_str()) == self.fail_on {
                    anyhow::bail!("cannot handle {msg}");
                }
                output
                    .send_async(format!("{}:{}", self.topic, msg.to_uppercase()))
                    .await?;
            }
            Ok(())
        }
    }

    fn handlers(fail_on: Option<&'static str>) -> Vec<Arc<dyn Handler<String, String>>> {
        vec![
            Arc::new(Upper { topic: "a", fail_on }),
            Arc::new(Upper { topic: "*", fail_on: None }),
        ]
    }

    #[tokio::test]
    async fn routes_by_topic_in_emission_order() {
        let (router, output) = Router::new(handlers(None)).unwrap();
        assert_eq!(router.emit("a", "x".into()).await.unwrap(), 2);
        assert_eq!(router.emit("b", "y".into()).await.unwrap(), 1);
        assert_eq!(router.emit("a", "z".into()).await.unwrap(), 2);
        router.stop().await.unwrap();
        let out: Vec<String> = output.drain().collect();
        let exact: Vec<&String> = out.iter().filter(|m| m.starts_with("a:")).collect();
        assert_eq!(exact, vec!["a:X", "a:Z"]);
        let all: Vec<&String> = out.iter().filter(|m| m.starts_with("*:")).collect();
        assert_eq!(all, vec!["*:X", "*:Y", "*:Z"]);
    }

    #[tokio::test]
    async fn stop_returns_the_handler_error() {
        let (router, _output) = Router::new(handlers(Some("bad"))).unwrap();
        router.emit("a", "bad".into()).await.unwrap();
        let err = router.stop().await.unwrap_err();
        assert!(format!("{err:#}").contains("cannot handle bad"));
    }

    #[tokio::test]
    async fn dotted_topics_match_exactly() {
        let matcher = exact("v1:Message:tipset").unwrap();
        assert!(matcher.is_match("v1:Message:tipset"));
        assert!(!matcher.is_match("v1:MessageX:tipset"));
        assert!(!matcher.is_match("xv1:Message:tipset"));
    }
}
