// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smart_default::SmartDefault;
use tracing_subscriber::filter::LevelFilter;

use crate::processor::DEFAULT_ACTOR_CONCURRENCY;
use crate::utils::RetryArgs;

/// `"1m 30s"` style durations.
mod humantime_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        humantime::parse_duration(&String::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Connection to the chain node.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, SmartDefault)]
#[serde(default)]
pub struct Client {
    /// `[token:]multiaddr` or URL of the node API. `FULLNODE_API_INFO` is
    /// used when unset.
    pub api_info: Option<String>,
    /// Replaces the token of `api_info`.
    pub token: Option<String>,
    /// How often the head is polled while watching.
    #[default(crate::rpc_client::DEFAULT_POLL_INTERVAL)]
    #[serde(with = "humantime_duration")]
    pub poll_interval: Duration,
    /// Attempts per node call.
    #[default(3)]
    pub max_retries: usize,
    /// Budget of one node call, retries included.
    #[default(Duration::from_secs(120))]
    #[serde(with = "humantime_duration")]
    pub call_timeout: Duration,
}

impl Client {
    pub fn retry_args(&self) -> RetryArgs {
        RetryArgs {
            timeout: Some(self.call_timeout),
            max_retries: Some(self.max_retries),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Rows are kept in memory and lost on exit.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, SmartDefault)]
#[serde(default)]
pub struct Storage {
    pub backend: StorageBackend,
    #[default(PathBuf::from("forest-indexer.sqlite"))]
    pub sqlite_path: PathBuf,
    /// Also writes every indexed record to this CAR archive.
    pub archive: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, SmartDefault)]
#[serde(default)]
pub struct Indexer {
    /// Name recorded on processing and gap reports.
    #[default("forest-indexer".into())]
    pub reporter: String,
    /// Tasks to run, every task when empty.
    pub tasks: Vec<String>,
    /// Time budget of one tipset.
    #[serde(with = "humantime_duration::option")]
    pub window: Option<Duration>,
    /// Tipsets indexed in parallel while watching.
    #[default(1)]
    pub workers: usize,
    /// Tipsets applied on top of a head before it is indexed.
    #[default(2)]
    pub confidence: usize,
    /// Actors processed concurrently by actor tasks.
    #[default(DEFAULT_ACTOR_CONCURRENCY)]
    pub actor_concurrency: usize,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default)]
pub struct Metrics {
    /// Serves `/metrics` on this address, e.g. `127.0.0.1:6116`.
    pub address: Option<SocketAddr>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct LogLevelFilter(pub LevelFilter);

impl Serialize for LogLevelFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.to_string().to_uppercase())
    }
}

impl<'de> Deserialize<'de> for LogLevelFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Case insensitive.
        LevelFilter::from_str(&String::deserialize(deserializer)?)
            .map(LogLevelFilter)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    pub level: LogLevelFilter,
}

impl LogValue {
    pub fn new(module: &str, level: LevelFilter) -> Self {
        Self {
            module: module.to_string(),
            level: LogLevelFilter(level),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct Log {
    pub filters: Vec<LogValue>,
}

impl Log {
    pub(in crate::cli_shared) fn to_filter_string(&self) -> String {
        self.filters
            .iter()
            .map(|f| format!("{}={}", f.module, f.level.0))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            filters: vec![
                LogValue::new("axum", LevelFilter::WARN),
                LogValue::new("hyper", LevelFilter::WARN),
                LogValue::new("jsonrpsee", LevelFilter::WARN),
                LogValue::new("sqlx", LevelFilter::WARN),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub storage: Storage,
    pub indexer: Indexer,
    pub metrics: Metrics,
    pub log: Log,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck::Arbitrary;
    use quickcheck_macros::quickcheck;
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Debug)]
    struct ConfigPartial(Config);

    impl Arbitrary for ConfigPartial {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let secs = |g: &mut quickcheck::Gen| Duration::from_secs(u64::from(u32::arbitrary(g)));
            ConfigPartial(Config {
                client: Client {
                    api_info: Option::arbitrary(g),
                    token: Option::arbitrary(g),
                    poll_interval: secs(g),
                    max_retries: usize::from(u16::arbitrary(g)),
                    call_timeout: secs(g),
                },
                storage: Storage {
                    backend: if bool::arbitrary(g) {
                        StorageBackend::Memory
                    } else {
                        StorageBackend::Sqlite
                    },
                    sqlite_path: PathBuf::arbitrary(g),
                    archive: Option::arbitrary(g),
                },
                indexer: Indexer {
                    reporter: String::arbitrary(g),
                    tasks: Vec::arbitrary(g),
                    window: bool::arbitrary(g).then(|| secs(g)),
                    workers: usize::from(u16::arbitrary(g)),
                    confidence: usize::from(u16::arbitrary(g)),
                    actor_concurrency: usize::from(u16::arbitrary(g)),
                },
                metrics: Metrics {
                    address: Option::arbitrary(g),
                },
                log: Log::default(),
            })
        }
    }

    #[quickcheck]
    fn test_config_all_params_under_section(config: ConfigPartial) {
        let serialized_config =
            toml::to_string(&config.0).expect("could not serialize the configuration");
        assert_eq!(
            serialized_config
                .trim_start()
                .chars()
                .next()
                .expect("configuration empty"),
            '['
        )
    }

    #[test]
    fn test_default_log_filters() {
        let config = Log::default();
        EnvFilter::builder()
            .parse(config.to_filter_string())
            .unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [client]
            api_info = "/ip4/10.0.0.1/tcp/1234/http"

            [indexer]
            tasks = ["blocks", "messages"]
            window = "30s"

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.client.api_info.as_deref(),
            Some("/ip4/10.0.0.1/tcp/1234/http")
        );
        assert_eq!(config.indexer.window, Some(Duration::from_secs(30)));
        assert_eq!(config.indexer.workers, 1);
        assert_eq!(config.indexer.reporter, "forest-indexer");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.metrics, Metrics::default());
    }

    #[test]
    fn default_round_trips() {
        let config = Config::default();
        let back: Config = toml::from_str(&toml::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
