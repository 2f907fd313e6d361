// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::IsTerminal as _;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer as _, Registry, prelude::*};

use crate::cli_shared::cli::{CliOpts, Log};

#[derive(Debug, Default, Clone, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum LoggingColor {
    Always,
    #[default]
    Auto,
    Never,
}

impl LoggingColor {
    pub fn coloring_enabled(&self) -> bool {
        match self {
            LoggingColor::Auto => std::io::stdout().is_terminal(),
            LoggingColor::Always => true,
            LoggingColor::Never => false,
        }
    }
}

/// Flushes the file logger when dropped.
#[derive(Default)]
pub struct Guards {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn tracing_subscriber::layer::Layer<Registry> + Send + Sync>;

pub fn setup_logger(opts: &CliOpts, log: &Log) -> Guards {
    let mut guards = Guards::default();
    let mut layers: Vec<BoxedLayer> = vec![console_layer(opts, log)];

    // file logger
    if let Some(log_dir) = &opts.log_dir {
        let file_appender = tracing_appender::rolling::hourly(log_dir, "forest-indexer.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        guards._file = Some(guard);
        let layer = tracing_subscriber::fmt::Layer::new()
            .with_ansi(false)
            .with_writer(writer);
        layers.push(if opts.log_json {
            layer.json().with_filter(get_env_filter(log)).boxed()
        } else {
            layer.with_filter(get_env_filter(log)).boxed()
        });
    }

    tracing_subscriber::registry().with(layers).init();
    guards
}

fn console_layer(opts: &CliOpts, log: &Log) -> BoxedLayer {
    if opts.log_json {
        tracing_subscriber::fmt::Layer::new()
            .json()
            .with_filter(get_env_filter(log))
            .boxed()
    } else {
        tracing_subscriber::fmt::Layer::new()
            .with_ansi(opts.color.coloring_enabled())
            .with_filter(get_env_filter(log))
            .boxed()
    }
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable,
/// or `info` narrowed by the configured module filters.
fn get_env_filter(log: &Log) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => default_env_filter(log),
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn default_env_filter(log: &Log) -> EnvFilter {
    let directives = match log.to_filter_string() {
        filters if filters.is_empty() => "info".to_string(),
        filters => format!("info,{filters}"),
    };
    // Invalid module names fall back to `info`.
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli_shared::cli::LogValue;
    use std::str::FromStr as _;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_default_env_filter() {
        let filter = default_env_filter(&Log::default());
        assert!(filter.to_string().contains("sqlx=warn"));
    }

    #[test]
    fn configured_filters_are_appended() {
        let log = Log {
            filters: vec![LogValue::new("indexer::tasks", LevelFilter::DEBUG)],
        };
        let filter = default_env_filter(&log).to_string();
        assert!(filter.contains("indexer::tasks=debug"));
        assert!(!filter.contains("sqlx"));
        assert_eq!(
            default_env_filter(&Log { filters: vec![] }).to_string(),
            "info"
        );
    }

    #[test]
    fn logging_color_from_str() {
        assert_eq!(LoggingColor::from_str("never").unwrap(), LoggingColor::Never);
        assert!(!LoggingColor::Never.coloring_enabled());
        assert!(LoggingColor::Always.coloring_enabled());
        assert!(LoggingColor::from_str("sometimes").is_err());
    }
}
