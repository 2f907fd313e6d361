// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser as _;
use tracing::error;

use super::subcommands::{Cli, ConfigError};
use crate::cli_shared::{logger, read_config};

/// Exit code of bad configuration or arguments, the one `clap` uses too.
const CONFIG_ERROR: u8 = 2;
const FATAL: u8 = 1;

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> ExitCode
where
    ArgT: Into<OsString> + Clone,
{
    ExitCode::from(run(args))
}

fn run<ArgT>(args: impl IntoIterator<Item = ArgT>) -> u8
where
    ArgT: Into<OsString> + Clone,
{
    // Capture Cli inputs
    let Cli { opts, cmd } = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let config = match read_config(opts.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return CONFIG_ERROR;
        }
    };
    let _guards = logger::setup_logger(&opts, &config.log);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start the async runtime: {e}");
            return FATAL;
        }
    };
    match runtime.block_on(cmd.run(config)) {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:#}");
            exit_code(&e)
        }
    }
}

fn exit_code(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<ConfigError>().is_some() {
        CONFIG_ERROR
    } else {
        FATAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn config_errors_exit_with_two() {
        let e = anyhow::Error::from(ConfigError(anyhow::anyhow!("bad tasks")))
            .context("setting up");
        assert_eq!(exit_code(&e), CONFIG_ERROR);
        let e = Err::<(), _>(anyhow::anyhow!("node unreachable"))
            .context("walking")
            .unwrap_err();
        assert_eq!(exit_code(&e), FATAL);
    }

    #[test]
    fn bad_config_file_exits_with_two() {
        let code = run(["forest-indexer", "--config", "/no/such/file.toml", "walk"]);
        assert_eq!(code, CONFIG_ERROR);
    }
}
