// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod config;

use std::path::PathBuf;

use clap::Args;

pub use self::config::*;
use crate::cli_shared::logger::LoggingColor;

/// Options shared by every command.
#[derive(Default, Debug, Args)]
pub struct CliOpts {
    /// A TOML file containing relevant configurations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Enable or disable colored logging in `stdout`
    #[arg(long, global = true, default_value = "auto")]
    pub color: LoggingColor,
    /// Also write logs to hourly rotated files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    /// Log JSON lines instead of text
    #[arg(long, global = true)]
    pub log_json: bool,
}
