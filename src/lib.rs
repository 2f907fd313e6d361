// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![recursion_limit = "1024"]

pub mod actors;
pub mod archive;
pub mod blocks;
pub mod bus;
pub mod chain;
pub mod chain_follow;
mod cli;
mod cli_shared;
pub mod datasource;
pub mod export;
pub mod extract;
pub mod gaps;
pub mod gas;
pub mod index;
pub mod ipld;
pub mod lotus_json;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod rpc_client;
pub mod shim;
pub mod statediff;
pub mod storage;
pub mod tasks;
#[cfg(test)]
mod test_utils;
pub mod transform;
pub mod utils;

pub use cli::main::main as indexer_main;
pub use cli_shared::cli::Config;
