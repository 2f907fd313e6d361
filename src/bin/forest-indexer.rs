// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::process::ExitCode;

fn main() -> ExitCode {
    indexer::indexer_main(std::env::args_os())
}
