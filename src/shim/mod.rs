// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Thin aliases over the `fvm_shared` types the indexer speaks in, so the rest
//! of the crate does not depend on a particular `fvm_shared` major version.

pub mod address {
    pub use fvm_shared4::address::{Address, Error, Network, Protocol};

    /// Parses an address carrying either the mainnet or the testnet prefix.
    pub fn parse(s: &str) -> Result<Address, Error> {
        Network::Mainnet
            .parse_address(s)
            .or_else(|_| Network::Testnet.parse_address(s))
    }
}

pub mod clock {
    pub use fvm_shared4::clock::ChainEpoch;
}

pub mod econ {
    pub use fvm_shared4::econ::TokenAmount;
}

pub mod error {
    pub use fvm_shared4::error::ExitCode;
}

pub mod message;

pub mod receipt {
    pub use fvm_shared4::receipt::Receipt;
}

pub mod bigint {
    pub use fvm_shared4::bigint::bigint_ser;
    pub use num_bigint::BigInt;
}

/// Network version, as reported by the node.
pub type NetworkVersion = u32;
