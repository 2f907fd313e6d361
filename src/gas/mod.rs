// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Base fee and post-execution gas accounting.

use num_traits::Zero as _;

use crate::shim::{bigint::BigInt, econ::TokenAmount};

pub const BLOCK_GAS_LIMIT: u64 = 10_000_000_000;
pub const BLOCK_GAS_TARGET: u64 = BLOCK_GAS_LIMIT / 2;
pub const BASE_FEE_MAX_CHANGE_DENOM: i64 = 8; // 12.5%;
pub const INITIAL_BASE_FEE: i64 = 100_000_000; // Genesis base fee
pub const MINIMUM_BASE_FEE: i64 = 100;
pub const GAS_OVERUSE_NUM: u64 = 11;
pub const GAS_OVERUSE_DENOM: u64 = 10;

/// Base fee of the next tipset given the gas limit its parent's blocks used.
pub fn compute_next_base_fee(
    base_fee: &TokenAmount,
    gas_limit_used: u64,
    no_of_blocks: usize,
) -> TokenAmount {
    let delta = i128::from(gas_limit_used / no_of_blocks.max(1) as u64)
        - i128::from(BLOCK_GAS_TARGET);
    let mut change = base_fee.atto() * BigInt::from(delta);
    change /= BLOCK_GAS_TARGET;
    change /= BASE_FEE_MAX_CHANGE_DENOM;
    let next = base_fee.atto() + change;
    TokenAmount::from_atto(next.max(BigInt::from(MINIMUM_BASE_FEE)))
}

/// How much of the unused gas is refunded and how much burned for
/// over-estimating the limit. Returns `(refund, burn)`.
pub fn compute_gas_overestimation_burn(gas_used: u64, gas_limit: u64) -> (u64, u64) {
    if gas_used == 0 {
        return (0, gas_limit);
    }
    let allowed =
        u128::from(gas_used) * u128::from(GAS_OVERUSE_NUM) / u128::from(GAS_OVERUSE_DENOM);
    if u128::from(gas_limit) < allowed {
        return (gas_limit.saturating_sub(gas_used), 0);
    }
    let over = (u128::from(gas_limit) - allowed).min(u128::from(gas_used));
    let unused = gas_limit.saturating_sub(gas_used);
    let burn = u64::try_from(u128::from(unused) * over / u128::from(gas_used)).unwrap_or(unused);
    (unused - burn, burn)
}

/// Post-execution accounting of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GasOutputs {
    pub base_fee_burn: TokenAmount,
    pub over_estimation_burn: TokenAmount,
    pub miner_penalty: TokenAmount,
    pub miner_tip: TokenAmount,
    pub refund: TokenAmount,
    pub gas_refund: u64,
    pub gas_burned: u64,
}

/// Splits what a message paid for gas between burning, the miner and the sender.
///
/// The base fee is only burned when `charge_network_fee` holds.
pub fn compute_gas_outputs(
    gas_used: u64,
    gas_limit: u64,
    base_fee: &TokenAmount,
    fee_cap: &TokenAmount,
    gas_premium: &TokenAmount,
    charge_network_fee: bool,
) -> GasOutputs {
    let base_fee = base_fee.atto();
    let fee_cap = fee_cap.atto();
    let used = BigInt::from(gas_used);
    let limit = BigInt::from(gas_limit);

    let mut miner_penalty = BigInt::zero();
    let base_fee_to_pay = if base_fee > fee_cap {
        miner_penalty = (base_fee - fee_cap) * &used;
        fee_cap.clone()
    } else {
        base_fee.clone()
    };
    let base_fee_burn = if charge_network_fee {
        &base_fee_to_pay * &used
    } else {
        BigInt::zero()
    };
    let miner_tip_per_gas = gas_premium.atto().clone().min(fee_cap - &base_fee_to_pay);
    let miner_tip = miner_tip_per_gas * &limit;

    let (gas_refund, gas_burned) = compute_gas_overestimation_burn(gas_used, gas_limit);
    let mut over_estimation_burn = BigInt::zero();
    if gas_burned != 0 {
        let burned = BigInt::from(gas_burned);
        over_estimation_burn = &base_fee_to_pay * &burned;
        miner_penalty += (base_fee - &base_fee_to_pay) * &burned;
    }

    let refund = (fee_cap * &limit - &base_fee_burn - &miner_tip - &over_estimation_burn)
        .max(BigInt::zero());
    GasOutputs {
        base_fee_burn: TokenAmount::from_atto(base_fee_burn),
        over_estimation_burn: TokenAmount::from_atto(over_estimation_burn),
        miner_penalty: TokenAmount::from_atto(miner_penalty),
        miner_tip: TokenAmount::from_atto(miner_tip),
        refund: TokenAmount::from_atto(refund),
        gas_refund,
        gas_burned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Zero as _;
    use rstest::rstest;

    #[rstest]
    #[case(100_000_000, 0, 1, 87_500_000)]
    #[case(100_000_000, 0, 5, 87_500_000)]
    #[case(100_000_000, BLOCK_GAS_TARGET, 1, 100_000_000)]
    #[case(100_000_000, BLOCK_GAS_TARGET * 2, 2, 100_000_000)]
    #[case(100_000_000, BLOCK_GAS_LIMIT * 2, 2, 112_500_000)]
    #[case(100_000_000, BLOCK_GAS_LIMIT * 15 / 10, 2, 106_250_000)]
    #[case(100, 0, 1, MINIMUM_BASE_FEE)]
    fn next_base_fee(
        #[case] base_fee: i64,
        #[case] limit_used: u64,
        #[case] blocks: usize,
        #[case] expected: i64,
    ) {
        assert_eq!(
            compute_next_base_fee(&TokenAmount::from_atto(base_fee), limit_used, blocks),
            TokenAmount::from_atto(expected)
        );
    }

    #[rstest]
    #[case(0, 1000, (0, 1000))]
    #[case(1000, 1000, (0, 0))]
    #[case(1000, 1100, (100, 0))]
    #[case(1000, 2000, (100, 900))]
    #[case(1000, 5000, (0, 4000))]
    fn overestimation_burn(#[case] used: u64, #[case] limit: u64, #[case] expected: (u64, u64)) {
        assert_eq!(compute_gas_overestimation_burn(used, limit), expected);
    }

    #[test]
    fn gas_outputs_add_up() {
        let base_fee = TokenAmount::from_atto(100);
        let fee_cap = TokenAmount::from_atto(150);
        let premium = TokenAmount::from_atto(10);
        let out = compute_gas_outputs(1000, 2000, &base_fee, &fee_cap, &premium, true);
        assert_eq!(out.base_fee_burn, TokenAmount::from_atto(100_000));
        assert_eq!(out.miner_tip, TokenAmount::from_atto(20_000));
        assert_eq!(out.gas_burned, 900);
        assert_eq!(out.over_estimation_burn, TokenAmount::from_atto(90_000));
        assert_eq!(out.miner_penalty, TokenAmount::zero());
        assert_eq!(
            out.base_fee_burn.atto()
                + out.over_estimation_burn.atto()
                + out.miner_tip.atto()
                + out.refund.atto(),
            fee_cap.atto() * 2000u64
        );
    }

    #[test]
    fn fee_cap_below_base_fee_penalizes_miner() {
        let base_fee = TokenAmount::from_atto(200);
        let fee_cap = TokenAmount::from_atto(150);
        let premium = TokenAmount::from_atto(10);
        let out = compute_gas_outputs(1000, 1000, &base_fee, &fee_cap, &premium, true);
        assert_eq!(out.miner_penalty, TokenAmount::from_atto(50_000));
        assert_eq!(out.base_fee_burn, TokenAmount::from_atto(150_000));
        assert_eq!(out.miner_tip, TokenAmount::zero());
        assert_eq!(out.refund, TokenAmount::zero());
    }

    #[test]
    fn no_network_fee() {
        let fee = TokenAmount::from_atto(100);
        let out = compute_gas_outputs(1000, 1000, &fee, &fee, &TokenAmount::zero(), false);
        assert_eq!(out.base_fee_burn, TokenAmount::zero());
        assert_eq!(out.refund, TokenAmount::from_atto(100_000));
    }
}
