//! Subsidy and staking-pool funding schedule helpers.

use crate::money::{Amount, COIN};
use crate::params::ConsensusParams;

const INITIAL_BLOCK_SUBSIDY: Amount = 75 * COIN;

fn halvings(height: i32, params: &ConsensusParams) -> Option<u32> {
    if height < 0 || params.subsidy_halving_interval <= 0 {
        return None;
    }
    let halvings = (height / params.subsidy_halving_interval) as u32;
    if halvings >= 64 {
        return None;
    }
    Some(halvings)
}

pub fn block_subsidy(height: i32, params: &ConsensusParams) -> Amount {
    match halvings(height, params) {
        Some(halvings) => INITIAL_BLOCK_SUBSIDY >> halvings,
        None => 0,
    }
}

/// Portion of the block subsidy credited to the staking pool that mined it.
pub fn staking_pool_subsidy(height: i32, params: &ConsensusParams) -> Amount {
    if !params.is_saturn_active(height) {
        return 0;
    }
    block_subsidy(height, params) * params.staking_pool_subsidy_percent / 100
}

/// Minimum genesis stake that enables a pool created at `height`.
pub fn initial_staking_pool_amount(height: i32, params: &ConsensusParams) -> Amount {
    match halvings(height, params) {
        Some(halvings) => params.staking_initial_pool_amount >> halvings,
        None => 0,
    }
}
