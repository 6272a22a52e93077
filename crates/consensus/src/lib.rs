//! Consensus constants, parameters, and activation schedule.

pub mod constants;
pub mod money;
pub mod params;
pub mod rewards;
pub mod upgrades;

pub use money::{Amount, COIN};
pub use params::{consensus_params, ConsensusParams, Network, ParamsError};
pub use rewards::{block_subsidy, initial_staking_pool_amount, staking_pool_subsidy};
pub use upgrades::{AccountId, Hash256};
