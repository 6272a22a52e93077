//! Consensus parameter definitions.

use std::fmt;

use crate::constants::MAX_PLOT_FILTER_BITS;
use crate::money::{money_range, Amount, COIN};
use crate::upgrades::{AccountId, NetworkUpgrade, UpgradeIndex, MAX_NETWORK_UPGRADES};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Some(Network::Mainnet),
            "test" | "testnet" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub target_spacing: i64,
    pub subsidy_halving_interval: i32,
    pub upgrades: [NetworkUpgrade; MAX_NETWORK_UPGRADES],
    /// Plot filter bit count applied once proof of space is active.
    pub plot_filter_bits: u32,
    /// Staking-pool epoch length in blocks.
    pub staking_epoch_blocks: i32,
    /// Coins sent from this account fund (and enable) a staking pool.
    pub staking_genesis_id: AccountId,
    pub staking_min_withdrawable: Amount,
    /// Minimum genesis stake at height zero; halves with the block subsidy.
    pub staking_initial_pool_amount: Amount,
    /// Share of each block subsidy paid to the block's staking pool.
    pub staking_pool_subsidy_percent: i64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParamsError {
    PlotFilterBits(u32),
    EpochLength(i32),
    HalvingInterval(i32),
    Amount(&'static str),
    SubsidyPercent(i64),
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsError::PlotFilterBits(bits) => write!(
                f,
                "plot filter bits {bits} out of range (max {MAX_PLOT_FILTER_BITS})"
            ),
            ParamsError::EpochLength(blocks) => {
                write!(f, "staking epoch length must be positive (got {blocks})")
            }
            ParamsError::HalvingInterval(blocks) => {
                write!(f, "subsidy halving interval must be positive (got {blocks})")
            }
            ParamsError::Amount(name) => write!(f, "{name} out of money range"),
            ParamsError::SubsidyPercent(percent) => {
                write!(f, "staking pool subsidy percent {percent} not in 0..=100")
            }
        }
    }
}

impl std::error::Error for ParamsError {}

impl ConsensusParams {
    pub fn activation_height(&self, idx: UpgradeIndex) -> i32 {
        self.upgrades[idx.as_usize()].activation_height
    }

    pub fn is_mercury_active(&self, height: i32) -> bool {
        crate::upgrades::network_upgrade_active(height, &self.upgrades, UpgradeIndex::Mercury)
    }

    pub fn is_saturn_active(&self, height: i32) -> bool {
        crate::upgrades::network_upgrade_active(height, &self.upgrades, UpgradeIndex::Saturn)
    }

    /// True for heights at which a staking-pool snapshot is taken.
    pub fn is_staking_snapshot_height(&self, height: i32) -> bool {
        let activation = self.activation_height(UpgradeIndex::Saturn);
        if activation == NetworkUpgrade::NO_ACTIVATION_HEIGHT || self.staking_epoch_blocks <= 0 {
            return false;
        }
        height >= activation + self.staking_epoch_blocks && height % self.staking_epoch_blocks == 0
    }

    /// True when the snapshot at `height` has a predecessor epoch to reward.
    pub fn has_previous_staking_epoch(&self, height: i32) -> bool {
        let activation = self.activation_height(UpgradeIndex::Saturn);
        activation != NetworkUpgrade::NO_ACTIVATION_HEIGHT
            && height >= activation + 2 * self.staking_epoch_blocks
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.plot_filter_bits > MAX_PLOT_FILTER_BITS {
            return Err(ParamsError::PlotFilterBits(self.plot_filter_bits));
        }
        if self.staking_epoch_blocks <= 0 {
            return Err(ParamsError::EpochLength(self.staking_epoch_blocks));
        }
        if self.subsidy_halving_interval <= 0 {
            return Err(ParamsError::HalvingInterval(self.subsidy_halving_interval));
        }
        if !money_range(self.staking_min_withdrawable) || self.staking_min_withdrawable == 0 {
            return Err(ParamsError::Amount("staking minimum withdrawable"));
        }
        if !money_range(self.staking_initial_pool_amount) {
            return Err(ParamsError::Amount("staking initial pool amount"));
        }
        if !(0..=100).contains(&self.staking_pool_subsidy_percent) {
            return Err(ParamsError::SubsidyPercent(self.staking_pool_subsidy_percent));
        }
        Ok(())
    }
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

const STAKING_GENESIS_ID: AccountId = [
    0x0f, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

fn schedule(mercury: i32, saturn: i32) -> [NetworkUpgrade; MAX_NETWORK_UPGRADES] {
    [
        NetworkUpgrade {
            activation_height: NetworkUpgrade::ALWAYS_ACTIVE,
        },
        NetworkUpgrade {
            activation_height: mercury,
        },
        NetworkUpgrade {
            activation_height: saturn,
        },
    ]
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        target_spacing: 180,
        subsidy_halving_interval: 700_000,
        upgrades: schedule(170_000, 654_201),
        plot_filter_bits: 9,
        staking_epoch_blocks: 100,
        staking_genesis_id: STAKING_GENESIS_ID,
        staking_min_withdrawable: COIN,
        staking_initial_pool_amount: 10_000 * COIN,
        staking_pool_subsidy_percent: 20,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        upgrades: schedule(0, 101),
        plot_filter_bits: 6,
        ..mainnet_consensus_params()
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        subsidy_halving_interval: 350_000,
        upgrades: schedule(50, 101),
        plot_filter_bits: 0,
        staking_epoch_blocks: 10,
        staking_initial_pool_amount: 100 * COIN,
        ..mainnet_consensus_params()
    }
}
