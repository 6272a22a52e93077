//! Activation schedule for the proof-of-space and staking-pool rules.

pub type Hash256 = [u8; 32];

/// Destination-script derived identifier used to group ledger indices.
pub type AccountId = [u8; 20];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum UpgradeIndex {
    Base = 0,
    /// Chia-style proof of space replaces the capacity proof.
    Mercury = 1,
    /// Staking pools and epoch snapshots.
    Saturn = 2,
}

pub const MAX_NETWORK_UPGRADES: usize = 3;

pub const ALL_UPGRADES: [UpgradeIndex; MAX_NETWORK_UPGRADES] =
    [UpgradeIndex::Base, UpgradeIndex::Mercury, UpgradeIndex::Saturn];

impl UpgradeIndex {
    pub const fn as_usize(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            UpgradeIndex::Base => "Base",
            UpgradeIndex::Mercury => "Mercury",
            UpgradeIndex::Saturn => "Saturn",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetworkUpgrade {
    pub activation_height: i32,
}

impl NetworkUpgrade {
    pub const ALWAYS_ACTIVE: i32 = 0;
    pub const NO_ACTIVATION_HEIGHT: i32 = -1;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpgradeState {
    Disabled,
    Pending,
    Active,
}

pub fn network_upgrade_state(
    height: i32,
    upgrades: &[NetworkUpgrade; MAX_NETWORK_UPGRADES],
    idx: UpgradeIndex,
) -> UpgradeState {
    let activation_height = upgrades[idx.as_usize()].activation_height;
    if activation_height == NetworkUpgrade::NO_ACTIVATION_HEIGHT {
        UpgradeState::Disabled
    } else if height >= activation_height {
        UpgradeState::Active
    } else {
        UpgradeState::Pending
    }
}

pub fn network_upgrade_active(
    height: i32,
    upgrades: &[NetworkUpgrade; MAX_NETWORK_UPGRADES],
    idx: UpgradeIndex,
) -> bool {
    network_upgrade_state(height, upgrades, idx) == UpgradeState::Active
}

pub fn current_upgrade(height: i32, upgrades: &[NetworkUpgrade; MAX_NETWORK_UPGRADES]) -> UpgradeIndex {
    for idx in ALL_UPGRADES.iter().rev() {
        if network_upgrade_active(height, upgrades, *idx) {
            return *idx;
        }
    }
    UpgradeIndex::Base
}
