//! Coin database, account indexes and staking-pool snapshots.

pub mod account;
pub mod block_tree;
pub mod coins;
pub mod index;
mod scan;
pub mod staking;
pub mod store;
pub mod upgrade;

use std::fmt;

use qitd_consensus::ParamsError;
use qitd_primitives::encoding::DecodeError;
use qitd_storage::StoreError;

pub use account::{AccountBalance, BalanceQuery, BindingEntry};
pub use block_tree::{BlockFileInfo, BlockIndexRecord, BlockTree, ChainIndexView, MemoryChainIndex};
pub use coins::{Coin, CoinPayload, CoinsCacheEntry, CoinsMap};
pub use index::{IndexEntry, IndexFamily, IndexValue};
pub use staking::{StakingPool, StakingPoolUser};
pub use store::{BatchFaultInjector, ChainStateOptions, CoinStore};

#[derive(Debug)]
pub enum ChainStateError {
    Store(StoreError),
    Decode(DecodeError),
    Params(ParamsError),
    CorruptIndex(&'static str),
    InvariantViolation(String),
    MissingBlock([u8; 32]),
    SimulatedCrash { partial_batches: usize },
}

impl ChainStateError {
    /// Fatal errors mean the ledger on disk can no longer be trusted; the
    /// only way forward is an offline index rebuild.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainStateError::Store(_)
                | ChainStateError::Decode(_)
                | ChainStateError::CorruptIndex(_)
                | ChainStateError::InvariantViolation(_)
        )
    }
}

impl fmt::Display for ChainStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainStateError::Store(err) => write!(f, "{err}"),
            ChainStateError::Decode(err) => write!(f, "corrupt record: {err}"),
            ChainStateError::Params(err) => write!(f, "{err}"),
            ChainStateError::CorruptIndex(message) => write!(f, "{message}"),
            ChainStateError::InvariantViolation(message) => {
                write!(f, "chain state invariant violated: {message}")
            }
            ChainStateError::MissingBlock(hash) => {
                write!(f, "block {} missing from block index", hash_hex(hash))
            }
            ChainStateError::SimulatedCrash { partial_batches } => {
                write!(f, "simulated crash after {partial_batches} partial batches")
            }
        }
    }
}

impl std::error::Error for ChainStateError {}

impl From<StoreError> for ChainStateError {
    fn from(err: StoreError) -> Self {
        ChainStateError::Store(err)
    }
}

impl From<DecodeError> for ChainStateError {
    fn from(err: DecodeError) -> Self {
        ChainStateError::Decode(err)
    }
}

impl From<ParamsError> for ChainStateError {
    fn from(err: ParamsError) -> Self {
        ChainStateError::Params(err)
    }
}

/// Hashes print in display order, most significant byte first.
pub fn hash_hex(hash: &[u8; 32]) -> String {
    hash.iter().rev().map(|byte| format!("{byte:02x}")).collect()
}
