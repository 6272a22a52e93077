//! Protocol constants shared by proof verification and the account ledger.

use crate::money::{Amount, COIN};

/// Base target of the genesis block; difficulty is this divided by the
/// previous block's base target.
pub const INITIAL_BASE_TARGET: u64 = 24_433_591_728;

/// Low 48 bits of the header flags word carry the base target.
pub const BASE_TARGET_MASK: u64 = 0x0000_ffff_ffff_ffff;
pub const HEADER_FLAG_SPACE_PROOF: u64 = 0x4000_0000_0000_0000;
pub const HEADER_FLAG_SIGNATURE: u64 = 0x8000_0000_0000_0000;

pub const MIN_PLOT_SIZE: i32 = 32;
pub const MAX_PLOT_SIZE: i32 = 50;

/// Plot filters are applied to the first 32 bits of a hash.
pub const MAX_PLOT_FILTER_BITS: u32 = 31;

/// Amount locked by every capacity binding entry.
pub const BIND_PLOTTER_LOCK_AMOUNT: Amount = COIN / 10;

/// Derivation paths for the three BLS key roles.
pub const FARMER_KEY_PATH: [u32; 4] = [12381, 8444, 0, 0];
pub const POOL_KEY_PATH: [u32; 4] = [12381, 8444, 1, 0];
pub const LOCAL_KEY_PATH: [u32; 4] = [12381, 8444, 3, 0];
