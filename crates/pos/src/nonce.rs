//! Staking-pool nonce search for legacy capacity mining.

use qitd_consensus::{AccountId, Hash256};
use qitd_primitives::sha256_concat;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NonceSearch {
    pub nonce: u64,
    pub deadline: u64,
}

/// Scans nonces `1..=vote_power` and keeps the one with the smallest deadline.
/// Zero vote power yields nonce 0 with the maximum deadline.
pub fn search_staking_nonce(
    epoch_hash: &Hash256,
    pool: &AccountId,
    height: i32,
    vote_power: u64,
) -> NonceSearch {
    let height = (height as u32).to_be_bytes();
    let mut best = NonceSearch {
        nonce: 0,
        deadline: u64::MAX,
    };
    for nonce in 1..=vote_power {
        let deadline = staking_deadline(epoch_hash, pool, &height, nonce);
        if deadline < best.deadline {
            best = NonceSearch { nonce, deadline };
        }
    }
    best
}

fn staking_deadline(epoch_hash: &Hash256, pool: &AccountId, height: &[u8; 4], nonce: u64) -> u64 {
    let digest = sha256_concat(&[epoch_hash, pool, height, &nonce.to_be_bytes()]);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(low)
}
