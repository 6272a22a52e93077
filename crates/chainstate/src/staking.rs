//! Staking-pool snapshots taken at epoch boundaries.
//!
//! At each snapshot height the currently locked stakes are grouped by pool,
//! the previous epoch's pool subsidies are shared out pro rata to the
//! previous epoch's stakers, and users whose withdrawable amount reaches the
//! minimum get a pending-withdrawal coin. Everything is keyed by the epoch
//! block hash, so running the same epoch twice rewrites identical bytes.

use std::collections::BTreeMap;

use qitd_consensus::{initial_staking_pool_amount, staking_pool_subsidy, AccountId, Amount, Hash256};
use qitd_log::{log_debug, log_info};
use qitd_primitives::encoding::{DecodeError, Decoder, Encoder};
use qitd_primitives::{p2sh_script, sha256d, OutPoint, TxOut};
use qitd_storage::{Column, KeyValueStore, WriteBatch};

use crate::block_tree::{BlockIndexRecord, ChainIndexView};
use crate::coins::{coin_key, Coin, CoinPayload};
use crate::index::{parse_index_key, put_index_entries, IndexFamily};
use crate::scan::visit_prefix;
use crate::store::{mib, CoinStore};
use crate::{hash_hex, ChainStateError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StakingPool {
    pub pool: AccountId,
    /// The genesis stake that enabled the pool.
    pub genesis_outpoint: OutPoint,
    pub stake: Amount,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StakingPoolUser {
    pub account: AccountId,
    pub stake: Amount,
    pub withdrawable: Amount,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SnapshotSummary {
    pub pools: usize,
    pub users: usize,
    pub pending_coins: usize,
}

pub fn pending_withdrawal_outpoint(epoch_hash: &Hash256, pool: &AccountId, account: &AccountId) -> OutPoint {
    let mut preimage = Vec::with_capacity(72);
    preimage.extend_from_slice(epoch_hash);
    preimage.extend_from_slice(pool);
    preimage.extend_from_slice(account);
    OutPoint::new(sha256d(&preimage), 0)
}

/// `floor(reward * user_stake / pool_stake)` without intermediate overflow.
pub fn reward_share(reward: Amount, user_stake: Amount, pool_stake: Amount) -> Amount {
    if reward <= 0 || user_stake <= 0 || pool_stake <= 0 {
        return 0;
    }
    let share = i128::from(reward) * i128::from(user_stake) / i128::from(pool_stake);
    Amount::try_from(share).unwrap_or(Amount::MAX)
}

pub fn encode_pools(pools: &[StakingPool]) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(1 + pools.len() * 64);
    encoder.write_varint(pools.len() as u64);
    for pool in pools {
        encoder.write_account_id(&pool.pool);
        encoder.write_hash(&pool.genesis_outpoint.hash);
        encoder.write_u32_le(pool.genesis_outpoint.index);
        encoder.write_i64_le(pool.stake);
    }
    encoder.into_inner()
}

pub fn decode_pools(bytes: &[u8]) -> Result<Vec<StakingPool>, DecodeError> {
    let mut decoder = Decoder::new(bytes);
    let count = decoder.read_varint()?;
    let mut pools = Vec::new();
    for _ in 0..count {
        pools.push(StakingPool {
            pool: decoder.read_account_id()?,
            genesis_outpoint: OutPoint::new(decoder.read_hash()?, decoder.read_u32_le()?),
            stake: decoder.read_i64_le()?,
        });
    }
    if !decoder.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(pools)
}

pub fn encode_users(users: &[StakingPoolUser]) -> Vec<u8> {
    let mut encoder = Encoder::with_capacity(1 + users.len() * 36);
    encoder.write_varint(users.len() as u64);
    for user in users {
        encoder.write_account_id(&user.account);
        encoder.write_i64_le(user.stake);
        encoder.write_i64_le(user.withdrawable);
    }
    encoder.into_inner()
}

pub fn decode_users(bytes: &[u8]) -> Result<Vec<StakingPoolUser>, DecodeError> {
    let mut decoder = Decoder::new(bytes);
    let count = decoder.read_varint()?;
    let mut users = Vec::new();
    for _ in 0..count {
        users.push(StakingPoolUser {
            account: decoder.read_account_id()?,
            stake: decoder.read_i64_le()?,
            withdrawable: decoder.read_i64_le()?,
        });
    }
    if !decoder.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(users)
}

fn users_key(epoch_hash: &Hash256, pool: &AccountId) -> [u8; 52] {
    let mut key = [0u8; 52];
    key[..32].copy_from_slice(epoch_hash);
    key[32..].copy_from_slice(pool);
    key
}

#[derive(Clone, Copy, Debug, Default)]
struct UserStatus {
    stake: Amount,
    withdrawable: Amount,
}

type PoolUsers = BTreeMap<AccountId, BTreeMap<AccountId, UserStatus>>;

impl<S: KeyValueStore> CoinStore<S> {
    pub fn staking_pools(&self, epoch_hash: &Hash256) -> Result<Vec<StakingPool>, ChainStateError> {
        match self.store().get(Column::StakingPoolEpoch, epoch_hash)? {
            Some(bytes) => Ok(decode_pools(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn staking_pool_users(
        &self,
        epoch_hash: &Hash256,
        pool: &AccountId,
    ) -> Result<Vec<StakingPoolUser>, ChainStateError> {
        match self.store().get(Column::StakingPoolUsers, &users_key(epoch_hash, pool))? {
            Some(bytes) => Ok(decode_users(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Takes the snapshot for `epoch` if its height is a snapshot height.
    pub fn snapshot_staking_pools(
        &self,
        epoch: &BlockIndexRecord,
        chain: &dyn ChainIndexView,
    ) -> Result<Option<SnapshotSummary>, ChainStateError> {
        let _guard = self.lock();
        if !self.params().is_staking_snapshot_height(epoch.height) {
            return Ok(None);
        }
        let mut partial_batches = 0;
        self.snapshot_staking_pools_locked(epoch, chain, &mut partial_batches)
            .map(Some)
    }

    fn collect_stakes(
        &self,
        height: i32,
    ) -> Result<(BTreeMap<AccountId, OutPoint>, PoolUsers), ChainStateError> {
        let params = self.params();
        let mut enabled = BTreeMap::new();
        let mut users: PoolUsers = BTreeMap::new();
        let column = IndexFamily::StakingReceive.column();
        visit_prefix(self.store().as_ref(), column, &[], |key, _| {
            let (_, outpoint) =
                parse_index_key(key).ok_or(ChainStateError::CorruptIndex("staking receive key"))?;
            let coin = self.get_coin(&outpoint)?.ok_or_else(|| {
                ChainStateError::InvariantViolation(format!(
                    "staking index entry {}:{} has no coin",
                    hash_hex(&outpoint.hash),
                    outpoint.index
                ))
            })?;
            let (CoinPayload::Staking {
                receiver,
                amount,
                lock_blocks,
            }, Some(owner)) = (&coin.payload, coin.owner)
            else {
                return Err(ChainStateError::InvariantViolation(format!(
                    "staking index entry {}:{} points at a non-staking coin",
                    hash_hex(&outpoint.hash),
                    outpoint.index
                )));
            };

            if owner == params.staking_genesis_id {
                if coin.value() >= initial_staking_pool_amount(coin.height as i32, params) {
                    enabled.insert(*receiver, outpoint);
                }
                return Ok(());
            }
            if u64::from(coin.height) + u64::from(*lock_blocks) < height as u64 {
                return Ok(());
            }
            let status = users.entry(*receiver).or_default().entry(owner).or_default();
            status.stake += *amount;
            Ok(())
        })?;
        users.retain(|pool, _| enabled.contains_key(pool));
        Ok((enabled, users))
    }

    /// Adds the previous epoch's rewards and retained withdrawable amounts.
    fn carry_previous_epoch(
        &self,
        epoch: &BlockIndexRecord,
        chain: &dyn ChainIndexView,
        users: &mut PoolUsers,
    ) -> Result<(), ChainStateError> {
        let params = self.params();
        let mut rewards: BTreeMap<AccountId, Amount> = BTreeMap::new();
        let mut cursor = *epoch;
        for _ in 0..params.staking_epoch_blocks {
            if let Some(account) = cursor.miner_reward_account {
                *rewards.entry(account).or_default() += staking_pool_subsidy(cursor.height, params);
            }
            cursor = chain.require_block_index(&cursor.prev_hash)?;
        }
        let prev_epoch_hash = cursor.hash;

        let prev_stakes: BTreeMap<AccountId, Amount> = self
            .staking_pools(&prev_epoch_hash)?
            .into_iter()
            .map(|pool| (pool.pool, pool.stake))
            .collect();
        if prev_stakes.is_empty() {
            return Ok(());
        }

        let min_withdrawable = params.staking_min_withdrawable;
        for (pool, pool_users) in users.iter_mut() {
            let reward = rewards.get(pool).copied().unwrap_or(0);
            let pool_stake = prev_stakes.get(pool).copied().unwrap_or(0);
            for prev_user in self.staking_pool_users(&prev_epoch_hash, pool)? {
                let Some(status) = pool_users.get_mut(&prev_user.account) else {
                    continue;
                };
                let retained = prev_user.withdrawable < min_withdrawable
                    || self.have_coin(&pending_withdrawal_outpoint(
                        &prev_epoch_hash,
                        pool,
                        &prev_user.account,
                    ))?;
                if retained {
                    status.withdrawable = prev_user.withdrawable;
                }
                status.withdrawable += reward_share(reward, prev_user.stake, pool_stake);
            }
        }
        Ok(())
    }

    pub(crate) fn snapshot_staking_pools_locked(
        &self,
        epoch: &BlockIndexRecord,
        chain: &dyn ChainIndexView,
        partial_batches: &mut usize,
    ) -> Result<SnapshotSummary, ChainStateError> {
        log_debug!("begin staking pool snapshot for epoch {}", epoch.height);
        let (enabled, mut users) = self.collect_stakes(epoch.height)?;
        if self.params().has_previous_staking_epoch(epoch.height) {
            self.carry_previous_epoch(epoch, chain, &mut users)?;
        }

        let min_withdrawable = self.params().staking_min_withdrawable;
        let mut summary = SnapshotSummary::default();
        let mut batch = WriteBatch::new();
        let mut pools = Vec::with_capacity(users.len());
        for (pool, pool_users) in &users {
            let mut list = Vec::with_capacity(pool_users.len());
            let mut pool_stake: Amount = 0;
            for (account, status) in pool_users {
                list.push(StakingPoolUser {
                    account: *account,
                    stake: status.stake,
                    withdrawable: status.withdrawable,
                });
                pool_stake += status.stake;
                if status.withdrawable >= min_withdrawable {
                    let outpoint = pending_withdrawal_outpoint(&epoch.hash, pool, account);
                    let coin = Coin {
                        out: TxOut::new(status.withdrawable, p2sh_script(account)),
                        height: epoch.height as u32,
                        is_coinbase: false,
                        spent: false,
                        owner: Some(*account),
                        payload: CoinPayload::None,
                    };
                    batch.put(Column::Coin, coin_key(&outpoint), coin.encode());
                    put_index_entries(&mut batch, &outpoint, &coin);
                    summary.pending_coins += 1;
                    self.maybe_write_partial(&mut batch, partial_batches)?;
                }
            }
            list.sort_by(|a, b| b.stake.cmp(&a.stake).then_with(|| a.account.cmp(&b.account)));
            batch.put(Column::StakingPoolUsers, users_key(&epoch.hash, pool), encode_users(&list));
            summary.users += list.len();
            self.maybe_write_partial(&mut batch, partial_batches)?;

            let genesis_outpoint = enabled
                .get(pool)
                .copied()
                .ok_or(ChainStateError::CorruptIndex("pool lost its genesis stake"))?;
            pools.push(StakingPool {
                pool: *pool,
                genesis_outpoint,
                stake: pool_stake,
            });
        }
        pools.sort_by(|a, b| b.stake.cmp(&a.stake).then_with(|| a.pool.cmp(&b.pool)));
        batch.put(Column::StakingPoolEpoch, epoch.hash, encode_pools(&pools));
        summary.pools = pools.len();

        log_debug!(
            "writing staking pool batch of {:.2} MiB",
            mib(batch.size_estimate())
        );
        self.store().write_batch(&batch)?;
        log_info!(
            "staking pool snapshot at height {}: {} pools, {} users, {} pending withdrawals",
            epoch.height,
            summary.pools,
            summary.users,
            summary.pending_coins
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_share_floors() {
        assert_eq!(reward_share(40, 100, 400), 10);
        assert_eq!(reward_share(40, 300, 400), 30);
        assert_eq!(reward_share(10, 1, 3), 3);
        assert_eq!(reward_share(10, 1, 0), 0);
        assert_eq!(reward_share(i64::MAX, i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn pending_outpoint_depends_on_every_part() {
        let base = pending_withdrawal_outpoint(&[1u8; 32], &[2u8; 20], &[3u8; 20]);
        assert_eq!(base, pending_withdrawal_outpoint(&[1u8; 32], &[2u8; 20], &[3u8; 20]));
        assert_ne!(base, pending_withdrawal_outpoint(&[9u8; 32], &[2u8; 20], &[3u8; 20]));
        assert_ne!(base, pending_withdrawal_outpoint(&[1u8; 32], &[3u8; 20], &[2u8; 20]));
        assert_eq!(base.index, 0);
    }

    #[test]
    fn snapshot_lists_reject_trailing_bytes() {
        let pools = vec![StakingPool {
            pool: [1u8; 20],
            genesis_outpoint: OutPoint::new([2u8; 32], 1),
            stake: 500,
        }];
        let mut bytes = encode_pools(&pools);
        assert_eq!(decode_pools(&bytes), Ok(pools));
        bytes.push(0);
        assert_eq!(decode_pools(&bytes), Err(DecodeError::TrailingBytes));

        let users = vec![StakingPoolUser {
            account: [4u8; 20],
            stake: 100,
            withdrawable: 7,
        }];
        assert_eq!(decode_users(&encode_users(&users)), Ok(users));
    }
}
