//! Coin database: point lookups and the single batched mutation path.

use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use qitd_consensus::{ConsensusParams, Hash256};
use qitd_log::{log_debug, log_info, log_warn};
use qitd_primitives::OutPoint;
use qitd_storage::{meta, Column, KeyValueStore, WriteBatch};

use crate::block_tree::ChainIndexView;
use crate::coins::{coin_key, outpoint_from_coin_key, Coin, CoinsMap};
use crate::index::{erase_index_entries, put_index_entries};
use crate::scan::visit_prefix;
use crate::{hash_hex, ChainStateError};

pub const DEFAULT_BATCH_SIZE: usize = 16 << 20;
const HEAD_BLOCKS_LEN: usize = 64;
const NULL_HASH: Hash256 = [0u8; 32];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainStateOptions {
    /// Byte threshold at which a write batch is committed and restarted.
    pub batch_size: usize,
}

impl Default for ChainStateOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Hook consulted after every partial batch commit. Returning `true` aborts
/// the write as if the process had died at that point.
pub trait BatchFaultInjector: Send + Sync {
    fn should_crash(&self, partial_batches: usize) -> bool;
}

pub(crate) fn mib(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

pub struct CoinStore<S> {
    store: Arc<S>,
    params: ConsensusParams,
    options: ChainStateOptions,
    lock: ReentrantMutex<()>,
    fault_injector: Option<Arc<dyn BatchFaultInjector>>,
}

impl<S: KeyValueStore> CoinStore<S> {
    pub fn new(
        store: Arc<S>,
        params: ConsensusParams,
        options: ChainStateOptions,
    ) -> Result<Self, ChainStateError> {
        params.validate()?;
        Ok(Self {
            store,
            params,
            options,
            lock: ReentrantMutex::new(()),
            fault_injector: None,
        })
    }

    pub fn with_fault_injector(mut self, injector: Arc<dyn BatchFaultInjector>) -> Self {
        self.fault_injector = Some(injector);
        self
    }

    /// The chain-state lock. Every mutation holds it; callers connecting or
    /// disconnecting blocks take it around the whole operation.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn options(&self) -> ChainStateOptions {
        self.options
    }

    pub fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainStateError> {
        match self.store.get(Column::Coin, &coin_key(outpoint))? {
            Some(bytes) => Ok(Some(Coin::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn have_coin(&self, outpoint: &OutPoint) -> Result<bool, ChainStateError> {
        Ok(self.store.exists(Column::Coin, &coin_key(outpoint))?)
    }

    pub fn best_block(&self) -> Result<Option<Hash256>, ChainStateError> {
        let Some(bytes) = self.store.get(Column::Meta, meta::BEST_BLOCK)? else {
            return Ok(None);
        };
        let hash = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ChainStateError::CorruptIndex("best block record"))?;
        Ok(Some(hash))
    }

    /// The in-progress transition marker as `(new tip, old tip)`.
    pub fn head_blocks(&self) -> Result<Option<(Hash256, Hash256)>, ChainStateError> {
        let Some(bytes) = self.store.get(Column::Meta, meta::HEAD_BLOCKS)? else {
            return Ok(None);
        };
        if bytes.len() != HEAD_BLOCKS_LEN {
            return Err(ChainStateError::CorruptIndex("head blocks record"));
        }
        let mut new_tip = NULL_HASH;
        let mut old_tip = NULL_HASH;
        new_tip.copy_from_slice(&bytes[..32]);
        old_tip.copy_from_slice(&bytes[32..]);
        Ok(Some((new_tip, old_tip)))
    }

    /// Visits every stored coin in key order.
    pub fn for_each_coin(
        &self,
        mut visitor: impl FnMut(OutPoint, Coin) -> Result<(), ChainStateError>,
    ) -> Result<(), ChainStateError> {
        visit_prefix(self.store.as_ref(), Column::Coin, &[], |key, value| {
            let outpoint =
                outpoint_from_coin_key(key).ok_or(ChainStateError::CorruptIndex("coin key"))?;
            visitor(outpoint, Coin::decode(value)?)
        })
    }

    /// Commits `batch` as one partial write of a larger transition.
    pub(crate) fn write_partial(
        &self,
        batch: &mut WriteBatch,
        partial_batches: &mut usize,
    ) -> Result<(), ChainStateError> {
        log_debug!(
            "writing partial batch of {:.2} MiB",
            mib(batch.size_estimate())
        );
        self.store.write_batch(batch)?;
        batch.clear();
        *partial_batches += 1;
        if let Some(injector) = &self.fault_injector {
            if injector.should_crash(*partial_batches) {
                log_warn!("simulating a crash after {} partial batches", partial_batches);
                return Err(ChainStateError::SimulatedCrash {
                    partial_batches: *partial_batches,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn maybe_write_partial(
        &self,
        batch: &mut WriteBatch,
        partial_batches: &mut usize,
    ) -> Result<(), ChainStateError> {
        if batch.size_estimate() > self.options.batch_size {
            self.write_partial(batch, partial_batches)?;
        }
        Ok(())
    }

    /// Writes every dirty entry of `changes` and moves the best block to
    /// `best_block`. The first committed write records the transition in the
    /// head-blocks marker; the last one clears it and stores the new tip, so
    /// an interrupted call leaves the marker behind for replay.
    ///
    /// On success `changes` is drained.
    pub fn apply_batch(
        &self,
        changes: &mut CoinsMap,
        best_block: &Hash256,
        chain: &dyn ChainIndexView,
    ) -> Result<(), ChainStateError> {
        let _guard = self.lock();
        if *best_block == NULL_HASH {
            return Err(ChainStateError::InvariantViolation(
                "batch without a best block".to_string(),
            ));
        }
        let tip = chain.require_block_index(best_block)?;

        let old_tip = match self.head_blocks()? {
            Some((marked_new, marked_old)) => {
                if marked_new != *best_block {
                    return Err(ChainStateError::InvariantViolation(format!(
                        "interrupted transition to {} cannot be replayed as {}",
                        hash_hex(&marked_new),
                        hash_hex(best_block)
                    )));
                }
                log_info!(
                    "replaying interrupted transition {} -> {}",
                    hash_hex(&marked_old),
                    hash_hex(&marked_new)
                );
                marked_old
            }
            None => self.best_block()?.unwrap_or(NULL_HASH),
        };

        let mut batch = WriteBatch::new();
        let mut marker = [0u8; HEAD_BLOCKS_LEN];
        marker[..32].copy_from_slice(best_block);
        marker[32..].copy_from_slice(&old_tip);
        batch.delete(Column::Meta, meta::BEST_BLOCK);
        batch.put(Column::Meta, meta::HEAD_BLOCKS, marker);

        let mut partial_batches = 0usize;
        let mut changed = 0usize;
        for (outpoint, entry) in changes.iter() {
            if !entry.dirty {
                continue;
            }
            let key = coin_key(outpoint);
            if entry.coin.spent {
                batch.delete(Column::Coin, key);
                erase_index_entries(&mut batch, outpoint, &entry.coin);
            } else {
                batch.put(Column::Coin, key, entry.coin.encode());
                put_index_entries(&mut batch, outpoint, &entry.coin);
            }
            changed += 1;
            self.maybe_write_partial(&mut batch, &mut partial_batches)?;
        }

        if self.params.is_staking_snapshot_height(tip.height) {
            // The snapshot reads coins back from the store.
            self.write_partial(&mut batch, &mut partial_batches)?;
            self.snapshot_staking_pools_locked(&tip, chain, &mut partial_batches)?;
        }

        batch.delete(Column::Meta, meta::HEAD_BLOCKS);
        batch.put(Column::Meta, meta::BEST_BLOCK, *best_block);
        log_debug!(
            "writing final batch of {:.2} MiB",
            mib(batch.size_estimate())
        );
        self.store.write_batch(&batch)?;
        log_debug!(
            "committed {} changed coins (out of {}) at height {}",
            changed,
            changes.len(),
            tip.height
        );
        changes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qitd_consensus::{consensus_params, Network};
    use qitd_primitives::{p2sh_script, TxOut};
    use qitd_storage::memory::MemoryStore;

    use crate::block_tree::{BlockIndexRecord, MemoryChainIndex};
    use crate::coins::{CoinPayload, CoinsCacheEntry};

    fn setup() -> (CoinStore<MemoryStore>, MemoryChainIndex) {
        let store = CoinStore::new(
            Arc::new(MemoryStore::new()),
            consensus_params(Network::Regtest),
            ChainStateOptions::default(),
        )
        .expect("coin store");
        let chain = MemoryChainIndex::new();
        chain.insert(BlockIndexRecord {
            hash: [1u8; 32],
            height: 1,
            ..BlockIndexRecord::default()
        });
        (store, chain)
    }

    fn coin(value: i64) -> Coin {
        Coin::new(TxOut::new(value, p2sh_script(&[8u8; 20])), 1, false, CoinPayload::None)
    }

    #[test]
    fn apply_batch_writes_and_drains() {
        let (coins, chain) = setup();
        let outpoint = OutPoint::new([5u8; 32], 0);
        let mut changes = CoinsMap::new();
        changes.insert(outpoint, CoinsCacheEntry::dirty(coin(50)));
        changes.insert(
            OutPoint::new([6u8; 32], 0),
            CoinsCacheEntry {
                coin: coin(60),
                dirty: false,
            },
        );

        coins.apply_batch(&mut changes, &[1u8; 32], &chain).expect("apply");
        assert!(changes.is_empty());
        assert_eq!(coins.get_coin(&outpoint).expect("get"), Some(coin(50)));
        assert!(!coins.have_coin(&OutPoint::new([6u8; 32], 0)).expect("have"));
        assert_eq!(coins.best_block().expect("best"), Some([1u8; 32]));
        assert_eq!(coins.head_blocks().expect("heads"), None);
    }

    #[test]
    fn unknown_tip_is_rejected_before_writing() {
        let (coins, chain) = setup();
        let mut changes = CoinsMap::new();
        changes.insert(OutPoint::new([5u8; 32], 0), CoinsCacheEntry::dirty(coin(50)));
        assert!(matches!(
            coins.apply_batch(&mut changes, &[2u8; 32], &chain),
            Err(ChainStateError::MissingBlock(_))
        ));
        assert_eq!(coins.head_blocks().expect("heads"), None);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn rejects_invalid_params() {
        let mut params = consensus_params(Network::Regtest);
        params.plot_filter_bits = 32;
        assert!(matches!(
            CoinStore::new(Arc::new(MemoryStore::new()), params, ChainStateOptions::default()),
            Err(ChainStateError::Params(_))
        ));
    }
}
