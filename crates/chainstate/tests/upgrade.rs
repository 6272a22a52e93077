use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use qitd_chainstate::index::INDEX_VERSION;
use qitd_chainstate::{
    BalanceQuery, BlockIndexRecord, ChainStateOptions, Coin, CoinPayload, CoinStore,
    CoinsCacheEntry, CoinsMap, IndexFamily, MemoryChainIndex,
};
use qitd_consensus::{consensus_params, AccountId, Network, COIN};
use qitd_primitives::{p2sh_script, OutPoint, TxOut};
use qitd_storage::memory::MemoryStore;
use qitd_storage::{
    Column, KeyValueStore, PrefixVisitor, RangeVisitor, ScanResult, StoreError, WriteBatch,
};

const ALICE: AccountId = [0x11; 20];
const BOB: AccountId = [0x22; 20];

fn populated() -> (Arc<MemoryStore>, CoinStore<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let coins = CoinStore::new(
        Arc::clone(&store),
        consensus_params(Network::Regtest),
        ChainStateOptions::default(),
    )
    .expect("coin store");
    let chain = MemoryChainIndex::new();
    chain.insert(BlockIndexRecord {
        hash: [7u8; 32],
        height: 7,
        ..BlockIndexRecord::default()
    });

    let mut changes = CoinsMap::new();
    for index in 0..25u32 {
        let payload = match index % 3 {
            0 => CoinPayload::None,
            1 => CoinPayload::Point {
                receiver: BOB,
                amount: COIN,
            },
            _ => CoinPayload::BindPlotter {
                plotter_id: u64::from(index),
            },
        };
        let coin = Coin::new(TxOut::new(COIN, p2sh_script(&ALICE)), 7, false, payload);
        changes.insert(OutPoint::new([9u8; 32], index), CoinsCacheEntry::dirty(coin));
    }
    coins
        .apply_batch(&mut changes, &[7u8; 32], &chain)
        .expect("apply");
    (store, coins)
}

fn index_snapshot(store: &MemoryStore) -> Vec<(Vec<u8>, Vec<u8>)> {
    IndexFamily::ALL
        .into_iter()
        .flat_map(|family| store.scan_prefix(family.column(), &[]).expect("scan"))
        .collect()
}

#[test]
fn rebuild_restores_wiped_indexes() {
    let (store, coins) = populated();
    let expected = index_snapshot(&store);
    let balance = coins
        .account_balance(&ALICE, BalanceQuery::all(), &CoinsMap::new())
        .expect("balance");

    for family in IndexFamily::ALL {
        for (key, _) in store.scan_prefix(family.column(), &[]).expect("scan") {
            store.delete(family.column(), &key).expect("wipe");
        }
    }
    // A stale entry that no coin implies.
    store
        .put(Column::Balance, &[0xee; 56], &5i64.to_le_bytes())
        .expect("stale");

    let mut reported = Vec::new();
    assert!(coins.upgrade_indexes(|percent| reported.push(percent)).expect("upgrade"));
    assert_eq!(reported, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    assert_eq!(index_snapshot(&store), expected);
    assert_eq!(coins.index_version().expect("version"), Some(INDEX_VERSION));
    assert_eq!(
        coins
            .account_balance(&ALICE, BalanceQuery::all(), &CoinsMap::new())
            .expect("balance"),
        balance
    );
}

#[test]
fn current_version_skips_rebuild() {
    let (_store, coins) = populated();
    assert!(coins.upgrade_indexes(|_| {}).expect("first"));
    let mut reported = Vec::new();
    assert!(!coins.upgrade_indexes(|percent| reported.push(percent)).expect("second"));
    assert!(reported.is_empty());
}

#[test]
fn empty_coin_table_still_records_version() {
    let store = Arc::new(MemoryStore::new());
    let coins = CoinStore::new(
        store,
        consensus_params(Network::Regtest),
        ChainStateOptions::default(),
    )
    .expect("coin store");
    let mut reported = Vec::new();
    assert!(coins.upgrade_indexes(|percent| reported.push(percent)).expect("upgrade"));
    assert_eq!(reported, vec![0, 100]);
    assert_eq!(coins.index_version().expect("version"), Some(INDEX_VERSION));
}

/// Memory store that counts committed batches.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    commits: AtomicUsize,
}

impl KeyValueStore for CountingStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(column, key, value)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.inner.delete(column, key)
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        self.inner.scan_prefix(column, prefix)
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.inner.for_each_prefix(column, prefix, visitor)
    }

    fn for_each_from<'a>(
        &self,
        column: Column,
        start: &[u8],
        visitor: &mut RangeVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.inner.for_each_from(column, start, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.write_batch(batch)
    }
}

#[test]
fn small_batches_rebuild_in_chunks() {
    let (reference, _) = populated();
    let expected = index_snapshot(&reference);

    let store = Arc::new(CountingStore::default());
    for (key, value) in reference.scan_prefix(Column::Coin, &[]).expect("coins") {
        store.put(Column::Coin, &key, &value).expect("copy coin");
    }
    for (index, family) in IndexFamily::ALL.into_iter().enumerate() {
        for stale in 0..30u8 {
            let mut key = vec![0xee; 20];
            key.extend_from_slice(&[index as u8, stale]);
            store.put(family.column(), &key, &[1u8; 8]).expect("stale");
        }
    }

    let coins = CoinStore::new(
        Arc::clone(&store),
        consensus_params(Network::Regtest),
        ChainStateOptions { batch_size: 200 },
    )
    .expect("coin store");
    let mut reported = Vec::new();
    assert!(coins.upgrade_indexes(|percent| reported.push(percent)).expect("upgrade"));

    assert_eq!(reported, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    assert!(store.commits.load(Ordering::SeqCst) > 4);
    let rebuilt: Vec<_> = IndexFamily::ALL
        .into_iter()
        .flat_map(|family| store.inner.scan_prefix(family.column(), &[]).expect("scan"))
        .collect();
    assert_eq!(rebuilt, expected);
    assert_eq!(coins.index_version().expect("version"), Some(INDEX_VERSION));
}
