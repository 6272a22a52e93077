use std::collections::BTreeMap;
use std::sync::Arc;

use qitd_chainstate::index::{index_key, IndexValue};
use qitd_chainstate::{
    AccountBalance, BalanceQuery, BindingEntry, BlockIndexRecord, ChainStateError,
    ChainStateOptions, Coin, CoinPayload, CoinStore, CoinsCacheEntry, CoinsMap, MemoryChainIndex,
};
use qitd_consensus::constants::BIND_PLOTTER_LOCK_AMOUNT;
use qitd_consensus::{consensus_params, AccountId, Amount, Hash256, Network, COIN};
use qitd_primitives::{p2sh_script, OutPoint, TxOut};
use qitd_storage::memory::MemoryStore;
use qitd_storage::{Column, KeyValueStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ACCOUNTS: [AccountId; 4] = [[0x10; 20], [0x20; 20], [0x30; 20], [0x40; 20]];
const ALICE: AccountId = ACCOUNTS[0];
const BOB: AccountId = ACCOUNTS[1];
const CAROL: AccountId = ACCOUNTS[2];

fn block_hash(height: i32) -> Hash256 {
    let mut hash = [0u8; 32];
    hash[..4].copy_from_slice(&height.to_le_bytes());
    hash[31] = 0xbb;
    hash
}

fn setup(tip: i32) -> (Arc<MemoryStore>, CoinStore<MemoryStore>, MemoryChainIndex) {
    let store = Arc::new(MemoryStore::new());
    let coins = CoinStore::new(
        Arc::clone(&store),
        consensus_params(Network::Regtest),
        ChainStateOptions::default(),
    )
    .expect("coin store");
    let chain = MemoryChainIndex::new();
    for height in 1..=tip {
        chain.insert(BlockIndexRecord {
            hash: block_hash(height),
            height,
            ..BlockIndexRecord::default()
        });
    }
    (store, coins, chain)
}

fn coin(owner: &AccountId, value: Amount, payload: CoinPayload) -> Coin {
    Coin::new(TxOut::new(value, p2sh_script(owner)), 1, false, payload)
}

fn outpoint(tag: u8, index: u32) -> OutPoint {
    OutPoint::new([tag; 32], index)
}

fn connect(coins: &CoinStore<MemoryStore>, chain: &MemoryChainIndex, height: i32, entries: Vec<(OutPoint, Coin)>) {
    let mut changes: CoinsMap = entries
        .into_iter()
        .map(|(outpoint, coin)| (outpoint, CoinsCacheEntry::dirty(coin)))
        .collect();
    coins
        .apply_batch(&mut changes, &block_hash(height), chain)
        .expect("apply batch");
}

fn spent(mut coin: Coin) -> Coin {
    coin.spend();
    coin
}

#[test]
fn balance_components_follow_payloads() {
    let (_store, coins, chain) = setup(2);
    connect(
        &coins,
        &chain,
        1,
        vec![
            (outpoint(1, 0), coin(&ALICE, 7 * COIN, CoinPayload::None)),
            (
                outpoint(1, 1),
                coin(&ALICE, 2 * COIN, CoinPayload::Point { receiver: BOB, amount: 2 * COIN }),
            ),
            (
                outpoint(1, 2),
                coin(
                    &ALICE,
                    5 * COIN,
                    CoinPayload::Staking {
                        receiver: CAROL,
                        amount: 5 * COIN,
                        lock_blocks: 100,
                    },
                ),
            ),
            (
                outpoint(1, 3),
                coin(&ALICE, BIND_PLOTTER_LOCK_AMOUNT, CoinPayload::BindPlotter { plotter_id: 42 }),
            ),
        ],
    );

    let alice = coins
        .account_balance(&ALICE, BalanceQuery::all(), &CoinsMap::new())
        .expect("balance");
    assert_eq!(
        alice,
        AccountBalance {
            balance: 14 * COIN + BIND_PLOTTER_LOCK_AMOUNT,
            bind_plotter_locked: Some(BIND_PLOTTER_LOCK_AMOUNT),
            point_sent: Some(2 * COIN),
            point_received: Some(0),
            staking_sent: Some(5 * COIN),
            staking_received: Some(0),
        }
    );

    let bob = coins
        .account_balance(
            &BOB,
            BalanceQuery {
                point: true,
                ..BalanceQuery::default()
            },
            &CoinsMap::new(),
        )
        .expect("balance");
    assert_eq!(bob.balance, 0);
    assert_eq!(bob.point_received, Some(2 * COIN));
    assert_eq!(bob.bind_plotter_locked, None);
    assert_eq!(bob.staking_received, None);
}

#[test]
fn uncommitted_changes_adjust_the_stored_totals() {
    let (_store, coins, chain) = setup(2);
    let stored = coin(&ALICE, 3 * COIN, CoinPayload::None);
    connect(&coins, &chain, 1, vec![(outpoint(1, 0), stored.clone())]);

    let mut dirty = CoinsMap::new();
    // Stored and spent: subtracts.
    dirty.insert(outpoint(1, 0), CoinsCacheEntry::dirty(spent(stored.clone())));
    // New and unspent: adds.
    dirty.insert(
        outpoint(2, 0),
        CoinsCacheEntry::dirty(coin(&ALICE, 4 * COIN, CoinPayload::None)),
    );
    // Never stored and already spent: no effect.
    dirty.insert(
        outpoint(3, 0),
        CoinsCacheEntry::dirty(spent(coin(&ALICE, 50 * COIN, CoinPayload::None))),
    );
    // Clean entries are ignored.
    dirty.insert(
        outpoint(4, 0),
        CoinsCacheEntry {
            coin: coin(&ALICE, 60 * COIN, CoinPayload::None),
            dirty: false,
        },
    );
    let balance = coins
        .account_balance(&ALICE, BalanceQuery::default(), &dirty)
        .expect("balance");
    assert_eq!(balance.balance, 4 * COIN);

    // Unspent and already stored: not counted twice.
    let mut dirty = CoinsMap::new();
    dirty.insert(outpoint(1, 0), CoinsCacheEntry::dirty(stored));
    let balance = coins
        .account_balance(&ALICE, BalanceQuery::default(), &dirty)
        .expect("balance");
    assert_eq!(balance.balance, 3 * COIN);
}

#[test]
fn binding_queries_filter_by_account_and_plotter() {
    let (_store, coins, chain) = setup(2);
    let bind = |owner: &AccountId, plotter_id: u64| {
        coin(owner, BIND_PLOTTER_LOCK_AMOUNT, CoinPayload::BindPlotter { plotter_id })
    };
    connect(
        &coins,
        &chain,
        1,
        vec![
            (outpoint(1, 0), bind(&ALICE, 7)),
            (outpoint(1, 1), bind(&ALICE, 8)),
            (outpoint(2, 0), bind(&BOB, 7)),
        ],
    );

    let alice_all = coins.binding_entries_for_account(&ALICE, 0).expect("bindings");
    assert_eq!(alice_all.len(), 2);
    let alice_eight = coins.binding_entries_for_account(&ALICE, 8).expect("bindings");
    assert_eq!(
        alice_eight,
        vec![BindingEntry {
            account: ALICE,
            outpoint: outpoint(1, 1),
            plotter_id: 8,
            height: 1,
        }]
    );

    let mut seven: Vec<AccountId> = coins
        .binding_entries_for_plotter(7)
        .expect("bindings")
        .into_iter()
        .map(|entry| entry.account)
        .collect();
    seven.sort();
    assert_eq!(seven, vec![ALICE, BOB]);
    assert!(coins.binding_entries_for_plotter(9).expect("bindings").is_empty());
}

#[test]
fn top_staking_ranks_receivers() {
    let (_store, coins, chain) = setup(2);
    let stake = |owner: &AccountId, receiver: AccountId, amount: Amount| {
        coin(
            owner,
            amount,
            CoinPayload::Staking {
                receiver,
                amount,
                lock_blocks: 10,
            },
        )
    };
    connect(
        &coins,
        &chain,
        1,
        vec![
            (outpoint(1, 0), stake(&ALICE, BOB, 5 * COIN)),
            (outpoint(1, 1), stake(&ALICE, CAROL, 5 * COIN)),
            (outpoint(1, 2), stake(&BOB, ALICE, 2 * COIN)),
            (outpoint(1, 3), stake(&CAROL, ALICE, 2 * COIN)),
        ],
    );

    let ranked = coins.top_staking_accounts(10, &CoinsMap::new()).expect("top");
    assert_eq!(ranked, vec![(BOB, 5 * COIN), (CAROL, 5 * COIN), (ALICE, 4 * COIN)]);
    let ranked = coins.top_staking_accounts(1, &CoinsMap::new()).expect("top");
    assert_eq!(ranked, vec![(BOB, 5 * COIN)]);

    let mut dirty = CoinsMap::new();
    dirty.insert(
        outpoint(1, 0),
        CoinsCacheEntry::dirty(spent(stake(&ALICE, BOB, 5 * COIN))),
    );
    let ranked = coins.top_staking_accounts(10, &dirty).expect("top");
    assert_eq!(ranked, vec![(CAROL, 5 * COIN), (ALICE, 4 * COIN)]);
}

#[test]
fn negative_total_is_an_invariant_violation() {
    let (store, coins, _chain) = setup(1);
    store
        .put(
            Column::Balance,
            &index_key(&ALICE, &outpoint(9, 0)),
            &IndexValue::Amount(-COIN).encode(),
        )
        .expect("put");
    let err = coins
        .account_balance(&ALICE, BalanceQuery::default(), &CoinsMap::new())
        .expect_err("negative balance");
    assert!(matches!(err, ChainStateError::InvariantViolation(_)));
    assert!(err.is_fatal());
}

#[test]
fn undecodable_index_value_is_corruption() {
    let (store, coins, _chain) = setup(1);
    store
        .put(Column::PointSend, &index_key(&ALICE, &outpoint(9, 0)), &[1, 2, 3])
        .expect("put");
    assert!(matches!(
        coins.account_balance(&ALICE, BalanceQuery::all(), &CoinsMap::new()),
        Err(ChainStateError::CorruptIndex(_))
    ));
}

#[derive(Default)]
struct Expected {
    balance: Amount,
    bind_plotter_locked: Amount,
    point_sent: Amount,
    point_received: Amount,
    staking_sent: Amount,
    staking_received: Amount,
}

fn expected_totals(live: &BTreeMap<OutPoint, Coin>) -> BTreeMap<AccountId, Expected> {
    let mut totals: BTreeMap<AccountId, Expected> = BTreeMap::new();
    for coin in live.values() {
        let owner = coin.owner.expect("owned");
        totals.entry(owner).or_default().balance += coin.value();
        match &coin.payload {
            CoinPayload::None => {}
            CoinPayload::BindPlotter { .. } => {
                totals.entry(owner).or_default().bind_plotter_locked += BIND_PLOTTER_LOCK_AMOUNT
            }
            CoinPayload::Point { receiver, amount } => {
                totals.entry(owner).or_default().point_sent += coin.value();
                totals.entry(*receiver).or_default().point_received += amount;
            }
            CoinPayload::Staking { receiver, amount, .. } => {
                totals.entry(owner).or_default().staking_sent += coin.value();
                totals.entry(*receiver).or_default().staking_received += amount;
            }
        }
    }
    totals
}

fn assert_matches_model(
    coins: &CoinStore<MemoryStore>,
    live: &BTreeMap<OutPoint, Coin>,
    dirty: &CoinsMap,
) {
    let totals = expected_totals(live);
    let empty = Expected::default();
    for account in &ACCOUNTS {
        let expected = totals.get(account).unwrap_or(&empty);
        let want = AccountBalance {
            balance: expected.balance,
            bind_plotter_locked: Some(expected.bind_plotter_locked),
            point_sent: Some(expected.point_sent),
            point_received: Some(expected.point_received),
            staking_sent: Some(expected.staking_sent),
            staking_received: Some(expected.staking_received),
        };
        assert_eq!(
            coins
                .account_balance(account, BalanceQuery::all(), dirty)
                .expect("balance"),
            want
        );
    }
}

fn random_payload(rng: &mut StdRng, value: Amount) -> CoinPayload {
    let receiver = ACCOUNTS[rng.gen_range(0..ACCOUNTS.len())];
    match rng.gen_range(0..4) {
        0 => CoinPayload::None,
        1 => CoinPayload::BindPlotter {
            plotter_id: rng.gen_range(1..5),
        },
        2 => CoinPayload::Point {
            receiver,
            amount: value,
        },
        _ => CoinPayload::Staking {
            receiver,
            amount: value,
            lock_blocks: rng.gen_range(1..50),
        },
    }
}

#[test]
fn randomized_history_conserves_totals() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let (_store, coins, chain) = setup(60);
    let mut live: BTreeMap<OutPoint, Coin> = BTreeMap::new();

    for height in 1..=60 {
        let mut changes = CoinsMap::new();
        let mut next = live.clone();

        let spends = rng.gen_range(0..=live.len().min(3));
        let victims: Vec<OutPoint> = live.keys().copied().take(spends).collect();
        for outpoint in victims {
            let coin = next.remove(&outpoint).expect("live coin");
            changes.insert(outpoint, CoinsCacheEntry::dirty(spent(coin)));
        }

        for index in 0..rng.gen_range(1..4u32) {
            let owner = ACCOUNTS[rng.gen_range(0..ACCOUNTS.len())];
            let value = rng.gen_range(1..1_000) * COIN / 100;
            let payload = random_payload(&mut rng, value);
            let mut coin = Coin::new(TxOut::new(value, p2sh_script(&owner)), height as u32, false, payload);
            coin.is_coinbase = index == 0;
            let outpoint = OutPoint::new(block_hash(height), index);
            next.insert(outpoint, coin.clone());
            changes.insert(outpoint, CoinsCacheEntry::dirty(coin));
        }

        // The uncommitted view already reflects the block.
        assert_matches_model(&coins, &next, &changes);
        coins
            .apply_batch(&mut changes, &block_hash(height), &chain)
            .expect("apply batch");
        live = next;
        assert_matches_model(&coins, &live, &CoinsMap::new());
    }
    assert!(!live.is_empty());
}
