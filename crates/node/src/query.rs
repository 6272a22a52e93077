//! One-shot query commands. Each prints a single JSON document.

use qitd_chainstate::{hash_hex, BalanceQuery, BindingEntry, CoinStore, CoinsMap};
use qitd_consensus::{AccountId, Amount, Hash256};
use qitd_pos::identity::{derive_master_key, derive_role_key, farmer_id, KeyRole};
use qitd_pos::legacy::{plotter_id_from_public_key, public_key_from_passphrase};
use qitd_primitives::OutPoint;
use qitd_storage::KeyValueStore;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Query {
    Balance(AccountId),
    BindingsForAccount { account: AccountId, plotter_id: u64 },
    BindingsForPlotter(u64),
    TopStaking(usize),
    StakingPools(Hash256),
    PlotterId(String),
    FarmerId(String),
}

impl Query {
    pub(crate) fn needs_store(&self) -> bool {
        !matches!(self, Query::PlotterId(_) | Query::FarmerId(_))
    }
}

#[derive(Debug, Serialize)]
struct BalanceView {
    account: String,
    balance: Amount,
    bind_plotter_locked: Option<Amount>,
    point_sent: Option<Amount>,
    point_received: Option<Amount>,
    staking_sent: Option<Amount>,
    staking_received: Option<Amount>,
}

#[derive(Debug, Serialize)]
struct BindingView {
    account: String,
    outpoint: String,
    plotter_id: u64,
    height: u32,
}

impl From<&BindingEntry> for BindingView {
    fn from(entry: &BindingEntry) -> Self {
        Self {
            account: hex::encode(entry.account),
            outpoint: outpoint_to_string(&entry.outpoint),
            plotter_id: entry.plotter_id,
            height: entry.height,
        }
    }
}

#[derive(Debug, Serialize)]
struct StakeView {
    account: String,
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct PoolUserView {
    account: String,
    stake: Amount,
    withdrawable: Amount,
}

#[derive(Debug, Serialize)]
struct PoolView {
    pool: String,
    genesis_outpoint: String,
    stake: Amount,
    users: Vec<PoolUserView>,
}

#[derive(Debug, Serialize)]
struct EpochView {
    epoch: String,
    pools: Vec<PoolView>,
}

/// Inverse of [`hash_hex`]: hashes are written in reversed byte order.
pub(crate) fn parse_hash_hex(value: &str) -> Option<Hash256> {
    let bytes = hex::decode(value.trim()).ok()?;
    let mut hash: Hash256 = bytes.try_into().ok()?;
    hash.reverse();
    Some(hash)
}

pub(crate) fn parse_account_hex(value: &str) -> Option<AccountId> {
    let bytes = hex::decode(value.trim()).ok()?;
    bytes.try_into().ok()
}

fn outpoint_to_string(outpoint: &OutPoint) -> String {
    format!("{}:{}", hash_hex(&outpoint.hash), outpoint.index)
}

fn to_json<T: Serialize>(view: &T) -> Result<Value, String> {
    serde_json::to_value(view).map_err(|err| err.to_string())
}

pub(crate) fn run_identity_query(query: &Query) -> Result<Value, String> {
    match query {
        Query::PlotterId(passphrase) => {
            let public_key = public_key_from_passphrase(passphrase);
            Ok(serde_json::json!({
                "public_key": hex::encode(public_key),
                "plotter_id": plotter_id_from_public_key(&public_key),
            }))
        }
        Query::FarmerId(passphrase) => {
            let master = derive_master_key(passphrase).map_err(|err| err.to_string())?;
            let farmer = derive_role_key(&master, KeyRole::Farmer)
                .map_err(|err| err.to_string())?
                .public_key()
                .to_bytes();
            Ok(serde_json::json!({
                "farmer_public_key": hex::encode(farmer),
                "farmer_id": farmer_id(&farmer),
            }))
        }
        _ => Err("query needs an open coin database".to_string()),
    }
}

pub(crate) fn run_store_query<S: KeyValueStore>(
    coins: &CoinStore<S>,
    query: &Query,
) -> Result<Value, String> {
    let no_changes = CoinsMap::new();
    match query {
        Query::Balance(account) => {
            let balance = coins
                .account_balance(account, BalanceQuery::all(), &no_changes)
                .map_err(|err| err.to_string())?;
            to_json(&BalanceView {
                account: hex::encode(account),
                balance: balance.balance,
                bind_plotter_locked: balance.bind_plotter_locked,
                point_sent: balance.point_sent,
                point_received: balance.point_received,
                staking_sent: balance.staking_sent,
                staking_received: balance.staking_received,
            })
        }
        Query::BindingsForAccount {
            account,
            plotter_id,
        } => {
            let entries = coins
                .binding_entries_for_account(account, *plotter_id)
                .map_err(|err| err.to_string())?;
            to_json(&entries.iter().map(BindingView::from).collect::<Vec<_>>())
        }
        Query::BindingsForPlotter(plotter_id) => {
            let entries = coins
                .binding_entries_for_plotter(*plotter_id)
                .map_err(|err| err.to_string())?;
            to_json(&entries.iter().map(BindingView::from).collect::<Vec<_>>())
        }
        Query::TopStaking(limit) => {
            let ranked = coins
                .top_staking_accounts(*limit, &no_changes)
                .map_err(|err| err.to_string())?;
            let views: Vec<StakeView> = ranked
                .into_iter()
                .map(|(account, amount)| StakeView {
                    account: hex::encode(account),
                    amount,
                })
                .collect();
            to_json(&views)
        }
        Query::StakingPools(epoch) => {
            let mut pools = Vec::new();
            for pool in coins.staking_pools(epoch).map_err(|err| err.to_string())? {
                let users = coins
                    .staking_pool_users(epoch, &pool.pool)
                    .map_err(|err| err.to_string())?
                    .into_iter()
                    .map(|user| PoolUserView {
                        account: hex::encode(user.account),
                        stake: user.stake,
                        withdrawable: user.withdrawable,
                    })
                    .collect();
                pools.push(PoolView {
                    pool: hex::encode(pool.pool),
                    genesis_outpoint: outpoint_to_string(&pool.genesis_outpoint),
                    stake: pool.stake,
                    users,
                });
            }
            to_json(&EpochView {
                epoch: hash_hex(epoch),
                pools,
            })
        }
        Query::PlotterId(_) | Query::FarmerId(_) => run_identity_query(query),
    }
}
