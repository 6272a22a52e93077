//! Account index descriptors.
//!
//! Every unspent coin with an owner implies a fixed set of index entries,
//! derived here in one place so writes, erases, balance adjustments and
//! rebuilds all agree.

use qitd_consensus::{AccountId, Amount};
use qitd_primitives::OutPoint;
use qitd_storage::{Column, WriteBatch};
use smallvec::SmallVec;

use crate::coins::{coin_key, outpoint_from_coin_key, Coin, CoinPayload, COIN_KEY_LEN};

pub const ACCOUNT_KEY_LEN: usize = 20;
pub const INDEX_KEY_LEN: usize = ACCOUNT_KEY_LEN + COIN_KEY_LEN;
const BINDING_VALUE_LEN: usize = 12;

/// Stored index layout version; bump to force a rebuild on startup.
pub const INDEX_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum IndexFamily {
    Balance,
    BindPlotter,
    PointSend,
    PointReceive,
    StakingSend,
    StakingReceive,
}

impl IndexFamily {
    pub const ALL: [IndexFamily; 6] = [
        IndexFamily::Balance,
        IndexFamily::BindPlotter,
        IndexFamily::PointSend,
        IndexFamily::PointReceive,
        IndexFamily::StakingSend,
        IndexFamily::StakingReceive,
    ];

    pub fn column(self) -> Column {
        match self {
            IndexFamily::Balance => Column::Balance,
            IndexFamily::BindPlotter => Column::BindPlotter,
            IndexFamily::PointSend => Column::PointSend,
            IndexFamily::PointReceive => Column::PointReceive,
            IndexFamily::StakingSend => Column::StakingSend,
            IndexFamily::StakingReceive => Column::StakingReceive,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexValue {
    Amount(Amount),
    Binding { plotter_id: u64, height: u32 },
}

impl IndexValue {
    pub fn encode(&self) -> SmallVec<[u8; BINDING_VALUE_LEN]> {
        let mut out = SmallVec::new();
        match self {
            IndexValue::Amount(amount) => out.extend_from_slice(&amount.to_le_bytes()),
            IndexValue::Binding { plotter_id, height } => {
                out.extend_from_slice(&plotter_id.to_le_bytes());
                out.extend_from_slice(&height.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(family: IndexFamily, bytes: &[u8]) -> Option<Self> {
        match family {
            IndexFamily::BindPlotter => {
                if bytes.len() != BINDING_VALUE_LEN {
                    return None;
                }
                Some(IndexValue::Binding {
                    plotter_id: u64::from_le_bytes(bytes[0..8].try_into().ok()?),
                    height: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
                })
            }
            _ => Some(IndexValue::Amount(i64::from_le_bytes(bytes.try_into().ok()?))),
        }
    }

    /// Amount this entry contributes to its family's account total.
    pub fn amount(&self, bind_lock: Amount) -> Amount {
        match self {
            IndexValue::Amount(amount) => *amount,
            IndexValue::Binding { .. } => bind_lock,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub family: IndexFamily,
    pub account: AccountId,
    pub value: IndexValue,
}

impl IndexEntry {
    pub fn key(&self, outpoint: &OutPoint) -> [u8; INDEX_KEY_LEN] {
        index_key(&self.account, outpoint)
    }
}

pub fn index_key(account: &AccountId, outpoint: &OutPoint) -> [u8; INDEX_KEY_LEN] {
    let mut key = [0u8; INDEX_KEY_LEN];
    key[..ACCOUNT_KEY_LEN].copy_from_slice(account);
    key[ACCOUNT_KEY_LEN..].copy_from_slice(&coin_key(outpoint));
    key
}

pub fn parse_index_key(key: &[u8]) -> Option<(AccountId, OutPoint)> {
    if key.len() != INDEX_KEY_LEN {
        return None;
    }
    let account: AccountId = key[..ACCOUNT_KEY_LEN].try_into().ok()?;
    let outpoint = outpoint_from_coin_key(&key[ACCOUNT_KEY_LEN..])?;
    Some((account, outpoint))
}

/// Index entries implied by `coin`, regardless of its spent flag.
pub fn index_entries(coin: &Coin) -> SmallVec<[IndexEntry; 3]> {
    let mut entries = SmallVec::new();
    let Some(owner) = coin.owner else {
        return entries;
    };
    entries.push(IndexEntry {
        family: IndexFamily::Balance,
        account: owner,
        value: IndexValue::Amount(coin.value()),
    });
    match &coin.payload {
        CoinPayload::None => {}
        CoinPayload::BindPlotter { plotter_id } => entries.push(IndexEntry {
            family: IndexFamily::BindPlotter,
            account: owner,
            value: IndexValue::Binding {
                plotter_id: *plotter_id,
                height: coin.height,
            },
        }),
        CoinPayload::Point { receiver, amount } => {
            entries.push(IndexEntry {
                family: IndexFamily::PointSend,
                account: owner,
                value: IndexValue::Amount(coin.value()),
            });
            entries.push(IndexEntry {
                family: IndexFamily::PointReceive,
                account: *receiver,
                value: IndexValue::Amount(*amount),
            });
        }
        CoinPayload::Staking {
            receiver, amount, ..
        } => {
            entries.push(IndexEntry {
                family: IndexFamily::StakingSend,
                account: owner,
                value: IndexValue::Amount(coin.value()),
            });
            entries.push(IndexEntry {
                family: IndexFamily::StakingReceive,
                account: *receiver,
                value: IndexValue::Amount(*amount),
            });
        }
    }
    entries
}

pub fn put_index_entries(batch: &mut WriteBatch, outpoint: &OutPoint, coin: &Coin) {
    for entry in index_entries(coin) {
        batch.put(entry.family.column(), entry.key(outpoint), entry.value.encode().as_slice());
    }
}

pub fn erase_index_entries(batch: &mut WriteBatch, outpoint: &OutPoint, coin: &Coin) {
    for entry in index_entries(coin) {
        batch.delete(entry.family.column(), entry.key(outpoint));
    }
}
