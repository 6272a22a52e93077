//! Account balance and binding queries over the persisted indexes, adjusted
//! for not-yet-committed coin changes.

use std::collections::BTreeMap;

use qitd_consensus::constants::BIND_PLOTTER_LOCK_AMOUNT;
use qitd_consensus::{AccountId, Amount};
use qitd_primitives::OutPoint;
use qitd_storage::KeyValueStore;

use crate::coins::CoinsMap;
use crate::index::{index_entries, parse_index_key, IndexFamily, IndexValue};
use crate::scan::visit_prefix;
use crate::store::CoinStore;
use crate::ChainStateError;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BalanceQuery {
    pub bind_plotter: bool,
    pub point: bool,
    pub staking: bool,
}

impl BalanceQuery {
    pub fn all() -> Self {
        Self {
            bind_plotter: true,
            point: true,
            staking: true,
        }
    }
}

/// Components not requested by the [`BalanceQuery`] are `None`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AccountBalance {
    /// Value of every unspent coin owned by the account.
    pub balance: Amount,
    pub bind_plotter_locked: Option<Amount>,
    pub point_sent: Option<Amount>,
    pub point_received: Option<Amount>,
    pub staking_sent: Option<Amount>,
    pub staking_received: Option<Amount>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BindingEntry {
    pub account: AccountId,
    pub outpoint: OutPoint,
    pub plotter_id: u64,
    pub height: u32,
}

fn account_hex(account: &AccountId) -> String {
    account.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn negative_total(family: IndexFamily, account: &AccountId, total: Amount) -> ChainStateError {
    ChainStateError::InvariantViolation(format!(
        "{family:?} total {total} for account {} is negative",
        account_hex(account)
    ))
}

impl<S: KeyValueStore> CoinStore<S> {
    fn stored_index_value(
        &self,
        family: IndexFamily,
        key: &[u8],
    ) -> Result<Option<IndexValue>, ChainStateError> {
        match self.store().get(family.column(), key)? {
            Some(bytes) => IndexValue::decode(family, &bytes)
                .map(Some)
                .ok_or(ChainStateError::CorruptIndex("account index value")),
            None => Ok(None),
        }
    }

    /// Net change `dirty` makes to `account`'s total in `family` relative to
    /// the persisted index: spent coins whose entries are stored subtract,
    /// unspent coins whose entries are not yet stored add.
    fn dirty_adjustment(
        &self,
        family: IndexFamily,
        account: Option<&AccountId>,
        dirty: &CoinsMap,
        mut apply: impl FnMut(AccountId, Amount) -> Result<(), ChainStateError>,
    ) -> Result<(), ChainStateError> {
        for (outpoint, entry) in dirty.iter().filter(|(_, entry)| entry.dirty) {
            for index in index_entries(&entry.coin) {
                if index.family != family || account.is_some_and(|wanted| *wanted != index.account) {
                    continue;
                }
                let stored = self.stored_index_value(family, &index.key(outpoint))?;
                match (stored, entry.coin.spent) {
                    (Some(value), true) => {
                        apply(index.account, -value.amount(BIND_PLOTTER_LOCK_AMOUNT))?
                    }
                    (None, false) => apply(index.account, index.value.amount(BIND_PLOTTER_LOCK_AMOUNT))?,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn family_total(
        &self,
        family: IndexFamily,
        account: &AccountId,
        dirty: &CoinsMap,
    ) -> Result<Amount, ChainStateError> {
        let overflow = || negative_total(family, account, Amount::MAX);
        let mut total: Amount = 0;
        visit_prefix(self.store().as_ref(), family.column(), account, |key, value| {
            if parse_index_key(key).is_none() {
                return Err(ChainStateError::CorruptIndex("account index key"));
            }
            let value = IndexValue::decode(family, value)
                .ok_or(ChainStateError::CorruptIndex("account index value"))?;
            total = total
                .checked_add(value.amount(BIND_PLOTTER_LOCK_AMOUNT))
                .ok_or_else(overflow)?;
            Ok(())
        })?;
        self.dirty_adjustment(family, Some(account), dirty, |_, delta| {
            total = total.checked_add(delta).ok_or_else(overflow)?;
            Ok(())
        })?;
        if total < 0 {
            return Err(negative_total(family, account, total));
        }
        Ok(total)
    }

    pub fn account_balance(
        &self,
        account: &AccountId,
        query: BalanceQuery,
        dirty: &CoinsMap,
    ) -> Result<AccountBalance, ChainStateError> {
        let optional = |wanted: bool, family: IndexFamily| -> Result<Option<Amount>, ChainStateError> {
            if wanted {
                self.family_total(family, account, dirty).map(Some)
            } else {
                Ok(None)
            }
        };
        Ok(AccountBalance {
            balance: self.family_total(IndexFamily::Balance, account, dirty)?,
            bind_plotter_locked: optional(query.bind_plotter, IndexFamily::BindPlotter)?,
            point_sent: optional(query.point, IndexFamily::PointSend)?,
            point_received: optional(query.point, IndexFamily::PointReceive)?,
            staking_sent: optional(query.staking, IndexFamily::StakingSend)?,
            staking_received: optional(query.staking, IndexFamily::StakingReceive)?,
        })
    }

    fn binding_entries(
        &self,
        prefix: &[u8],
        mut keep: impl FnMut(&BindingEntry) -> bool,
    ) -> Result<Vec<BindingEntry>, ChainStateError> {
        let mut entries = Vec::new();
        let column = IndexFamily::BindPlotter.column();
        visit_prefix(self.store().as_ref(), column, prefix, |key, value| {
            let (account, outpoint) =
                parse_index_key(key).ok_or(ChainStateError::CorruptIndex("binding key"))?;
            let Some(IndexValue::Binding { plotter_id, height }) =
                IndexValue::decode(IndexFamily::BindPlotter, value)
            else {
                return Err(ChainStateError::CorruptIndex("binding value"));
            };
            let entry = BindingEntry {
                account,
                outpoint,
                plotter_id,
                height,
            };
            if keep(&entry) {
                entries.push(entry);
            }
            Ok(())
        })?;
        Ok(entries)
    }

    /// Bindings owned by `account`; `plotter_id == 0` matches any plotter.
    pub fn binding_entries_for_account(
        &self,
        account: &AccountId,
        plotter_id: u64,
    ) -> Result<Vec<BindingEntry>, ChainStateError> {
        self.binding_entries(account, |entry| plotter_id == 0 || entry.plotter_id == plotter_id)
    }

    pub fn binding_entries_for_plotter(
        &self,
        plotter_id: u64,
    ) -> Result<Vec<BindingEntry>, ChainStateError> {
        self.binding_entries(&[], |entry| entry.plotter_id == plotter_id)
    }

    /// The `limit` accounts receiving the most stake, largest first, ties by
    /// account id.
    pub fn top_staking_accounts(
        &self,
        limit: usize,
        dirty: &CoinsMap,
    ) -> Result<Vec<(AccountId, Amount)>, ChainStateError> {
        let family = IndexFamily::StakingReceive;
        let mut totals: BTreeMap<AccountId, Amount> = BTreeMap::new();
        let mut add = |account: AccountId, delta: Amount| -> Result<(), ChainStateError> {
            let total = totals.entry(account).or_default();
            *total = total
                .checked_add(delta)
                .ok_or_else(|| negative_total(family, &account, Amount::MAX))?;
            Ok(())
        };
        visit_prefix(self.store().as_ref(), family.column(), &[], |key, value| {
            let (account, _) =
                parse_index_key(key).ok_or(ChainStateError::CorruptIndex("staking key"))?;
            let value =
                IndexValue::decode(family, value).ok_or(ChainStateError::CorruptIndex("staking value"))?;
            add(account, value.amount(BIND_PLOTTER_LOCK_AMOUNT))
        })?;
        self.dirty_adjustment(family, None, dirty, &mut add)?;

        let mut ranked = Vec::with_capacity(totals.len());
        for (account, total) in totals {
            if total < 0 {
                return Err(negative_total(family, &account, total));
            }
            if total > 0 {
                ranked.push((account, total));
            }
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }
}
