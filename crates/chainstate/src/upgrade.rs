//! Offline rebuild of the account indexes from the coin table.

use qitd_log::log_info;
use qitd_storage::{meta, Column, KeyValueStore, WriteBatch};

use crate::coins::{outpoint_from_coin_key, Coin};
use crate::index::{put_index_entries, IndexFamily, INDEX_VERSION};
use crate::scan::{visit_in_chunks, visit_prefix};
use crate::store::CoinStore;
use crate::ChainStateError;

const PROGRESS_STEP: u32 = 10;

impl<S: KeyValueStore> CoinStore<S> {
    pub fn index_version(&self) -> Result<Option<u32>, ChainStateError> {
        let Some(bytes) = self.store().get(Column::Meta, meta::INDEX_VERSION)? else {
            return Ok(None);
        };
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ChainStateError::CorruptIndex("index version record"))?;
        Ok(Some(u32::from_le_bytes(raw)))
    }

    /// Rebuilds every account index when the stored layout version is not
    /// current. `progress` receives percentages in steps of ten. Returns
    /// whether a rebuild ran.
    pub fn upgrade_indexes(&self, mut progress: impl FnMut(u32)) -> Result<bool, ChainStateError> {
        let _guard = self.lock();
        if self.index_version()? == Some(INDEX_VERSION) {
            return Ok(false);
        }
        log_info!("upgrading coin database indexes to version {INDEX_VERSION}: [0%]");
        progress(0);
        self.store().delete(Column::Meta, meta::INDEX_VERSION)?;
        let batch_size = self.options().batch_size;
        let store = self.store().as_ref();

        let mut batch = WriteBatch::new();
        let mut removed = 0usize;
        for family in IndexFamily::ALL {
            visit_in_chunks(store, family.column(), &mut batch, batch_size, |key, _, batch| {
                batch.delete(family.column(), key);
                removed += 1;
                Ok(())
            })?;
        }
        store.write_batch(&batch)?;
        batch.clear();

        let mut total = 0usize;
        visit_prefix(store, Column::Coin, &[], |_, _| {
            total += 1;
            Ok(())
        })?;
        let mut position = 0usize;
        let mut reported = 0u32;
        visit_in_chunks(store, Column::Coin, &mut batch, batch_size, |key, value, batch| {
            let outpoint =
                outpoint_from_coin_key(key).ok_or(ChainStateError::CorruptIndex("coin key"))?;
            let coin = Coin::decode(value)?;
            put_index_entries(batch, &outpoint, &coin);

            position += 1;
            let percent = (position * 100 / total.max(1)) as u32;
            let step = percent / PROGRESS_STEP * PROGRESS_STEP;
            if step > reported && step < 100 {
                reported = step;
                log_info!("upgrading coin database indexes: [{step}%]");
                progress(step);
            }
            Ok(())
        })?;
        batch.put(Column::Meta, meta::INDEX_VERSION, INDEX_VERSION.to_le_bytes());
        store.write_batch(&batch)?;

        log_info!(
            "upgraded coin database indexes: removed {removed} entries, indexed {total} coins [DONE]"
        );
        progress(100);
        Ok(true)
    }
}
