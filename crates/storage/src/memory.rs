use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    Column, KeyValueStore, PrefixVisitor, RangeVisitor, ScanResult, StoreError, WriteBatch,
    WriteOp,
};

/// Entries copied out per lock acquisition while visiting.
const VISIT_CHUNK: usize = 256;

/// In-memory store over a single sorted keyspace of `column prefix ‖ key`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

fn namespaced(column: Column, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(column.prefix());
    out.extend_from_slice(key);
    out
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.is_empty())
    }

    /// Number of records stored under `column`.
    pub fn column_len(&self, column: Column) -> Result<usize, StoreError> {
        let mut count = 0usize;
        self.for_each_prefix(column, &[], &mut |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Visits `column` keys that start with `prefix` and are `>= start`.
    /// The lock is released between chunks so visitors may use the store.
    fn visit_chunked(
        &self,
        column: Column,
        prefix: &[u8],
        start: &[u8],
        visitor: &mut RangeVisitor<'_>,
    ) -> Result<(), StoreError> {
        let bounds = namespaced(column, prefix);
        let mut lower = Bound::Included(namespaced(column, start));
        loop {
            let chunk: Vec<(Vec<u8>, Vec<u8>)> = {
                let guard = self.read()?;
                guard
                    .range::<Vec<u8>, _>((lower.as_ref(), Bound::Unbounded))
                    .take_while(|(key, _)| key.starts_with(&bounds))
                    .take(VISIT_CHUNK)
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            };
            let Some((last, _)) = chunk.last() else {
                return Ok(());
            };
            let next = Bound::Excluded(last.clone());
            let full = chunk.len() == VISIT_CHUNK;
            for (key, value) in &chunk {
                if !visitor(&key[1..], value)? {
                    return Ok(());
                }
            }
            if !full {
                return Ok(());
            }
            lower = next;
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read()?.get(&namespaced(column, key)).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write()?.insert(namespaced(column, key), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.write()?.remove(&namespaced(column, key));
        Ok(())
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        let mut results = Vec::new();
        self.for_each_prefix(column, prefix, &mut |key, value| {
            results.push((key.to_vec(), value.to_vec()));
            Ok(())
        })?;
        Ok(results)
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.visit_chunked(column, prefix, prefix, &mut |key, value| {
            visitor(key, value)?;
            Ok(true)
        })
    }

    fn for_each_from<'a>(
        &self,
        column: Column,
        start: &[u8],
        visitor: &mut RangeVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.visit_chunked(column, &[], start, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard.insert(namespaced(*column, key.as_slice()), value.as_slice().to_vec());
                }
                WriteOp::Delete { column, key } => {
                    guard.remove(&namespaced(*column, key.as_slice()));
                }
            }
        }
        Ok(())
    }
}
