//! Streaming column scans that keep chain-state errors intact.

use qitd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::ChainStateError;

fn stash(failure: &mut Option<ChainStateError>, err: ChainStateError) -> StoreError {
    let message = err.to_string();
    *failure = Some(err);
    StoreError::Backend(message)
}

/// Visits every `column` record under `prefix` in key order.
pub(crate) fn visit_prefix<S: KeyValueStore + ?Sized>(
    store: &S,
    column: Column,
    prefix: &[u8],
    mut visitor: impl FnMut(&[u8], &[u8]) -> Result<(), ChainStateError>,
) -> Result<(), ChainStateError> {
    let mut failure = None;
    let scanned = store.for_each_prefix(column, prefix, &mut |key, value| {
        visitor(key, value).map_err(|err| stash(&mut failure, err))
    });
    match failure {
        Some(err) => Err(err),
        None => scanned.map_err(ChainStateError::from),
    }
}

/// Walks all of `column` while the visitor fills `batch`. Once the batch
/// grows past `batch_size` the scan stops, the batch is committed, and the
/// walk resumes after the last visited key. Whatever remains in `batch` at
/// the end is left for the caller.
pub(crate) fn visit_in_chunks<S: KeyValueStore + ?Sized>(
    store: &S,
    column: Column,
    batch: &mut WriteBatch,
    batch_size: usize,
    mut visitor: impl FnMut(&[u8], &[u8], &mut WriteBatch) -> Result<(), ChainStateError>,
) -> Result<(), ChainStateError> {
    let mut cursor: Vec<u8> = Vec::new();
    loop {
        let mut failure = None;
        let mut resume_at: Option<Vec<u8>> = None;
        let scanned = store.for_each_from(column, &cursor, &mut |key, value| {
            visitor(key, value, &mut *batch).map_err(|err| stash(&mut failure, err))?;
            if batch.size_estimate() > batch_size {
                let mut next = key.to_vec();
                next.push(0);
                resume_at = Some(next);
                return Ok(false);
            }
            Ok(true)
        });
        if let Some(err) = failure {
            return Err(err);
        }
        scanned?;
        let Some(next) = resume_at else {
            return Ok(());
        };
        store.write_batch(batch)?;
        batch.clear();
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qitd_storage::memory::MemoryStore;

    #[test]
    fn visitor_error_is_returned_unchanged() {
        let store = MemoryStore::new();
        store.put(Column::Coin, b"a", b"1").expect("put");
        store.put(Column::Coin, b"b", b"2").expect("put");

        let mut visited = 0;
        let err = visit_prefix(&store, Column::Coin, &[], |_, _| {
            visited += 1;
            Err(ChainStateError::CorruptIndex("coin key"))
        })
        .expect_err("visitor fails");
        assert!(matches!(err, ChainStateError::CorruptIndex("coin key")));
        assert_eq!(visited, 1);
    }

    #[test]
    fn chunked_walk_commits_between_scans() {
        let store = MemoryStore::new();
        for idx in 0u8..40 {
            store.put(Column::Balance, &[idx], &[idx]).expect("put");
        }

        let mut batch = WriteBatch::new();
        let mut order = Vec::new();
        visit_in_chunks(&store, Column::Balance, &mut batch, 64, |key, _, batch| {
            order.push(key[0]);
            batch.delete(Column::Balance, key);
            Ok(())
        })
        .expect("walk");
        assert_eq!(order, (0u8..40).collect::<Vec<_>>());
        assert!(batch.size_estimate() <= 64);
        assert!(batch.len() < 40);
        assert_eq!(store.column_len(Column::Balance).expect("count"), batch.len());

        store.write_batch(&batch).expect("tail");
        assert_eq!(store.column_len(Column::Balance).expect("count"), 0);
    }
}
