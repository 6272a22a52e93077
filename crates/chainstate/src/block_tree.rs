//! Block-tree metadata: block files, block index records and flags.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use qitd_consensus::{AccountId, Hash256};
use qitd_pos::ChainPosition;
use qitd_primitives::encoding::{DecodeError, Decoder, Encoder};
use qitd_storage::{meta, Column, KeyValueStore, WriteBatch};

use crate::scan::visit_prefix;
use crate::ChainStateError;

const FLAG_TRUE: u8 = b'1';
const FLAG_FALSE: u8 = b'0';

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockFileInfo {
    pub blocks: u32,
    pub size: u32,
    pub undo_size: u32,
    pub height_first: u32,
    pub height_last: u32,
    pub time_first: u64,
    pub time_last: u64,
}

impl BlockFileInfo {
    pub fn add_block(&mut self, height: u32, time: u64) {
        if self.blocks == 0 || self.height_first > height {
            self.height_first = height;
        }
        if self.blocks == 0 || self.time_first > time {
            self.time_first = time;
        }
        self.blocks += 1;
        self.height_last = self.height_last.max(height);
        self.time_last = self.time_last.max(time);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(36);
        encoder.write_u32_le(self.blocks);
        encoder.write_u32_le(self.size);
        encoder.write_u32_le(self.undo_size);
        encoder.write_u32_le(self.height_first);
        encoder.write_u32_le(self.height_last);
        encoder.write_u64_le(self.time_first);
        encoder.write_u64_le(self.time_last);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let info = Self {
            blocks: decoder.read_u32_le()?,
            size: decoder.read_u32_le()?,
            undo_size: decoder.read_u32_le()?,
            height_first: decoder.read_u32_le()?,
            height_last: decoder.read_u32_le()?,
            time_first: decoder.read_u64_le()?,
            time_last: decoder.read_u64_le()?,
        };
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(info)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockIndexRecord {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: i32,
    pub base_target: u64,
    pub next_generation_signature: Hash256,
    /// Account paid by the block's miner-reward output, if it has one.
    pub miner_reward_account: Option<AccountId>,
}

impl BlockIndexRecord {
    pub fn position(&self) -> ChainPosition {
        ChainPosition {
            hash: self.hash,
            height: self.height,
            base_target: self.base_target,
            next_generation_signature: self.next_generation_signature,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(128);
        encoder.write_hash(&self.hash);
        encoder.write_hash(&self.prev_hash);
        encoder.write_i32_le(self.height);
        encoder.write_u64_le(self.base_target);
        encoder.write_hash(&self.next_generation_signature);
        match &self.miner_reward_account {
            Some(account) => {
                encoder.write_u8(1);
                encoder.write_account_id(account);
            }
            None => encoder.write_u8(0),
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let hash = decoder.read_hash()?;
        let prev_hash = decoder.read_hash()?;
        let height = decoder.read_i32_le()?;
        let base_target = decoder.read_u64_le()?;
        let next_generation_signature = decoder.read_hash()?;
        let miner_reward_account = match decoder.read_u8()? {
            0 => None,
            1 => Some(decoder.read_account_id()?),
            _ => return Err(DecodeError::InvalidData("miner reward account flag")),
        };
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            hash,
            prev_hash,
            height,
            base_target,
            next_generation_signature,
            miner_reward_account,
        })
    }
}

/// Read access to the block index, keyed by block hash.
pub trait ChainIndexView: Send + Sync {
    fn block_index(&self, hash: &Hash256) -> Result<Option<BlockIndexRecord>, ChainStateError>;

    fn require_block_index(&self, hash: &Hash256) -> Result<BlockIndexRecord, ChainStateError> {
        self.block_index(hash)?
            .ok_or(ChainStateError::MissingBlock(*hash))
    }
}

/// In-memory block index for tools and tests.
#[derive(Default)]
pub struct MemoryChainIndex {
    records: RwLock<HashMap<Hash256, BlockIndexRecord>>,
}

impl MemoryChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: BlockIndexRecord) {
        self.records.write().insert(record.hash, record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ChainIndexView for MemoryChainIndex {
    fn block_index(&self, hash: &Hash256) -> Result<Option<BlockIndexRecord>, ChainStateError> {
        Ok(self.records.read().get(hash).copied())
    }
}

pub struct BlockTree<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> BlockTree<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn read_block_file_info(&self, file: u32) -> Result<Option<BlockFileInfo>, ChainStateError> {
        match self.store.get(Column::BlockFiles, &file.to_be_bytes())? {
            Some(bytes) => Ok(Some(BlockFileInfo::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn read_last_block_file(&self) -> Result<Option<u32>, ChainStateError> {
        let Some(bytes) = self.store.get(Column::Meta, meta::LAST_BLOCK_FILE)? else {
            return Ok(None);
        };
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ChainStateError::CorruptIndex("last block file record"))?;
        Ok(Some(u32::from_le_bytes(raw)))
    }

    pub fn write_reindexing(&self, reindexing: bool) -> Result<(), ChainStateError> {
        if reindexing {
            self.store.put(Column::Meta, meta::REINDEXING, &[FLAG_TRUE])?;
        } else {
            self.store.delete(Column::Meta, meta::REINDEXING)?;
        }
        Ok(())
    }

    pub fn is_reindexing(&self) -> Result<bool, ChainStateError> {
        Ok(self.store.exists(Column::Meta, meta::REINDEXING)?)
    }

    pub fn write_flag(&self, name: &str, value: bool) -> Result<(), ChainStateError> {
        let byte = if value { FLAG_TRUE } else { FLAG_FALSE };
        self.store.put(Column::Flag, name.as_bytes(), &[byte])?;
        Ok(())
    }

    pub fn read_flag(&self, name: &str) -> Result<Option<bool>, ChainStateError> {
        Ok(self
            .store
            .get(Column::Flag, name.as_bytes())?
            .map(|bytes| bytes.first() == Some(&FLAG_TRUE)))
    }

    /// Writes file infos, the last file number and block records in one batch.
    pub fn write_batch_sync(
        &self,
        file_infos: &[(u32, BlockFileInfo)],
        last_file: u32,
        records: &[BlockIndexRecord],
    ) -> Result<(), ChainStateError> {
        let mut batch = WriteBatch::new();
        for (file, info) in file_infos {
            batch.put(Column::BlockFiles, file.to_be_bytes(), info.encode());
        }
        batch.put(Column::Meta, meta::LAST_BLOCK_FILE, last_file.to_le_bytes());
        for record in records {
            batch.put(Column::BlockIndex, record.hash, record.encode());
        }
        self.store.write_batch(&batch)?;
        Ok(())
    }

    pub fn load_block_index(&self) -> Result<Vec<BlockIndexRecord>, ChainStateError> {
        let mut records = Vec::new();
        visit_prefix(self.store.as_ref(), Column::BlockIndex, &[], |_, value| {
            records.push(BlockIndexRecord::decode(value)?);
            Ok(())
        })?;
        records.sort_by_key(|record| record.height);
        Ok(records)
    }
}

impl<S: KeyValueStore> ChainIndexView for BlockTree<S> {
    fn block_index(&self, hash: &Hash256) -> Result<Option<BlockIndexRecord>, ChainStateError> {
        match self.store.get(Column::BlockIndex, hash)? {
            Some(bytes) => Ok(Some(BlockIndexRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
